//! Lifecycle callbacks.
//!
//! A callback observes a run: every hook receives the optimizer's current
//! [`RunState`]. Hooks run synchronously, in registration order, and any error
//! a hook returns aborts the run.

mod history;
mod tracing_callback;

pub use history::{HistoryCallback, HistoryEntry};
pub use tracing_callback::TracingCallback;

use crate::error::{OptimizerError, Result};
use crate::state::{Event, RunState};

/// Observer of an optimization run. Every hook defaults to a no-op.
///
/// `&mut self` is for the callback's own bookkeeping; the run state itself is
/// read-only.
pub trait Callback {
    fn on_run_start(&mut self, _state: &RunState) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_run_end(&mut self, _state: &RunState) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_refinement_start(&mut self, _state: &RunState) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_refinement_end(&mut self, _state: &RunState) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_validation_start(&mut self, _state: &RunState) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_validation_end(&mut self, _state: &RunState) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_merge_success(&mut self, _state: &RunState) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_merge_failure(&mut self, _state: &RunState) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Route `event` to the matching hook.
pub fn dispatch(callback: &mut dyn Callback, event: Event, state: &RunState) -> anyhow::Result<()> {
    match event {
        Event::RunStart => callback.on_run_start(state),
        Event::RunEnd => callback.on_run_end(state),
        Event::RefinementStart => callback.on_refinement_start(state),
        Event::RefinementEnd => callback.on_refinement_end(state),
        Event::ValidationStart => callback.on_validation_start(state),
        Event::ValidationEnd => callback.on_validation_end(state),
        Event::MergeSuccess => callback.on_merge_success(state),
        Event::MergeFailure => callback.on_merge_failure(state),
    }
}

/// Notify every callback in order; the first failure stops the chain.
pub fn notify_all(
    callbacks: &mut [&mut dyn Callback],
    event: Event,
    state: &RunState,
) -> Result<()> {
    for callback in callbacks.iter_mut() {
        dispatch(&mut **callback, event, state)
            .map_err(|source| OptimizerError::Callback { event, source })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl Callback for Failing {
        fn on_merge_success(&mut self, _state: &RunState) -> anyhow::Result<()> {
            anyhow::bail!("sink unreachable")
        }
    }

    #[test]
    fn test_default_hooks_are_noops() {
        struct Silent;
        impl Callback for Silent {}

        let state = RunState::default();
        let mut silent = Silent;
        for event in Event::ALL {
            assert!(dispatch(&mut silent, event, &state).is_ok());
        }
    }

    #[test]
    fn test_notify_all_in_order_and_stops_on_error() {
        let state = RunState::default();
        let mut first = HistoryCallback::new();
        let mut failing = Failing;
        let mut last = HistoryCallback::new();

        {
            let mut chain: Vec<&mut dyn Callback> = vec![&mut first, &mut failing, &mut last];
            notify_all(&mut chain, Event::RunStart, &state).unwrap();

            let err = notify_all(&mut chain, Event::MergeSuccess, &state).unwrap_err();
            match err {
                OptimizerError::Callback { event, source } => {
                    assert_eq!(event, Event::MergeSuccess);
                    assert_eq!(source.to_string(), "sink unreachable");
                }
                other => panic!("expected callback error, got {:?}", other),
            }
        }

        assert_eq!(first.events(), vec![Event::RunStart, Event::MergeSuccess]);
        // never reached after the failing hook
        assert_eq!(last.events(), vec![Event::RunStart]);
    }
}
