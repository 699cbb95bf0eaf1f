use super::Callback;
use crate::state::RunState;

/// Telemetry sink that turns lifecycle events into `tracing` events.
///
/// Install a subscriber in the host application to see them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingCallback;

impl TracingCallback {
    pub fn new() -> Self {
        Self
    }
}

fn patch_target(state: &RunState) -> &str {
    state
        .patch
        .as_ref()
        .map(|p| p.target_block.as_str())
        .unwrap_or("")
}

impl Callback for TracingCallback {
    fn on_run_start(&mut self, state: &RunState) -> anyhow::Result<()> {
        tracing::info!(
            examples = state.dataset_size,
            prompt_chars = state.prompt.len(),
            "optimization started"
        );
        Ok(())
    }

    fn on_run_end(&mut self, state: &RunState) -> anyhow::Result<()> {
        tracing::info!(
            evaluations = state.total_evaluations,
            accepted = state.accepted_patches,
            flagged = state.flagged.len(),
            accuracy = state.accuracy.unwrap_or(f64::NAN),
            "optimization finished"
        );
        Ok(())
    }

    fn on_refinement_start(&mut self, state: &RunState) -> anyhow::Result<()> {
        tracing::debug!(
            example = state.example_id,
            attempt = state.refinement_attempt,
            "refinement started"
        );
        Ok(())
    }

    fn on_refinement_end(&mut self, state: &RunState) -> anyhow::Result<()> {
        tracing::debug!(
            example = state.example_id,
            attempt = state.refinement_attempt,
            is_valid = state.is_valid,
            "refinement finished"
        );
        Ok(())
    }

    fn on_validation_start(&mut self, state: &RunState) -> anyhow::Result<()> {
        tracing::debug!(
            example = state.example_id,
            target = patch_target(state),
            "validating candidate"
        );
        Ok(())
    }

    fn on_validation_end(&mut self, state: &RunState) -> anyhow::Result<()> {
        tracing::debug!(
            example = state.example_id,
            is_valid = state.is_valid,
            score = state.validation_score,
            "validation finished"
        );
        Ok(())
    }

    fn on_merge_success(&mut self, state: &RunState) -> anyhow::Result<()> {
        tracing::info!(
            example = state.example_id,
            attempt = state.refinement_attempt,
            target = patch_target(state),
            "patch accepted"
        );
        Ok(())
    }

    fn on_merge_failure(&mut self, state: &RunState) -> anyhow::Result<()> {
        tracing::warn!(
            example = state.example_id,
            attempt = state.refinement_attempt,
            target = patch_target(state),
            error = state.last_error.as_deref().unwrap_or(""),
            "patch rejected"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::dispatch;
    use crate::state::Event;

    #[test]
    fn test_never_fails() {
        let mut sink = TracingCallback::new();
        let state = RunState::new("### Task", 3);
        for event in Event::ALL {
            assert!(dispatch(&mut sink, event, &state).is_ok());
        }
    }
}
