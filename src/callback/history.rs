//! Audit log of every lifecycle notification.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::Callback;
use crate::error::Result;
use crate::state::{Event, RunState};

/// One notification: the event plus the full run state at that moment.
///
/// Serialized flat, so each JSON record reads `{"event": ..., "prompt": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub event: Event,
    #[serde(flatten)]
    pub state: RunState,
}

/// Records every hook call in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryCallback {
    history: Vec<HistoryEntry>,
}

impl HistoryCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn events(&self) -> Vec<Event> {
        self.history.iter().map(|e| e.event).collect()
    }

    pub fn count(&self, event: Event) -> usize {
        self.history.iter().filter(|e| e.event == event).count()
    }

    /// Most recent entry for `event`.
    pub fn last(&self, event: Event) -> Option<&HistoryEntry> {
        self.history.iter().rev().find(|e| e.event == event)
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Save the log as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.history)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a log written by [`HistoryCallback::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let history: Vec<HistoryEntry> = serde_json::from_str(&content)?;
        Ok(HistoryCallback { history })
    }

    fn log(&mut self, event: Event, state: &RunState) -> anyhow::Result<()> {
        self.history.push(HistoryEntry {
            event,
            state: state.clone(),
        });
        Ok(())
    }
}

impl Callback for HistoryCallback {
    fn on_run_start(&mut self, state: &RunState) -> anyhow::Result<()> {
        self.log(Event::RunStart, state)
    }

    fn on_run_end(&mut self, state: &RunState) -> anyhow::Result<()> {
        self.log(Event::RunEnd, state)
    }

    fn on_refinement_start(&mut self, state: &RunState) -> anyhow::Result<()> {
        self.log(Event::RefinementStart, state)
    }

    fn on_refinement_end(&mut self, state: &RunState) -> anyhow::Result<()> {
        self.log(Event::RefinementEnd, state)
    }

    fn on_validation_start(&mut self, state: &RunState) -> anyhow::Result<()> {
        self.log(Event::ValidationStart, state)
    }

    fn on_validation_end(&mut self, state: &RunState) -> anyhow::Result<()> {
        self.log(Event::ValidationEnd, state)
    }

    fn on_merge_success(&mut self, state: &RunState) -> anyhow::Result<()> {
        self.log(Event::MergeSuccess, state)
    }

    fn on_merge_failure(&mut self, state: &RunState) -> anyhow::Result<()> {
        self.log(Event::MergeFailure, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::dispatch;
    use tempfile::TempDir;

    #[test]
    fn test_records_every_event_with_state() {
        let mut history = HistoryCallback::new();
        let mut state = RunState::new("### Task", 2);

        for event in Event::ALL {
            state.total_evaluations += 1;
            dispatch(&mut history, event, &state).unwrap();
        }

        assert_eq!(history.events(), Event::ALL.to_vec());
        assert_eq!(history.count(Event::MergeFailure), 1);
        assert_eq!(history.entries()[0].state.total_evaluations, 1);
        assert_eq!(history.last(Event::RunEnd).unwrap().state.total_evaluations, 8);
    }

    #[test]
    fn test_entries_serialize_flat() {
        let mut history = HistoryCallback::new();
        history.on_run_start(&RunState::new("### Task", 0)).unwrap();

        let value = serde_json::to_value(&history.entries()[0]).unwrap();
        assert_eq!(value["event"], "run_start");
        assert_eq!(value["prompt"], "### Task");
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");

        let mut history = HistoryCallback::new();
        let mut state = RunState::new("### Task", 1);
        history.on_run_start(&state).unwrap();
        state.flagged.push(0);
        state.final_prompt = Some("### Task".to_string());
        history.on_run_end(&state).unwrap();
        history.save(&path).unwrap();

        let loaded = HistoryCallback::load(&path).unwrap();
        assert_eq!(loaded.entries(), history.entries());
    }
}
