//! Controller run-state machine.

use serde::Serialize;

use crate::error::TileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Uninitialized,
    Initializing,
    GeneratingTiles,
    Ready,
    Scraping,
}

/// Inputs that move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    BeginInitialize,
    /// Storage is prepared and discovery will not run.
    StorageReady { has_tiles: bool },
    BeginDiscovery,
    DiscoveryFinished,
    InitializationFailed,
    StartRefresh,
    RefreshFinished,
    /// Clearing tile records. Finishes with `StorageReady`.
    BeginReset,
}

impl RunState {
    pub fn is_initialized(&self) -> bool {
        matches!(self, RunState::Ready | RunState::Scraping)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Scraping)
    }

    pub fn current_operation(&self) -> Option<&'static str> {
        match self {
            RunState::Initializing => Some("initializing"),
            RunState::GeneratingTiles => Some("generating_tiles"),
            RunState::Scraping => Some("scraping"),
            RunState::Uninitialized | RunState::Ready => None,
        }
    }

    /// The state after `event`, or a conflict if `event` is not allowed here.
    pub fn transition(self, event: RunEvent) -> Result<RunState, TileError> {
        use RunEvent::*;
        use RunState::*;

        let next = match (self, event) {
            (Uninitialized | Ready, BeginInitialize) => Some(Initializing),
            (Initializing, StorageReady { has_tiles: true }) => Some(Ready),
            (Initializing, StorageReady { has_tiles: false }) => Some(Uninitialized),
            (Initializing, BeginDiscovery) => Some(GeneratingTiles),
            (GeneratingTiles, DiscoveryFinished) => Some(Ready),
            (Initializing | GeneratingTiles, InitializationFailed) => Some(Uninitialized),
            (Ready, StartRefresh) => Some(Scraping),
            (Scraping, RefreshFinished) => Some(Ready),
            (Uninitialized | Ready, BeginReset) => Some(Initializing),
            _ => None,
        };

        next.ok_or_else(|| TileError::Conflict(conflict_message(self, event)))
    }
}

fn conflict_message(state: RunState, event: RunEvent) -> String {
    match (state, event) {
        (RunState::Uninitialized, RunEvent::StartRefresh) => {
            "tiles have not been initialized".to_string()
        }
        (RunState::Scraping, RunEvent::StartRefresh) => "refresh is already running".to_string(),
        (state, _) => match state.current_operation() {
            Some(op) => format!("operation '{}' is in progress", op),
            None => format!("{:?} is not allowed while {:?}", event, state),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_then_refresh() {
        let state = RunState::Uninitialized
            .transition(RunEvent::BeginInitialize)
            .and_then(|s| s.transition(RunEvent::BeginDiscovery))
            .and_then(|s| s.transition(RunEvent::DiscoveryFinished))
            .unwrap();
        assert_eq!(state, RunState::Ready);
        assert!(state.is_initialized());

        let running = state.transition(RunEvent::StartRefresh).unwrap();
        assert!(running.is_running());
        assert_eq!(running.current_operation(), Some("scraping"));
        assert_eq!(
            running.transition(RunEvent::RefreshFinished).unwrap(),
            RunState::Ready
        );
    }

    #[test]
    fn test_guards_reject_invalid_events() {
        assert!(matches!(
            RunState::Uninitialized.transition(RunEvent::StartRefresh),
            Err(TileError::Conflict(_))
        ));
        assert!(matches!(
            RunState::Scraping.transition(RunEvent::StartRefresh),
            Err(TileError::Conflict(_))
        ));
        assert!(matches!(
            RunState::GeneratingTiles.transition(RunEvent::BeginInitialize),
            Err(TileError::Conflict(_))
        ));
        assert!(matches!(
            RunState::Scraping.transition(RunEvent::BeginReset),
            Err(TileError::Conflict(_))
        ));
    }

    #[test]
    fn test_failure_returns_to_uninitialized() {
        assert_eq!(
            RunState::GeneratingTiles
                .transition(RunEvent::InitializationFailed)
                .unwrap(),
            RunState::Uninitialized
        );
        assert_eq!(
            RunState::Initializing
                .transition(RunEvent::StorageReady { has_tiles: true })
                .unwrap(),
            RunState::Ready
        );
    }

    #[test]
    fn test_reset_passes_through_initializing() {
        let resetting = RunState::Ready.transition(RunEvent::BeginReset).unwrap();
        assert_eq!(resetting, RunState::Initializing);
        assert!(matches!(
            resetting.transition(RunEvent::StartRefresh),
            Err(TileError::Conflict(_))
        ));
        assert_eq!(
            resetting
                .transition(RunEvent::StorageReady { has_tiles: false })
                .unwrap(),
            RunState::Uninitialized
        );
    }
}
