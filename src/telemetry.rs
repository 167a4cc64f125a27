//! Game telemetry snapshot
//!
//! Telemetry strings are produced outside this crate and consumed verbatim.
//! The only field the pipeline interprets is the session state.

use parking_lot::RwLock;

/// Colony setting reported before any game data has been collected
pub const UNKNOWN_SETTING: &str = "Unknown as of now...";

/// Where the player currently is
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// A game is loaded and running
    #[default]
    InGame,
    /// Main menu / start screen, no game loaded
    StartScreen,
    /// Picking a landing site on the world map
    SelectingStartSite,
    /// A pre-game dialog page (scenario, storyteller, ...)
    Dialog(String),
}

impl SessionState {
    /// Text for the `CurrentWindow` prompt field; `None` while in game
    pub fn window_description(&self) -> Option<String> {
        match self {
            SessionState::InGame => None,
            SessionState::StartScreen => Some("The player is at the start screen".to_string()),
            SessionState::SelectingStartSite => {
                Some("The player is selecting the start site".to_string())
            }
            SessionState::Dialog(name) => Some(format!("The player is at the dialog {}", name)),
        }
    }

    pub fn is_start_screen(&self) -> bool {
        matches!(self, SessionState::StartScreen)
    }
}

/// Read-only view of the game used to build prompts
#[derive(Debug, Clone)]
pub struct TelemetrySnapshot {
    pub session: SessionState,
    pub player_name: Option<String>,
    pub colony_roster: Vec<String>,
    pub colony_setting: String,
    pub research_summary: String,
    pub resource_data: String,
    pub rooms_summary: String,
    pub energy_summary: String,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            session: SessionState::InGame,
            player_name: None,
            colony_roster: Vec::new(),
            colony_setting: UNKNOWN_SETTING.to_string(),
            research_summary: String::new(),
            resource_data: String::new(),
            rooms_summary: String::new(),
            energy_summary: String::new(),
        }
    }
}

/// Supplier of telemetry snapshots
pub trait TelemetrySource: Send + Sync {
    fn snapshot(&self) -> TelemetrySnapshot;
}

/// Telemetry held in memory and updated by whoever feeds the pipeline
#[derive(Debug, Default)]
pub struct StaticTelemetry {
    inner: RwLock<TelemetrySnapshot>,
}

impl StaticTelemetry {
    pub fn new(snapshot: TelemetrySnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    /// Mutate the current snapshot in place
    pub fn update(&self, f: impl FnOnce(&mut TelemetrySnapshot)) {
        f(&mut self.inner.write());
    }
}

impl TelemetrySource for StaticTelemetry {
    fn snapshot(&self) -> TelemetrySnapshot {
        self.inner.read().clone()
    }
}
