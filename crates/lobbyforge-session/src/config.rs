//! Orchestrator configuration.

use lobbyforge_protocol::{DEFAULT_BUILD_ID, SessionName};
use serde::{Deserialize, Serialize};

/// Settings for a [`SessionOrchestrator`](crate::SessionOrchestrator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// The one name every request is issued under.
    pub session_name: SessionName,

    /// Build compatibility id stamped on created sessions.
    pub build_unique_id: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            session_name: SessionName::game(),
            build_unique_id: DEFAULT_BUILD_ID,
        }
    }
}
