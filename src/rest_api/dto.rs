//! Response bodies for the HTTP surface

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    /// Whether this replica currently holds the leader lease
    pub leader: bool,
}
