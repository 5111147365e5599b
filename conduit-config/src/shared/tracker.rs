use serde::{Deserialize, Serialize};

/// Progress tracker behavior.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TrackerConfig {
    /// Dispatch reporter calls through a single background task instead of inline.
    #[serde(default)]
    pub report_async: bool,
}
