use serde::{Deserialize, Serialize};

use crate::load::Config;
use crate::shared::{Setting, TrackerConfig, ValidationError};

/// Top-level configuration for a job run, loadable with [`crate::load_config`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JobConfig {
    #[serde(default)]
    pub setting: Setting,
    #[serde(default)]
    pub tracker: TrackerConfig,
}

impl JobConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.setting.validate()
    }
}

impl Config for JobConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}
