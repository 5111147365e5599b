use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Sentinel used by every limit field to mean "no limit".
const UNBOUNDED: i64 = -1;

/// Execution limits for a single job.
///
/// Every count uses `-1` as "unbounded". `max_page_size` additionally reads `-1` as
/// "the whole dataset in one page".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Setting {
    /// Number of pages processed concurrently.
    #[serde(default = "default_max_degree_of_parallelism")]
    pub max_degree_of_parallelism: i64,
    /// Number of items requested from the reader per page.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,
    /// Timeouts tolerated across the whole job before giving up.
    #[serde(default = "default_maximum_timeouts_allowed")]
    pub maximum_timeouts_allowed: i64,
    /// Timeouts tolerated for a single operation before giving up.
    #[serde(default = "default_maximum_timeouts_allowed_per_query")]
    pub maximum_timeouts_allowed_per_query: i64,
    /// Deadline, in seconds, applied to each reader, mapper and writer call. `0` disables it.
    #[serde(default = "default_maximum_timeout")]
    pub maximum_timeout: u64,
}

impl Setting {
    pub const DEFAULT_MAX_DEGREE_OF_PARALLELISM: i64 = 1;

    pub const DEFAULT_MAX_PAGE_SIZE: i64 = UNBOUNDED;

    pub const DEFAULT_MAXIMUM_TIMEOUTS_ALLOWED: i64 = UNBOUNDED;

    pub const DEFAULT_MAXIMUM_TIMEOUTS_ALLOWED_PER_QUERY: i64 = 3;

    pub const DEFAULT_MAXIMUM_TIMEOUT_SECS: u64 = 30;

    /// Validates the limits.
    ///
    /// Counts must be either positive or `-1`. Page size and parallelism additionally
    /// reject zero with a dedicated error.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_page_size == 0 {
            return Err(ValidationError::MaxPageSizeZero);
        }

        if self.max_degree_of_parallelism == 0 {
            return Err(ValidationError::MaxDegreeOfParallelismZero);
        }

        for (field, value) in [
            ("setting.max_page_size", self.max_page_size),
            (
                "setting.max_degree_of_parallelism",
                self.max_degree_of_parallelism,
            ),
            (
                "setting.maximum_timeouts_allowed",
                self.maximum_timeouts_allowed,
            ),
            (
                "setting.maximum_timeouts_allowed_per_query",
                self.maximum_timeouts_allowed_per_query,
            ),
        ] {
            if value < UNBOUNDED {
                return Err(ValidationError::InvalidFieldValue {
                    field: field.to_string(),
                    constraint: "must be -1 (unbounded) or non-negative".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Per-operation deadline, or `None` when disabled.
    pub fn maximum_timeout(&self) -> Option<Duration> {
        (self.maximum_timeout > 0).then(|| Duration::from_secs(self.maximum_timeout))
    }
}

impl Default for Setting {
    fn default() -> Self {
        Self {
            max_degree_of_parallelism: default_max_degree_of_parallelism(),
            max_page_size: default_max_page_size(),
            maximum_timeouts_allowed: default_maximum_timeouts_allowed(),
            maximum_timeouts_allowed_per_query: default_maximum_timeouts_allowed_per_query(),
            maximum_timeout: default_maximum_timeout(),
        }
    }
}

fn default_max_degree_of_parallelism() -> i64 {
    Setting::DEFAULT_MAX_DEGREE_OF_PARALLELISM
}

fn default_max_page_size() -> i64 {
    Setting::DEFAULT_MAX_PAGE_SIZE
}

fn default_maximum_timeouts_allowed() -> i64 {
    Setting::DEFAULT_MAXIMUM_TIMEOUTS_ALLOWED
}

fn default_maximum_timeouts_allowed_per_query() -> i64 {
    Setting::DEFAULT_MAXIMUM_TIMEOUTS_ALLOWED_PER_QUERY
}

fn default_maximum_timeout() -> u64 {
    Setting::DEFAULT_MAXIMUM_TIMEOUT_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let setting: Setting = serde_json::from_str(r#"{ "max_page_size": 100 }"#).unwrap();

        assert_eq!(setting.max_page_size, 100);
        assert_eq!(setting.max_degree_of_parallelism, 1);
        assert_eq!(setting.maximum_timeouts_allowed, -1);
        assert_eq!(setting.maximum_timeouts_allowed_per_query, 3);
        assert_eq!(setting.maximum_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let setting = Setting {
            max_page_size: 0,
            ..Setting::default()
        };

        assert_eq!(setting.validate(), Err(ValidationError::MaxPageSizeZero));
    }

    #[test]
    fn negative_limits_other_than_unbounded_are_rejected() {
        let setting = Setting {
            maximum_timeouts_allowed_per_query: -5,
            ..Setting::default()
        };

        let err = setting.validate().unwrap_err();
        assert!(err.to_string().contains("maximum_timeouts_allowed_per_query"));
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let setting = Setting {
            maximum_timeout: 0,
            ..Setting::default()
        };

        assert!(setting.validate().is_ok());
        assert_eq!(setting.maximum_timeout(), None);
    }
}
