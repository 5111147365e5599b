use std::num::NonZeroUsize;
use std::time::Duration;

use crate::bail;
use crate::config::Setting;
use crate::error::{ErrorKind, EtlResult};

/// Number of items requested from a reader per page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    /// The whole dataset is read as a single page.
    All,
    Limited(NonZeroUsize),
}

impl PageSize {
    /// Converts `max_page_size`, where `-1` means [`PageSize::All`].
    pub fn from_setting(max_page_size: i64) -> EtlResult<Self> {
        match max_page_size {
            -1 => Ok(PageSize::All),
            0 => bail!(
                ErrorKind::InvalidArgument,
                "Maximum page size cannot be zero"
            ),
            size if size < 0 => bail!(
                ErrorKind::InvalidArgument,
                "Maximum page size must be positive or -1",
                size
            ),
            size => {
                let size = usize::try_from(size).unwrap_or(usize::MAX);
                Ok(NonZeroUsize::new(size).map_or(PageSize::All, PageSize::Limited))
            }
        }
    }

    /// Number of pages needed to cover `size` items.
    pub fn page_count(&self, size: usize) -> usize {
        match self {
            PageSize::All => 1,
            PageSize::Limited(page_size) => size.div_ceil(page_size.get()),
        }
    }

    /// `(skip, take)` window of page `index` over a dataset of `size` items.
    pub fn window(&self, index: usize, size: usize) -> (usize, usize) {
        match self {
            PageSize::All => (0, size),
            PageSize::Limited(page_size) => {
                let page_size = page_size.get();
                (index.saturating_mul(page_size), page_size)
            }
        }
    }
}

/// How many units of work may run at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    Unbounded,
    Bounded(NonZeroUsize),
}

impl Parallelism {
    /// Converts `max_degree_of_parallelism`, where `-1` means [`Parallelism::Unbounded`].
    pub fn from_setting(max_degree_of_parallelism: i64) -> EtlResult<Self> {
        match max_degree_of_parallelism {
            -1 => Ok(Parallelism::Unbounded),
            degree if degree <= 0 => bail!(
                ErrorKind::InvalidArgument,
                "Maximum degree of parallelism must be positive or -1",
                degree
            ),
            degree => {
                let degree = usize::try_from(degree).unwrap_or(usize::MAX);
                Ok(NonZeroUsize::new(degree).map_or(Parallelism::Unbounded, Parallelism::Bounded))
            }
        }
    }

    /// Number of workers to start for `work_items` units of work.
    pub fn workers(&self, work_items: usize) -> usize {
        match self {
            Parallelism::Unbounded => work_items,
            Parallelism::Bounded(degree) => degree.get().min(work_items),
        }
    }
}

/// Retry budget for timed-out operations. `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryLimits {
    /// Timeouts tolerated across the whole job.
    pub total: Option<u64>,
    /// Timeouts tolerated by a single operation.
    pub per_operation: Option<u64>,
    /// Deadline applied to each attempt.
    pub attempt_timeout: Option<Duration>,
}

impl RetryLimits {
    pub fn from_setting(setting: &Setting) -> Self {
        Self {
            total: budget(setting.maximum_timeouts_allowed),
            per_operation: budget(setting.maximum_timeouts_allowed_per_query),
            attempt_timeout: setting.maximum_timeout(),
        }
    }
}

fn budget(limit: i64) -> Option<u64> {
    u64::try_from(limit).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_conversion() {
        assert_eq!(PageSize::from_setting(-1).unwrap(), PageSize::All);
        assert_eq!(
            PageSize::from_setting(0).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            PageSize::from_setting(10).unwrap(),
            PageSize::Limited(NonZeroUsize::new(10).unwrap())
        );
    }

    #[test]
    fn page_count_rounds_up() {
        let page_size = PageSize::from_setting(4).unwrap();
        assert_eq!(page_size.page_count(0), 0);
        assert_eq!(page_size.page_count(8), 2);
        assert_eq!(page_size.page_count(9), 3);
        assert_eq!(page_size.window(2, 9), (8, 4));

        assert_eq!(PageSize::All.page_count(1_000), 1);
        assert_eq!(PageSize::All.window(0, 1_000), (0, 1_000));
    }

    #[test]
    fn parallelism_conversion() {
        assert_eq!(Parallelism::from_setting(-1).unwrap(), Parallelism::Unbounded);
        assert_eq!(Parallelism::from_setting(3).unwrap().workers(10), 3);
        assert_eq!(Parallelism::from_setting(3).unwrap().workers(2), 2);
        assert_eq!(Parallelism::Unbounded.workers(7), 7);
        assert!(Parallelism::from_setting(0).is_err());
    }

    #[test]
    fn negative_budgets_are_unbounded() {
        let limits = RetryLimits::from_setting(&Setting {
            maximum_timeouts_allowed: -1,
            maximum_timeouts_allowed_per_query: 2,
            maximum_timeout: 0,
            ..Setting::default()
        });

        assert_eq!(limits.total, None);
        assert_eq!(limits.per_operation, Some(2));
        assert_eq!(limits.attempt_timeout, None);
    }
}
