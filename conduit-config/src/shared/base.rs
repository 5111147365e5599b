use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// `max_page_size` is zero, which would produce no pages at all.
    #[error("`max_page_size` cannot be zero")]
    MaxPageSizeZero,
    /// `max_degree_of_parallelism` is zero, which would never run a page.
    #[error("`max_degree_of_parallelism` cannot be zero")]
    MaxDegreeOfParallelismZero,
    /// A field holds a value outside its accepted range.
    #[error("Invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}
