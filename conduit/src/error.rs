//! Error type shared by pipes, trackers and jobs.
//!
//! [`EtlError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, an optional source and the capture location. Several failures, for
//! example from pages processed concurrently, fold into one aggregated [`EtlError`].

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

use conduit_config::LoadConfigError;
use conduit_config::shared::ValidationError;

/// Result type used across the crate.
pub type EtlResult<T> = Result<T, EtlError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Error returned by every fallible operation of the crate.
///
/// Cloning is cheap: sources and backtraces are reference counted, which lets the same
/// failure be handed to a tracker reporter and returned to the caller.
#[derive(Debug, Clone)]
pub struct EtlError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Failures collected from independent units of work, in completion order.
    Many {
        errors: Vec<EtlError>,
        location: &'static Location<'static>,
    },
}

/// Classification of an [`EtlError`].
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Pipe Errors
    /// A pipe was pulled after `stop()` and before `resume()`.
    PipeStopped,
    /// Constituent statuses of a composite pipe do not combine into a single status.
    InvalidStatusChain,

    // Argument & Configuration Errors
    InvalidArgument,
    ConfigError,

    // Collaborator Errors
    /// An operation exceeded its deadline. Always treated as retryable by jobs.
    Timeout,
    SourceError,
    DestinationError,
    MappingError,

    // State & Workflow Errors
    InvalidState,
    WorkerPanic,

    // IO Errors
    IoError,

    // Unknown / Uncategorized
    Unknown,
}

impl EtlError {
    /// Returns the kind of this error, or of the first aggregated error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every kind contained in this error, flattening aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the static description, or the first aggregated one.
    pub fn description(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.description.as_ref()),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.description()),
        }
    }

    /// Returns the dynamic detail, or the first aggregated error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the aggregated errors, or a one-element slice holding `self`.
    pub fn errors(&self) -> &[EtlError] {
        match self.repr {
            ErrorRepr::Single(_) => std::slice::from_ref(self),
            ErrorRepr::Many { ref errors, .. } => errors,
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the location where this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches the originating error, exposed through [`error::Error::source`].
    ///
    /// Ignored on aggregates, whose source is always their first error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        EtlError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for EtlError {
    fn eq(&self, other: &EtlError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (
                ErrorRepr::Many {
                    errors: errors_a, ..
                },
                ErrorRepr::Many {
                    errors: errors_b, ..
                },
            ) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl Hash for EtlError {
    /// Hashes kind and description only, so repeated occurrences group together.
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.repr).hash(state);
        match &self.repr {
            ErrorRepr::Single(payload) => {
                payload.kind.hash(state);
                payload.description.hash(state);
            }
            ErrorRepr::Many { errors, .. } => {
                errors.len().hash(state);
                for error in errors {
                    error.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                write_detail(payload.detail.as_deref(), f, 1)?;
                write_backtrace(payload.backtrace.as_ref(), f, 1)?;

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if errors.is_empty() {
                    write!(f, "\n  (no inner errors provided)")?;
                }

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    match lines.next() {
                        Some(first_line) => write!(f, "\n  {}. {}", index + 1, first_line)?,
                        None => write!(f, "\n  {}.", index + 1)?,
                    }

                    for line in lines {
                        if line.is_empty() {
                            write!(f, "\n     ")?;
                        } else {
                            write!(f, "\n     {line}")?;
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for EtlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

fn write_backtrace(
    backtrace: &Backtrace,
    f: &mut fmt::Formatter<'_>,
    indent: usize,
) -> fmt::Result {
    let indent_str = "  ".repeat(indent);

    let rendered_backtrace = backtrace.to_string();
    if rendered_backtrace.trim().is_empty() {
        return Ok(());
    }

    write!(f, "\n{indent_str}Backtrace:")?;
    for line in rendered_backtrace.lines() {
        if line.trim().is_empty() {
            write!(f, "\n{indent_str}  ")?;
        } else {
            write!(f, "\n{indent_str}  {line}")?;
        }
    }

    Ok(())
}

fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    let Some(detail) = detail else {
        return Ok(());
    };

    let indent_str = "  ".repeat(indent);
    if detail.trim().is_empty() {
        return write!(f, "\n{indent_str}Detail: <empty>");
    }

    write!(f, "\n{indent_str}Detail:")?;
    for line in detail.lines() {
        if line.trim().is_empty() {
            write!(f, "\n{indent_str}  ")?;
        } else {
            write!(f, "\n{indent_str}  {line}")?;
        }
    }

    Ok(())
}

impl From<(ErrorKind, &'static str)> for EtlError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for EtlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors; a single error is returned unwrapped.
impl<E> From<Vec<E>> for EtlError
where
    E: Into<EtlError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> EtlError {
        let location = Location::caller();

        let mut errors: Vec<EtlError> = errors.into_iter().map(Into::into).collect();
        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        EtlError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for EtlError {
    #[track_caller]
    fn from(err: std::io::Error) -> EtlError {
        let kind = if err.kind() == std::io::ErrorKind::TimedOut {
            ErrorKind::Timeout
        } else {
            ErrorKind::IoError
        };

        let detail = err.to_string();
        EtlError::from_components(
            kind,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<tokio::time::error::Elapsed> for EtlError {
    #[track_caller]
    fn from(err: tokio::time::error::Elapsed) -> EtlError {
        let detail = err.to_string();
        EtlError::from_components(
            ErrorKind::Timeout,
            Cow::Borrowed("Operation exceeded its deadline"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<ValidationError> for EtlError {
    #[track_caller]
    fn from(err: ValidationError) -> EtlError {
        let detail = err.to_string();
        EtlError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid job setting"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<LoadConfigError> for EtlError {
    #[track_caller]
    fn from(err: LoadConfigError) -> EtlError {
        let detail = err.to_string();
        EtlError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Configuration could not be loaded"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;
    use crate::etl_error;

    #[test]
    fn single_error_exposes_components() {
        let err = etl_error!(
            ErrorKind::SourceError,
            "Reading page failed",
            "skip 10 is past the end"
        );

        assert_eq!(err.kind(), ErrorKind::SourceError);
        assert_eq!(err.description(), Some("Reading page failed"));
        assert_eq!(err.detail(), Some("skip 10 is past the end"));
        assert_eq!(err.errors().len(), 1);
        assert!(err.to_string().starts_with("[SourceError] Reading page failed"));
    }

    #[test]
    fn single_element_vec_is_not_wrapped() {
        let err: EtlError = vec![etl_error!(ErrorKind::Timeout, "Write timed out")].into();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.errors().len(), 1);
        assert!(err.source().is_none());
    }

    #[test]
    fn aggregate_reports_every_kind_and_forwards_first_as_source() {
        let err: EtlError = vec![
            etl_error!(ErrorKind::SourceError, "Page 0 failed"),
            etl_error!(ErrorKind::DestinationError, "Page 1 failed"),
        ]
        .into();

        assert_eq!(err.kind(), ErrorKind::SourceError);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::SourceError, ErrorKind::DestinationError]
        );
        assert_eq!(err.errors().len(), 2);
        assert!(err.to_string().starts_with("[Many] 2 errors aggregated"));

        let source = err.source().unwrap().to_string();
        assert!(source.contains("Page 0 failed"));
    }

    #[test]
    fn source_is_preserved_across_clones() {
        let io = std::io::Error::other("connection reset");
        let err = etl_error!(ErrorKind::SourceError, "Reader failed", source: io);
        let cloned = err.clone();

        assert_eq!(cloned.source().unwrap().to_string(), "connection reset");
        assert_eq!(err, cloned);
    }

    #[test]
    fn timed_out_io_errors_are_classified_as_timeouts() {
        let err: EtlError = std::io::Error::from(std::io::ErrorKind::TimedOut).into();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }
}
