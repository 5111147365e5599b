//! Shorthands for building and returning [`crate::error::EtlError`] values.

/// Builds an [`crate::error::EtlError`] from a kind and a static description.
///
/// A third argument adds detail: `detail = value` moves anything convertible into
/// `Cow<'static, str>`, a bare expression is rendered with `to_string()`. A trailing
/// `source: err` attaches the originating error.
///
/// ```
/// use conduit::error::ErrorKind;
/// use conduit::etl_error;
///
/// let err = etl_error!(ErrorKind::InvalidArgument, "Page size is zero", detail = "max_page_size");
/// assert_eq!(err.kind(), ErrorKind::InvalidArgument);
/// ```
#[macro_export]
macro_rules! etl_error {
    ($kind:expr, $desc:expr $(, source: $source:expr)?) => {
        $crate::error::EtlError::from(($kind, $desc))$(.with_source($source))?
    };
    ($kind:expr, $desc:expr, detail = $detail:expr $(, source: $source:expr)?) => {
        $crate::error::EtlError::from(($kind, $desc, $detail))$(.with_source($source))?
    };
    ($kind:expr, $desc:expr, $detail:expr $(, source: $source:expr)?) => {
        $crate::error::EtlError::from(($kind, $desc, $detail.to_string()))
            $(.with_source($source))?
    };
}

/// Returns early with an [`crate::error::EtlError`] built like [`etl_error!`].
#[macro_export]
macro_rules! bail {
    ($($args:tt)+) => {
        return ::core::result::Result::Err($crate::etl_error!($($args)+))
    };
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use crate::error::{ErrorKind, EtlResult};

    fn page_window(take: usize) -> EtlResult<usize> {
        if take == 0 {
            bail!(ErrorKind::InvalidArgument, "Page size is zero", take);
        }
        Ok(take)
    }

    #[test]
    fn detail_forms() {
        let rendered = etl_error!(ErrorKind::SourceError, "Read failed", 42);
        assert_eq!(rendered.detail(), Some("42"));

        let moved = etl_error!(ErrorKind::SourceError, "Read failed", detail = String::from("page 3"));
        assert_eq!(moved.detail(), Some("page 3"));
        assert_eq!(moved.description(), Some("Read failed"));
    }

    #[test]
    fn source_is_attached() {
        let io = std::io::Error::other("connection reset");
        let err = etl_error!(ErrorKind::IoError, "Write failed", detail = "page 1", source: io);

        assert_eq!(err.detail(), Some("page 1"));
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("connection reset"));
    }

    #[test]
    fn bail_returns_early() {
        assert_eq!(page_window(3).unwrap(), 3);
        let err = page_window(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.detail(), Some("0"));
    }
}
