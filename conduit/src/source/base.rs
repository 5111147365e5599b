use async_trait::async_trait;

use crate::error::EtlResult;

/// Paged source of data.
///
/// A page is returned as a single `T`, typically a collection of rows. Implementations
/// must tolerate concurrent calls to [`Reader::read`] since pages are fetched in parallel.
#[async_trait]
pub trait Reader<T>: Send + Sync {
    /// Total number of addressable items.
    async fn size(&self) -> EtlResult<usize>;

    /// Reads up to `take` items starting at `skip`.
    ///
    /// Fails when `skip` is past [`Reader::size`].
    async fn read(&self, skip: usize, take: usize) -> EtlResult<T>;

    /// Releases the underlying resources.
    async fn close(&self) -> EtlResult<()> {
        Ok(())
    }
}
