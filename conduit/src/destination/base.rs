use async_trait::async_trait;

use crate::error::EtlResult;

/// Sink receiving mapped pages.
///
/// Writes for different pages may arrive concurrently and in any order; writes for the
/// same page arrive in mapper order.
#[async_trait]
pub trait Writer<T>: Send + Sync {
    async fn write(&self, item: T) -> EtlResult<()>;

    /// Flushes and releases the underlying resources.
    async fn close(&self) -> EtlResult<()> {
        Ok(())
    }
}
