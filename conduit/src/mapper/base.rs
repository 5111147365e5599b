use async_trait::async_trait;

use crate::error::EtlResult;

/// Converts one source page into one destination page.
#[async_trait]
pub trait Mapper<S, D>: Send + Sync {
    async fn map(&self, source: &S) -> EtlResult<D>;
}
