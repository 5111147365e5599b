use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::source::Reader;

/// In-memory reader over a fixed list of items, paged as `Vec<I>`.
#[derive(Debug, Clone)]
pub struct MemoryReader<I> {
    items: Arc<RwLock<Vec<I>>>,
}

impl<I> MemoryReader<I> {
    pub fn new(items: Vec<I>) -> Self {
        Self {
            items: Arc::new(RwLock::new(items)),
        }
    }

    /// Replaces the items served by this reader.
    pub async fn replace(&self, items: Vec<I>) {
        *self.items.write().await = items;
    }
}

#[async_trait]
impl<I> Reader<Vec<I>> for MemoryReader<I>
where
    I: Clone + Send + Sync + 'static,
{
    async fn size(&self) -> EtlResult<usize> {
        Ok(self.items.read().await.len())
    }

    async fn read(&self, skip: usize, take: usize) -> EtlResult<Vec<I>> {
        let items = self.items.read().await;
        if skip > items.len() {
            bail!(
                ErrorKind::SourceError,
                "Page starts past the end of the source",
                format!("skip {skip} with {} items available", items.len())
            );
        }

        let end = skip.saturating_add(take).min(items.len());
        debug!(skip, take, returned = end - skip, "reading page from memory");

        Ok(items[skip..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_pages_and_clamps_last_one() {
        let reader = MemoryReader::new((0..10).collect::<Vec<u32>>());

        assert_eq!(reader.size().await.unwrap(), 10);
        assert_eq!(reader.read(0, 4).await.unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(reader.read(8, 4).await.unwrap(), vec![8, 9]);
        assert!(reader.read(10, 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn skip_past_end_fails() {
        let reader = MemoryReader::new(vec![1u8, 2]);
        let err = reader.read(3, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceError);
    }
}
