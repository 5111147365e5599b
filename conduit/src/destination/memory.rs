use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::bail;
use crate::destination::Writer;
use crate::error::{ErrorKind, EtlResult};

#[derive(Debug)]
struct Inner<T> {
    written: Vec<T>,
    closed: bool,
}

/// In-memory destination for tests and development.
///
/// Every written item is kept in arrival order and can be inspected through
/// [`MemoryWriter::written`]. Writing after [`Writer::close`] fails.
#[derive(Debug, Clone)]
pub struct MemoryWriter<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> MemoryWriter<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                written: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Returns a copy of everything written so far.
    pub async fn written(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.inner.lock().await.written.clone()
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }

    pub async fn clear(&self) {
        self.inner.lock().await.written.clear();
    }
}

impl<T> Default for MemoryWriter<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Writer<T> for MemoryWriter<T>
where
    T: Send + 'static,
{
    async fn write(&self, item: T) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            bail!(
                ErrorKind::DestinationError,
                "Cannot write to a closed memory writer"
            );
        }

        inner.written.push(item);
        debug!(written = inner.written.len(), "stored item in memory");

        Ok(())
    }

    async fn close(&self) -> EtlResult<()> {
        self.inner.lock().await.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_items_in_arrival_order() {
        let writer = MemoryWriter::new();
        writer.write("a").await.unwrap();
        writer.write("b").await.unwrap();

        assert_eq!(writer.written().await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn rejects_writes_after_close() {
        let writer = MemoryWriter::new();
        writer.close().await.unwrap();

        assert!(writer.is_closed().await);
        let err = writer.write(1u8).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DestinationError);
    }
}
