use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::source::Reader;

/// Reader whose first `failures` reads fail with a "Connection Timeout" message.
///
/// Every later read returns the page of the wrapped reader.
pub struct FlakyReader<T> {
    inner: Arc<dyn Reader<T>>,
    failures: usize,
    reads: AtomicUsize,
}

impl<T> FlakyReader<T> {
    pub fn new(inner: Arc<dyn Reader<T>>, failures: usize) -> Self {
        Self {
            inner,
            failures,
            reads: AtomicUsize::new(0),
        }
    }

    /// Read attempts so far, failed ones included.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T> Reader<T> for FlakyReader<T>
where
    T: Send + 'static,
{
    async fn size(&self) -> EtlResult<usize> {
        self.inner.size().await
    }

    async fn read(&self, skip: usize, take: usize) -> EtlResult<T> {
        let attempt = self.reads.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            bail!(
                ErrorKind::SourceError,
                "Read failed",
                format!("Connection Timeout on attempt {}", attempt + 1)
            );
        }

        self.inner.read(skip, take).await
    }

    async fn close(&self) -> EtlResult<()> {
        self.inner.close().await
    }
}

/// Reader sleeping before every page.
pub struct SlowReader<T> {
    inner: Arc<dyn Reader<T>>,
    delay: Duration,
}

impl<T> SlowReader<T> {
    pub fn new(inner: Arc<dyn Reader<T>>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl<T> Reader<T> for SlowReader<T>
where
    T: Send + 'static,
{
    async fn size(&self) -> EtlResult<usize> {
        self.inner.size().await
    }

    async fn read(&self, skip: usize, take: usize) -> EtlResult<T> {
        tokio::time::sleep(self.delay).await;
        self.inner.read(skip, take).await
    }

    async fn close(&self) -> EtlResult<()> {
        self.inner.close().await
    }
}
