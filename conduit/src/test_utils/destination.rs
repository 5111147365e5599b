use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::destination::Writer;
use crate::error::EtlResult;
use crate::test_utils::notify::TimedNotify;

/// Writer sleeping before every write.
pub struct SlowWriter<T> {
    inner: Arc<dyn Writer<T>>,
    delay: Duration,
}

impl<T> SlowWriter<T> {
    pub fn new(inner: Arc<dyn Writer<T>>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl<T> Writer<T> for SlowWriter<T>
where
    T: Send + 'static,
{
    async fn write(&self, item: T) -> EtlResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.write(item).await
    }

    async fn close(&self) -> EtlResult<()> {
        self.inner.close().await
    }
}

/// Writer signalling a [`TimedNotify`] after every successful write.
pub struct NotifyingWriter<T> {
    inner: Arc<dyn Writer<T>>,
    written: TimedNotify,
}

impl<T> NotifyingWriter<T> {
    pub fn new(inner: Arc<dyn Writer<T>>) -> Self {
        Self {
            inner,
            written: TimedNotify::new(),
        }
    }

    pub fn written(&self) -> &TimedNotify {
        &self.written
    }
}

#[async_trait]
impl<T> Writer<T> for NotifyingWriter<T>
where
    T: Send + 'static,
{
    async fn write(&self, item: T) -> EtlResult<()> {
        self.inner.write(item).await?;
        self.written.notify();
        Ok(())
    }

    async fn close(&self) -> EtlResult<()> {
        self.inner.close().await
    }
}
