use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};

use crate::destination::Writer;
use crate::error::EtlResult;
use crate::pipes::base::{Consumer, Pipe, PipeStream};
use crate::pipes::status::{PipeControl, PipeStatus};
use crate::pipes::stream::TrackedStream;

/// Consumer handing every incoming item to a [`Writer`] in arrival order.
pub struct WritePipe<T> {
    writer: Arc<dyn Writer<T>>,
    control: PipeControl,
}

impl<T> WritePipe<T>
where
    T: Send + 'static,
{
    pub fn new(writer: Arc<dyn Writer<T>>) -> Self {
        Self {
            writer,
            control: PipeControl::new(),
        }
    }
}

#[async_trait]
impl<T> Pipe for WritePipe<T>
where
    T: Send + 'static,
{
    fn status(&self) -> EtlResult<PipeStatus> {
        Ok(self.control.status())
    }

    fn stop(&self) {
        self.control.stop();
    }

    fn resume(&self) {
        self.control.resume();
    }

    async fn close(&self) -> EtlResult<()> {
        self.writer.close().await
    }
}

impl<T> Consumer<T> for WritePipe<T>
where
    T: Send + 'static,
{
    fn consume(&self, consumes: PipeStream<T>) -> BoxFuture<'static, EtlResult<()>> {
        let writer = self.writer.clone();
        let control = self.control.clone();
        let mut items = TrackedStream::stop_only(consumes, control.clone());

        async move {
            control.set_status(PipeStatus::Working);
            let result = async {
                while let Some(item) = items.next().await {
                    writer.write(item?).await?;
                }
                EtlResult::Ok(())
            }
            .await;

            control.settle(&result);
            result
        }
        .boxed()
    }
}
