//! Closure-backed implementations of every pipe role.

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt, stream};

use crate::concurrency::lock;
use crate::error::EtlResult;
use crate::pipes::base::{Consumer, Pipe, PipeStream, Producer, Transformer};
use crate::pipes::status::{PipeControl, PipeStatus};
use crate::pipes::stream::TrackedStream;

type ProduceFn<P> = dyn Fn() -> PipeStream<P> + Send + Sync;
type TransformFn<C, P> = dyn Fn(PipeStream<C>) -> PipeStream<P> + Send + Sync;
type ConsumeFn<C> = dyn Fn(PipeStream<C>) -> BoxFuture<'static, EtlResult<()>> + Send + Sync;

macro_rules! impl_primitive_pipe {
    ($name:ident < $($param:ident),+ >) => {
        impl<$($param),+> Pipe for $name<$($param),+>
        where
            $($param: Send + 'static),+
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
        }
    };
}

/// Producer whose runs are created by a closure.
///
/// Each call to [`Producer::produces`] invokes the closure again, so a finite producer can
/// be replayed once its previous run finished.
pub struct LambdaProducer<P> {
    control: PipeControl,
    produce: Box<ProduceFn<P>>,
}

impl<P> LambdaProducer<P>
where
    P: Send + 'static,
{
    pub fn new<F>(produce: F) -> Self
    where
        F: Fn() -> PipeStream<P> + Send + Sync + 'static,
    {
        Self {
            control: PipeControl::new(),
            produce: Box::new(produce),
        }
    }

    /// Replays `items` on every run.
    pub fn replaying<I>(items: I) -> Self
    where
        I: IntoIterator<Item = P> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        Self::new(move || stream::iter(items.clone().into_iter().map(Ok)).boxed())
    }
}

impl_primitive_pipe!(LambdaProducer<P>);

impl<P> Producer<P> for LambdaProducer<P>
where
    P: Send + 'static,
{
    fn produces(&self) -> PipeStream<P> {
        TrackedStream::new((self.produce)(), self.control.clone()).boxed()
    }
}

/// Producer handing out a fixed set of items exactly once.
///
/// The first run drains the queue; later runs yield an empty stream.
pub struct QueueProducer<P> {
    control: PipeControl,
    items: Mutex<Vec<P>>,
}

impl<P> QueueProducer<P>
where
    P: Send + 'static,
{
    pub fn new(items: impl IntoIterator<Item = P>) -> Self {
        Self {
            control: PipeControl::new(),
            items: Mutex::new(items.into_iter().collect()),
        }
    }
}

impl_primitive_pipe!(QueueProducer<P>);

impl<P> Producer<P> for QueueProducer<P>
where
    P: Send + 'static,
{
    fn produces(&self) -> PipeStream<P> {
        let items = std::mem::take(&mut *lock(&self.items));
        TrackedStream::new(stream::iter(items.into_iter().map(Ok)), self.control.clone()).boxed()
    }
}

/// Transformer backed by a stream-to-stream closure.
pub struct LambdaTransformer<C, P> {
    control: PipeControl,
    transform: Box<TransformFn<C, P>>,
}

impl<C, P> LambdaTransformer<C, P>
where
    C: Send + 'static,
    P: Send + 'static,
{
    pub fn new<F>(transform: F) -> Self
    where
        F: Fn(PipeStream<C>) -> PipeStream<P> + Send + Sync + 'static,
    {
        Self {
            control: PipeControl::new(),
            transform: Box::new(transform),
        }
    }

    /// Applies `f` to every element; the first failure ends the stream.
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(C) -> EtlResult<P> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new(move |consumes| {
            let f = f.clone();
            consumes
                .map(move |item| item.and_then(|value| f(value)))
                .boxed()
        })
    }
}

impl_primitive_pipe!(LambdaTransformer<C, P>);

impl<C, P> Transformer<C, P> for LambdaTransformer<C, P>
where
    C: Send + 'static,
    P: Send + 'static,
{
    fn transform(&self, consumes: PipeStream<C>) -> PipeStream<P> {
        TrackedStream::new((self.transform)(consumes), self.control.clone()).boxed()
    }
}

/// Consumer backed by a closure that drains the stream.
pub struct LambdaConsumer<C> {
    control: PipeControl,
    consume: Box<ConsumeFn<C>>,
}

impl<C> LambdaConsumer<C>
where
    C: Send + 'static,
{
    pub fn new<F>(consume: F) -> Self
    where
        F: Fn(PipeStream<C>) -> BoxFuture<'static, EtlResult<()>> + Send + Sync + 'static,
    {
        Self {
            control: PipeControl::new(),
            consume: Box::new(consume),
        }
    }

    /// Calls `f` for every element in arrival order, failing on the first error.
    pub fn for_each<F>(f: F) -> Self
    where
        F: Fn(C) -> EtlResult<()> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new(move |mut consumes| {
            let f = f.clone();
            async move {
                while let Some(item) = consumes.next().await {
                    f(item?)?;
                }
                Ok(())
            }
            .boxed()
        })
    }
}

impl_primitive_pipe!(LambdaConsumer<C>);

impl<C> Consumer<C> for LambdaConsumer<C>
where
    C: Send + 'static,
{
    fn consume(&self, consumes: PipeStream<C>) -> BoxFuture<'static, EtlResult<()>> {
        let control = self.control.clone();
        let guarded = TrackedStream::stop_only(consumes, control.clone()).boxed();
        let drain = (self.consume)(guarded);

        async move {
            control.set_status(PipeStatus::Working);
            let result = drain.await;
            control.settle(&result);
            result
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;

    use super::*;
    use crate::error::ErrorKind;
    use crate::etl_error;

    #[tokio::test]
    async fn finite_producer_replays_on_restart() {
        let producer = LambdaProducer::replaying(vec![1, 2, 3]);

        let first: Vec<i32> = producer.produces().try_collect().await.unwrap();
        let second: Vec<i32> = producer.produces().try_collect().await.unwrap();

        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(second, first);
        assert_eq!(producer.status().unwrap(), PipeStatus::Finished);
    }

    #[tokio::test]
    async fn queue_producer_is_single_use() {
        let producer = QueueProducer::new(vec!["a", "b"]);

        let first: Vec<&str> = producer.produces().try_collect().await.unwrap();
        let second: Vec<&str> = producer.produces().try_collect().await.unwrap();

        assert_eq!(first, vec!["a", "b"]);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn restart_after_stop_fails_until_resumed() {
        let producer = LambdaProducer::replaying(0..10);
        producer.stop();

        let err = producer
            .produces()
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PipeStopped);
        assert_eq!(producer.status().unwrap(), PipeStatus::Stopped);

        producer.resume();
        let items: Vec<i32> = producer.produces().try_collect().await.unwrap();
        assert_eq!(items.len(), 10);
    }

    #[tokio::test]
    async fn map_transformer_stops_at_first_failure() {
        let producer = LambdaProducer::replaying(vec![1, 2, 3]);
        let transformer = LambdaTransformer::map(|value: i32| {
            if value == 2 {
                return Err(etl_error!(ErrorKind::MappingError, "two is not allowed"));
            }
            Ok(value * 10)
        });

        let mut output = transformer.transform(producer.produces());
        assert_eq!(output.next().await.unwrap().unwrap(), 10);
        assert!(output.next().await.unwrap().is_err());
        assert!(output.next().await.is_none());
        assert_eq!(transformer.status().unwrap(), PipeStatus::Errored);
    }

    #[tokio::test]
    async fn consumer_settles_status_from_outcome() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let consumer = {
            let seen = seen.clone();
            LambdaConsumer::for_each(move |value: u8| {
                seen.lock().unwrap().push(value);
                Ok(())
            })
        };
        let producer = LambdaProducer::replaying(vec![4u8, 5, 6]);

        consumer.consume(producer.produces()).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![4, 5, 6]);
        assert_eq!(consumer.status().unwrap(), PipeStatus::Finished);
    }

    #[tokio::test]
    async fn stopped_consumer_reports_stopped() {
        let consumer = LambdaConsumer::for_each(|_: u8| Ok(()));
        let producer = LambdaProducer::replaying(vec![1u8]);
        consumer.stop();

        let err = consumer.consume(producer.produces()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PipeStopped);
        assert_eq!(consumer.status().unwrap(), PipeStatus::Stopped);
    }
}
