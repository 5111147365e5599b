//! `then` composition of pipes.
//!
//! Composing never nests: the constituent list of the result is the concatenation of the
//! flat lists of both sides, so stop, resume, status and close always reach primitive
//! pipes directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::EtlResult;
use crate::pipes::base::{Closed, Consumer, Pipe, PipeStream, Producer, Transformer, close_all};
use crate::pipes::status::{PipeStatus, aggregate_status};

/// Joins two pipes into one.
///
/// | left | right | result |
/// |---|---|---|
/// | producer | transformer | producer |
/// | transformer | transformer | transformer |
/// | producer | consumer | closed |
/// | transformer | consumer | consumer |
pub trait Then<Rhs> {
    type Output;

    fn then(self, rhs: Rhs) -> Self::Output;
}

struct Constituents {
    pipes: Vec<Arc<dyn Pipe>>,
    closed: AtomicBool,
}

impl Constituents {
    fn join(left: Arc<dyn Pipe>, right: Arc<dyn Pipe>) -> Self {
        let mut pipes = flatten(left);
        pipes.extend(flatten(right));

        Self {
            pipes,
            closed: AtomicBool::new(false),
        }
    }

    fn status(&self) -> EtlResult<PipeStatus> {
        let statuses = self
            .pipes
            .iter()
            .map(|pipe| pipe.status())
            .collect::<EtlResult<Vec<_>>>()?;
        aggregate_status(statuses)
    }

    fn stop(&self) {
        for pipe in &self.pipes {
            pipe.stop();
        }
    }

    fn resume(&self) {
        for pipe in &self.pipes {
            pipe.resume();
        }
    }

    async fn close(&self) -> EtlResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        close_all(&self.pipes).await
    }
}

fn flatten(pipe: Arc<dyn Pipe>) -> Vec<Arc<dyn Pipe>> {
    pipe.constituents().unwrap_or_else(|| vec![pipe])
}

macro_rules! impl_composite_pipe {
    ($name:ident < $($param:ident),+ >) => {
        #[async_trait]
        impl<$($param),+> Pipe for $name<$($param),+>
        where
            $($param: Send + 'static),+
        {
            fn status(&self) -> EtlResult<PipeStatus> {
                self.parts.status()
            }

            fn stop(&self) {
                self.parts.stop();
            }

            fn resume(&self) {
                self.parts.resume();
            }

            fn constituents(&self) -> Option<Vec<Arc<dyn Pipe>>> {
                Some(self.parts.pipes.clone())
            }

            async fn close(&self) -> EtlResult<()> {
                self.parts.close().await
            }
        }
    };
}

/// Producer built from a producer followed by a transformer.
pub struct ComposedProducer<P> {
    parts: Constituents,
    produce: Box<dyn Fn() -> PipeStream<P> + Send + Sync>,
}

impl_composite_pipe!(ComposedProducer<P>);

impl<P> Producer<P> for ComposedProducer<P>
where
    P: Send + 'static,
{
    fn produces(&self) -> PipeStream<P> {
        (self.produce)()
    }
}

/// Transformer built from two transformers.
pub struct ComposedTransformer<C, P> {
    parts: Constituents,
    transform: Box<dyn Fn(PipeStream<C>) -> PipeStream<P> + Send + Sync>,
}

impl_composite_pipe!(ComposedTransformer<C, P>);

impl<C, P> Transformer<C, P> for ComposedTransformer<C, P>
where
    C: Send + 'static,
    P: Send + 'static,
{
    fn transform(&self, consumes: PipeStream<C>) -> PipeStream<P> {
        (self.transform)(consumes)
    }
}

/// Consumer built from a transformer followed by a consumer.
pub struct ComposedConsumer<C> {
    parts: Constituents,
    consume: Box<dyn Fn(PipeStream<C>) -> BoxFuture<'static, EtlResult<()>> + Send + Sync>,
}

impl_composite_pipe!(ComposedConsumer<C>);

impl<C> Consumer<C> for ComposedConsumer<C>
where
    C: Send + 'static,
{
    fn consume(&self, consumes: PipeStream<C>) -> BoxFuture<'static, EtlResult<()>> {
        (self.consume)(consumes)
    }
}

/// Closed pipe built from a producer followed by a consumer.
pub struct ComposedClosed {
    parts: Constituents,
    start: Box<dyn Fn() -> BoxFuture<'static, EtlResult<()>> + Send + Sync>,
}

#[async_trait]
impl Pipe for ComposedClosed {
    fn status(&self) -> EtlResult<PipeStatus> {
        self.parts.status()
    }

    fn stop(&self) {
        self.parts.stop();
    }

    fn resume(&self) {
        self.parts.resume();
    }

    fn constituents(&self) -> Option<Vec<Arc<dyn Pipe>>> {
        Some(self.parts.pipes.clone())
    }

    async fn close(&self) -> EtlResult<()> {
        self.parts.close().await
    }
}

impl Closed for ComposedClosed {
    fn start(&self) -> BoxFuture<'static, EtlResult<()>> {
        (self.start)()
    }
}

impl<M, P> Then<Arc<dyn Transformer<M, P>>> for Arc<dyn Producer<M>>
where
    M: Send + 'static,
    P: Send + 'static,
{
    type Output = Arc<dyn Producer<P>>;

    fn then(self, rhs: Arc<dyn Transformer<M, P>>) -> Self::Output {
        let parts = Constituents::join(self.clone(), rhs.clone());
        Arc::new(ComposedProducer {
            parts,
            produce: Box::new(move || rhs.transform(self.produces())),
        })
    }
}

impl<C, M, P> Then<Arc<dyn Transformer<M, P>>> for Arc<dyn Transformer<C, M>>
where
    C: Send + 'static,
    M: Send + 'static,
    P: Send + 'static,
{
    type Output = Arc<dyn Transformer<C, P>>;

    fn then(self, rhs: Arc<dyn Transformer<M, P>>) -> Self::Output {
        let parts = Constituents::join(self.clone(), rhs.clone());
        Arc::new(ComposedTransformer {
            parts,
            transform: Box::new(move |consumes| rhs.transform(self.transform(consumes))),
        })
    }
}

impl<M> Then<Arc<dyn Consumer<M>>> for Arc<dyn Producer<M>>
where
    M: Send + 'static,
{
    type Output = Arc<dyn Closed>;

    fn then(self, rhs: Arc<dyn Consumer<M>>) -> Self::Output {
        let parts = Constituents::join(self.clone(), rhs.clone());
        Arc::new(ComposedClosed {
            parts,
            start: Box::new(move || rhs.consume(self.produces())),
        })
    }
}

impl<C, M> Then<Arc<dyn Consumer<M>>> for Arc<dyn Transformer<C, M>>
where
    C: Send + 'static,
    M: Send + 'static,
{
    type Output = Arc<dyn Consumer<C>>;

    fn then(self, rhs: Arc<dyn Consumer<M>>) -> Self::Output {
        let parts = Constituents::join(self.clone(), rhs.clone());
        Arc::new(ComposedConsumer {
            parts,
            consume: Box::new(move |consumes| rhs.consume(self.transform(consumes))),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::{StreamExt, TryStreamExt, stream};

    use super::*;
    use crate::bail;
    use crate::concurrency::lock;
    use crate::error::{ErrorKind, EtlError};
    use crate::pipes::lambda::{LambdaConsumer, LambdaProducer, LambdaTransformer};

    fn numbers() -> Arc<dyn Producer<u32>> {
        Arc::new(LambdaProducer::replaying(vec![1u32, 2, 3]))
    }

    fn doubled() -> Arc<dyn Transformer<u32, u32>> {
        Arc::new(LambdaTransformer::map(|value: u32| Ok(value * 2)))
    }

    #[tokio::test]
    async fn constituents_are_flattened() {
        let composed = numbers().then(doubled()).then(doubled());
        assert_eq!(composed.constituents().unwrap().len(), 3);

        let values: Vec<u32> = composed.produces().try_collect().await.unwrap();
        assert_eq!(values, vec![4, 8, 12]);
        assert_eq!(composed.status().unwrap(), PipeStatus::Finished);
    }

    #[tokio::test]
    async fn transformer_chains_compose() {
        let chain = doubled().then(doubled());
        let values: Vec<u32> = chain.transform(numbers().produces()).try_collect().await.unwrap();
        assert_eq!(values, vec![4, 8, 12]);
    }

    #[tokio::test]
    async fn closed_pipe_runs_to_completion() {
        let total = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let sink: Arc<dyn Consumer<u32>> = {
            let total = total.clone();
            Arc::new(LambdaConsumer::for_each(move |value: u32| {
                total.fetch_add(value, Ordering::SeqCst);
                Ok(())
            }))
        };

        let closed = numbers().then(doubled()).then(sink);
        assert_eq!(closed.status().unwrap(), PipeStatus::Created);

        closed.start().await.unwrap();
        assert_eq!(total.load(Ordering::SeqCst), 12);
        assert_eq!(closed.status().unwrap(), PipeStatus::Finished);
    }

    #[tokio::test]
    async fn stop_reaches_every_constituent() {
        let sink: Arc<dyn Consumer<u32>> = Arc::new(LambdaConsumer::for_each(|_: u32| Ok(())));
        let closed = numbers().then(sink);
        closed.stop();

        assert!(closed.start().await.is_err());
        assert_eq!(closed.status().unwrap(), PipeStatus::Stopped);

        closed.resume();
        closed.start().await.unwrap();
        assert_eq!(closed.status().unwrap(), PipeStatus::Finished);
    }

    /// Pass-through pipe recording its closes into a shared log.
    struct Closing {
        name: &'static str,
        fails: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Pipe for Closing {
        fn status(&self) -> EtlResult<PipeStatus> {
            Ok(PipeStatus::Created)
        }

        fn stop(&self) {}

        fn resume(&self) {}

        async fn close(&self) -> EtlResult<()> {
            lock(&self.log).push(self.name);
            if self.fails {
                bail!(ErrorKind::DestinationError, "Close failed", self.name);
            }
            Ok(())
        }
    }

    impl Producer<u32> for Closing {
        fn produces(&self) -> PipeStream<u32> {
            stream::empty().boxed()
        }
    }

    impl Transformer<u32, u32> for Closing {
        fn transform(&self, consumes: PipeStream<u32>) -> PipeStream<u32> {
            consumes
        }
    }

    #[tokio::test]
    async fn close_runs_once() {
        let composed = numbers().then(doubled());
        composed.close().await.unwrap();
        composed.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_reaches_constituents_in_order_and_keeps_every_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipe = |name: &'static str, fails: bool| {
            Arc::new(Closing {
                name,
                fails,
                log: log.clone(),
            })
        };
        let source: Arc<dyn Producer<u32>> = pipe("source", true);
        let middle: Arc<dyn Transformer<u32, u32>> = pipe("middle", false);
        let last: Arc<dyn Transformer<u32, u32>> = pipe("last", true);

        let composed = source.then(middle).then(last);
        let err = composed.close().await.unwrap_err();
        composed.close().await.unwrap();

        assert_eq!(*lock(&log), vec!["source", "middle", "last"]);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::DestinationError, ErrorKind::DestinationError]
        );
        let details: Vec<_> = err.errors().iter().filter_map(EtlError::detail).collect();
        assert_eq!(details, vec!["source", "last"]);
    }
}
