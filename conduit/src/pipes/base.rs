use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::error::{EtlError, EtlResult};
use crate::pipes::status::PipeStatus;

/// Stream of elements flowing between pipes.
pub type PipeStream<T> = BoxStream<'static, EtlResult<T>>;

/// Behavior shared by every pipe role.
#[async_trait]
pub trait Pipe: Send + Sync {
    /// Current status; composites derive it from their constituents.
    fn status(&self) -> EtlResult<PipeStatus>;

    /// Raises the stop flag. Running streams end at their next pull with a
    /// [`crate::error::ErrorKind::PipeStopped`] error, and later runs fail the same way until
    /// [`Pipe::resume`] is called.
    fn stop(&self);

    /// Lowers the stop flag.
    fn resume(&self);

    /// Flat list of primitive pipes a composite is built from.
    fn constituents(&self) -> Option<Vec<Arc<dyn Pipe>>> {
        None
    }

    /// Releases the resources held by the pipe.
    async fn close(&self) -> EtlResult<()> {
        Ok(())
    }
}

/// Pipe emitting a lazy stream of `P`.
///
/// Every call to [`Producer::produces`] starts a new run.
pub trait Producer<P>: Pipe {
    fn produces(&self) -> PipeStream<P>;
}

/// Pipe turning a stream of `C` into a stream of `P`.
pub trait Transformer<C, P>: Pipe {
    fn transform(&self, consumes: PipeStream<C>) -> PipeStream<P>;
}

/// Pipe draining a stream of `C` to completion.
pub trait Consumer<C>: Pipe {
    fn consume(&self, consumes: PipeStream<C>) -> BoxFuture<'static, EtlResult<()>>;
}

/// Fully wired pipe: a producer connected to a consumer.
pub trait Closed: Pipe {
    /// Wires the stages together immediately and returns the future that drives them.
    fn start(&self) -> BoxFuture<'static, EtlResult<()>>;
}

/// Closes `pipes` in order, each exactly once, and aggregates the failures.
pub(crate) async fn close_all(pipes: &[Arc<dyn Pipe>]) -> EtlResult<()> {
    let mut errors: Vec<EtlError> = Vec::new();
    for pipe in pipes {
        if let Err(err) = pipe.close().await {
            errors.push(err);
        }
    }

    if errors.is_empty() {
        return Ok(());
    }

    Err(errors.into())
}
