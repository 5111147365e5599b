use core::pin::Pin;
use core::task::{Context, Poll};

use futures::{Stream, ready};
use pin_project_lite::pin_project;

use crate::error::{ErrorKind, EtlResult};
use crate::pipes::status::{PipeControl, PipeStatus, pipe_stopped};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Run {
    NotStarted,
    Running,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tracking {
    /// Drive the owner's status through the whole run.
    Status,
    /// Only enforce the stop flag; the owner settles its status elsewhere.
    StopOnly,
}

pin_project! {
    /// Stream adapter that ties a pipe's status and stop flag to the elements it yields.
    ///
    /// Every pull checks the stop flag first; a raised flag ends the stream with a
    /// [`ErrorKind::PipeStopped`] error. The first error from the inner stream is yielded and
    /// the stream is fused afterwards. Dropping the stream while it is still running
    /// settles the owner to [`PipeStatus::Stopped`].
    #[must_use = "streams do nothing unless polled"]
    pub struct TrackedStream<S> {
        #[pin]
        inner: S,
        control: PipeControl,
        run: Run,
        tracking: Tracking,
    }

    impl<S> PinnedDrop for TrackedStream<S> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if *this.run == Run::Running && *this.tracking == Tracking::Status {
                this.control.set_status(PipeStatus::Stopped);
            }
        }
    }
}

impl<S> TrackedStream<S> {
    pub fn new(inner: S, control: PipeControl) -> Self {
        Self {
            inner,
            control,
            run: Run::NotStarted,
            tracking: Tracking::Status,
        }
    }

    /// Wraps `inner` so it honors the stop flag without touching the status.
    pub fn stop_only(inner: S, control: PipeControl) -> Self {
        Self {
            inner,
            control,
            run: Run::NotStarted,
            tracking: Tracking::StopOnly,
        }
    }
}

impl<S, T> Stream for TrackedStream<S>
where
    S: Stream<Item = EtlResult<T>>,
{
    type Item = EtlResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let tracks_status = *this.tracking == Tracking::Status;

        if *this.run == Run::Done {
            return Poll::Ready(None);
        }

        if this.control.is_stopped() {
            *this.run = Run::Done;
            if tracks_status {
                this.control.set_status(PipeStatus::Stopped);
            }
            return Poll::Ready(Some(Err(pipe_stopped())));
        }

        if *this.run == Run::NotStarted {
            *this.run = Run::Running;
            if tracks_status {
                this.control.set_status(PipeStatus::Working);
            }
        }

        let item = ready!(this.inner.poll_next(cx));
        match item {
            Some(Ok(value)) => Poll::Ready(Some(Ok(value))),
            Some(Err(err)) => {
                *this.run = Run::Done;
                if tracks_status {
                    let status = if err.kind() == ErrorKind::PipeStopped {
                        PipeStatus::Stopped
                    } else {
                        PipeStatus::Errored
                    };
                    this.control.set_status(status);
                }
                Poll::Ready(Some(Err(err)))
            }
            None => {
                *this.run = Run::Done;
                if tracks_status {
                    this.control.set_status(PipeStatus::Finished);
                }
                Poll::Ready(None)
            }
        }
    }
}
