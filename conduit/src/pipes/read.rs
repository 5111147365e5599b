use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::concurrency::lock;
use crate::config::PageSize;
use crate::error::EtlResult;
use crate::pipes::base::{Pipe, PipeStream, Producer};
use crate::pipes::status::{PipeControl, PipeStatus};
use crate::pipes::stream::TrackedStream;
use crate::source::Reader;

/// Page claims shared by every live stream of one [`ReadPipe`] run.
struct PageCursor {
    next_page: AtomicUsize,
    /// `(size, page_count)`, fetched once per run.
    extent: OnceCell<(usize, usize)>,
}

impl PageCursor {
    fn new() -> Self {
        Self {
            next_page: AtomicUsize::new(0),
            extent: OnceCell::new(),
        }
    }
}

/// Producer emitting the pages of a [`Reader`], one element per page.
///
/// Streams created while another stream of the same pipe is alive claim pages from the
/// same cursor, so running several copies concurrently reads every page exactly once.
/// Once every stream is gone the next call starts over from the first page.
pub struct ReadPipe<T> {
    reader: Arc<dyn Reader<T>>,
    page_size: PageSize,
    control: PipeControl,
    cursor: Mutex<Weak<PageCursor>>,
}

impl<T> ReadPipe<T>
where
    T: Send + 'static,
{
    pub fn new(reader: Arc<dyn Reader<T>>, page_size: PageSize) -> Self {
        Self {
            reader,
            page_size,
            control: PipeControl::new(),
            cursor: Mutex::new(Weak::new()),
        }
    }

    fn cursor(&self) -> Arc<PageCursor> {
        let mut current = lock(&self.cursor);
        if let Some(cursor) = current.upgrade() {
            return cursor;
        }

        let cursor = Arc::new(PageCursor::new());
        *current = Arc::downgrade(&cursor);
        cursor
    }
}

#[async_trait]
impl<T> Pipe for ReadPipe<T>
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
        self.reader.close().await
    }
}

impl<T> Producer<T> for ReadPipe<T>
where
    T: Send + 'static,
{
    fn produces(&self) -> PipeStream<T> {
        let cursor = self.cursor();
        let reader = self.reader.clone();
        let page_size = self.page_size;

        let pages = stream::unfold((cursor, reader), move |(cursor, reader)| async move {
            let extent = cursor
                .extent
                .get_or_try_init(|| async {
                    let size = reader.size().await?;
                    EtlResult::Ok((size, page_size.page_count(size)))
                })
                .await;
            let (size, page_count) = match extent {
                Ok(extent) => *extent,
                Err(err) => return Some((Err(err), (cursor, reader))),
            };

            let page = cursor.next_page.fetch_add(1, Ordering::AcqRel);
            if page >= page_count {
                return None;
            }

            let (skip, take) = page_size.window(page, size);
            debug!(page, page_count, skip, take, "reading page");
            let result = reader.read(skip, take).await;

            Some((result, (cursor, reader)))
        });

        TrackedStream::new(pages, self.control.clone()).boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use futures::TryStreamExt;

    use super::*;
    use crate::source::memory::MemoryReader;

    fn reader(count: u32) -> Arc<dyn Reader<Vec<u32>>> {
        Arc::new(MemoryReader::new((0..count).collect()))
    }

    #[tokio::test]
    async fn emits_one_element_per_page() {
        let pipe = ReadPipe::new(reader(7), PageSize::Limited(NonZeroUsize::new(3).unwrap()));

        let pages: Vec<Vec<u32>> = pipe.produces().try_collect().await.unwrap();
        assert_eq!(pages, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);

        let replay: Vec<Vec<u32>> = pipe.produces().try_collect().await.unwrap();
        assert_eq!(replay, pages);
    }

    #[tokio::test]
    async fn whole_dataset_is_one_page() {
        let pipe = ReadPipe::new(reader(5), PageSize::All);
        let pages: Vec<Vec<u32>> = pipe.produces().try_collect().await.unwrap();
        assert_eq!(pages, vec![vec![0, 1, 2, 3, 4]]);
    }

    #[tokio::test]
    async fn live_streams_split_the_pages() {
        let pipe = ReadPipe::new(reader(10), PageSize::Limited(NonZeroUsize::new(2).unwrap()));

        let first = pipe.produces();
        let second = pipe.produces();
        let (first, second) = tokio::join!(
            first.try_collect::<Vec<_>>(),
            second.try_collect::<Vec<_>>()
        );

        let mut items: Vec<u32> = first
            .unwrap()
            .into_iter()
            .chain(second.unwrap())
            .flatten()
            .collect();
        items.sort_unstable();
        assert_eq!(items, (0..10).collect::<Vec<_>>());
    }
}
