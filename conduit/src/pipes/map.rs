use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, stream};

use crate::error::EtlResult;
use crate::mapper::Mapper;
use crate::pipes::base::{Pipe, PipeStream, Transformer};
use crate::pipes::status::{PipeControl, PipeStatus};
use crate::pipes::stream::TrackedStream;

/// Transformer applying every mapper to every page.
///
/// Output order is page-major, mapper-minor: all outputs of a page are emitted before the
/// next page is pulled.
pub struct MapPipe<S, D> {
    mappers: Arc<Vec<Arc<dyn Mapper<S, D>>>>,
    control: PipeControl,
}

impl<S, D> MapPipe<S, D>
where
    S: Send + Sync + 'static,
    D: Send + 'static,
{
    pub fn new(mappers: Vec<Arc<dyn Mapper<S, D>>>) -> Self {
        Self {
            mappers: Arc::new(mappers),
            control: PipeControl::new(),
        }
    }
}

#[async_trait]
impl<S, D> Pipe for MapPipe<S, D>
where
    S: Send + Sync + 'static,
    D: Send + 'static,
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

impl<S, D> Transformer<S, D> for MapPipe<S, D>
where
    S: Send + Sync + 'static,
    D: Send + 'static,
{
    fn transform(&self, consumes: PipeStream<S>) -> PipeStream<D> {
        let mappers = self.mappers.clone();
        let outputs = consumes.flat_map(move |page| {
            let mappers = mappers.clone();
            let page = match page {
                Ok(page) => Arc::new(page),
                Err(err) => return stream::iter(vec![Err(err)]).left_stream(),
            };

            stream::iter(0..mappers.len())
                .then(move |index| {
                    let mapper = mappers[index].clone();
                    let page = page.clone();
                    async move { mapper.map(&page).await }
                })
                .right_stream()
        });

        TrackedStream::new(outputs, self.control.clone()).boxed()
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;

    use super::*;
    use crate::pipes::base::Producer;
    use crate::pipes::lambda::LambdaProducer;

    struct Scale(u32);

    #[async_trait]
    impl Mapper<Vec<u32>, Vec<u32>> for Scale {
        async fn map(&self, source: &Vec<u32>) -> EtlResult<Vec<u32>> {
            Ok(source.iter().map(|value| value * self.0).collect())
        }
    }

    #[tokio::test]
    async fn outputs_are_page_major_mapper_minor() {
        let pages = LambdaProducer::replaying(vec![vec![1u32], vec![2]]);
        let mappers: Vec<Arc<dyn Mapper<Vec<u32>, Vec<u32>>>> =
            vec![Arc::new(Scale(10)), Arc::new(Scale(100))];
        let pipe = MapPipe::new(mappers);

        let outputs: Vec<Vec<u32>> = pipe.transform(pages.produces()).try_collect().await.unwrap();
        assert_eq!(outputs, vec![vec![10], vec![100], vec![20], vec![200]]);
        assert_eq!(pipe.status().unwrap(), PipeStatus::Finished);
    }
}
