use std::any::Any;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::mapper::Mapper;

/// Pass-through mapper for jobs whose source and destination types are the same.
///
/// It is generic over both types so it can stand in for any `Mapper<S, D>`; mapping fails
/// when `S` and `D` turn out to differ.
pub struct IdentityMapper<S, D> {
    _types: PhantomData<fn(&S) -> D>,
}

impl<S, D> IdentityMapper<S, D>
where
    S: 'static,
    D: 'static,
{
    /// Returns the mapper when `S` and `D` are the same type.
    pub fn for_types() -> Option<Self> {
        (std::any::TypeId::of::<S>() == std::any::TypeId::of::<D>()).then_some(Self {
            _types: PhantomData,
        })
    }
}

#[async_trait]
impl<S, D> Mapper<S, D> for IdentityMapper<S, D>
where
    S: Clone + Send + Sync + 'static,
    D: Send + 'static,
{
    async fn map(&self, source: &S) -> EtlResult<D> {
        let boxed: Box<dyn Any + Send> = Box::new(source.clone());
        match boxed.downcast::<D>() {
            Ok(destination) => Ok(*destination),
            Err(_) => bail!(
                ErrorKind::InvalidArgument,
                "Identity mapping requires identical source and destination types",
                format!(
                    "{} -> {}",
                    std::any::type_name::<S>(),
                    std::any::type_name::<D>()
                )
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_values_through() {
        let mapper = IdentityMapper::<Vec<u8>, Vec<u8>>::for_types().unwrap();
        assert_eq!(mapper.map(&vec![1, 2]).await.unwrap(), vec![1, 2]);
    }

    #[test]
    fn refuses_different_types() {
        assert!(IdentityMapper::<u8, String>::for_types().is_none());
    }
}
