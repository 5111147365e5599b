//! Page transformations applied between reading and writing.

mod base;
mod identity;

pub use base::Mapper;
pub use identity::IdentityMapper;
