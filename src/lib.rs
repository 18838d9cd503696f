//! bonk-bbtree: dynamic AABB tree broad phase with an incremental pair cache

pub mod types;
pub mod bounds;
pub mod error;
pub mod pool;
pub mod pairs;
pub mod context;
mod tree;
pub mod index;
mod reindex;
pub mod api;

pub use crate::types::*;
pub use crate::api::*;
pub use crate::bounds::Aabb;
pub use crate::context::SharedContext;
pub use crate::error::IndexError;
pub use crate::index::{BbFn, BbTree, VelocityFn};
