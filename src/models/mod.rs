//! Data models.

mod tree;

pub use tree::TreeValue;
