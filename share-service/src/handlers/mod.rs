//! HTTP handlers for share-service.

pub mod access_code;
pub mod invitation;
pub mod resolve;

pub use access_code::*;
pub use invitation::*;
pub use resolve::*;
