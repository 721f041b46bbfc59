//! Core data types for bondwatch.

pub mod brand;
pub mod breach;
pub mod channel;
pub mod store;
pub mod subscription;
pub mod validate;

pub use brand::*;
pub use breach::*;
pub use channel::*;
pub use store::*;
pub use subscription::*;
pub use validate::*;
