//! Re-exports of future helpers used by object-safe async traits.

pub use futures::future::{BoxFuture, FutureExt};
