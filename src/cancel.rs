//! Cooperative cancellation for evaluations
//!
//! The caller signals via a cancellation token. The engine checks the
//! token between units of work and races it against collaborator calls.
//! Prefix summaries already computed stay valid.

pub use tokio_util::sync::CancellationToken;
