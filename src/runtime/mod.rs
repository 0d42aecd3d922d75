//! Runtime support for the clustering tasks
//!
//! Shutdown signalling and cancellation scopes.

pub mod shutdown;

pub use shutdown::ShutdownSignal;
