//! Application services - flow registry and the queued executor

/// The queued executor: dispatcher, workers, and the public contract
pub mod queued_executor;

/// Flow name lookup
pub mod registry;
