//! Attempt execution: calldata encoding, submission, replacement

pub mod broadcast;
pub mod calldata;
pub mod coordinator;

pub use broadcast::{submit_with_fallback, Broadcaster, RelayBroadcaster};
pub use coordinator::{AttemptState, ChainView, ExecutionAttempt, ExecutionCoordinator};
