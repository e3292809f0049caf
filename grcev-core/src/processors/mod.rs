//! Delivery processors.
//!
//! This module contains the moving parts of the delivery engine:
//!
//! - `EventDispatcher`: executes a single delivery attempt
//! - `DeliveryBatchRunner`: polls for pending and due-for-retry logs
//! - `DeadLetterMover`: quarantines deliveries that exhausted retries

pub mod batch_runner;
pub mod dead_letter_mover;
pub mod dispatcher;

pub use batch_runner::{DEFAULT_RETRY_BATCH_SIZE, DeliveryBatchRunner};
pub use dead_letter_mover::DeadLetterMover;
pub use dispatcher::{EventDispatcher, MAX_ERROR_MESSAGE_CHARS};
