//! Wire objects delivered to subscribers.

pub mod envelope;
pub mod queue;

pub use envelope::WebhookEnvelope;
pub use queue::QueueMessage;
