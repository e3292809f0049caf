pub mod dead_letter;
pub mod delivery_log;
pub mod domain_event;
pub mod subscription;

pub use dead_letter::{DEFAULT_DEAD_LETTER_ERROR, DeadLetterEntry, DeadLetterStatus};
pub use delivery_log::{DeliveryStatus, EventDeliveryLog};
pub use domain_event::{DomainEvent, EventStatus};
pub use subscription::{DeliveryMethod, EventSubscription, RetryPolicy};
