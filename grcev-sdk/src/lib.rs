//! Subscriber-facing SDK for the GRC event delivery engine.
//!
//! Contains the wire objects a subscriber receives (webhook envelope,
//! queue message) and the signature scheme used to authenticate webhook
//! deliveries. The engine itself lives in `grcev-core`.

pub mod objects;
pub mod signature;
