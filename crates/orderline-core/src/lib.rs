//! Orderline Core Types and Traits
//!
//! This crate provides the fundamental types and traits used throughout Orderline:
//! - The order record model and payload decoding
//! - Durable store and message source abstractions
//! - Clock abstraction for expiry logic
//! - Core error types

pub mod clock;
pub mod error;
pub mod memory;
pub mod order;
pub mod source;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use memory::MemoryOrderStore;
pub use order::{Delivery, Item, Order, Payment};
pub use source::{AckToken, InboundMessage, MessageSource};
pub use store::{OrderStore, PutOutcome};
