//! Policy-enforcing data gateway: the only path from callers to storage.

pub mod envelope;
pub mod error;
pub mod gateway;
pub mod selector;

pub use envelope::{Envelope, Payload};
pub use error::GatewayError;
pub use gateway::{Gateway, DEFAULT_MAX_TAKE};
pub use selector::Selector;
