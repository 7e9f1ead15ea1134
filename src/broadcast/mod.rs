//! Real-time fan-out to connected subscribers
//!
//! The [`Broadcaster`] snapshots the connection registry, hands one
//! serialized event to a [`DeliveryTransport`] per connection and prunes
//! connections whose transport reports them gone.

pub mod broadcaster;
pub mod event;
pub mod gateway;
pub mod hub;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use broadcaster::{BroadcastConfig, BroadcastError, BroadcastReport, Broadcaster};
pub use event::{AlertPayload, BroadcastEvent, VitalUpdatePayload};
pub use gateway::{GatewayError, GatewayTransport};
pub use hub::WebSocketHub;
pub use transport::{DeliveryError, DeliveryTransport};
