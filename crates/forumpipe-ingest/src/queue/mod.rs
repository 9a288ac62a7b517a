//! Message queue capability
//!
//! Publishing needs two things from a queue: send one payload to a named
//! topic and learn its message id, and close the client once every send in
//! flight has settled.

use async_trait::async_trait;

use crate::error::QueueError;

pub mod pubsub;

pub use pubsub::PubSubClient;

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Send `payload` to `topic` and wait for the broker to confirm it.
    ///
    /// Returns the broker-assigned message id.
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<String, QueueError>;

    /// Refuse new sends and wait for the ones in flight to finish
    async fn close(&self);
}
