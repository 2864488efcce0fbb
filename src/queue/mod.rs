//! Queue hand-off between the crawler and the persister
//!
//! This module contains:
//! - The envelope wire format
//! - The publisher trait with its AMQP and in-memory implementations
//! - The consumer state machine and the AMQP driver that feeds it

mod consumer;
mod envelope;
mod persister;
mod publisher;

pub use consumer::{
    persist_delivery, Action, ConsumerEvent, ConsumerMachine, ConsumerState, ConsumerStats,
    DeliveryOutcome, ExitReason,
};
pub use envelope::{decode_envelope, encode_envelope};
pub use persister::run_persister;
pub use publisher::{declare_topology, AmqpPublisher, MemoryPublisher};

use crate::Post;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by the broker side of the pipeline
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Failed to connect to broker at {address}: {source}")]
    Connect {
        address: String,
        source: lapin::Error,
    },

    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Consumer terminated: {0}")]
    Terminated(ExitReason),
}

/// Sends envelopes towards the persistence stage
#[async_trait]
pub trait EnvelopePublisher: Send + Sync {
    /// Publishes the posts of one thread page as a single message
    async fn publish(&self, posts: &[Post]) -> Result<(), BrokerError>;
}
