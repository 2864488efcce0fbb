//! Envelope publishers
//!
//! `AmqpPublisher` talks to the broker; `MemoryPublisher` records envelopes so
//! crawl runs can be inspected without one.

use crate::config::BrokerConfig;
use crate::queue::envelope::encode_envelope;
use crate::queue::{BrokerError, EnvelopePublisher};
use crate::Post;
use async_trait::async_trait;
use lapin::options::{
    BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::sync::RwLock;
use tracing::{debug, info};

const CONTENT_TYPE: &str = "application/json";
const PERSISTENT: u8 = 2;

fn durable_exchange() -> ExchangeDeclareOptions {
    ExchangeDeclareOptions {
        durable: true,
        ..Default::default()
    }
}

fn durable_queue() -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: true,
        ..Default::default()
    }
}

/// Declares the exchange, the queue and the dead-letter route, and binds them
///
/// Both the publisher and the consumer call this, so whichever starts first
/// creates the topology. Redeclaring with identical arguments is a no-op.
pub async fn declare_topology(channel: &Channel, broker: &BrokerConfig) -> Result<(), BrokerError> {
    let dead_exchange = broker.dead_letter_exchange();
    let dead_queue = broker.dead_letter_queue();

    channel
        .exchange_declare(
            &dead_exchange,
            ExchangeKind::Direct,
            durable_exchange(),
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_declare(&dead_queue, durable_queue(), FieldTable::default())
        .await?;
    channel
        .queue_bind(
            &dead_queue,
            &dead_exchange,
            &broker.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    channel
        .exchange_declare(
            &broker.exchange,
            ExchangeKind::Direct,
            durable_exchange(),
            FieldTable::default(),
        )
        .await?;

    let mut arguments = FieldTable::default();
    arguments.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(dead_exchange.into()),
    );
    channel
        .queue_declare(&broker.queue, durable_queue(), arguments)
        .await?;
    channel
        .queue_bind(
            &broker.queue,
            &broker.exchange,
            &broker.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    debug!(
        "Declared {} -> {} ({}), dead letters to {}",
        broker.exchange, broker.queue, broker.routing_key, dead_queue
    );
    Ok(())
}

/// Publishes envelopes over one AMQP connection and channel
pub struct AmqpPublisher {
    connection: Connection,
    channel: Channel,
    exchange: String,
    routing_key: String,
}

impl AmqpPublisher {
    /// Connects to the broker and declares the topology
    ///
    /// # Arguments
    ///
    /// * `broker` - Broker connection and routing settings
    ///
    /// # Returns
    ///
    /// * `Ok(AmqpPublisher)` - Connected publisher with a ready channel
    /// * `Err(BrokerError)` - Connection or declaration failed
    pub async fn connect(broker: &BrokerConfig) -> Result<Self, BrokerError> {
        let address = format!("{}:{}", broker.host, broker.port);
        let connection = Connection::connect(&broker.uri(), ConnectionProperties::default())
            .await
            .map_err(|source| BrokerError::Connect {
                address: address.clone(),
                source,
            })?;

        let channel = connection.create_channel().await?;
        declare_topology(&channel, broker).await?;

        info!("Connected to broker at {}", address);

        Ok(Self {
            connection,
            channel,
            exchange: broker.exchange.clone(),
            routing_key: broker.routing_key.clone(),
        })
    }

    /// Closes the channel and the connection
    pub async fn close(self) -> Result<(), BrokerError> {
        self.channel.close(200, "crawl finished").await?;
        self.connection.close(200, "crawl finished").await?;
        Ok(())
    }
}

#[async_trait]
impl EnvelopePublisher for AmqpPublisher {
    async fn publish(&self, posts: &[Post]) -> Result<(), BrokerError> {
        let body = encode_envelope(posts)?;
        let properties = BasicProperties::default()
            .with_content_type(CONTENT_TYPE.into())
            .with_delivery_mode(PERSISTENT);

        // The returned confirm is dropped: delivery is fire-and-forget
        self.channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await?;

        debug!("Published envelope of {} posts", posts.len());
        Ok(())
    }
}

/// Publisher that keeps encoded envelopes in memory
///
/// Used by `crawl --dry-run` and by tests to observe what would have been
/// sent to the broker.
#[derive(Default)]
pub struct MemoryPublisher {
    envelopes: RwLock<Vec<Vec<u8>>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoded envelopes in publish order
    pub fn envelopes(&self) -> Vec<Vec<u8>> {
        self.envelopes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn publish_count(&self) -> usize {
        self.envelopes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl EnvelopePublisher for MemoryPublisher {
    async fn publish(&self, posts: &[Post]) -> Result<(), BrokerError> {
        let body = encode_envelope(posts)?;
        self.envelopes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(body);
        Ok(())
    }
}
