//! AMQP driver for the consumer state machine
//!
//! Performs the machine's actions against the broker and turns what comes back
//! (replies, deliveries, closures) into events. Everything runs on one loop;
//! the sink is written synchronously inside it.

use crate::config::BrokerConfig;
use crate::queue::consumer::{Action, ConsumerEvent, ConsumerMachine};
use crate::queue::publisher::declare_topology;
use crate::queue::BrokerError;
use crate::storage::PostSink;
use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer};
use std::collections::VecDeque;
use std::convert::Infallible;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info};

const CONSUMER_TAG: &str = "forum-harvest";
const PREFETCH: u16 = 1;

/// Broker handles owned by the driver
#[derive(Default)]
struct Link {
    connection: Option<Connection>,
    channel: Option<Channel>,
    consumer: Option<Consumer>,
}

/// Consumes envelopes until the consumer terminates
///
/// There is no reconnect loop: any connection failure or unexpected closure
/// ends the run and is returned as [`BrokerError::Terminated`], leaving
/// restarts to the process supervisor.
///
/// # Arguments
///
/// * `broker` - Broker connection and routing settings
/// * `sink` - Destination for decoded posts
pub async fn run_persister<S: PostSink>(
    broker: &BrokerConfig,
    sink: S,
) -> Result<Infallible, BrokerError> {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut machine = ConsumerMachine::new(sink);
    let mut link = Link::default();
    let mut pending = VecDeque::from([ConsumerEvent::Start]);

    loop {
        let event = match pending.pop_front() {
            Some(event) => event,
            None => next_event(&mut events_rx, link.consumer.as_mut()).await,
        };

        for action in machine.handle(event) {
            if let Action::Exit(reason) = action {
                let stats = machine.stats();
                info!(
                    "Consumer stopped after {} deliveries ({} acked, {} rejected, {} posts)",
                    stats.deliveries, stats.acked, stats.rejected, stats.posts_persisted
                );
                return Err(BrokerError::Terminated(reason));
            }

            if let Some(reply) = perform(action, &mut link, broker, &events_tx).await {
                pending.push_back(reply);
            }
        }
    }
}

/// Waits for the next broker-originated event
async fn next_event(
    events: &mut UnboundedReceiver<ConsumerEvent>,
    consumer: Option<&mut Consumer>,
) -> ConsumerEvent {
    let Some(consumer) = consumer else {
        return events.recv().await.unwrap_or_else(|| {
            ConsumerEvent::ConnectionClosed("event channel closed".to_string())
        });
    };

    tokio::select! {
        biased;
        Some(event) = events.recv() => event,
        delivery = consumer.next() => match delivery {
            Some(Ok(delivery)) => ConsumerEvent::Delivered {
                delivery_tag: delivery.delivery_tag,
                body: delivery.data,
            },
            Some(Err(e)) => ConsumerEvent::ChannelClosed(e.to_string()),
            None => ConsumerEvent::Cancelled,
        },
    }
}

/// Executes one action and returns the event describing its outcome
async fn perform(
    action: Action,
    link: &mut Link,
    broker: &BrokerConfig,
    events: &UnboundedSender<ConsumerEvent>,
) -> Option<ConsumerEvent> {
    match action {
        Action::OpenConnection => {
            let address = format!("{}:{}", broker.host, broker.port);
            info!("Connecting to broker at {}", address);

            match Connection::connect(&broker.uri(), ConnectionProperties::default()).await {
                Ok(connection) => {
                    let events = events.clone();
                    connection.on_error(move |e| {
                        let _ = events.send(ConsumerEvent::ConnectionClosed(e.to_string()));
                    });
                    link.connection = Some(connection);
                    Some(ConsumerEvent::Connected)
                }
                Err(e) => Some(ConsumerEvent::ConnectFailed(format!("{address}: {e}"))),
            }
        }
        Action::OpenChannel => {
            let connection = link.connection.as_ref()?;
            match connection.create_channel().await {
                Ok(channel) => {
                    link.channel = Some(channel);
                    Some(ConsumerEvent::ChannelOpened)
                }
                Err(e) => Some(ConsumerEvent::ChannelClosed(e.to_string())),
            }
        }
        Action::DeclareQueue => {
            let channel = link.channel.as_ref()?;
            match declare_queue(channel, broker).await {
                Ok(()) => Some(ConsumerEvent::QueueDeclared),
                Err(e) => Some(ConsumerEvent::ChannelClosed(e.to_string())),
            }
        }
        Action::StartConsuming => {
            let channel = link.channel.as_ref()?;
            let consumer = channel
                .basic_consume(
                    &broker.queue,
                    CONSUMER_TAG,
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await;
            match consumer {
                Ok(consumer) => {
                    link.consumer = Some(consumer);
                    Some(ConsumerEvent::ConsumeStarted)
                }
                Err(e) => Some(ConsumerEvent::ChannelClosed(e.to_string())),
            }
        }
        Action::Ack(delivery_tag) => {
            let channel = link.channel.as_ref()?;
            match channel
                .basic_ack(delivery_tag, BasicAckOptions::default())
                .await
            {
                Ok(()) => Some(ConsumerEvent::Settled { delivery_tag }),
                Err(e) => Some(ConsumerEvent::ChannelClosed(e.to_string())),
            }
        }
        Action::Reject(delivery_tag) => {
            let channel = link.channel.as_ref()?;
            let options = BasicNackOptions {
                requeue: false,
                ..Default::default()
            };
            match channel.basic_nack(delivery_tag, options).await {
                Ok(()) => Some(ConsumerEvent::Settled { delivery_tag }),
                Err(e) => Some(ConsumerEvent::ChannelClosed(e.to_string())),
            }
        }
        Action::CloseChannel => {
            link.consumer = None;
            if let Some(channel) = link.channel.take() {
                if let Err(e) = channel.close(200, "consumer stopped").await {
                    debug!("Channel close failed: {}", e);
                }
            }
            None
        }
        Action::CloseConnection => {
            link.consumer = None;
            link.channel = None;
            if let Some(connection) = link.connection.take() {
                if let Err(e) = connection.close(200, "consumer stopped").await {
                    debug!("Connection close failed: {}", e);
                }
            }
            None
        }
        Action::Exit(reason) => {
            error!("Unhandled exit action: {}", reason);
            None
        }
    }
}

/// Limits unacknowledged deliveries to one, then declares the topology
async fn declare_queue(channel: &Channel, broker: &BrokerConfig) -> Result<(), BrokerError> {
    channel
        .basic_qos(PREFETCH, BasicQosOptions::default())
        .await?;
    declare_topology(channel, broker).await
}
