//! Consumer state machine
//!
//! The machine is fed typed events by the AMQP driver in
//! [`run_persister`](crate::queue::run_persister) and answers each one with
//! the actions the driver must perform. It never touches the network, so every
//! transition can be exercised with synthetic events.

use crate::queue::envelope::decode_envelope;
use crate::storage::PostSink;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Lifecycle of the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    ChannelOpening,
    QueueReady,
    Consuming,
    ChannelClosed,
    ConnectionClosed,
    Failed,
}

impl ConsumerState {
    /// Terminal states accept no further events
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConsumerState::ChannelClosed | ConsumerState::ConnectionClosed | ConsumerState::Failed
        )
    }
}

/// Something that happened on the broker link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerEvent {
    Start,
    Connected,
    ConnectFailed(String),
    ChannelOpened,
    QueueDeclared,
    ConsumeStarted,
    Delivered { delivery_tag: u64, body: Vec<u8> },
    /// The ack or reject for `delivery_tag` reached the broker
    Settled { delivery_tag: u64 },
    Cancelled,
    ChannelClosed(String),
    ConnectionClosed(String),
}

impl ConsumerEvent {
    fn name(&self) -> &'static str {
        match self {
            ConsumerEvent::Start => "start",
            ConsumerEvent::Connected => "connected",
            ConsumerEvent::ConnectFailed(_) => "connect-failed",
            ConsumerEvent::ChannelOpened => "channel-opened",
            ConsumerEvent::QueueDeclared => "queue-declared",
            ConsumerEvent::ConsumeStarted => "consume-started",
            ConsumerEvent::Delivered { .. } => "delivered",
            ConsumerEvent::Settled { .. } => "settled",
            ConsumerEvent::Cancelled => "cancelled",
            ConsumerEvent::ChannelClosed(_) => "channel-closed",
            ConsumerEvent::ConnectionClosed(_) => "connection-closed",
        }
    }
}

/// Work the driver performs on behalf of the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    OpenConnection,
    OpenChannel,
    /// Set prefetch to 1 and declare the exchange, queue and dead-letter route
    DeclareQueue,
    StartConsuming,
    Ack(u64),
    /// Negative acknowledgment without requeue; the broker dead-letters it
    Reject(u64),
    CloseChannel,
    CloseConnection,
    /// Always the last action of a batch
    Exit(ExitReason),
}

/// Why the consumer stopped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExitReason {
    #[error("could not connect to broker: {0}")]
    ConnectFailed(String),

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),

    #[error("consumer cancelled by broker")]
    Cancelled,

    #[error("delivery {incoming} arrived while delivery {in_flight} was unacknowledged")]
    PrefetchViolated { incoming: u64, in_flight: u64 },

    #[error("unexpected {event} event in state {state:?}")]
    UnexpectedEvent {
        state: ConsumerState,
        event: &'static str,
    },
}

/// Result of handling one delivery body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Persisted(usize),
    Undecodable(String),
    StorageFailed(String),
}

/// Decodes an envelope and writes its posts to the sink
pub fn persist_delivery<S: PostSink + ?Sized>(sink: &mut S, body: &[u8]) -> DeliveryOutcome {
    let posts = match decode_envelope(body) {
        Ok(posts) => posts,
        Err(e) => return DeliveryOutcome::Undecodable(e.to_string()),
    };

    match sink.insert_all(&posts) {
        Ok(written) => DeliveryOutcome::Persisted(written),
        Err(e) => DeliveryOutcome::StorageFailed(e.to_string()),
    }
}

/// Counters kept across the consumer's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub deliveries: u64,
    pub acked: u64,
    pub rejected: u64,
    pub posts_persisted: u64,
}

/// Explicit consumer state machine with a single dispatcher
pub struct ConsumerMachine<S: PostSink> {
    state: ConsumerState,
    in_flight: Option<u64>,
    sink: S,
    stats: ConsumerStats,
}

impl<S: PostSink> ConsumerMachine<S> {
    pub fn new(sink: S) -> Self {
        Self {
            state: ConsumerState::Disconnected,
            in_flight: None,
            sink,
            stats: ConsumerStats::default(),
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Delivery tag awaiting settlement, if any
    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Applies one event and returns the actions to perform, in order
    pub fn handle(&mut self, event: ConsumerEvent) -> Vec<Action> {
        use ConsumerEvent as Event;
        use ConsumerState as State;

        if self.state.is_terminal() {
            debug!("Ignoring {} event after termination", event.name());
            return Vec::new();
        }

        match (self.state, event) {
            (_, Event::ConnectionClosed(reason)) => {
                self.state = State::ConnectionClosed;
                vec![Action::Exit(ExitReason::ConnectionClosed(reason))]
            }
            (_, Event::ChannelClosed(reason)) => {
                self.state = State::ChannelClosed;
                vec![
                    Action::CloseConnection,
                    Action::Exit(ExitReason::ChannelClosed(reason)),
                ]
            }
            (State::Disconnected, Event::Start) => {
                self.state = State::Connecting;
                vec![Action::OpenConnection]
            }
            (State::Connecting, Event::Connected) => {
                self.state = State::ChannelOpening;
                vec![Action::OpenChannel]
            }
            (State::Connecting, Event::ConnectFailed(reason)) => {
                self.state = State::Failed;
                vec![Action::Exit(ExitReason::ConnectFailed(reason))]
            }
            (State::ChannelOpening, Event::ChannelOpened) => vec![Action::DeclareQueue],
            (State::ChannelOpening, Event::QueueDeclared) => {
                self.state = State::QueueReady;
                vec![Action::StartConsuming]
            }
            (State::QueueReady, Event::ConsumeStarted) => {
                info!("Consuming deliveries");
                self.state = State::Consuming;
                Vec::new()
            }
            (State::Consuming, Event::Delivered { delivery_tag, body }) => {
                self.on_delivery(delivery_tag, &body)
            }
            (State::Consuming, Event::Settled { delivery_tag }) => {
                if self.in_flight == Some(delivery_tag) {
                    self.in_flight = None;
                } else {
                    warn!(delivery_tag, "Settled a delivery that was not in flight");
                }
                Vec::new()
            }
            (State::Consuming, Event::Cancelled) => {
                warn!("Consumer cancelled by broker");
                self.state = State::ChannelClosed;
                vec![
                    Action::CloseChannel,
                    Action::CloseConnection,
                    Action::Exit(ExitReason::Cancelled),
                ]
            }
            (state, event) => {
                self.state = State::Failed;
                vec![Action::Exit(ExitReason::UnexpectedEvent {
                    state,
                    event: event.name(),
                })]
            }
        }
    }

    fn on_delivery(&mut self, delivery_tag: u64, body: &[u8]) -> Vec<Action> {
        if let Some(in_flight) = self.in_flight {
            self.state = ConsumerState::Failed;
            return vec![
                Action::CloseConnection,
                Action::Exit(ExitReason::PrefetchViolated {
                    incoming: delivery_tag,
                    in_flight,
                }),
            ];
        }

        self.in_flight = Some(delivery_tag);
        self.stats.deliveries += 1;

        match persist_delivery(&mut self.sink, body) {
            DeliveryOutcome::Persisted(written) => {
                debug!(delivery_tag, written, "Persisted envelope");
                self.stats.acked += 1;
                self.stats.posts_persisted += written as u64;
                vec![Action::Ack(delivery_tag)]
            }
            DeliveryOutcome::Undecodable(reason) => {
                warn!(delivery_tag, "Rejecting undecodable envelope: {}", reason);
                self.stats.rejected += 1;
                vec![Action::Reject(delivery_tag)]
            }
            DeliveryOutcome::StorageFailed(reason) => {
                error!(delivery_tag, "Rejecting envelope after storage failure: {}", reason);
                self.stats.rejected += 1;
                vec![Action::Reject(delivery_tag)]
            }
        }
    }
}
