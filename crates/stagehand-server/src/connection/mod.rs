//! One backend connection: receiver, sender and coordinator.
//!
//! ```text
//! transport ──► Receiver ──► InboundQueue ──► Coordinator ──► RequestHandler
//!                                                  │                │
//! transport ◄── Sender ◄──── OutboundQueue ◄───────┴────────────────┘
//! ```
//!
//! Shutdown always runs in the same order: close sentinel, wait for the
//! sender, close the transport, release both queues, stop the receiver.

mod coordinator;
mod queue;
mod receiver;
mod sender;

pub use queue::{InboundQueue, OutboundQueue, QueueClosed};
pub use receiver::ReceiverExit;
pub use sender::SenderStop;

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use stagehand_core::stages::StageResolver;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span};

use crate::handler::RequestHandler;
use crate::metrics::{
    CONNECTION_DURATION_SECONDS, CONNECTIONS_ACTIVE, CONNECTIONS_CLOSED_TOTAL,
    CONNECTIONS_OPENED_TOTAL,
};
use crate::transport::{FrameSink, FrameSource};
use coordinator::{Coordinator, Tasks};

/// Queue sizing and teardown timing for one connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Inbound queue capacity.
    pub inbound_capacity: usize,
    /// Outbound queue capacity.
    pub outbound_capacity: usize,
    /// How long to wait for the receiver after cancelling it.
    pub receiver_drain_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 4,
            outbound_capacity: 256,
            receiver_drain_timeout: Duration::from_secs(1),
        }
    }
}

/// Coordinator lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for a `new` envelope.
    AwaitingCommand,
    /// The request handler owns the exchange.
    Delegated,
    /// Tearing down.
    ShuttingDown,
    /// Fully torn down.
    Closed,
}

/// Summary of a finished connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionReport {
    /// Connection identifier (`conn_<uuid>`).
    pub connection_id: String,
    /// Requests handed to the handler.
    pub requests_delegated: u64,
    /// `new` envelopes answered with Error + Finish.
    pub requests_rejected: u64,
    /// Messages ignored outside a request cycle.
    pub messages_dropped: u64,
    /// Close sentinels enqueued (at most one).
    pub close_sentinels: u32,
    /// Why the receiver stopped.
    pub receiver_exit: ReceiverExit,
    /// Why the sender stopped.
    pub sender_stop: SenderStop,
    /// State when the report was produced.
    pub final_state: ConnectionState,
}

impl ConnectionReport {
    fn new(connection_id: String) -> Self {
        Self {
            connection_id,
            requests_delegated: 0,
            requests_rejected: 0,
            messages_dropped: 0,
            close_sentinels: 0,
            receiver_exit: ReceiverExit::Aborted,
            sender_stop: SenderStop::Aborted,
            final_state: ConnectionState::AwaitingCommand,
        }
    }
}

/// A connection waiting to be run over a transport.
pub struct Connection {
    id: String,
    resolver: Arc<dyn StageResolver>,
    handler: Arc<dyn RequestHandler>,
    config: ConnectionConfig,
    shutdown: CancellationToken,
}

impl Connection {
    /// New connection with default sizing and its own shutdown token.
    pub fn new(resolver: Arc<dyn StageResolver>, handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            id: format!("conn_{}", uuid::Uuid::now_v7()),
            resolver,
            handler,
            config: ConnectionConfig::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Override queue sizing and timeouts.
    #[must_use]
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Tie the connection to a server-wide shutdown token.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Connection identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run the connection to completion over the given transport halves.
    ///
    /// Spawns the receiver and sender, coordinates on the current task, and
    /// returns once everything is torn down.
    pub async fn run<S: FrameSource, K: FrameSink>(self, source: S, sink: K) -> ConnectionReport {
        let span = info_span!("connection", connection_id = %self.id);
        self.serve(source, sink).instrument(span).await
    }

    async fn serve<S: FrameSource, K: FrameSink>(self, source: S, sink: K) -> ConnectionReport {
        let started = Instant::now();
        info!("connection opened");
        counter!(CONNECTIONS_OPENED_TOTAL).increment(1);
        gauge!(CONNECTIONS_ACTIVE).increment(1.0);

        let (inbound_tx, inbound) = queue::inbound(self.config.inbound_capacity);
        let (outbound, outbound_rx) = queue::outbound(self.config.outbound_capacity);
        let receiver_cancel = CancellationToken::new();

        let tasks = Tasks {
            receiver: tokio::spawn(
                receiver::run_receiver(source, inbound_tx, receiver_cancel.clone())
                    .in_current_span(),
            ),
            sender: tokio::spawn(sender::run_sender(sink, outbound_rx).in_current_span()),
            receiver_cancel,
        };

        let coordinator = Coordinator {
            resolver: self.resolver,
            handler: self.handler,
            shutdown: self.shutdown,
            receiver_drain_timeout: self.config.receiver_drain_timeout,
            report: ConnectionReport::new(self.id),
        };
        let report = coordinator.run(inbound, outbound, tasks).await;

        gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
        counter!(CONNECTIONS_CLOSED_TOTAL).increment(1);
        histogram!(CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        info!(
            delegated = report.requests_delegated,
            rejected = report.requests_rejected,
            dropped = report.messages_dropped,
            receiver = ?report.receiver_exit,
            sender = ?report.sender_stop,
            "connection closed"
        );
        report
    }
}
