//! # stagehand-server
//!
//! Per-connection coordination for the stagehand worker.
//!
//! Every accepted stream becomes a [`Connection`] made of three tasks joined
//! by two bounded queues:
//!
//! - **Receiver**: transport reads into the inbound queue
//! - **Sender**: outbound queue into transport writes
//! - **Coordinator**: validates `new` envelopes, resolves stage plans and
//!   hands the queues to the [`RequestHandler`]
//!
//! [`WorkerServer`] exposes connections over WebSocket with Axum, alongside
//! `/health` and `/metrics`.

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod handler;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod transport;

pub use config::ServerConfig;
pub use connection::{
    Connection, ConnectionConfig, ConnectionReport, ConnectionState, InboundQueue, OutboundQueue,
    QueueClosed, ReceiverExit, SenderStop,
};
pub use handler::{DryRunHandler, RequestHandler, RequestStart};
pub use server::WorkerServer;
pub use shutdown::{DrainOutcome, ShutdownCoordinator};
