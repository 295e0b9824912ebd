//! # stagehand-core
//!
//! Shared vocabulary for the stagehand worker:
//!
//! - **Envelope**: [`envelope::ClientEnvelope`], the first message of a request cycle,
//!   and the [`envelope::RequestRejection`] reasons reported back to the backend
//! - **Events**: [`events::OutgoingEvent`] with `Error`, `Finish` and handler-defined variants
//! - **Stages**: [`stages::StagePlan`] and the [`stages::StageResolver`] lookup seam
//! - **Logging**: `tracing` subscriber setup and a capturing subscriber for tests

#![deny(unsafe_code)]

pub mod envelope;
pub mod events;
pub mod logging;
pub mod stages;
pub mod text;
