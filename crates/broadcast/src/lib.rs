//! File broadcast engine.
//!
//! Streams one local file to every node of a job allocation, block by
//! block. The crate holds the **business logic** only: the caller supplies
//! a [`ControlPlane`] that hands out transfer credentials and a
//! [`Transport`] that delivers one message to many nodes.
//!
//! # Pipeline
//!
//! 1. **Init**: map the source, resolve the credential, pick a codec
//! 2. **Streaming**: encode a block, fan it out, wait for every node
//! 3. **Done** after the last block is acknowledged everywhere, or
//!    **Aborted** on the first failing round

pub mod credential;
pub mod error;
pub mod fanout;
pub mod message;
pub mod orchestrator;
pub mod transport;
pub mod types;

// Re-export primary types for convenience.
pub use credential::{ControlPlane, CredentialResolver, StaticControlPlane};
pub use error::BroadcastError;
pub use filebcast_transfer::Capabilities;
pub use fanout::{AggregateResult, FanoutBroadcaster, effective_fanout};
pub use message::BcastEnvelope;
pub use orchestrator::{BroadcastOrchestrator, bcast_file};
pub use transport::{FanoutRequest, Transport};
pub use types::{
    BroadcastEvent, BroadcastParameters, BroadcastReport, BroadcastState, CompressionSummary,
    TransferCredential,
};
