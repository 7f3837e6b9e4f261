//! TCP data channel for block broadcasts.
//!
//! Carries one block message per connection from the sending host to each
//! target node, and one return code back. The sending side is the
//! [`FanoutClient`] (wrapped as a [`TcpTransport`] for the broadcast
//! engine); the node side is the [`BcastReceiver`].
//!
//! # Wire format
//!
//! See the [`wire`] module for the frame layout.

pub mod client;
pub mod error;
pub mod server;
pub mod transport;
pub mod wire;

pub use client::{FanoutClient, NodeAddressBook};
pub use error::DataChannelError;
pub use server::{AckSink, BcastReceiver, BlockSink};
pub use transport::TcpTransport;

/// TCP read/write buffer size (256 KB).
pub const TCP_BUFFER_SIZE: usize = 256 * 1024;
