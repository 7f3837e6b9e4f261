//! Delivery of one message to many nodes.
//!
//! `Transport` is implemented by the data channel (TCP) and by test mocks.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use filebcast_protocol::{FileBcastMessage, MessageType, NodeReply};

use crate::error::BroadcastError;

/// One fanout round: the same message to every listed node.
#[derive(Debug, Clone, Copy)]
pub struct FanoutRequest<'a> {
    /// Host list expression the node names came from.
    pub node_list: &'a str,
    pub nodes: &'a [String],
    pub msg_type: MessageType,
    pub message: &'a FileBcastMessage,
    /// Deadline for the whole round.
    pub timeout: Duration,
    /// Nodes addressed at once.
    pub fanout: usize,
    /// Reuse resolved node addresses across rounds.
    pub cache_node_info: bool,
}

/// Sends a message to a set of nodes and collects one reply per node.
pub trait Transport: Send + Sync {
    /// Delivers `request.message` and returns the replies that came back.
    ///
    /// Nodes that could not be reached should appear with an error code
    /// rather than failing the whole call; `Err` means the round as a whole
    /// could not be carried out.
    fn send_to_all<'a>(
        &'a self,
        request: FanoutRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<NodeReply>, BroadcastError>> + Send + 'a>>;
}
