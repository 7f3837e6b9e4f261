//! One fanout round per block, reduced to a single result.

use std::time::Duration;

use filebcast_protocol::constants::MAX_FANOUT;
use filebcast_protocol::hostlist;
use filebcast_protocol::{FileBcastMessage, MessageType, NodeReply, ResponseCode};
use tracing::{debug, error};

use crate::error::BroadcastError;
use crate::transport::{FanoutRequest, Transport};
use crate::types::TransferCredential;

/// Fanout width for a requested value; 0 means the maximum.
pub fn effective_fanout(requested: usize) -> usize {
    if requested == 0 {
        MAX_FANOUT
    } else {
        requested.min(MAX_FANOUT)
    }
}

/// Replies of one round and the worst code among them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateResult {
    pub code: ResponseCode,
    pub replies: Vec<NodeReply>,
}

impl AggregateResult {
    /// Reduces replies to the numerically largest code. No replies at all
    /// counts as success.
    pub fn from_replies(replies: Vec<NodeReply>) -> Self {
        let code = replies
            .iter()
            .map(|r| r.code)
            .max()
            .unwrap_or(ResponseCode::SUCCESS);
        Self { code, replies }
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    pub fn failures(&self) -> impl Iterator<Item = &NodeReply> {
        self.replies.iter().filter(|r| !r.code.is_success())
    }

    /// Failing nodes as a host list expression, e.g. `tux[2-3]`.
    pub fn failed_nodes(&self) -> String {
        let names: Vec<String> = self.failures().map(|r| r.node_name.clone()).collect();
        hostlist::ranged(&names)
    }
}

/// Sends block messages to every node of one credential.
pub struct FanoutBroadcaster<'a> {
    transport: &'a dyn Transport,
    credential: &'a TransferCredential,
    timeout: Duration,
    fanout: usize,
}

impl<'a> FanoutBroadcaster<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        credential: &'a TransferCredential,
        timeout: Duration,
        fanout: usize,
    ) -> Self {
        Self {
            transport,
            credential,
            timeout,
            fanout: effective_fanout(fanout),
        }
    }

    pub fn fanout(&self) -> usize {
        self.fanout
    }

    /// Delivers `message` to all nodes and waits for every reply.
    pub async fn send(&self, message: &FileBcastMessage) -> Result<AggregateResult, BroadcastError> {
        let request = FanoutRequest {
            node_list: &self.credential.node_list,
            nodes: &self.credential.node_names,
            msg_type: MessageType::RequestFileBcast,
            message,
            timeout: self.timeout,
            fanout: self.fanout,
            cache_node_info: true,
        };

        let replies = self.transport.send_to_all(request).await.inspect_err(|e| {
            error!(block = message.block_no(), error = %e, "fanout round failed");
        })?;
        let result = AggregateResult::from_replies(replies);

        for reply in result.failures() {
            error!(
                "{}({}): {}",
                MessageType::RequestFileBcast,
                reply.node_name,
                reply.code
            );
        }
        debug!(
            block = message.block_no(),
            replies = result.replies.len(),
            code = result.code.0,
            failed = %result.failed_nodes(),
            "fanout round complete"
        );
        Ok(result)
    }
}
