//! [`Transport`] over TCP.
//!
//! Bridges the broadcast engine's collaborator trait to the fanout client.

use std::future::Future;
use std::pin::Pin;

use filebcast_broadcast::{BroadcastError, FanoutRequest, Transport};
use filebcast_protocol::{NodeReply, RequestFrame};
use tracing::debug;

use crate::client::{FanoutClient, NodeAddressBook};

/// Delivers block messages to nodes over TCP.
#[derive(Debug, Default)]
pub struct TcpTransport {
    client: FanoutClient,
}

impl TcpTransport {
    pub fn new(book: NodeAddressBook) -> Self {
        Self {
            client: FanoutClient::new(book),
        }
    }
}

impl Transport for TcpTransport {
    fn send_to_all<'a>(
        &'a self,
        request: FanoutRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<NodeReply>, BroadcastError>> + Send + 'a>> {
        Box::pin(async move {
            let frame = RequestFrame {
                msg_type: request.msg_type,
                header: request.message.header.clone(),
            };
            debug!(
                nodes = %request.node_list,
                block = frame.header.block_no,
                fanout = request.fanout,
                "fanout round"
            );
            let replies = self
                .client
                .send_to_all(
                    request.nodes,
                    &frame,
                    &request.message.block,
                    request.fanout,
                    request.timeout,
                    request.cache_node_info,
                )
                .await?;
            Ok(replies)
        })
    }
}
