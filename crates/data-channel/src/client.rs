//! TCP fanout client (sending side).
//!
//! Encodes a block request once, writes it to every target node with a
//! bounded number of connections in flight, and collects one return code
//! per node under a shared deadline.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use filebcast_protocol::constants::DEFAULT_NODE_PORT;
use filebcast_protocol::{NodeReply, RequestFrame, ResponseCode};
use futures_util::stream::{self, StreamExt};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::DataChannelError;
use crate::wire::{encode_request, read_response};

/// Maps node names to socket addresses.
///
/// Nodes without an override are reached at `<name>:<default_port>`.
#[derive(Debug)]
pub struct NodeAddressBook {
    default_port: u16,
    overrides: HashMap<String, String>,
    cache: Mutex<HashMap<String, SocketAddr>>,
}

impl Default for NodeAddressBook {
    fn default() -> Self {
        Self::new(DEFAULT_NODE_PORT)
    }
}

impl NodeAddressBook {
    pub fn new(default_port: u16) -> Self {
        Self {
            default_port,
            overrides: HashMap::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Routes `node` to `addr` (`host` or `host:port`).
    pub fn insert(&mut self, node: impl Into<String>, addr: impl Into<String>) {
        self.overrides.insert(node.into(), addr.into());
    }

    pub fn with(mut self, node: impl Into<String>, addr: impl Into<String>) -> Self {
        self.insert(node, addr);
        self
    }

    /// Address string to connect to for `node`.
    pub fn target(&self, node: &str) -> String {
        match self.overrides.get(node) {
            Some(addr) if addr.contains(':') => addr.clone(),
            Some(host) => format!("{host}:{}", self.default_port),
            None => format!("{node}:{}", self.default_port),
        }
    }

    /// Resolves `node`, reusing an earlier answer when `use_cache` is set.
    pub async fn resolve(&self, node: &str, use_cache: bool) -> Result<SocketAddr, DataChannelError> {
        if use_cache && let Some(addr) = self.cached(node) {
            return Ok(addr);
        }

        let target = self.target(node);
        let unknown = |reason: String| DataChannelError::UnknownNode {
            node: node.to_string(),
            reason,
        };
        let addr = tokio::net::lookup_host(&target)
            .await
            .map_err(|e| unknown(e.to_string()))?
            .next()
            .ok_or_else(|| unknown(format!("no address for {target}")))?;

        if use_cache && let Ok(mut cache) = self.cache.lock() {
            cache.insert(node.to_string(), addr);
        }
        Ok(addr)
    }

    fn cached(&self, node: &str) -> Option<SocketAddr> {
        self.cache.lock().ok()?.get(node).copied()
    }
}

/// How one node's delivery ended.
enum Outcome {
    Answered(ResponseCode),
    DeadlineMissed,
}

type Delivery<'a> = Pin<Box<dyn Future<Output = (String, Outcome)> + Send + 'a>>;

/// Sends one request to many nodes.
#[derive(Debug, Default)]
pub struct FanoutClient {
    book: NodeAddressBook,
}

impl FanoutClient {
    pub fn new(book: NodeAddressBook) -> Self {
        Self { book }
    }

    /// Delivers `frame` + `payload` to every node in `nodes`.
    ///
    /// At most `fanout` nodes are contacted at once and the whole round
    /// shares one deadline. Replies come back in node order. Unreachable
    /// nodes get `CONNECTION_ERROR`, garbled replies `RECEIVE_ERROR` and
    /// nodes still pending at the deadline `TIMEOUT`; if no node answered
    /// at all before the deadline the round fails with
    /// [`DataChannelError::Timeout`].
    pub async fn send_to_all(
        &self,
        nodes: &[String],
        frame: &RequestFrame,
        payload: &[u8],
        fanout: usize,
        timeout: Duration,
        use_cache: bool,
    ) -> Result<Vec<NodeReply>, DataChannelError> {
        let encoded = encode_request(frame, payload)?;
        let deadline = Instant::now() + timeout;

        // Built up front so the round future stays `Send`.
        let encoded = encoded.as_slice();
        let deliveries: Vec<Delivery<'_>> = nodes
            .iter()
            .map(|node| self.delivery(node, encoded, deadline, use_cache))
            .collect();

        let outcomes: Vec<(String, Outcome)> = stream::iter(deliveries)
            .buffered(fanout.max(1))
            .collect()
            .await;

        let answered = outcomes
            .iter()
            .any(|(_, o)| matches!(o, Outcome::Answered(_)));
        if !outcomes.is_empty() && !answered {
            warn!(nodes = outcomes.len(), ?timeout, "no node answered");
            return Err(DataChannelError::Timeout);
        }

        Ok(outcomes
            .into_iter()
            .map(|(node, outcome)| {
                let code = match outcome {
                    Outcome::Answered(code) => code,
                    Outcome::DeadlineMissed => ResponseCode::TIMEOUT,
                };
                NodeReply::new(node, code)
            })
            .collect())
    }

    fn delivery<'a>(
        &'a self,
        node: &'a str,
        encoded: &'a [u8],
        deadline: Instant,
        use_cache: bool,
    ) -> Delivery<'a> {
        Box::pin(async move {
            let outcome = self.deliver(node, encoded, deadline, use_cache).await;
            (node.to_string(), outcome)
        })
    }

    async fn deliver(
        &self,
        node: &str,
        encoded: &[u8],
        deadline: Instant,
        use_cache: bool,
    ) -> Outcome {
        match tokio::time::timeout_at(deadline, self.exchange(node, encoded, use_cache)).await {
            Ok(code) => Outcome::Answered(code),
            Err(_) => {
                debug!(node, "deadline reached");
                Outcome::DeadlineMissed
            }
        }
    }

    async fn exchange(&self, node: &str, encoded: &[u8], use_cache: bool) -> ResponseCode {
        let addr = match self.book.resolve(node, use_cache).await {
            Ok(addr) => addr,
            Err(e) => {
                debug!(node, error = %e, "resolve failed");
                return ResponseCode::CONNECTION_ERROR;
            }
        };

        let stream = match TcpStream::connect(addr).await {
            Ok(s) => s,
            Err(e) => {
                debug!(node, %addr, error = %e, "connect failed");
                return ResponseCode::CONNECTION_ERROR;
            }
        };
        let (reader, mut writer) = stream.into_split();

        if let Err(e) = async {
            writer.write_all(encoded).await?;
            writer.flush().await
        }
        .await
        {
            debug!(node, %addr, error = %e, "send failed");
            return ResponseCode::CONNECTION_ERROR;
        }

        let mut reader = BufReader::new(reader);
        match read_response(&mut reader).await {
            Ok(code) => {
                debug!(node, code = code.0, "reply");
                code
            }
            Err(e) => {
                debug!(node, error = %e, "bad reply");
                ResponseCode::RECEIVE_ERROR
            }
        }
    }
}
