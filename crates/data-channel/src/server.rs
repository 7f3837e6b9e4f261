//! Block receiver (node side).
//!
//! Accepts block requests, checks the credential and the block sequence,
//! and answers each request with one return code. What happens to the
//! block bytes is up to the [`BlockSink`]; the default [`AckSink`] only
//! acknowledges.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use filebcast_protocol::{
    Credential, FileBcastMessage, MessageType, RequestFrame, ResponseCode,
};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::TCP_BUFFER_SIZE;
use crate::error::DataChannelError;
use crate::wire::{read_request, write_response};

/// Consumer of validated blocks.
pub trait BlockSink: Send + Sync {
    /// Takes one block that passed validation and returns the code to send
    /// back to the sender.
    fn accept(
        &self,
        message: &FileBcastMessage,
    ) -> Pin<Box<dyn Future<Output = ResponseCode> + Send + '_>>;
}

/// Acknowledges every block without storing it.
#[derive(Debug, Default, Clone, Copy)]
pub struct AckSink;

impl BlockSink for AckSink {
    fn accept(
        &self,
        _message: &FileBcastMessage,
    ) -> Pin<Box<dyn Future<Output = ResponseCode> + Send + '_>> {
        Box::pin(async { ResponseCode::SUCCESS })
    }
}

/// Progress of one destination file.
#[derive(Debug, Default, Clone, Copy)]
struct Sequence {
    /// Last block the sink accepted.
    accepted: Option<u32>,
    /// Block currently held by the sink.
    reserved: Option<u32>,
}

impl Sequence {
    fn admits(&self, block_no: u32) -> bool {
        if self.reserved.is_some() {
            return false;
        }
        match self.accepted {
            _ if block_no == 1 => true,
            Some(prev) => block_no == prev + 1,
            None => false,
        }
    }
}

struct ReceiverState {
    node_name: String,
    credential: Credential,
    sink: Arc<dyn BlockSink>,
    observer: Option<mpsc::Sender<FileBcastMessage>>,
    sequences: Mutex<HashMap<String, Sequence>>,
}

/// Node-side peer of the fanout client.
#[derive(Clone)]
pub struct BcastReceiver {
    state: Arc<ReceiverState>,
}

impl BcastReceiver {
    pub fn new(node_name: impl Into<String>, credential: Credential) -> Self {
        Self {
            state: Arc::new(ReceiverState {
                node_name: node_name.into(),
                credential,
                sink: Arc::new(AckSink),
                observer: None,
                sequences: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Replaces the block consumer. Call before serving.
    pub fn with_sink(self, sink: Arc<dyn BlockSink>) -> Self {
        self.rebuild(|s| s.sink = sink)
    }

    /// Reports every accepted block on `tx`. Call before serving.
    ///
    /// Blocks are dropped when the channel is full.
    pub fn with_observer(self, tx: mpsc::Sender<FileBcastMessage>) -> Self {
        self.rebuild(|s| s.observer = Some(tx))
    }

    fn rebuild(self, f: impl FnOnce(&mut ReceiverState)) -> Self {
        let old = &self.state;
        let sequences = old.sequences.lock().map(|m| m.clone()).unwrap_or_default();
        let mut state = ReceiverState {
            node_name: old.node_name.clone(),
            credential: old.credential.clone(),
            sink: Arc::clone(&old.sink),
            observer: old.observer.clone(),
            sequences: Mutex::new(sequences),
        };
        f(&mut state);
        Self {
            state: Arc::new(state),
        }
    }

    /// Binds a listener on `addr`.
    pub async fn bind(addr: &str) -> Result<TcpListener, DataChannelError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "block receiver listening");
        Ok(listener)
    }

    /// Accepts connections until `cancel` fires, one task per connection.
    pub async fn serve(
        &self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), DataChannelError> {
        loop {
            let (stream, peer) = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(node = %self.state.node_name, "receiver stopped");
                    return Ok(());
                }
                accepted = listener.accept() => accepted?,
            };

            let receiver = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    result = receiver.handle_connection(stream, peer) => {
                        if let Err(e) = result {
                            warn!(%peer, error = %e, "connection ended with error");
                        }
                    }
                }
            });
        }
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<(), DataChannelError> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::with_capacity(TCP_BUFFER_SIZE, reader);

        loop {
            let (frame, payload) = match read_request(&mut reader).await {
                Ok(Some(request)) => request,
                Ok(None) => return Ok(()),
                Err(e) => {
                    debug!(%peer, error = %e, "unreadable request");
                    write_response(&mut writer, ResponseCode::RECEIVE_ERROR).await?;
                    return Err(e);
                }
            };
            let code = self.handle(frame, payload).await;
            write_response(&mut writer, code).await?;
        }
    }

    /// Validates one request and hands it to the sink.
    pub async fn handle(&self, frame: RequestFrame, payload: Vec<u8>) -> ResponseCode {
        let state = &self.state;
        if frame.msg_type != MessageType::RequestFileBcast {
            return ResponseCode::INVALID_ARGUMENT;
        }
        let message = FileBcastMessage {
            header: frame.header,
            block: payload,
        };
        let header = &message.header;

        if !header.cred.matches(&state.credential) {
            warn!(node = %state.node_name, fname = %header.fname, "invalid credential");
            return ResponseCode::CREDENTIAL_INVALID;
        }
        if message.block.len() != header.block_len as usize {
            warn!(
                block = header.block_no,
                expected = header.block_len,
                got = message.block.len(),
                "payload length mismatch"
            );
            return ResponseCode::INVALID_ARGUMENT;
        }
        if !self.reserve(&header.fname, header.block_no) {
            warn!(fname = %header.fname, block = header.block_no, "block out of order");
            return ResponseCode::BLOCK_OUT_OF_ORDER;
        }

        let code = state.sink.accept(&message).await;
        self.settle(&header.fname, header.block_no, header.last_block, code.is_success());
        if !code.is_success() {
            return code;
        }

        debug!(
            node = %state.node_name,
            fname = %header.fname,
            block = header.block_no,
            last = header.last_block,
            "block accepted"
        );
        if let Some(tx) = &state.observer {
            let _ = tx.try_send(message);
        }
        code
    }

    /// Claims `block_no` of `fname` for the sink if it is the next block
    /// and no other block of that file is in flight.
    fn reserve(&self, fname: &str, block_no: u32) -> bool {
        let Ok(mut sequences) = self.state.sequences.lock() else {
            return false;
        };
        let seq = sequences.get(fname).copied().unwrap_or_default();
        if !seq.admits(block_no) {
            return false;
        }
        sequences.insert(
            fname.to_string(),
            Sequence {
                reserved: Some(block_no),
                ..seq
            },
        );
        true
    }

    /// Releases the reservation taken by [`reserve`](Self::reserve),
    /// advancing the sequence when the sink accepted the block.
    fn settle(&self, fname: &str, block_no: u32, last: bool, accepted: bool) {
        let Ok(mut sequences) = self.state.sequences.lock() else {
            return;
        };
        let Some(mut seq) = sequences.get(fname).copied() else {
            return;
        };
        seq.reserved = None;
        if accepted {
            seq.accepted = Some(block_no);
        }
        if (accepted && last) || seq.accepted.is_none() {
            sequences.remove(fname);
        } else {
            sequences.insert(fname.to_string(), seq);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::encode_request;
    use filebcast_protocol::{CompressionMode, FileBcastHeader};
    use tokio::io::AsyncWriteExt;

    fn cred() -> Credential {
        Credential::new(vec![0x5A; 32])
    }

    fn frame(block_no: u32, last: bool, payload: &[u8]) -> RequestFrame {
        RequestFrame::file_bcast(FileBcastHeader {
            fname: "/tmp/out".into(),
            block_no,
            last_block: last,
            force: false,
            compress: CompressionMode::None,
            modes: 0o100644,
            uid: 1,
            user_name: "u".into(),
            gid: 1,
            atime: None,
            mtime: None,
            block_len: payload.len() as u32,
            uncomp_len: payload.len() as u32,
            cred: cred(),
        })
    }

    /// Rejects everything with a fixed code.
    struct RejectSink(ResponseCode);

    impl BlockSink for RejectSink {
        fn accept(
            &self,
            _message: &FileBcastMessage,
        ) -> Pin<Box<dyn Future<Output = ResponseCode> + Send + '_>> {
            let code = self.0;
            Box::pin(async move { code })
        }
    }

    #[tokio::test]
    async fn accepts_blocks_in_order() {
        let rx = BcastReceiver::new("n1", cred());
        assert_eq!(rx.handle(frame(1, false, b"ab"), b"ab".to_vec()).await, ResponseCode::SUCCESS);
        assert_eq!(rx.handle(frame(2, false, b"cd"), b"cd".to_vec()).await, ResponseCode::SUCCESS);
        assert_eq!(rx.handle(frame(3, true, b"e"), b"e".to_vec()).await, ResponseCode::SUCCESS);
    }

    #[tokio::test]
    async fn rejects_gap() {
        let rx = BcastReceiver::new("n1", cred());
        rx.handle(frame(1, false, b"a"), b"a".to_vec()).await;
        assert_eq!(
            rx.handle(frame(3, false, b"c"), b"c".to_vec()).await,
            ResponseCode::BLOCK_OUT_OF_ORDER
        );
    }

    #[tokio::test]
    async fn first_block_must_be_one() {
        let rx = BcastReceiver::new("n1", cred());
        assert_eq!(
            rx.handle(frame(2, false, b"a"), b"a".to_vec()).await,
            ResponseCode::BLOCK_OUT_OF_ORDER
        );
    }

    #[tokio::test]
    async fn restart_at_one_is_allowed() {
        let rx = BcastReceiver::new("n1", cred());
        rx.handle(frame(1, false, b"a"), b"a".to_vec()).await;
        rx.handle(frame(2, false, b"b"), b"b".to_vec()).await;
        assert_eq!(rx.handle(frame(1, false, b"a"), b"a".to_vec()).await, ResponseCode::SUCCESS);
        assert_eq!(rx.handle(frame(2, true, b"b"), b"b".to_vec()).await, ResponseCode::SUCCESS);
    }

    #[tokio::test]
    async fn last_block_ends_sequence() {
        let rx = BcastReceiver::new("n1", cred());
        rx.handle(frame(1, true, b"a"), b"a".to_vec()).await;
        assert_eq!(
            rx.handle(frame(2, false, b"b"), b"b".to_vec()).await,
            ResponseCode::BLOCK_OUT_OF_ORDER
        );
    }

    #[tokio::test]
    async fn rejects_wrong_credential() {
        let rx = BcastReceiver::new("n1", Credential::new(vec![1; 32]));
        assert_eq!(
            rx.handle(frame(1, true, b"a"), b"a".to_vec()).await,
            ResponseCode::CREDENTIAL_INVALID
        );
    }

    #[tokio::test]
    async fn rejects_length_mismatch() {
        let rx = BcastReceiver::new("n1", cred());
        assert_eq!(
            rx.handle(frame(1, true, b"abc"), b"ab".to_vec()).await,
            ResponseCode::INVALID_ARGUMENT
        );
    }

    #[tokio::test]
    async fn rejects_response_message_type() {
        let rx = BcastReceiver::new("n1", cred());
        let mut f = frame(1, true, b"a");
        f.msg_type = MessageType::ResponseReturnCode;
        assert_eq!(rx.handle(f, b"a".to_vec()).await, ResponseCode::INVALID_ARGUMENT);
    }

    #[tokio::test]
    async fn sink_code_is_returned_and_sequence_not_advanced() {
        let rx = BcastReceiver::new("n1", cred())
            .with_sink(Arc::new(RejectSink(ResponseCode::FILE_EXISTS)));
        assert_eq!(
            rx.handle(frame(1, false, b"a"), b"a".to_vec()).await,
            ResponseCode::FILE_EXISTS
        );
        assert_eq!(
            rx.handle(frame(2, false, b"b"), b"b".to_vec()).await,
            ResponseCode::BLOCK_OUT_OF_ORDER
        );
        // The rejected block released its claim, so a retry reaches the sink.
        assert_eq!(
            rx.handle(frame(1, false, b"a"), b"a".to_vec()).await,
            ResponseCode::FILE_EXISTS
        );
    }

    /// Holds every block until a permit is released.
    struct GateSink(Arc<tokio::sync::Semaphore>);

    impl BlockSink for GateSink {
        fn accept(
            &self,
            _message: &FileBcastMessage,
        ) -> Pin<Box<dyn Future<Output = ResponseCode> + Send + '_>> {
            Box::pin(async move {
                match self.0.acquire().await {
                    Ok(_) => ResponseCode::SUCCESS,
                    Err(_) => ResponseCode::ERROR,
                }
            })
        }
    }

    fn in_flight(rx: &BcastReceiver, fname: &str) -> bool {
        rx.state
            .sequences
            .lock()
            .unwrap()
            .get(fname)
            .is_some_and(|seq| seq.reserved.is_some())
    }

    #[tokio::test]
    async fn duplicate_block_in_flight_is_rejected() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let rx = BcastReceiver::new("n1", cred()).with_sink(Arc::new(GateSink(Arc::clone(&gate))));

        let first = {
            let rx = rx.clone();
            tokio::spawn(async move { rx.handle(frame(1, false, b"a"), b"a".to_vec()).await })
        };
        while !in_flight(&rx, "/tmp/out") {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            rx.handle(frame(1, false, b"a"), b"a".to_vec()).await,
            ResponseCode::BLOCK_OUT_OF_ORDER
        );
        assert_eq!(
            rx.handle(frame(2, false, b"b"), b"b".to_vec()).await,
            ResponseCode::BLOCK_OUT_OF_ORDER
        );

        gate.add_permits(2);
        assert_eq!(first.await.unwrap(), ResponseCode::SUCCESS);
        assert_eq!(
            rx.handle(frame(2, true, b"b"), b"b".to_vec()).await,
            ResponseCode::SUCCESS
        );
        assert!(rx.state.sequences.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn observer_sees_accepted_blocks() {
        let (tx, mut obs) = mpsc::channel(8);
        let rx = BcastReceiver::new("n1", cred()).with_observer(tx);
        rx.handle(frame(1, true, b"xyz"), b"xyz".to_vec()).await;
        let seen = obs.try_recv().unwrap();
        assert_eq!(seen.block, b"xyz");
        assert!(seen.is_last());
    }

    #[tokio::test]
    async fn serves_over_tcp_until_cancelled() {
        let listener = BcastReceiver::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let rx = BcastReceiver::new("n1", cred());
        let server = {
            let cancel = cancel.clone();
            tokio::spawn(async move { rx.serve(listener, cancel).await })
        };

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let first = encode_request(&frame(1, false, b"ab"), b"ab").unwrap();
        stream.write_all(&first).await.unwrap();
        assert_eq!(
            crate::wire::read_response(&mut stream).await.unwrap(),
            ResponseCode::SUCCESS
        );
        let skipped = encode_request(&frame(5, false, b"ab"), b"ab").unwrap();
        stream.write_all(&skipped).await.unwrap();
        assert_eq!(
            crate::wire::read_response(&mut stream).await.unwrap(),
            ResponseCode::BLOCK_OUT_OF_ORDER
        );

        cancel.cancel();
        server.await.unwrap().unwrap();
    }
}
