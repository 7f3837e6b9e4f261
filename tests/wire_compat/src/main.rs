fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use filebcast_protocol::{
        CompressionMode, FileBcastHeader, MessageType, NodeReply, RequestFrame, ResponseCode,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture, re-serializes it, and compares the JSON
    /// values (order-independent).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  rust:    {reserialized}"
        );
        parsed
    }

    // --- Header fixtures ---

    #[test]
    fn fixture_request_frame() {
        let frame: RequestFrame = roundtrip_test("request_frame.json");
        assert_eq!(frame.msg_type, MessageType::RequestFileBcast);
        let h = &frame.header;
        assert_eq!(h.block_no, 1);
        assert_eq!(h.compress, CompressionMode::Lz4);
        assert_eq!(h.modes, 0o100755);
        assert_eq!(h.cred.as_bytes(), &[1, 2, 3]);
        assert!(h.atime.is_none() && h.mtime.is_none());
    }

    #[test]
    fn fixture_request_frame_preserve() {
        let frame: RequestFrame = roundtrip_test("request_frame_preserve.json");
        let h = &frame.header;
        assert!(h.last_block);
        assert!(h.force);
        assert_eq!(h.atime, Some(1_700_000_000));
        assert_eq!(h.mtime, Some(1_700_000_100));
        assert_eq!(h.cred.to_hex(), "deadbeef");
    }

    #[test]
    fn fixture_node_reply() {
        let reply: NodeReply = roundtrip_test("node_reply.json");
        assert_eq!(reply.node_name, "tux07");
        assert_eq!(reply.code, ResponseCode::BLOCK_OUT_OF_ORDER);
    }

    #[test]
    fn header_without_timestamps_parses() {
        let json = load_fixture("request_frame.json");
        let header: FileBcastHeader = serde_json::from_value(json["header"].clone()).unwrap();
        assert_eq!(header.user_name, "alice");
        assert_eq!(header.uncomp_len, 16);
    }

    // --- Framing ---

    #[tokio::test]
    async fn frame_layout_is_length_prefixed() {
        use filebcast_data_channel::wire::{encode_request, read_request};

        let frame: RequestFrame = serde_json::from_value(load_fixture("request_frame.json")).unwrap();
        let payload = [9u8, 8, 7, 6];
        let bytes = encode_request(&frame, &payload).unwrap();

        let header_len = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let header: serde_json::Value = serde_json::from_slice(&bytes[4..4 + header_len]).unwrap();
        assert_eq!(header["type"], "request_file_bcast");
        let payload_at = 4 + header_len;
        let payload_len =
            u32::from_be_bytes(bytes[payload_at..payload_at + 4].try_into().unwrap()) as usize;
        assert_eq!(payload_len, payload.len());
        assert_eq!(&bytes[payload_at + 4..], &payload);

        let mut reader: &[u8] = &bytes;
        let (parsed, body) = read_request(&mut reader).await.unwrap().unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(body, payload);
    }

    // --- Loopback broadcasts ---

    mod loopback {
        use filebcast_broadcast::{
            BroadcastError, BroadcastParameters, StaticControlPlane, TransferCredential, bcast_file,
        };
        use filebcast_data_channel::{BcastReceiver, NodeAddressBook, TcpTransport};
        use filebcast_protocol::{CompressionMode, Credential, FileBcastMessage, JobStepId, ResponseCode};
        use tokio::sync::mpsc;
        use tokio_util::sync::CancellationToken;

        struct Cluster {
            book: NodeAddressBook,
            observers: Vec<mpsc::Receiver<FileBcastMessage>>,
            cancel: CancellationToken,
        }

        impl Drop for Cluster {
            fn drop(&mut self) {
                self.cancel.cancel();
            }
        }

        async fn cluster(names: &[&str], credential: &Credential) -> Cluster {
            let cancel = CancellationToken::new();
            let mut book = NodeAddressBook::default();
            let mut observers = Vec::new();
            for name in names {
                let listener = BcastReceiver::bind("127.0.0.1:0").await.unwrap();
                book.insert(*name, listener.local_addr().unwrap().to_string());
                let (tx, rx) = mpsc::channel(256);
                observers.push(rx);
                let receiver = BcastReceiver::new(*name, credential.clone()).with_observer(tx);
                let cancel = cancel.clone();
                tokio::spawn(async move { receiver.serve(listener, cancel).await });
            }
            Cluster {
                book,
                observers,
                cancel,
            }
        }

        fn compressible(len: usize) -> Vec<u8> {
            b"the quick brown fox jumps over the lazy dog\n"
                .iter()
                .copied()
                .cycle()
                .take(len)
                .collect()
        }

        fn decode(msg: &FileBcastMessage) -> Vec<u8> {
            let h = &msg.header;
            match h.compress {
                CompressionMode::None => msg.block.clone(),
                CompressionMode::Zlib => {
                    use std::io::Read;
                    let mut out = Vec::new();
                    flate2::read::ZlibDecoder::new(&msg.block[..])
                        .read_to_end(&mut out)
                        .unwrap();
                    out
                }
                CompressionMode::Lz4 => {
                    lz4_flex::block::decompress(&msg.block, h.uncomp_len as usize).unwrap()
                }
            }
        }

        fn drain(rx: &mut mpsc::Receiver<FileBcastMessage>) -> Vec<FileBcastMessage> {
            let mut messages = Vec::new();
            while let Ok(msg) = rx.try_recv() {
                messages.push(msg);
            }
            messages
        }

        async fn broadcast(mode: CompressionMode) {
            let credential = Credential::new(vec![7; 32]);
            let mut cluster = cluster(&["tux1", "tux2", "tux3"], &credential).await;
            let book = std::mem::take(&mut cluster.book);

            let dir = tempfile::tempdir().unwrap();
            let src = dir.path().join("payload.txt");
            let data = compressible(5000);
            std::fs::write(&src, &data).unwrap();

            let plane = StaticControlPlane::new().with(
                JobStepId::job(21),
                TransferCredential::from_node_list(credential, "tux[1-3]").unwrap(),
            );
            let params = BroadcastParameters {
                job_id: 21,
                block_size: 2048,
                compress: mode,
                fanout: 2,
                src_path: src,
                dst_path: "/scratch/payload.txt".into(),
                ..Default::default()
            };

            let report = bcast_file(params, &plane, &TcpTransport::new(book))
                .await
                .unwrap();
            assert_eq!(report.blocks, 3);
            assert_eq!(report.nodes, 3);
            assert_eq!(report.bytes, 5000);

            for rx in &mut cluster.observers {
                let messages = drain(rx);
                let numbers: Vec<u32> = messages.iter().map(|m| m.block_no()).collect();
                assert_eq!(numbers, vec![1, 2, 3]);
                assert!(messages[2].is_last());
                let rebuilt: Vec<u8> = messages.iter().flat_map(decode).collect();
                assert_eq!(rebuilt, data);
            }
        }

        #[tokio::test]
        async fn uncompressed_broadcast() {
            broadcast(CompressionMode::None).await;
        }

        #[tokio::test]
        async fn zlib_broadcast() {
            broadcast(CompressionMode::Zlib).await;
        }

        #[tokio::test]
        async fn lz4_broadcast() {
            broadcast(CompressionMode::Lz4).await;
        }

        #[tokio::test]
        async fn wrong_credential_aborts_first_block() {
            let mut cluster = cluster(&["tux1"], &Credential::new(vec![1; 32])).await;
            let book = std::mem::take(&mut cluster.book);
            let dir = tempfile::tempdir().unwrap();
            let src = dir.path().join("a.bin");
            std::fs::write(&src, vec![0u8; 300]).unwrap();

            let plane = StaticControlPlane::new().with(
                JobStepId::job(3),
                TransferCredential::from_node_list(Credential::new(vec![2; 32]), "tux1").unwrap(),
            );
            let params = BroadcastParameters {
                job_id: 3,
                block_size: 100,
                src_path: src,
                dst_path: "/tmp/a.bin".into(),
                ..Default::default()
            };

            let err = bcast_file(params, &plane, &TcpTransport::new(book))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                BroadcastError::NodeTransfer {
                    block_no: 1,
                    code: ResponseCode::CREDENTIAL_INVALID
                }
            ));
        }

        #[tokio::test]
        async fn unreachable_node_fails_the_round() {
            let credential = Credential::new(vec![5; 32]);
            let mut cluster = cluster(&["up"], &credential).await;

            // Bind then drop to get a port nobody listens on.
            let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let closed_addr = closed.local_addr().unwrap().to_string();
            drop(closed);
            let book = std::mem::take(&mut cluster.book).with("down", closed_addr);

            let dir = tempfile::tempdir().unwrap();
            let src = dir.path().join("a.bin");
            std::fs::write(&src, vec![1u8; 64]).unwrap();

            let plane = StaticControlPlane::new().with(
                JobStepId::job(4),
                TransferCredential::from_node_list(credential, "up,down").unwrap(),
            );
            let params = BroadcastParameters {
                job_id: 4,
                timeout_secs: 2,
                src_path: src,
                dst_path: "/tmp/a.bin".into(),
                ..Default::default()
            };

            let err = bcast_file(params, &plane, &TcpTransport::new(book))
                .await
                .unwrap_err();
            assert_eq!(err.response_code(), ResponseCode::CONNECTION_ERROR);
        }
    }
}
