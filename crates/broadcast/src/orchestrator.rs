//! Broadcast orchestrator.
//!
//! Drives one broadcast from source file to acknowledged last block,
//! strictly one block at a time, and reports progress events.

use std::time::Instant;

use filebcast_protocol::CompressionMode;
use filebcast_transfer::{Block, Capabilities, CompressionStats, SourceFile, select_codec};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::credential::{ControlPlane, CredentialResolver};
use crate::error::BroadcastError;
use crate::fanout::FanoutBroadcaster;
use crate::message::BcastEnvelope;
use crate::transport::Transport;
use crate::types::{
    BroadcastEvent, BroadcastParameters, BroadcastReport, BroadcastState, CompressionSummary,
};

/// Runs a single file broadcast.
pub struct BroadcastOrchestrator {
    params: BroadcastParameters,
    caps: Capabilities,
    state: BroadcastState,
    events_tx: mpsc::Sender<BroadcastEvent>,
    events_rx: Option<mpsc::Receiver<BroadcastEvent>>,
}

impl BroadcastOrchestrator {
    pub fn new(params: BroadcastParameters) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            params,
            caps: Capabilities::compiled(),
            state: BroadcastState::Init,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Restricts the codecs this broadcast may use.
    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    /// Takes the event receiver. Can only be called once.
    ///
    /// Events are dropped, never waited on, when the receiver falls behind.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<BroadcastEvent>> {
        self.events_rx.take()
    }

    pub fn state(&self) -> BroadcastState {
        self.state
    }

    /// Parameters in effect, including a compression downgrade if one
    /// happened.
    pub fn params(&self) -> &BroadcastParameters {
        &self.params
    }

    /// Broadcasts the source file to every node of the job.
    ///
    /// Stops at the first block that any node rejects; later blocks are
    /// never sent and nothing is rolled back.
    pub async fn run(
        &mut self,
        plane: &dyn ControlPlane,
        transport: &dyn Transport,
    ) -> Result<BroadcastReport, BroadcastError> {
        self.state = BroadcastState::Init;
        let mut current_block = None;

        match self.stream(plane, transport, &mut current_block).await {
            Ok(report) => {
                self.state = BroadcastState::Done;
                self.emit(BroadcastEvent::Completed {
                    blocks: report.blocks,
                });
                Ok(report)
            }
            Err(e) => {
                self.state = BroadcastState::Aborted;
                let code = e.response_code();
                debug!(block = ?current_block, %code, error = %e, "broadcast aborted");
                self.emit(BroadcastEvent::Aborted {
                    block_no: current_block,
                    code,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn stream(
        &mut self,
        plane: &dyn ControlPlane,
        transport: &dyn Transport,
        current_block: &mut Option<u32>,
    ) -> Result<BroadcastReport, BroadcastError> {
        let source = SourceFile::open(&self.params.src_path)?;
        let credential = CredentialResolver::new(plane)
            .verbose(self.params.verbose > 0)
            .resolve(self.params.job_step())
            .await?;

        let block_size = self.params.effective_block_size(source.len());
        let selection = select_codec(self.params.compress, source.bytes(), block_size, &self.caps);
        if let Some(downgrade) = selection.downgrade {
            self.params.compress = CompressionMode::None;
            self.emit(BroadcastEvent::Downgraded {
                requested: downgrade.requested,
                reason: downgrade.reason,
            });
        }
        let mut codec = selection.codec;
        let compress = codec.mode();

        let envelope = BcastEnvelope::new(&source, &credential, &self.params);
        let fanout =
            FanoutBroadcaster::new(transport, &credential, self.params.timeout(), self.params.fanout);
        debug!(
            dest = envelope.destination(),
            block_size,
            fanout = fanout.fanout(),
            compress = %compress,
            nodes = credential.node_count(),
            "starting broadcast"
        );

        self.state = BroadcastState::Streaming;
        let mut stats = CompressionStats::new();
        let mut block_no = 0u32;

        loop {
            *current_block = Some(block_no + 1);
            let started = Instant::now();
            let Some(encoded) = codec.next_block()? else {
                break;
            };
            stats.record(
                encoded.uncompressed_len,
                encoded.payload.len(),
                started.elapsed(),
            );

            block_no += 1;
            let block = Block::from_encoded(block_no, encoded, compress);
            let (payload_len, uncompressed_len, last) =
                (block.len(), block.uncompressed_len, block.last_block);
            debug!(
                block = block_no,
                len = payload_len,
                uncomp = uncompressed_len,
                last,
                "sending block"
            );

            let message = envelope.message(block);
            let result = fanout.send(&message).await?;
            if !result.is_success() {
                return Err(BroadcastError::NodeTransfer {
                    block_no,
                    code: result.code,
                });
            }

            self.emit(BroadcastEvent::BlockSent {
                block_no,
                payload_len,
                uncompressed_len,
                last,
            });
            if last {
                break;
            }
        }
        *current_block = None;

        let summary = summarize(compress, &stats);
        if let Some(summary) = &summary {
            info!("{summary}");
        }

        Ok(BroadcastReport {
            blocks: block_no,
            bytes: stats.uncompressed(),
            payload_bytes: stats.compressed(),
            compression: compress,
            nodes: credential.node_count(),
            summary,
        })
    }

    fn emit(&self, event: BroadcastEvent) {
        let _ = self.events_tx.try_send(event);
    }
}

fn summarize(compress: CompressionMode, stats: &CompressionStats) -> Option<CompressionSummary> {
    if !compress.is_compressed() {
        return None;
    }
    let percent_saved = stats.percent_saved()?;
    Some(CompressionSummary {
        uncompressed: stats.uncompressed(),
        compressed: stats.compressed(),
        percent_saved,
        elapsed: stats.elapsed(),
    })
}

/// Broadcasts a file with default codec capabilities.
pub async fn bcast_file(
    params: BroadcastParameters,
    plane: &dyn ControlPlane,
    transport: &dyn Transport,
) -> Result<BroadcastReport, BroadcastError> {
    BroadcastOrchestrator::new(params).run(plane, transport).await
}
