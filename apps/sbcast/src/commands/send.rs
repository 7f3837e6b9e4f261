//! `send` command implementation.

use anyhow::Result;
use filebcast_broadcast::{
    BroadcastEvent, BroadcastOrchestrator, BroadcastParameters, Capabilities,
};
use filebcast_data_channel::TcpTransport;
use tracing::{debug, info};

use crate::cli::SendArgs;
use crate::config::SbcastConfig;

/// Execute the `send` command
pub async fn run_send(args: &SendArgs, config: &SbcastConfig, verbose: u8) -> Result<()> {
    send_with(args, config, verbose, Capabilities::compiled()).await
}

async fn send_with(
    args: &SendArgs,
    config: &SbcastConfig,
    verbose: u8,
    caps: Capabilities,
) -> Result<()> {
    let params = build_params(args, config, verbose);
    info!(
        src = %params.src_path.display(),
        dst = %params.dst_path,
        job = %params.job_step(),
        compress = %params.compress,
        "starting broadcast"
    );

    let plane = config.control_plane()?;
    let transport = TcpTransport::new(config.address_book());

    let mut orchestrator = BroadcastOrchestrator::new(params).with_capabilities(caps);
    let logger = orchestrator.take_events().map(|mut events| {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                log_event(&event);
            }
        })
    });

    let result = orchestrator.run(&plane, &transport).await;
    // Closes the event channel so the logger drains and exits.
    drop(orchestrator);
    if let Some(logger) = logger {
        let _ = logger.await;
    }

    let report = result.map_err(|e| {
        let code = e.response_code();
        anyhow::Error::new(e).context(format!("broadcast failed ({code})"))
    })?;
    info!(
        blocks = report.blocks,
        bytes = report.bytes,
        payload_bytes = report.payload_bytes,
        nodes = report.nodes,
        compression = %report.compression,
        "broadcast complete"
    );
    Ok(())
}

/// Flags and environment win over the configuration file.
fn build_params(args: &SendArgs, config: &SbcastConfig, verbose: u8) -> BroadcastParameters {
    let defaults = &config.defaults;
    let job = args.job_step();
    BroadcastParameters {
        block_size: args.size.unwrap_or(defaults.block_size),
        compress: args.compress.unwrap_or(defaults.compress),
        fanout: args.fanout.unwrap_or(defaults.fanout),
        force: args.force,
        job_id: job.job_id,
        step_id: job.step_id,
        preserve: args.preserve,
        timeout_secs: args.timeout.unwrap_or(defaults.timeout_secs),
        verbose,
        src_path: args.source.clone(),
        dst_path: args.dest.clone(),
    }
}

fn log_event(event: &BroadcastEvent) {
    match event {
        // Already reported by codec selection.
        BroadcastEvent::Downgraded { requested, reason } => {
            debug!(%requested, %reason, "compression downgraded")
        }
        BroadcastEvent::BlockSent {
            block_no,
            payload_len,
            uncompressed_len,
            last,
        } => debug!(block_no, payload_len, uncompressed_len, last, "block delivered"),
        BroadcastEvent::Completed { .. } | BroadcastEvent::Aborted { .. } => {}
    }
}
