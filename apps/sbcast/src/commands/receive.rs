//! `receive` command implementation.

use anyhow::{Context, Result};
use filebcast_data_channel::BcastReceiver;
use filebcast_protocol::Credential;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::ReceiveArgs;
use crate::config::SbcastConfig;

/// Runs an acknowledging receiver until Ctrl-C.
pub async fn run_receive(args: &ReceiveArgs, config: &SbcastConfig) -> Result<()> {
    let credential = Credential::from_hex(args.credential.trim())
        .context("credential must be hex encoded")?;
    let node = match &args.node {
        Some(node) => node.clone(),
        None => hostname::get()
            .context("reading host name")?
            .to_string_lossy()
            .into_owned(),
    };
    let addr = args
        .listen
        .clone()
        .unwrap_or_else(|| config.receiver.listen_addr());

    let listener = BcastReceiver::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%node, fingerprint = %credential.fingerprint(), "receiver ready");

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot wait for Ctrl-C");
            return;
        }
        info!("shutting down");
        shutdown.cancel();
    });

    BcastReceiver::new(node, credential)
        .serve(listener, cancel)
        .await?;
    Ok(())
}
