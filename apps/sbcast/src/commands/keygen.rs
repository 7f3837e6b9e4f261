//! `keygen` command implementation.

use filebcast_protocol::Credential;
use tracing::debug;

/// Prints a fresh transfer credential to stdout.
pub fn run_keygen() -> anyhow::Result<()> {
    let credential = Credential::generate();
    debug!(fingerprint = %credential.fingerprint(), "credential generated");
    println!("{}", credential.to_hex());
    Ok(())
}
