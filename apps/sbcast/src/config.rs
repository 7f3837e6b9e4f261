//! sbcast configuration.
//!
//! Configuration is stored as TOML, by default in
//! `~/.config/filebcast/sbcast.toml`. A missing file means defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use filebcast_broadcast::{StaticControlPlane, TransferCredential};
use filebcast_data_channel::NodeAddressBook;
use filebcast_protocol::constants::{DEFAULT_NODE_PORT, MAX_BLOCK_SIZE};
use filebcast_protocol::{CompressionMode, Credential, JobStepId};
use serde::{Deserialize, Serialize};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SbcastConfig {
    /// Defaults for `send`, overridden by flags and environment.
    pub defaults: SendDefaults,

    pub receiver: ReceiverConfig,

    /// Node name -> `host` or `host:port`.
    pub nodes: HashMap<String, String>,

    /// Job allocations known to this host.
    pub jobs: Vec<JobEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendDefaults {
    pub block_size: usize,
    pub compress: CompressionMode,
    pub fanout: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Port the receivers listen on and senders connect to.
    pub port: u16,
    /// Listen address; `0.0.0.0:<port>` when empty.
    pub listen: String,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_NODE_PORT,
            listen: String::new(),
        }
    }
}

impl ReceiverConfig {
    pub fn listen_addr(&self) -> String {
        if self.listen.is_empty() {
            format!("0.0.0.0:{}", self.port)
        } else {
            self.listen.clone()
        }
    }
}

/// A static job allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEntry {
    pub job_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<u32>,
    /// Host list expression, e.g. `tux[1-4]`.
    pub nodes: String,
    /// Transfer credential, hex.
    pub credential: String,
}

impl SbcastConfig {
    /// Loads `path`, or the default location when `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path(),
        };

        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: SbcastConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        config.validate().with_context(|| format!("invalid {}", path.display()))?;
        tracing::debug!(path = %path.display(), jobs = config.jobs.len(), "configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.defaults.block_size > MAX_BLOCK_SIZE {
            anyhow::bail!(
                "block_size {} exceeds the {MAX_BLOCK_SIZE} byte maximum",
                self.defaults.block_size
            );
        }
        Ok(())
    }

    /// Control plane answering from the `[[jobs]]` table.
    pub fn control_plane(&self) -> anyhow::Result<StaticControlPlane> {
        let mut plane = StaticControlPlane::new();
        for job in &self.jobs {
            let id = JobStepId {
                job_id: job.job_id,
                step_id: job.step_id,
            };
            let credential = Credential::from_hex(&job.credential)
                .with_context(|| format!("credential of job {id}"))?;
            let entry = TransferCredential::from_node_list(credential, job.nodes.as_str())
                .with_context(|| format!("node list of job {id}"))?;
            plane.insert(id, entry);
        }
        Ok(plane)
    }

    /// Address book from the `[nodes]` table and the receiver port.
    pub fn address_book(&self) -> NodeAddressBook {
        let mut book = NodeAddressBook::new(self.receiver.port);
        for (node, addr) in &self.nodes {
            book.insert(node.clone(), addr.clone());
        }
        book
    }
}

/// Returns the default configuration file path.
fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("filebcast")
        .join("sbcast.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[defaults]
block_size = 1048576
compress = "zlib"

[receiver]
port = 7000

[nodes]
tux1 = "10.1.0.1"
tux2 = "10.1.0.2:7100"

[[jobs]]
job_id = 12
nodes = "tux[1-2]"
credential = "00ff00ff"

[[jobs]]
job_id = 12
step_id = 3
nodes = "tux1"
credential = "abcdef"
"#;

    #[test]
    fn default_config() {
        let config = SbcastConfig::default();
        assert_eq!(config.receiver.port, DEFAULT_NODE_PORT);
        assert_eq!(config.defaults.compress, CompressionMode::None);
        assert!(config.jobs.is_empty());
        assert_eq!(config.receiver.listen_addr(), format!("0.0.0.0:{DEFAULT_NODE_PORT}"));
    }

    #[test]
    fn parse_sample() {
        let config: SbcastConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.defaults.block_size, 1024 * 1024);
        assert_eq!(config.defaults.compress, CompressionMode::Zlib);
        assert_eq!(config.defaults.fanout, 0);
        assert_eq!(config.receiver.port, 7000);
        assert_eq!(config.jobs.len(), 2);
        assert_eq!(config.jobs[1].step_id, Some(3));
    }

    #[test]
    fn config_roundtrip_toml() {
        let config: SbcastConfig = toml::from_str(SAMPLE).unwrap();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: SbcastConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn address_book_from_nodes() {
        let config: SbcastConfig = toml::from_str(SAMPLE).unwrap();
        let book = config.address_book();
        assert_eq!(book.target("tux1"), "10.1.0.1:7000");
        assert_eq!(book.target("tux2"), "10.1.0.2:7100");
        assert_eq!(book.target("tux9"), "tux9:7000");
    }

    #[tokio::test]
    async fn control_plane_from_jobs() {
        use filebcast_broadcast::CredentialResolver;

        let config: SbcastConfig = toml::from_str(SAMPLE).unwrap();
        let plane = config.control_plane().unwrap();
        assert_eq!(plane.len(), 2);

        let job = CredentialResolver::new(&plane)
            .resolve(JobStepId::job(12))
            .await
            .unwrap();
        assert_eq!(job.node_names, vec!["tux1", "tux2"]);

        let step = CredentialResolver::new(&plane)
            .resolve(JobStepId::step(12, 3))
            .await
            .unwrap();
        assert_eq!(step.credential.to_hex(), "abcdef");
    }

    #[test]
    fn bad_credential_is_reported() {
        let config: SbcastConfig = toml::from_str(
            r#"
[[jobs]]
job_id = 1
nodes = "a"
credential = "not-hex"
"#,
        )
        .unwrap();
        let err = config.control_plane().unwrap_err();
        assert!(err.to_string().contains("credential of job 1"));
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SbcastConfig::load(Some(&tmp.path().join("absent.toml"))).unwrap();
        assert_eq!(config, SbcastConfig::default());
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sbcast.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = SbcastConfig::load(Some(&path)).unwrap();
        assert_eq!(config.jobs[0].nodes, "tux[1-2]");
    }

    #[test]
    fn load_rejects_oversized_block() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sbcast.toml");
        std::fs::write(&path, "[defaults]\nblock_size = 83886080\n").unwrap();
        let err = SbcastConfig::load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("exceeds"));
    }

    #[test]
    fn config_path_not_empty() {
        assert!(config_path().to_string_lossy().contains("filebcast"));
    }
}
