//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use filebcast_protocol::constants::MAX_BLOCK_SIZE;
use filebcast_protocol::{CompressionMode, JobStepId};

/// sbcast - broadcast a file to the nodes allocated to a job
#[derive(Parser, Debug)]
#[command(
    name = "sbcast",
    version,
    about = "Broadcast a file to every node of a job allocation",
    long_about = "Copies one local file to the same path on every node allocated to a job.\n\n\
                  The file is sent in blocks, optionally compressed, and the transfer \n\
                  succeeds only when every node has acknowledged every block."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "SBCAST_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Broadcast SOURCE to DEST on every node of the job
    Send(SendArgs),

    /// Run an acknowledging block receiver on this node
    Receive(ReceiveArgs),

    /// Print a new random transfer credential (hex)
    Keygen,
}

/// Arguments for the `send` command
#[derive(Args, Debug, Clone)]
pub struct SendArgs {
    /// Local file to broadcast
    pub source: PathBuf,

    /// Destination path on the nodes
    pub dest: String,

    /// Block size in bytes; accepts a k or m suffix
    #[arg(short = 's', long, env = "SBCAST_SIZE", value_parser = parse_size)]
    pub size: Option<usize>,

    /// Compress blocks (none, zlib, lz4); the bare flag selects lz4
    #[arg(
        short = 'C',
        long,
        env = "SBCAST_COMPRESS",
        num_args = 0..=1,
        default_missing_value = "lz4"
    )]
    pub compress: Option<CompressionMode>,

    /// Nodes contacted at once (max 8)
    #[arg(short = 'F', long, env = "SBCAST_FANOUT")]
    pub fanout: Option<usize>,

    /// Overwrite an existing destination file
    #[arg(short, long, env = "SBCAST_FORCE")]
    pub force: bool,

    /// Job (or job.step) whose nodes receive the file
    #[arg(short, long = "jobid", env = "SLURM_JOB_ID")]
    pub job: JobStepId,

    /// Step id when --jobid names a job only
    #[arg(long, env = "SLURM_STEP_ID")]
    pub step: Option<u32>,

    /// Preserve access and modification times
    #[arg(short, long, env = "SBCAST_PRESERVE")]
    pub preserve: bool,

    /// Per-block timeout in seconds
    #[arg(short, long, env = "SBCAST_TIMEOUT")]
    pub timeout: Option<u64>,
}

impl SendArgs {
    /// The job/step the file goes to; an explicit `JOB.STEP` wins over
    /// `--step`.
    pub fn job_step(&self) -> JobStepId {
        match (self.job.step_id, self.step) {
            (None, Some(step)) => JobStepId::step(self.job.job_id, step),
            _ => self.job,
        }
    }
}

/// Arguments for the `receive` command
#[derive(Args, Debug, Clone)]
pub struct ReceiveArgs {
    /// Node name (defaults to the host name)
    #[arg(long)]
    pub node: Option<String>,

    /// Listen address (defaults to the configured receiver address)
    #[arg(long)]
    pub listen: Option<String>,

    /// Expected transfer credential (hex)
    #[arg(long, env = "SBCAST_CREDENTIAL")]
    pub credential: String,
}

/// Parses a byte count with an optional `k` or `m` suffix.
pub fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let (digits, multiplier) = match s.char_indices().last() {
        Some((i, 'k' | 'K')) => (&s[..i], 1024),
        Some((i, 'm' | 'M')) => (&s[..i], 1024 * 1024),
        _ => (s, 1),
    };
    let n: usize = digits
        .parse()
        .map_err(|_| format!("invalid size `{s}`"))?;
    n.checked_mul(multiplier)
        .filter(|&size| size <= MAX_BLOCK_SIZE)
        .ok_or_else(|| format!("size `{s}` exceeds the {MAX_BLOCK_SIZE} byte maximum"))
}
