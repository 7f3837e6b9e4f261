use std::fmt;
use std::str::FromStr;

use base64::{Engine, engine::general_purpose::STANDARD};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::ProtocolError;
use crate::constants::CREDENTIAL_LEN;

// ---------------------------------------------------------------------------
// Compression
// ---------------------------------------------------------------------------

/// Per-block compression applied by the sender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    #[default]
    None,
    Zlib,
    Lz4,
}

impl CompressionMode {
    pub fn is_compressed(&self) -> bool {
        !matches!(self, CompressionMode::None)
    }
}

impl fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompressionMode::None => "none",
            CompressionMode::Zlib => "zlib",
            CompressionMode::Lz4 => "lz4",
        })
    }
}

impl FromStr for CompressionMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" | "no" => Ok(CompressionMode::None),
            "zlib" => Ok(CompressionMode::Zlib),
            "lz4" => Ok(CompressionMode::Lz4),
            other => Err(ProtocolError::InvalidCompression(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Response codes
// ---------------------------------------------------------------------------

/// Return code reported by a node for one block.
///
/// Codes are ordered: when several nodes fail, the numerically largest code
/// is the one reported for the whole round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseCode(pub u32);

impl ResponseCode {
    pub const SUCCESS: ResponseCode = ResponseCode(0);
    pub const ERROR: ResponseCode = ResponseCode(1);
    pub const FILE_EXISTS: ResponseCode = ResponseCode(17);
    pub const INVALID_ARGUMENT: ResponseCode = ResponseCode(22);
    pub const CONNECTION_ERROR: ResponseCode = ResponseCode(1001);
    pub const RECEIVE_ERROR: ResponseCode = ResponseCode(1003);
    pub const BLOCK_OUT_OF_ORDER: ResponseCode = ResponseCode(2100);
    pub const CREDENTIAL_INVALID: ResponseCode = ResponseCode(4002);
    pub const TIMEOUT: ResponseCode = ResponseCode(5004);

    pub fn is_success(&self) -> bool {
        *self == ResponseCode::SUCCESS
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match *self {
            ResponseCode::SUCCESS => "No error",
            ResponseCode::ERROR => "Unspecified error",
            ResponseCode::FILE_EXISTS => "File exists",
            ResponseCode::INVALID_ARGUMENT => "Invalid argument",
            ResponseCode::CONNECTION_ERROR => "Communication connection failure",
            ResponseCode::RECEIVE_ERROR => "Communication receive failure",
            ResponseCode::BLOCK_OUT_OF_ORDER => "File block received out of order",
            ResponseCode::CREDENTIAL_INVALID => "Invalid broadcast credential",
            ResponseCode::TIMEOUT => "Socket timed out on send/recv operation",
            ResponseCode(other) => return write!(f, "Unknown error {other}"),
        };
        f.write_str(text)
    }
}

// ---------------------------------------------------------------------------
// Job / step identity
// ---------------------------------------------------------------------------

/// A job, optionally narrowed to one of its steps (`123` or `123.4`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobStepId {
    pub job_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<u32>,
}

impl JobStepId {
    pub fn job(job_id: u32) -> Self {
        Self {
            job_id,
            step_id: None,
        }
    }

    pub fn step(job_id: u32, step_id: u32) -> Self {
        Self {
            job_id,
            step_id: Some(step_id),
        }
    }
}

impl fmt::Display for JobStepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step_id {
            Some(step) => write!(f, "{}.{}", self.job_id, step),
            None => write!(f, "{}", self.job_id),
        }
    }
}

impl FromStr for JobStepId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidJobId(s.to_string());
        let s = s.trim();
        let (job, step) = match s.split_once('.') {
            Some((job, step)) => (job, Some(step)),
            None => (s, None),
        };
        let job_id: u32 = job.parse().map_err(|_| invalid())?;
        if job_id == 0 {
            return Err(invalid());
        }
        let step_id = match step {
            Some(step) => Some(step.parse::<u32>().map_err(|_| invalid())?),
            None => None,
        };
        Ok(Self { job_id, step_id })
    }
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Opaque transfer credential issued by the control plane.
///
/// Serialized as base64 in JSON. `Debug` never prints the bytes.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(Vec<u8>);

impl Credential {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Fresh random credential of `CREDENTIAL_LEN` bytes.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; CREDENTIAL_LEN];
        rand::thread_rng().fill(bytes.as_mut_slice());
        Self(bytes)
    }

    /// Compares against `expected` in time independent of where the
    /// bytes differ.
    pub fn matches(&self, expected: &Credential) -> bool {
        self.0.len() == expected.0.len()
            && self
                .0
                .iter()
                .zip(&expected.0)
                .fold(0u8, |diff, (a, b)| diff | (a ^ b))
                == 0
    }

    /// Parses a credential from its hex form (as stored in config files).
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(s.trim()).map(Self)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short SHA-256 fingerprint, safe to log.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.0);
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({} bytes, sha256:{})", self.0.len(), self.fingerprint())
    }
}

impl Serialize for Credential {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(&self.0).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Credential {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD
            .decode(&s)
            .map(Credential)
            .map_err(serde::de::Error::custom)
    }
}
