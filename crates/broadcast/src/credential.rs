//! Control-plane lookup of transfer credentials.
//!
//! `ControlPlane` is implemented by whoever knows the job allocations;
//! the engine only ever asks it once per broadcast.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use filebcast_protocol::JobStepId;
use tracing::{debug, error, info};

use crate::error::BroadcastError;
use crate::types::TransferCredential;

/// Source of transfer credentials for running jobs.
pub trait ControlPlane: Send + Sync {
    /// Looks up the credential and node list for a job or one of its steps.
    fn lookup(
        &self,
        id: JobStepId,
    ) -> Pin<Box<dyn Future<Output = Result<TransferCredential, BroadcastError>> + Send + '_>>;
}

/// Fetches the credential of one broadcast.
pub struct CredentialResolver<'a> {
    plane: &'a dyn ControlPlane,
    verbose: bool,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(plane: &'a dyn ControlPlane) -> Self {
        Self {
            plane,
            verbose: false,
        }
    }

    /// Logs the credential summary at info level instead of debug.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Resolves the credential for `id`. Failures are final; there is no
    /// retry.
    pub async fn resolve(&self, id: JobStepId) -> Result<TransferCredential, BroadcastError> {
        debug_assert!(id.job_id != 0, "job id must be set before lookup");

        let cred = match self.plane.lookup(id).await {
            Ok(cred) => cred,
            Err(e) => {
                let e = match e {
                    e @ BroadcastError::CredentialLookup { .. } => e,
                    other => BroadcastError::lookup(id, other.to_string()),
                };
                error!(job = %id, error = %e, "credential lookup failed");
                return Err(e);
            }
        };

        if self.verbose {
            info!(
                node_list = %cred.node_list,
                node_cnt = cred.node_count(),
                cred = %cred.credential.fingerprint(),
                "transfer credential"
            );
        } else {
            debug!(
                node_list = %cred.node_list,
                node_cnt = cred.node_count(),
                cred = %cred.credential.fingerprint(),
                "transfer credential"
            );
        }
        Ok(cred)
    }
}

/// In-memory control plane with a fixed set of allocations.
///
/// A job-scoped entry also answers lookups for any step of that job.
#[derive(Debug, Clone, Default)]
pub struct StaticControlPlane {
    entries: HashMap<JobStepId, TransferCredential>,
}

impl StaticControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: JobStepId, credential: TransferCredential) {
        self.entries.insert(id, credential);
    }

    pub fn with(mut self, id: JobStepId, credential: TransferCredential) -> Self {
        self.insert(id, credential);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, id: JobStepId) -> Option<&TransferCredential> {
        self.entries.get(&id).or_else(|| {
            id.step_id
                .and_then(|_| self.entries.get(&JobStepId::job(id.job_id)))
        })
    }
}

impl ControlPlane for StaticControlPlane {
    fn lookup(
        &self,
        id: JobStepId,
    ) -> Pin<Box<dyn Future<Output = Result<TransferCredential, BroadcastError>> + Send + '_>> {
        let found = self
            .find(id)
            .cloned()
            .ok_or_else(|| BroadcastError::lookup(id, "Invalid job id specified"));
        Box::pin(async move { found })
    }
}
