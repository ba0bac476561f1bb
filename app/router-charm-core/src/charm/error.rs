use thiserror::Error;

use crate::{reconciler::error::ReconcilerError, workload::WorkloadError};

use super::status::StatusError;

#[derive(Debug, Error)]
pub enum CharmError {
    #[error("Cluster reconciliation failed! {}", .0)]
    Reconciler(ReconcilerError),
    #[error("Workload operation failed! {}", .0)]
    Workload(WorkloadError),
    #[error("{}", .0)]
    Status(StatusError),
}

impl CharmError {
    /// Failures the operator has to fix by hand, as opposed to ones a
    /// re-delivered event can get past.
    pub fn needs_intervention(&self) -> bool {
        matches!(self, CharmError::Reconciler(ReconcilerError::MultusNotInstalled))
    }
}
