//! Error taxonomy for the distribution engine.

use crate::types::{DistributionId, DistributionStatus};
use crate::validator::ValidationReport;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DistributorError {
    /// Allocation list or creation parameters rejected; nothing was persisted.
    #[error("validation failed: {0}")]
    Validation(ValidationReport),

    #[error("distribution {0} not found")]
    DistributionNotFound(DistributionId),

    /// A recomputed or on-chain root disagrees with the stored one. Never auto-repaired.
    #[error("integrity violation in distribution {distribution_id}: {detail}")]
    Integrity {
        distribution_id: DistributionId,
        detail: String,
    },

    #[error("illegal transition for distribution {distribution_id} in status {status}: {detail}")]
    StateConflict {
        distribution_id: DistributionId,
        status: DistributionStatus,
        detail: String,
    },

    /// Chain data source unreachable; local state was left untouched.
    #[error("chain data unavailable for distribution {distribution_id}: {detail}")]
    UpstreamUnavailable {
        distribution_id: DistributionId,
        detail: String,
    },

    /// The persistence collaborator failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Malformed hex, address or event payload at a boundary.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl DistributorError {
    pub fn integrity(distribution_id: DistributionId, detail: impl Into<String>) -> Self {
        Self::Integrity {
            distribution_id,
            detail: detail.into(),
        }
    }

    pub fn state_conflict(
        distribution_id: DistributionId,
        status: DistributionStatus,
        detail: impl Into<String>,
    ) -> Self {
        Self::StateConflict {
            distribution_id,
            status,
            detail: detail.into(),
        }
    }

    pub fn upstream(distribution_id: DistributionId, detail: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            distribution_id,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DistributionNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, DistributorError>;
