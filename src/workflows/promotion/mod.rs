//! Year-end promotion: evaluate a student's aggregated grades and attendance, then enroll
//! passing students in next year's course exactly once.

mod batch;
pub mod evaluation;
mod transactor;

#[cfg(test)]
mod tests;

pub use batch::{BatchPromotionReport, StudentPromotion, StudentPromotionResult};
pub use evaluation::{
    EvaluationEngine, PromotionConfig, PromotionEvaluation, PromotionEvaluator, PromotionReason,
    SubjectAverage,
};
pub use transactor::{PromotionOutcome, PromotionReceipt, PromotionRejection, PromotionService};

use crate::workflows::records::RepositoryError;

/// Infrastructure or lookup failure raised while promoting. Business outcomes such as
/// "not passed" or "already enrolled" are [`PromotionOutcome`] values, not errors.
#[derive(Debug, thiserror::Error)]
pub enum PromotionError {
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("promotion transaction could not be committed: {0}")]
    Transaction(#[source] RepositoryError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("promotion worker failed: {0}")]
    Worker(String),
}

impl PromotionError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Transaction failures leave no partial state, so the same request can be replayed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transaction(_) | Self::Repository(RepositoryError::Unavailable(_))
        )
    }
}
