use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::workflows::records::grading::{MAX_GRADE, MIN_GRADE};
use crate::workflows::records::PromotionWeighting;

const MAX_PRECISION: u32 = 6;

/// Thresholds and switches consumed by the promotion evaluator and transactor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionConfig {
    pub minimum_passing_average: f64,
    /// Decimal places kept on each per-subject average.
    pub subject_average_precision: u32,
    /// Decimal places kept on the overall final average.
    pub final_average_precision: u32,
    pub max_absence_percentage: f64,
    pub require_all_trimesters: bool,
    pub count_failed_subjects: bool,
    pub weighting: PromotionWeighting,
    /// Upper bound on concurrent per-student promotions in a batch run.
    pub max_parallelism: usize,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            minimum_passing_average: 7.0,
            subject_average_precision: 1,
            final_average_precision: 2,
            max_absence_percentage: 25.0,
            require_all_trimesters: true,
            count_failed_subjects: false,
            weighting: PromotionWeighting::default(),
            max_parallelism: 4,
        }
    }
}

impl PromotionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let average = self.minimum_passing_average;
        if !average.is_finite() || !(MIN_GRADE..=MAX_GRADE).contains(&average) {
            return Err(out_of_range(
                "minimum_passing_average",
                format!("must be within [{MIN_GRADE}, {MAX_GRADE}] (got {average})"),
            ));
        }

        let absence = self.max_absence_percentage;
        if !absence.is_finite() || !(0.0..=100.0).contains(&absence) {
            return Err(out_of_range(
                "max_absence_percentage",
                format!("must be within [0, 100] (got {absence})"),
            ));
        }

        for (field, precision) in [
            ("subject_average_precision", self.subject_average_precision),
            ("final_average_precision", self.final_average_precision),
        ] {
            if precision > MAX_PRECISION {
                return Err(out_of_range(
                    field,
                    format!("must be at most {MAX_PRECISION} decimals (got {precision})"),
                ));
            }
        }

        let PromotionWeighting {
            annual,
            final_evaluation,
        } = self.weighting;
        let sum_is_one = ((annual + final_evaluation) - 1.0).abs() <= 1e-6;
        if !(annual >= 0.0 && final_evaluation >= 0.0 && sum_is_one) {
            return Err(out_of_range(
                "weighting",
                format!(
                    "must be non-negative and sum to 1 (got {annual} + {final_evaluation})"
                ),
            ));
        }

        if self.max_parallelism == 0 {
            return Err(out_of_range(
                "max_parallelism",
                "must allow at least one worker".to_string(),
            ));
        }

        Ok(())
    }
}

fn out_of_range(field: &'static str, detail: String) -> ConfigError {
    ConfigError::OutOfRange { field, detail }
}
