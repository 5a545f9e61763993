use serde::{Deserialize, Serialize};

use super::config::PromotionConfig;
use super::rules::{absence_percentage, GradeSignals};
use crate::workflows::records::domain::SubjectId;

/// Reasons accumulated while evaluating a student. Blocking reasons fail the student;
/// subject exclusions are informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum PromotionReason {
    MissingTrimesters {
        subject_id: SubjectId,
        trimesters_present: usize,
    },
    NoUsableGrades {
        subject_id: SubjectId,
    },
    FinalAverageUnavailable,
    BelowMinimumAverage {
        final_average: f64,
        minimum: f64,
    },
    ExcessiveAbsences {
        absence_percentage: f64,
        maximum: f64,
    },
    FailedSubjects {
        count: usize,
    },
}

impl PromotionReason {
    pub fn is_blocking(&self) -> bool {
        !matches!(
            self,
            PromotionReason::MissingTrimesters { .. } | PromotionReason::NoUsableGrades { .. }
        )
    }

    pub fn summary(&self) -> String {
        match self {
            PromotionReason::MissingTrimesters {
                subject_id,
                trimesters_present,
            } => format!(
                "subject {subject_id} excluded: only {trimesters_present} of 3 trimesters graded"
            ),
            PromotionReason::NoUsableGrades { subject_id } => {
                format!("subject {subject_id} excluded: no trimester averages recorded")
            }
            PromotionReason::FinalAverageUnavailable => {
                "final average could not be computed from the recorded grades".to_string()
            }
            PromotionReason::BelowMinimumAverage {
                final_average,
                minimum,
            } => format!("final average {final_average} is below the minimum average {minimum}"),
            PromotionReason::ExcessiveAbsences {
                absence_percentage,
                maximum,
            } => format!(
                "unjustified absences {absence_percentage}% exceed the maximum {maximum}%"
            ),
            PromotionReason::FailedSubjects { count } => {
                format!("{count} subject(s) below the minimum average")
            }
        }
    }
}

pub(crate) fn decide_outcome(
    signals: &GradeSignals,
    attendance_ratio: Option<f64>,
    config: &PromotionConfig,
) -> (bool, Vec<PromotionReason>) {
    let mut reasons: Vec<PromotionReason> = signals
        .excluded
        .iter()
        .map(|excluded| {
            if excluded.trimesters_present == 0 {
                PromotionReason::NoUsableGrades {
                    subject_id: excluded.subject_id.clone(),
                }
            } else {
                PromotionReason::MissingTrimesters {
                    subject_id: excluded.subject_id.clone(),
                    trimesters_present: excluded.trimesters_present,
                }
            }
        })
        .collect();

    match signals.final_average {
        None => reasons.push(PromotionReason::FinalAverageUnavailable),
        Some(final_average) if final_average < config.minimum_passing_average => {
            reasons.push(PromotionReason::BelowMinimumAverage {
                final_average,
                minimum: config.minimum_passing_average,
            });
        }
        Some(_) => {}
    }

    if let Some(ratio) = attendance_ratio {
        let absence_percentage = absence_percentage(ratio);
        if absence_percentage > config.max_absence_percentage {
            reasons.push(PromotionReason::ExcessiveAbsences {
                absence_percentage,
                maximum: config.max_absence_percentage,
            });
        }
    }

    if config.count_failed_subjects && signals.failed_subjects > 0 {
        reasons.push(PromotionReason::FailedSubjects {
            count: signals.failed_subjects,
        });
    }

    let passed = !reasons.iter().any(PromotionReason::is_blocking);
    (passed, reasons)
}
