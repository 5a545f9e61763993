mod config;
mod policy;
mod rules;

pub use config::PromotionConfig;
pub use policy::PromotionReason;
pub use rules::SubjectAverage;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::PromotionError;
use crate::config::ConfigError;
use crate::workflows::records::domain::{AttendanceRecord, GradeRecord, StudentId, YearId};
use crate::workflows::records::recompute_attendance_ratio;
use crate::workflows::records::repository::{
    AttendanceRepository, CatalogRepository, GradeRepository,
};
use policy::decide_outcome;

/// Stateless evaluator that applies the promotion thresholds to loaded records.
#[derive(Debug, Clone)]
pub struct EvaluationEngine {
    config: PromotionConfig,
}

impl EvaluationEngine {
    pub fn new(config: PromotionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PromotionConfig {
        &self.config
    }

    pub fn evaluate(
        &self,
        student_id: &StudentId,
        year_id: &YearId,
        grades: &[GradeRecord],
        attendance: &[AttendanceRecord],
    ) -> PromotionEvaluation {
        let signals = rules::grade_signals(grades, &self.config);
        let attendance_ratio = recompute_attendance_ratio(attendance);
        let (passed, reasons) = decide_outcome(&signals, attendance_ratio, &self.config);

        PromotionEvaluation {
            student_id: student_id.clone(),
            year_id: year_id.clone(),
            passed,
            final_average: signals.final_average,
            attendance_ratio,
            failed_subjects_count: signals.failed_subjects,
            subject_averages: signals.subjects,
            reasons,
        }
    }
}

/// Pass/fail verdict for one student and year, with the figures it was based on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionEvaluation {
    pub student_id: StudentId,
    pub year_id: YearId,
    pub passed: bool,
    pub final_average: Option<f64>,
    pub attendance_ratio: Option<f64>,
    pub failed_subjects_count: usize,
    pub subject_averages: Vec<SubjectAverage>,
    pub reasons: Vec<PromotionReason>,
}

impl PromotionEvaluation {
    pub fn reason_messages(&self) -> Vec<String> {
        self.reasons.iter().map(PromotionReason::summary).collect()
    }
}

/// Loads a student's records for a year and runs them through the [`EvaluationEngine`].
/// Performs no writes.
pub struct PromotionEvaluator<S> {
    store: Arc<S>,
    engine: EvaluationEngine,
}

impl<S> Clone for PromotionEvaluator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            engine: self.engine.clone(),
        }
    }
}

impl<S> PromotionEvaluator<S>
where
    S: CatalogRepository + GradeRepository + AttendanceRepository,
{
    pub fn new(store: Arc<S>, config: PromotionConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            store,
            engine: EvaluationEngine::new(config)?,
        })
    }

    pub fn engine(&self) -> &EvaluationEngine {
        &self.engine
    }

    pub fn evaluate(
        &self,
        student_id: &StudentId,
        year_id: &YearId,
    ) -> Result<PromotionEvaluation, PromotionError> {
        if self.store.student(student_id)?.is_none() {
            return Err(PromotionError::not_found("student", student_id));
        }
        if self.store.year(year_id)?.is_none() {
            return Err(PromotionError::not_found("year", year_id));
        }

        let grades = self.store.grades_for_student(student_id, year_id)?;
        let attendance = self.store.attendance_for_student(student_id, year_id)?;
        Ok(self
            .engine
            .evaluate(student_id, year_id, &grades, &attendance))
    }
}
