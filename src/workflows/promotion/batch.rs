use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::transactor::{PromotionOutcome, PromotionRejection, PromotionService};
use super::PromotionError;
use crate::workflows::records::domain::{CourseId, EnrollmentStatus, StudentId, YearId};
use crate::workflows::records::repository::{
    AttendanceRepository, CatalogRepository, EnrollmentRepository, GradeRepository,
};

/// Per-student result inside a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StudentPromotionResult {
    Completed { outcome: PromotionOutcome },
    Failed { message: String, retryable: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentPromotion {
    pub student_id: StudentId,
    pub result: StudentPromotionResult,
}

/// Aggregate counts plus per-student detail for `promote_all`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPromotionReport {
    pub year_id: YearId,
    pub course_id: CourseId,
    pub created: usize,
    pub already_enrolled: usize,
    pub not_passed: usize,
    /// Passing students with no next year or no destination course.
    pub unresolved: usize,
    pub errors: usize,
    pub students: Vec<StudentPromotion>,
}

impl BatchPromotionReport {
    fn new(year_id: &YearId, course_id: &CourseId) -> Self {
        Self {
            year_id: year_id.clone(),
            course_id: course_id.clone(),
            created: 0,
            already_enrolled: 0,
            not_passed: 0,
            unresolved: 0,
            errors: 0,
            students: Vec::new(),
        }
    }

    fn record(&mut self, student_id: StudentId, result: Result<PromotionOutcome, PromotionError>) {
        let result = match result {
            Ok(outcome) => {
                match &outcome {
                    PromotionOutcome::Created(_) => self.created += 1,
                    PromotionOutcome::AlreadyEnrolled { .. } => self.already_enrolled += 1,
                    PromotionOutcome::Rejected(PromotionRejection::NotPassed { .. }) => {
                        self.not_passed += 1
                    }
                    PromotionOutcome::Rejected(_) => self.unresolved += 1,
                }
                StudentPromotionResult::Completed { outcome }
            }
            Err(err) => {
                warn!(student = %student_id, error = %err, "student promotion failed");
                self.errors += 1;
                StudentPromotionResult::Failed {
                    message: err.to_string(),
                    retryable: err.is_retryable(),
                }
            }
        };
        self.students.push(StudentPromotion { student_id, result });
    }

    pub fn outcome_for(&self, student_id: &StudentId) -> Option<&StudentPromotionResult> {
        self.students
            .iter()
            .find(|student| &student.student_id == student_id)
            .map(|student| &student.result)
    }
}

impl<S> PromotionService<S>
where
    S: CatalogRepository
        + GradeRepository
        + AttendanceRepository
        + EnrollmentRepository
        + 'static,
{
    /// Promote every student actively enrolled in `(year_id, course_id)`.
    ///
    /// Each student runs in its own blocking task under a semaphore sized by
    /// `max_parallelism`; one student's failure is recorded in the report and never aborts
    /// the others.
    pub async fn promote_all(
        &self,
        year_id: &YearId,
        course_id: &CourseId,
    ) -> Result<BatchPromotionReport, PromotionError> {
        let roster: Vec<StudentId> = self
            .store
            .enrollments_in(year_id, course_id)?
            .into_iter()
            .filter(|enrollment| enrollment.status == EnrollmentStatus::Active)
            .map(|enrollment| enrollment.key.student_id)
            .collect();
        info!(year = %year_id, course = %course_id, students = roster.len(), "batch promotion started");

        let semaphore = Arc::new(Semaphore::new(self.max_parallelism));
        let mut tasks = Vec::with_capacity(roster.len());
        for student_id in roster {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|err| PromotionError::Worker(err.to_string()))?;
            let service = self.clone();
            let year_id = year_id.clone();
            let course_id = course_id.clone();
            let task_student = student_id.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                service.promote(&task_student, &year_id, &course_id)
            });
            tasks.push((student_id, handle));
        }

        let mut report = BatchPromotionReport::new(year_id, course_id);
        for (student_id, handle) in tasks {
            let result = handle
                .await
                .unwrap_or_else(|err| Err(PromotionError::Worker(err.to_string())));
            report.record(student_id, result);
        }

        info!(
            year = %year_id,
            course = %course_id,
            created = report.created,
            already_enrolled = report.already_enrolled,
            not_passed = report.not_passed,
            unresolved = report.unresolved,
            errors = report.errors,
            "batch promotion finished"
        );
        Ok(report)
    }
}
