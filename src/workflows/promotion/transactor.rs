use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::evaluation::{PromotionConfig, PromotionEvaluation, PromotionEvaluator, PromotionReason};
use super::PromotionError;
use crate::config::ConfigError;
use crate::workflows::records::domain::{
    AcademicYear, Course, CourseId, DecisionId, Enrollment, EnrollmentId, EnrollmentKey,
    EnrollmentStatus, PromotionDecision, StudentId, YearId,
};
use crate::workflows::records::repository::{
    AttendanceRepository, CatalogRepository, EnrollmentRepository, GradeRepository,
    PromotionCommit, RepositoryError,
};

static ENROLLMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static DECISION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_enrollment_id() -> EnrollmentId {
    let id = ENROLLMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    EnrollmentId(format!("enr-{id:06}"))
}

fn next_decision_id() -> DecisionId {
    let id = DECISION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    DecisionId(format!("dec-{id:06}"))
}

/// Writes produced by a newly created promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionReceipt {
    pub enrollment: Enrollment,
    pub decision: PromotionDecision,
}

/// Terminal states that stop a promotion before any write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PromotionRejection {
    NotPassed { reasons: Vec<PromotionReason> },
    NoNextYear,
    NoDestinationCourse { next_year: YearId },
}

impl PromotionRejection {
    pub fn summary(&self) -> String {
        match self {
            PromotionRejection::NotPassed { reasons } => {
                let blocking: Vec<String> = reasons
                    .iter()
                    .filter(|reason| reason.is_blocking())
                    .map(PromotionReason::summary)
                    .collect();
                format!("not passed: {}", blocking.join("; "))
            }
            PromotionRejection::NoNextYear => "no later academic year is configured".to_string(),
            PromotionRejection::NoDestinationCourse { next_year } => {
                format!("no destination course found in year {next_year}")
            }
        }
    }
}

/// Result of a single `promote` call. `AlreadyEnrolled` is a success: it is what a retry of
/// an already-applied promotion returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PromotionOutcome {
    Created(PromotionReceipt),
    AlreadyEnrolled { enrollment: EnrollmentKey },
    Rejected(PromotionRejection),
}

impl PromotionOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, PromotionOutcome::Rejected(_))
    }

    pub fn summary(&self) -> String {
        match self {
            PromotionOutcome::Created(receipt) => {
                format!("promoted and enrolled as {}", receipt.enrollment.key)
            }
            PromotionOutcome::AlreadyEnrolled { enrollment } => {
                format!("already enrolled as {enrollment}")
            }
            PromotionOutcome::Rejected(rejection) => rejection.summary(),
        }
    }
}

struct PromotionRequest<'a> {
    student_id: &'a StudentId,
    year_id: &'a YearId,
    course_id: &'a CourseId,
}

enum PromotionState {
    Evaluating,
    ResolvingDestination {
        evaluation: PromotionEvaluation,
    },
    ResolvingCourse {
        evaluation: PromotionEvaluation,
        next_year: AcademicYear,
    },
    Enrolling {
        evaluation: PromotionEvaluation,
        next_year: AcademicYear,
        destination: Course,
    },
    Finished(PromotionOutcome),
}

impl PromotionState {
    fn label(&self) -> &'static str {
        match self {
            PromotionState::Evaluating => "evaluating",
            PromotionState::ResolvingDestination { .. } => "resolving_destination",
            PromotionState::ResolvingCourse { .. } => "resolving_course",
            PromotionState::Enrolling { .. } => "enrolling",
            PromotionState::Finished(_) => "finished",
        }
    }
}

/// Owns enrollment creation. Each promotion walks the state machine
/// `Evaluating → ResolvingDestination → ResolvingCourse → Enrolling`, stopping early with a
/// rejection; the enrollment, the audit decision and the source enrollment's status change
/// are committed as one unit.
pub struct PromotionService<S> {
    pub(super) store: Arc<S>,
    evaluator: PromotionEvaluator<S>,
    pub(super) max_parallelism: usize,
}

impl<S> Clone for PromotionService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            evaluator: self.evaluator.clone(),
            max_parallelism: self.max_parallelism,
        }
    }
}

impl<S> PromotionService<S>
where
    S: CatalogRepository + GradeRepository + AttendanceRepository + EnrollmentRepository,
{
    pub fn new(store: Arc<S>, config: PromotionConfig) -> Result<Self, ConfigError> {
        let max_parallelism = config.max_parallelism;
        let evaluator = PromotionEvaluator::new(Arc::clone(&store), config)?;
        Ok(Self {
            store,
            evaluator,
            max_parallelism,
        })
    }

    pub fn evaluator(&self) -> &PromotionEvaluator<S> {
        &self.evaluator
    }

    pub fn promote(
        &self,
        student_id: &StudentId,
        year_id: &YearId,
        course_id: &CourseId,
    ) -> Result<PromotionOutcome, PromotionError> {
        let request = PromotionRequest {
            student_id,
            year_id,
            course_id,
        };

        let mut state = PromotionState::Evaluating;
        loop {
            debug!(student = %student_id, year = %year_id, stage = state.label(), "promotion step");
            state = match state {
                PromotionState::Finished(outcome) => {
                    info!(
                        student = %student_id,
                        year = %year_id,
                        course = %course_id,
                        outcome = %outcome.summary(),
                        "promotion finished"
                    );
                    return Ok(outcome);
                }
                other => self.step(&request, other)?,
            };
        }
    }

    pub fn withdraw(
        &self,
        student_id: &StudentId,
        year_id: &YearId,
        course_id: &CourseId,
    ) -> Result<Enrollment, PromotionError> {
        let key = EnrollmentKey {
            student_id: student_id.clone(),
            year_id: year_id.clone(),
            course_id: course_id.clone(),
        };
        match self
            .store
            .update_enrollment_status(&key, EnrollmentStatus::Withdrawn)
        {
            Ok(enrollment) => Ok(enrollment),
            Err(RepositoryError::NotFound) => Err(PromotionError::not_found("enrollment", &key)),
            Err(err) => Err(err.into()),
        }
    }

    /// Audit trail of promotions out of `year_id`.
    pub fn decisions_for_year(
        &self,
        year_id: &YearId,
    ) -> Result<Vec<PromotionDecision>, PromotionError> {
        Ok(self.store.decisions_for_year(year_id)?)
    }

    fn step(
        &self,
        request: &PromotionRequest<'_>,
        state: PromotionState,
    ) -> Result<PromotionState, PromotionError> {
        let next = match state {
            PromotionState::Evaluating => {
                let evaluation = self
                    .evaluator
                    .evaluate(request.student_id, request.year_id)?;
                if evaluation.passed {
                    PromotionState::ResolvingDestination { evaluation }
                } else {
                    PromotionState::Finished(PromotionOutcome::Rejected(
                        PromotionRejection::NotPassed {
                            reasons: evaluation.reasons,
                        },
                    ))
                }
            }
            PromotionState::ResolvingDestination { evaluation } => {
                match self.next_year(request.year_id)? {
                    Some(next_year) => PromotionState::ResolvingCourse {
                        evaluation,
                        next_year,
                    },
                    None => PromotionState::Finished(PromotionOutcome::Rejected(
                        PromotionRejection::NoNextYear,
                    )),
                }
            }
            PromotionState::ResolvingCourse {
                evaluation,
                next_year,
            } => match self.destination_course(request.course_id, &next_year)? {
                Some(destination) => PromotionState::Enrolling {
                    evaluation,
                    next_year,
                    destination,
                },
                None => PromotionState::Finished(PromotionOutcome::Rejected(
                    PromotionRejection::NoDestinationCourse {
                        next_year: next_year.id,
                    },
                )),
            },
            PromotionState::Enrolling {
                evaluation,
                next_year,
                destination,
            } => PromotionState::Finished(self.enroll(
                request,
                &evaluation,
                &next_year,
                &destination,
            )?),
            finished @ PromotionState::Finished(_) => finished,
        };
        Ok(next)
    }

    /// Active year with the smallest ordering strictly after the current one.
    fn next_year(&self, year_id: &YearId) -> Result<Option<AcademicYear>, PromotionError> {
        let current = self
            .store
            .year(year_id)?
            .ok_or_else(|| PromotionError::not_found("year", year_id))?;

        Ok(self
            .store
            .years()?
            .into_iter()
            .filter(|year| year.active && year.ordering > current.ordering)
            .min_by(|a, b| a.ordering.cmp(&b.ordering).then_with(|| a.id.cmp(&b.id))))
    }

    /// The course's explicit successor when it lives in `next_year`, otherwise the next-year
    /// course with the smallest ordering above the current course's.
    fn destination_course(
        &self,
        course_id: &CourseId,
        next_year: &AcademicYear,
    ) -> Result<Option<Course>, PromotionError> {
        let current = self
            .store
            .course(course_id)?
            .ok_or_else(|| PromotionError::not_found("course", course_id))?;

        if let Some(pointer) = &current.next_course {
            match self.store.course(pointer)? {
                Some(course) if course.year_id == next_year.id => return Ok(Some(course)),
                Some(course) => warn!(
                    course = %current.id,
                    next_course = %course.id,
                    next_course_year = %course.year_id,
                    expected_year = %next_year.id,
                    "next course pointer targets another year; falling back to ordering"
                ),
                None => warn!(
                    course = %current.id,
                    next_course = %pointer,
                    "next course pointer is dangling; falling back to ordering"
                ),
            }
        }

        Ok(self
            .store
            .courses_in_year(&next_year.id)?
            .into_iter()
            .filter(|course| course.ordering > current.ordering)
            .min_by(|a, b| a.ordering.cmp(&b.ordering).then_with(|| a.id.cmp(&b.id))))
    }

    fn enroll(
        &self,
        request: &PromotionRequest<'_>,
        evaluation: &PromotionEvaluation,
        next_year: &AcademicYear,
        destination: &Course,
    ) -> Result<PromotionOutcome, PromotionError> {
        let key = EnrollmentKey {
            student_id: request.student_id.clone(),
            year_id: next_year.id.clone(),
            course_id: destination.id.clone(),
        };
        if self.store.fetch_enrollment(&key)?.is_some() {
            return Ok(PromotionOutcome::AlreadyEnrolled { enrollment: key });
        }

        let source_key = EnrollmentKey {
            student_id: request.student_id.clone(),
            year_id: request.year_id.clone(),
            course_id: request.course_id.clone(),
        };
        let source = self
            .store
            .fetch_enrollment(&source_key)?
            .filter(|enrollment| enrollment.status == EnrollmentStatus::Active)
            .map(|enrollment| enrollment.key);

        let created_at = Utc::now();
        let enrollment = Enrollment {
            id: next_enrollment_id(),
            key: key.clone(),
            status: EnrollmentStatus::Active,
            created_at,
        };
        let decision = PromotionDecision {
            id: next_decision_id(),
            student_id: request.student_id.clone(),
            year_from: request.year_id.clone(),
            course_from: request.course_id.clone(),
            year_to: next_year.id.clone(),
            course_to: destination.id.clone(),
            final_average: evaluation.final_average,
            attendance_ratio: evaluation.attendance_ratio,
            passed: evaluation.passed,
            created_at,
        };

        let commit = PromotionCommit {
            enrollment: enrollment.clone(),
            decision: decision.clone(),
            source,
        };
        match self.store.commit_promotion(commit) {
            Ok(()) => Ok(PromotionOutcome::Created(PromotionReceipt {
                enrollment,
                decision,
            })),
            Err(RepositoryError::Conflict) => {
                debug!(enrollment = %key, "enrollment created concurrently");
                Ok(PromotionOutcome::AlreadyEnrolled { enrollment: key })
            }
            Err(err) => {
                warn!(enrollment = %key, error = %err, "promotion commit failed");
                Err(PromotionError::Transaction(err))
            }
        }
    }
}
