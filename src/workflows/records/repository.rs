//! Storage abstractions for the record stores.
//!
//! The traits model a transactional document store: single-record writes are guarded by a
//! version number (compare-and-swap), and the promotion ledger applies a multi-record commit
//! atomically. [`super::memory::MemoryStore`] implements every trait in-process.

use serde::{Deserialize, Serialize};

use super::domain::{
    AcademicYear, AttendanceRecord, Course, CourseId, Enrollment, EnrollmentKey,
    EnrollmentStatus, GradeRecord, PromotionDecision, RecordKey, Student, StudentId, Subject,
    SubjectId, SubjectOffering, Trimester, YearId,
};

/// A stored document together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Read access to students, subjects, years and courses.
pub trait CatalogRepository: Send + Sync {
    fn student(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError>;
    fn subject(&self, id: &SubjectId) -> Result<Option<Subject>, RepositoryError>;
    fn year(&self, id: &YearId) -> Result<Option<AcademicYear>, RepositoryError>;
    fn years(&self) -> Result<Vec<AcademicYear>, RepositoryError>;
    fn course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError>;
    fn courses_in_year(&self, year_id: &YearId) -> Result<Vec<Course>, RepositoryError>;
}

pub trait GradeRepository: Send + Sync {
    fn fetch_grade(&self, key: &RecordKey) -> Result<Option<Versioned<GradeRecord>>, RepositoryError>;

    /// Persist `record` if the stored version still equals `expected` (`None` = must not exist).
    /// Returns the new version, or [`RepositoryError::VersionConflict`] when another writer won.
    fn store_grade(&self, record: GradeRecord, expected: Option<u64>)
        -> Result<u64, RepositoryError>;

    fn grades_for_student(
        &self,
        student_id: &StudentId,
        year_id: &YearId,
    ) -> Result<Vec<GradeRecord>, RepositoryError>;
}

pub trait AttendanceRepository: Send + Sync {
    fn fetch_attendance(
        &self,
        key: &RecordKey,
    ) -> Result<Option<Versioned<AttendanceRecord>>, RepositoryError>;

    fn store_attendance(
        &self,
        record: AttendanceRecord,
        expected: Option<u64>,
    ) -> Result<u64, RepositoryError>;

    fn attendance_for_student(
        &self,
        student_id: &StudentId,
        year_id: &YearId,
    ) -> Result<Vec<AttendanceRecord>, RepositoryError>;

    fn attendance_for_offering(
        &self,
        offering: &SubjectOffering,
    ) -> Result<Vec<AttendanceRecord>, RepositoryError>;

    fn working_days(
        &self,
        offering: &SubjectOffering,
        trimester: Trimester,
    ) -> Result<Option<i32>, RepositoryError>;

    fn set_working_days(
        &self,
        offering: &SubjectOffering,
        trimester: Trimester,
        days: i32,
    ) -> Result<(), RepositoryError>;
}

/// Writes produced by one successful promotion; applied all-or-nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct PromotionCommit {
    pub enrollment: Enrollment,
    pub decision: PromotionDecision,
    /// Enrollment the student is leaving, closed as `passed` in the same commit.
    pub source: Option<EnrollmentKey>,
}

pub trait EnrollmentRepository: Send + Sync {
    fn fetch_enrollment(&self, key: &EnrollmentKey) -> Result<Option<Enrollment>, RepositoryError>;

    fn enrollments_in(
        &self,
        year_id: &YearId,
        course_id: &CourseId,
    ) -> Result<Vec<Enrollment>, RepositoryError>;

    fn update_enrollment_status(
        &self,
        key: &EnrollmentKey,
        status: EnrollmentStatus,
    ) -> Result<Enrollment, RepositoryError>;

    /// Atomically create the enrollment, append the decision and close the source enrollment.
    /// Fails with [`RepositoryError::Conflict`] without writing anything when the enrollment
    /// key already exists.
    fn commit_promotion(&self, commit: PromotionCommit) -> Result<(), RepositoryError>;

    fn decisions_for_year(&self, year_from: &YearId)
        -> Result<Vec<PromotionDecision>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record was modified concurrently")]
    VersionConflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
