//! Grade and attendance records: domain types, stores, and the aggregators that own every
//! derived field.

pub mod attendance;
pub mod domain;
pub mod grading;
pub mod memory;
pub mod repository;
pub mod service;

#[cfg(test)]
mod tests;

pub use attendance::{recompute_attendance_ratio, AttendanceTotals};
pub use domain::{
    AcademicYear, AttendanceRecord, Course, CourseId, DecisionId, Enrollment, EnrollmentId,
    EnrollmentKey, EnrollmentStatus, GradeRecord, PromotionDecision, QualitativeBand, RecordKey,
    Student, StudentId, Subject, SubjectId, SubjectOffering, Trimester, TrimesterAttendance,
    TrimesterGrade, TrimesterMap, YearId,
};
pub use grading::{qualitative_band, recompute_grade_record, GradeAggregator, PromotionWeighting};
pub use memory::MemoryStore;
pub use repository::{
    AttendanceRepository, CatalogRepository, EnrollmentRepository, GradeRepository,
    PromotionCommit, RepositoryError, Versioned,
};
pub use service::{
    BulkWriteSummary, GradebookConfig, GradebookError, GradebookService,
    TrimesterAttendanceEntry, TrimesterAttendanceSummary, TrimesterGradeEntry,
};
