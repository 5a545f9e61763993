//! JSON school snapshots used to hydrate the in-memory store from the command line.
//!
//! Catalog entries are inserted directly. Grade, final-evaluation and attendance rows are
//! replayed through [`GradebookService`] so every derived field is computed exactly as it would
//! be for a live write.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::AppConfig;
use crate::workflows::records::{
    AcademicYear, Course, CourseId, Enrollment, EnrollmentId, EnrollmentKey, EnrollmentStatus,
    GradebookError, GradebookService, MemoryStore, RecordKey, RepositoryError, Student,
    StudentId, Subject, SubjectOffering, Trimester, TrimesterAttendanceEntry,
    TrimesterGradeEntry, YearId,
};

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("unable to read dataset {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("dataset rejected by store: {0}")]
    Repository(#[from] RepositoryError),
    #[error("dataset row rejected: {0}")]
    Gradebook(#[from] GradebookError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentSeed {
    pub student_id: StudentId,
    pub year_id: YearId,
    pub course_id: CourseId,
    #[serde(default = "default_status")]
    pub status: EnrollmentStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_status() -> EnrollmentStatus {
    EnrollmentStatus::Active
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingDaysRow {
    #[serde(flatten)]
    pub offering: SubjectOffering,
    pub trimester: Trimester,
    pub days: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRow {
    #[serde(flatten)]
    pub key: RecordKey,
    pub trimester: Trimester,
    #[serde(flatten)]
    pub entry: TrimesterGradeEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalEvaluationRow {
    #[serde(flatten)]
    pub key: RecordKey,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRow {
    #[serde(flatten)]
    pub key: RecordKey,
    pub trimester: Trimester,
    #[serde(flatten)]
    pub entry: TrimesterAttendanceEntry,
}

/// Everything needed to evaluate and promote a school's students offline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchoolSnapshot {
    pub students: Vec<Student>,
    pub subjects: Vec<Subject>,
    pub years: Vec<AcademicYear>,
    pub courses: Vec<Course>,
    #[serde(default)]
    pub enrollments: Vec<EnrollmentSeed>,
    #[serde(default)]
    pub working_days: Vec<WorkingDaysRow>,
    #[serde(default)]
    pub grades: Vec<GradeRow>,
    #[serde(default)]
    pub final_evaluations: Vec<FinalEvaluationRow>,
    #[serde(default)]
    pub attendance: Vec<AttendanceRow>,
}

impl SchoolSnapshot {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| DatasetError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, DatasetError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Build a populated store. Working-day calendars are applied before attendance rows so
    /// rows without an explicit day count pick up the calendar value.
    pub fn into_store(self, config: &AppConfig) -> Result<Arc<MemoryStore>, DatasetError> {
        let store = Arc::new(MemoryStore::new());
        for student in self.students {
            store.insert_student(student)?;
        }
        for subject in self.subjects {
            store.insert_subject(subject)?;
        }
        for year in self.years {
            store.insert_year(year)?;
        }
        for course in self.courses {
            store.insert_course(course)?;
        }
        for (index, seed) in self.enrollments.into_iter().enumerate() {
            store.seed_enrollment(Enrollment {
                id: EnrollmentId(format!("seed-{:06}", index + 1)),
                key: EnrollmentKey {
                    student_id: seed.student_id,
                    year_id: seed.year_id,
                    course_id: seed.course_id,
                },
                status: seed.status,
                created_at: seed.created_at,
            })?;
        }

        let gradebook = GradebookService::new(
            Arc::clone(&store),
            config.gradebook,
            config.promotion.weighting,
        );
        for row in &self.working_days {
            gradebook.set_working_days(&row.offering, row.trimester, row.days)?;
        }
        for row in &self.grades {
            gradebook.record_trimester_grade(&row.key, row.trimester, row.entry)?;
        }
        for row in &self.final_evaluations {
            gradebook.record_final_evaluation(&row.key, row.value)?;
        }
        for row in &self.attendance {
            gradebook.record_trimester_attendance(&row.key, row.trimester, row.entry)?;
        }

        info!(
            grades = self.grades.len(),
            attendance = self.attendance.len(),
            "dataset loaded"
        );
        Ok(store)
    }
}
