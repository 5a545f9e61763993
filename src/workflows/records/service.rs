use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::attendance::{normalize_attendance_record, trimester_totals, AttendanceTotals};
use super::domain::{
    AttendanceRecord, CourseId, GradeRecord, RecordKey, StudentId, SubjectOffering, Trimester,
    YearId,
};
use super::grading::{GradeAggregator, PromotionWeighting};
use super::repository::{
    AttendanceRepository, CatalogRepository, GradeRepository, RepositoryError, Versioned,
};

/// Write-path tuning for the gradebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradebookConfig {
    /// Compare-and-swap attempts per write before reporting contention.
    pub max_write_attempts: u32,
}

impl Default for GradebookConfig {
    fn default() -> Self {
        Self {
            max_write_attempts: 8,
        }
    }
}

/// Values entered for one trimester of one subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrimesterGradeEntry {
    pub average: Option<f64>,
    #[serde(default)]
    pub justified_absences: i32,
    #[serde(default)]
    pub unjustified_absences: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimesterAttendanceEntry {
    #[serde(default)]
    pub justified_absences: i32,
    #[serde(default)]
    pub unjustified_absences: i32,
    /// Falls back to the stored value, then to the offering's working-day calendar.
    #[serde(default)]
    pub working_days: Option<i32>,
}

/// Outcome of a bulk entry call; unknown students are skipped rather than failing the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkWriteSummary {
    pub written: usize,
    pub skipped: Vec<StudentId>,
}

/// Absence and working-day totals for one student across every subject of a course trimester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimesterAttendanceSummary {
    pub student_id: StudentId,
    pub course_id: CourseId,
    pub year_id: YearId,
    pub trimester: Trimester,
    pub totals: AttendanceTotals,
}

/// Entry point for grade and attendance writes. Every write re-runs the aggregators before
/// the record is persisted, so readers never observe stale derived fields.
pub struct GradebookService<S> {
    store: Arc<S>,
    aggregator: GradeAggregator,
    config: GradebookConfig,
}

impl<S> Clone for GradebookService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            aggregator: self.aggregator,
            config: self.config,
        }
    }
}

impl<S> GradebookService<S>
where
    S: CatalogRepository + GradeRepository + AttendanceRepository + 'static,
{
    pub fn new(store: Arc<S>, config: GradebookConfig, weighting: PromotionWeighting) -> Self {
        Self {
            store,
            aggregator: GradeAggregator::new(weighting),
            config,
        }
    }

    /// Upsert one trimester of a grade record.
    pub fn record_trimester_grade(
        &self,
        key: &RecordKey,
        trimester: Trimester,
        entry: TrimesterGradeEntry,
    ) -> Result<GradeRecord, GradebookError> {
        self.ensure_references(key)?;
        self.update_grade(key, |record| {
            let slot = record.trimesters.get_mut(trimester);
            slot.average = entry.average;
            slot.justified_absences = entry.justified_absences;
            slot.unjustified_absences = entry.unjustified_absences;
        })
    }

    pub fn record_final_evaluation(
        &self,
        key: &RecordKey,
        value: Option<f64>,
    ) -> Result<GradeRecord, GradebookError> {
        self.ensure_references(key)?;
        self.update_grade(key, |record| record.final_evaluation = value)
    }

    pub fn record_trimester_attendance(
        &self,
        key: &RecordKey,
        trimester: Trimester,
        entry: TrimesterAttendanceEntry,
    ) -> Result<AttendanceRecord, GradebookError> {
        self.ensure_references(key)?;
        let calendar_days = self.store.working_days(&key.offering(), trimester)?;
        self.update_attendance(key, |record| {
            let slot = record.trimesters.get_mut(trimester);
            slot.justified_absences = entry.justified_absences;
            slot.unjustified_absences = entry.unjustified_absences;
            if let Some(days) = entry.working_days {
                slot.working_days = days;
            } else if slot.working_days == 0 {
                slot.working_days = calendar_days.unwrap_or(0);
            }
        })
    }

    /// Apply one trimester of grades for many students of the same offering. Rows are
    /// independent upserts: a failing row aborts the call, an unknown student is skipped.
    pub fn record_trimester_grades_bulk(
        &self,
        offering: &SubjectOffering,
        trimester: Trimester,
        rows: Vec<(StudentId, TrimesterGradeEntry)>,
    ) -> Result<BulkWriteSummary, GradebookError> {
        let mut summary = BulkWriteSummary::default();
        for (student_id, entry) in rows {
            let key = RecordKey::new(student_id.clone(), offering);
            match self.record_trimester_grade(&key, trimester, entry) {
                Ok(_) => summary.written += 1,
                Err(GradebookError::NotFound { entity: "student", .. }) => {
                    warn!(student = %student_id, "skipping grade row for unknown student");
                    summary.skipped.push(student_id);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(summary)
    }

    pub fn record_trimester_absences_bulk(
        &self,
        offering: &SubjectOffering,
        trimester: Trimester,
        rows: Vec<(StudentId, TrimesterAttendanceEntry)>,
    ) -> Result<BulkWriteSummary, GradebookError> {
        let mut summary = BulkWriteSummary::default();
        for (student_id, entry) in rows {
            let key = RecordKey::new(student_id.clone(), offering);
            match self.record_trimester_attendance(&key, trimester, entry) {
                Ok(_) => summary.written += 1,
                Err(GradebookError::NotFound { entity: "student", .. }) => {
                    warn!(student = %student_id, "skipping attendance row for unknown student");
                    summary.skipped.push(student_id);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(summary)
    }

    /// Record the working-day calendar for an offering's trimester and stamp it onto every
    /// attendance record already stored for that offering. Returns how many records changed.
    pub fn set_working_days(
        &self,
        offering: &SubjectOffering,
        trimester: Trimester,
        days: i32,
    ) -> Result<usize, GradebookError> {
        self.ensure_offering(offering)?;
        let days = days.max(0);
        self.store.set_working_days(offering, trimester, days)?;

        let mut updated = 0;
        for record in self.store.attendance_for_offering(offering)? {
            self.update_attendance(&record.key, |record| {
                record.trimesters.get_mut(trimester).working_days = days;
            })?;
            updated += 1;
        }
        Ok(updated)
    }

    pub fn grade_record(&self, key: &RecordKey) -> Result<Option<GradeRecord>, GradebookError> {
        Ok(self.store.fetch_grade(key)?.map(|stored| stored.value))
    }

    pub fn attendance_record(
        &self,
        key: &RecordKey,
    ) -> Result<Option<AttendanceRecord>, GradebookError> {
        Ok(self.store.fetch_attendance(key)?.map(|stored| stored.value))
    }

    pub fn trimester_attendance_summary(
        &self,
        student_id: &StudentId,
        course_id: &CourseId,
        year_id: &YearId,
        trimester: Trimester,
    ) -> Result<TrimesterAttendanceSummary, GradebookError> {
        if self.store.student(student_id)?.is_none() {
            return Err(GradebookError::not_found("student", student_id));
        }
        let records: Vec<AttendanceRecord> = self
            .store
            .attendance_for_student(student_id, year_id)?
            .into_iter()
            .filter(|record| &record.key.course_id == course_id)
            .collect();

        Ok(TrimesterAttendanceSummary {
            student_id: student_id.clone(),
            course_id: course_id.clone(),
            year_id: year_id.clone(),
            trimester,
            totals: trimester_totals(&records, trimester),
        })
    }

    fn update_grade<F>(&self, key: &RecordKey, mutate: F) -> Result<GradeRecord, GradebookError>
    where
        F: Fn(&mut GradeRecord),
    {
        for attempt in 1..=self.config.max_write_attempts {
            let (mut record, expected) = split_versioned(self.store.fetch_grade(key)?, || {
                GradeRecord::new(key.clone())
            });
            mutate(&mut record);
            let record = self.aggregator.recompute(record);

            match self.store.store_grade(record.clone(), expected) {
                Ok(version) => {
                    debug!(record = %key, version, "grade record stored");
                    return Ok(record);
                }
                Err(RepositoryError::VersionConflict) => {
                    debug!(record = %key, attempt, "grade write lost a race, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(record = %key, "grade write exhausted retries");
        Err(GradebookError::Contention {
            key: key.clone(),
            attempts: self.config.max_write_attempts,
        })
    }

    fn update_attendance<F>(
        &self,
        key: &RecordKey,
        mutate: F,
    ) -> Result<AttendanceRecord, GradebookError>
    where
        F: Fn(&mut AttendanceRecord),
    {
        for attempt in 1..=self.config.max_write_attempts {
            let (mut record, expected) = split_versioned(self.store.fetch_attendance(key)?, || {
                AttendanceRecord::new(key.clone())
            });
            mutate(&mut record);
            let record = normalize_attendance_record(record);

            match self.store.store_attendance(record.clone(), expected) {
                Ok(version) => {
                    debug!(record = %key, version, "attendance record stored");
                    return Ok(record);
                }
                Err(RepositoryError::VersionConflict) => {
                    debug!(record = %key, attempt, "attendance write lost a race, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(record = %key, "attendance write exhausted retries");
        Err(GradebookError::Contention {
            key: key.clone(),
            attempts: self.config.max_write_attempts,
        })
    }

    fn ensure_references(&self, key: &RecordKey) -> Result<(), GradebookError> {
        if self.store.student(&key.student_id)?.is_none() {
            return Err(GradebookError::not_found("student", &key.student_id));
        }
        self.ensure_offering(&key.offering())
    }

    fn ensure_offering(&self, offering: &SubjectOffering) -> Result<(), GradebookError> {
        if self.store.year(&offering.year_id)?.is_none() {
            return Err(GradebookError::not_found("year", &offering.year_id));
        }
        if self.store.course(&offering.course_id)?.is_none() {
            return Err(GradebookError::not_found("course", &offering.course_id));
        }
        if self.store.subject(&offering.subject_id)?.is_none() {
            return Err(GradebookError::not_found("subject", &offering.subject_id));
        }
        Ok(())
    }
}

fn split_versioned<T>(stored: Option<Versioned<T>>, fresh: impl FnOnce() -> T) -> (T, Option<u64>) {
    match stored {
        Some(Versioned { version, value }) => (value, Some(version)),
        None => (fresh(), None),
    }
}

/// Error raised by the gradebook write path.
#[derive(Debug, thiserror::Error)]
pub enum GradebookError {
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("record {key} still contended after {attempts} write attempts")]
    Contention { key: RecordKey, attempts: u32 },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl GradebookError {
    fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Contention { .. } | Self::Repository(RepositoryError::Unavailable(_))
        )
    }
}
