use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, RwLock};

use super::domain::{
    AcademicYear, AttendanceRecord, Course, CourseId, Enrollment, EnrollmentKey,
    EnrollmentStatus, GradeRecord, PromotionDecision, RecordKey, Student, StudentId, Subject,
    SubjectId, SubjectOffering, Trimester, YearId,
};
use super::repository::{
    AttendanceRepository, CatalogRepository, EnrollmentRepository, GradeRepository,
    PromotionCommit, RepositoryError, Versioned,
};

/// In-process document store backing every repository trait.
///
/// Each collection sits behind its own lock so that grade writes, attendance writes and
/// promotion commits never serialize against each other. Versioned documents give callers
/// compare-and-swap semantics per record identity.
#[derive(Debug, Default)]
pub struct MemoryStore {
    catalog: RwLock<Catalog>,
    grades: Mutex<HashMap<RecordKey, Versioned<GradeRecord>>>,
    attendance: Mutex<AttendanceState>,
    ledger: Mutex<Ledger>,
}

#[derive(Debug, Default)]
struct Catalog {
    students: BTreeMap<StudentId, Student>,
    subjects: BTreeMap<SubjectId, Subject>,
    years: BTreeMap<YearId, AcademicYear>,
    courses: BTreeMap<CourseId, Course>,
}

#[derive(Debug, Default)]
struct AttendanceState {
    records: HashMap<RecordKey, Versioned<AttendanceRecord>>,
    working_days: HashMap<(SubjectOffering, Trimester), i32>,
}

#[derive(Debug, Default)]
struct Ledger {
    enrollments: BTreeMap<EnrollmentKey, Enrollment>,
    decisions: Vec<PromotionDecision>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable(format!("{name} lock poisoned")))
}

fn compare_and_swap<T>(
    slot: Option<&Versioned<T>>,
    expected: Option<u64>,
) -> Result<u64, RepositoryError> {
    match (slot.map(|current| current.version), expected) {
        (None, None) => Ok(1),
        (Some(current), Some(expected)) if current == expected => Ok(current + 1),
        _ => Err(RepositoryError::VersionConflict),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_student(&self, student: Student) -> Result<(), RepositoryError> {
        self.catalog_mut()?
            .students
            .insert(student.id.clone(), student);
        Ok(())
    }

    pub fn insert_subject(&self, subject: Subject) -> Result<(), RepositoryError> {
        self.catalog_mut()?
            .subjects
            .insert(subject.id.clone(), subject);
        Ok(())
    }

    pub fn insert_year(&self, year: AcademicYear) -> Result<(), RepositoryError> {
        self.catalog_mut()?.years.insert(year.id.clone(), year);
        Ok(())
    }

    pub fn insert_course(&self, course: Course) -> Result<(), RepositoryError> {
        self.catalog_mut()?.courses.insert(course.id.clone(), course);
        Ok(())
    }

    /// Register a pre-existing enrollment (e.g. the current year's roster).
    pub fn seed_enrollment(&self, enrollment: Enrollment) -> Result<(), RepositoryError> {
        let mut ledger = lock(&self.ledger, "ledger")?;
        if ledger.enrollments.contains_key(&enrollment.key) {
            return Err(RepositoryError::Conflict);
        }
        ledger.enrollments.insert(enrollment.key.clone(), enrollment);
        Ok(())
    }

    pub fn enrollments(&self) -> Result<Vec<Enrollment>, RepositoryError> {
        Ok(lock(&self.ledger, "ledger")?
            .enrollments
            .values()
            .cloned()
            .collect())
    }

    pub fn decisions(&self) -> Result<Vec<PromotionDecision>, RepositoryError> {
        Ok(lock(&self.ledger, "ledger")?.decisions.clone())
    }

    fn catalog(&self) -> Result<std::sync::RwLockReadGuard<'_, Catalog>, RepositoryError> {
        self.catalog
            .read()
            .map_err(|_| RepositoryError::Unavailable("catalog lock poisoned".to_string()))
    }

    fn catalog_mut(&self) -> Result<std::sync::RwLockWriteGuard<'_, Catalog>, RepositoryError> {
        self.catalog
            .write()
            .map_err(|_| RepositoryError::Unavailable("catalog lock poisoned".to_string()))
    }
}

impl CatalogRepository for MemoryStore {
    fn student(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError> {
        Ok(self.catalog()?.students.get(id).cloned())
    }

    fn subject(&self, id: &SubjectId) -> Result<Option<Subject>, RepositoryError> {
        Ok(self.catalog()?.subjects.get(id).cloned())
    }

    fn year(&self, id: &YearId) -> Result<Option<AcademicYear>, RepositoryError> {
        Ok(self.catalog()?.years.get(id).cloned())
    }

    fn years(&self) -> Result<Vec<AcademicYear>, RepositoryError> {
        Ok(self.catalog()?.years.values().cloned().collect())
    }

    fn course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError> {
        Ok(self.catalog()?.courses.get(id).cloned())
    }

    fn courses_in_year(&self, year_id: &YearId) -> Result<Vec<Course>, RepositoryError> {
        Ok(self
            .catalog()?
            .courses
            .values()
            .filter(|course| &course.year_id == year_id)
            .cloned()
            .collect())
    }
}

impl GradeRepository for MemoryStore {
    fn fetch_grade(&self, key: &RecordKey) -> Result<Option<Versioned<GradeRecord>>, RepositoryError> {
        Ok(lock(&self.grades, "grades")?.get(key).cloned())
    }

    fn store_grade(
        &self,
        record: GradeRecord,
        expected: Option<u64>,
    ) -> Result<u64, RepositoryError> {
        let mut grades = lock(&self.grades, "grades")?;
        let version = compare_and_swap(grades.get(&record.key), expected)?;
        grades.insert(
            record.key.clone(),
            Versioned {
                version,
                value: record,
            },
        );
        Ok(version)
    }

    fn grades_for_student(
        &self,
        student_id: &StudentId,
        year_id: &YearId,
    ) -> Result<Vec<GradeRecord>, RepositoryError> {
        let grades = lock(&self.grades, "grades")?;
        let mut records: Vec<GradeRecord> = grades
            .values()
            .filter(|entry| {
                &entry.value.key.student_id == student_id && &entry.value.key.year_id == year_id
            })
            .map(|entry| entry.value.clone())
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }
}

impl AttendanceRepository for MemoryStore {
    fn fetch_attendance(
        &self,
        key: &RecordKey,
    ) -> Result<Option<Versioned<AttendanceRecord>>, RepositoryError> {
        Ok(lock(&self.attendance, "attendance")?
            .records
            .get(key)
            .cloned())
    }

    fn store_attendance(
        &self,
        record: AttendanceRecord,
        expected: Option<u64>,
    ) -> Result<u64, RepositoryError> {
        let mut state = lock(&self.attendance, "attendance")?;
        let version = compare_and_swap(state.records.get(&record.key), expected)?;
        state.records.insert(
            record.key.clone(),
            Versioned {
                version,
                value: record,
            },
        );
        Ok(version)
    }

    fn attendance_for_student(
        &self,
        student_id: &StudentId,
        year_id: &YearId,
    ) -> Result<Vec<AttendanceRecord>, RepositoryError> {
        let state = lock(&self.attendance, "attendance")?;
        let mut records: Vec<AttendanceRecord> = state
            .records
            .values()
            .filter(|entry| {
                &entry.value.key.student_id == student_id && &entry.value.key.year_id == year_id
            })
            .map(|entry| entry.value.clone())
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    fn attendance_for_offering(
        &self,
        offering: &SubjectOffering,
    ) -> Result<Vec<AttendanceRecord>, RepositoryError> {
        let state = lock(&self.attendance, "attendance")?;
        let mut records: Vec<AttendanceRecord> = state
            .records
            .values()
            .filter(|entry| {
                entry.value.key.course_id == offering.course_id
                    && entry.value.key.subject_id == offering.subject_id
                    && entry.value.key.year_id == offering.year_id
            })
            .map(|entry| entry.value.clone())
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    fn working_days(
        &self,
        offering: &SubjectOffering,
        trimester: Trimester,
    ) -> Result<Option<i32>, RepositoryError> {
        Ok(lock(&self.attendance, "attendance")?
            .working_days
            .get(&(offering.clone(), trimester))
            .copied())
    }

    fn set_working_days(
        &self,
        offering: &SubjectOffering,
        trimester: Trimester,
        days: i32,
    ) -> Result<(), RepositoryError> {
        lock(&self.attendance, "attendance")?
            .working_days
            .insert((offering.clone(), trimester), days);
        Ok(())
    }
}

impl EnrollmentRepository for MemoryStore {
    fn fetch_enrollment(&self, key: &EnrollmentKey) -> Result<Option<Enrollment>, RepositoryError> {
        Ok(lock(&self.ledger, "ledger")?.enrollments.get(key).cloned())
    }

    fn enrollments_in(
        &self,
        year_id: &YearId,
        course_id: &CourseId,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        Ok(lock(&self.ledger, "ledger")?
            .enrollments
            .values()
            .filter(|enrollment| {
                &enrollment.key.year_id == year_id && &enrollment.key.course_id == course_id
            })
            .cloned()
            .collect())
    }

    fn update_enrollment_status(
        &self,
        key: &EnrollmentKey,
        status: EnrollmentStatus,
    ) -> Result<Enrollment, RepositoryError> {
        let mut ledger = lock(&self.ledger, "ledger")?;
        let enrollment = ledger
            .enrollments
            .get_mut(key)
            .ok_or(RepositoryError::NotFound)?;
        enrollment.status = status;
        Ok(enrollment.clone())
    }

    fn commit_promotion(&self, commit: PromotionCommit) -> Result<(), RepositoryError> {
        let mut ledger = lock(&self.ledger, "ledger")?;
        if ledger.enrollments.contains_key(&commit.enrollment.key) {
            return Err(RepositoryError::Conflict);
        }

        // Every check happens before the first mutation so a failed commit leaves no trace.
        if let Some(source) = &commit.source {
            if let Some(previous) = ledger.enrollments.get_mut(source) {
                previous.status = EnrollmentStatus::Passed;
            }
        }
        ledger
            .enrollments
            .insert(commit.enrollment.key.clone(), commit.enrollment);
        ledger.decisions.push(commit.decision);
        Ok(())
    }

    fn decisions_for_year(
        &self,
        year_from: &YearId,
    ) -> Result<Vec<PromotionDecision>, RepositoryError> {
        Ok(lock(&self.ledger, "ledger")?
            .decisions
            .iter()
            .filter(|decision| &decision.year_from == year_from)
            .cloned()
            .collect())
    }
}
