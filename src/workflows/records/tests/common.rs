use std::sync::Arc;

use chrono::NaiveDate;

use crate::workflows::records::domain::{
    AcademicYear, AttendanceRecord, Course, CourseId, GradeRecord, RecordKey, Student, StudentId,
    Subject, SubjectId, SubjectOffering, Trimester, TrimesterAttendance, YearId,
};
use crate::workflows::records::memory::MemoryStore;
use crate::workflows::records::repository::{
    AttendanceRepository, CatalogRepository, GradeRepository, RepositoryError, Versioned,
};
use crate::workflows::records::{GradebookConfig, GradebookService, PromotionWeighting};

pub(super) const YEAR: &str = "2024";
pub(super) const COURSE: &str = "grade-3";

pub(super) fn offering(subject: &str) -> SubjectOffering {
    SubjectOffering {
        course_id: CourseId::new(COURSE),
        subject_id: SubjectId::new(subject),
        year_id: YearId::new(YEAR),
    }
}

pub(super) fn key(student: &str, subject: &str) -> RecordKey {
    RecordKey::new(StudentId::new(student), &offering(subject))
}

pub(super) fn blank_grade(student: &str, subject: &str) -> GradeRecord {
    GradeRecord::new(key(student, subject))
}

pub(super) fn attendance(
    subject: &str,
    entries: [(i32, i32, i32); 3],
) -> AttendanceRecord {
    let mut record = AttendanceRecord::new(key("s-1", subject));
    for (trimester, (justified, unjustified, working)) in Trimester::ordered().into_iter().zip(entries)
    {
        *record.trimesters.get_mut(trimester) = TrimesterAttendance {
            justified_absences: justified,
            unjustified_absences: unjustified,
            working_days: working,
        };
    }
    record
}

/// Store with one year, one course, two subjects and students `s-1`, `s-2`.
pub(super) fn seeded_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store
        .insert_year(AcademicYear {
            id: YearId::new(YEAR),
            name: "School year 2024".to_string(),
            ordering: 2024,
            starts_on: NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date"),
            ends_on: NaiveDate::from_ymd_opt(2024, 12, 13).expect("valid date"),
            active: true,
        })
        .expect("year stored");
    store
        .insert_course(Course {
            id: CourseId::new(COURSE),
            name: "Grade 3".to_string(),
            year_id: YearId::new(YEAR),
            ordering: 3,
            next_course: None,
            subjects: vec![SubjectId::new("math"), SubjectId::new("lang")],
        })
        .expect("course stored");
    for (id, name) in [("math", "Mathematics"), ("lang", "Language")] {
        store
            .insert_subject(Subject {
                id: SubjectId::new(id),
                name: name.to_string(),
            })
            .expect("subject stored");
    }
    for (id, name) in [("s-1", "Lucia Vera"), ("s-2", "Tomas Rey")] {
        store
            .insert_student(Student {
                id: StudentId::new(id),
                full_name: name.to_string(),
            })
            .expect("student stored");
    }
    Arc::new(store)
}

pub(super) fn gradebook<S>(store: Arc<S>) -> GradebookService<S>
where
    S: CatalogRepository + GradeRepository + AttendanceRepository + 'static,
{
    GradebookService::new(store, GradebookConfig::default(), PromotionWeighting::default())
}

/// Catalog and reads come from a seeded store; every grade write loses its race.
pub(super) struct ContendedStore {
    pub inner: Arc<MemoryStore>,
}

impl CatalogRepository for ContendedStore {
    fn student(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError> {
        self.inner.student(id)
    }

    fn subject(&self, id: &SubjectId) -> Result<Option<Subject>, RepositoryError> {
        self.inner.subject(id)
    }

    fn year(&self, id: &YearId) -> Result<Option<AcademicYear>, RepositoryError> {
        self.inner.year(id)
    }

    fn years(&self) -> Result<Vec<AcademicYear>, RepositoryError> {
        self.inner.years()
    }

    fn course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError> {
        self.inner.course(id)
    }

    fn courses_in_year(&self, year_id: &YearId) -> Result<Vec<Course>, RepositoryError> {
        self.inner.courses_in_year(year_id)
    }
}

impl GradeRepository for ContendedStore {
    fn fetch_grade(&self, key: &RecordKey) -> Result<Option<Versioned<GradeRecord>>, RepositoryError> {
        self.inner.fetch_grade(key)
    }

    fn store_grade(
        &self,
        _record: GradeRecord,
        _expected: Option<u64>,
    ) -> Result<u64, RepositoryError> {
        Err(RepositoryError::VersionConflict)
    }

    fn grades_for_student(
        &self,
        student_id: &StudentId,
        year_id: &YearId,
    ) -> Result<Vec<GradeRecord>, RepositoryError> {
        self.inner.grades_for_student(student_id, year_id)
    }
}

impl AttendanceRepository for ContendedStore {
    fn fetch_attendance(
        &self,
        key: &RecordKey,
    ) -> Result<Option<Versioned<AttendanceRecord>>, RepositoryError> {
        self.inner.fetch_attendance(key)
    }

    fn store_attendance(
        &self,
        record: AttendanceRecord,
        expected: Option<u64>,
    ) -> Result<u64, RepositoryError> {
        self.inner.store_attendance(record, expected)
    }

    fn attendance_for_student(
        &self,
        student_id: &StudentId,
        year_id: &YearId,
    ) -> Result<Vec<AttendanceRecord>, RepositoryError> {
        self.inner.attendance_for_student(student_id, year_id)
    }

    fn attendance_for_offering(
        &self,
        offering: &SubjectOffering,
    ) -> Result<Vec<AttendanceRecord>, RepositoryError> {
        self.inner.attendance_for_offering(offering)
    }

    fn working_days(
        &self,
        offering: &SubjectOffering,
        trimester: Trimester,
    ) -> Result<Option<i32>, RepositoryError> {
        self.inner.working_days(offering, trimester)
    }

    fn set_working_days(
        &self,
        offering: &SubjectOffering,
        trimester: Trimester,
        days: i32,
    ) -> Result<(), RepositoryError> {
        self.inner.set_working_days(offering, trimester, days)
    }
}
