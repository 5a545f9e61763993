use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};

use crate::workflows::promotion::{PromotionConfig, PromotionService};
use crate::workflows::records::domain::{
    AcademicYear, AttendanceRecord, Course, CourseId, Enrollment, EnrollmentId, EnrollmentKey,
    EnrollmentStatus, GradeRecord, PromotionDecision, RecordKey, Student, StudentId, Subject,
    SubjectId, SubjectOffering, Trimester, TrimesterAttendance, YearId,
};
use crate::workflows::records::grading::recompute_grade_record;
use crate::workflows::records::memory::MemoryStore;
use crate::workflows::records::repository::{
    AttendanceRepository, CatalogRepository, EnrollmentRepository, GradeRepository,
    PromotionCommit, RepositoryError, Versioned,
};
use crate::workflows::records::{
    GradebookConfig, GradebookService, PromotionWeighting, TrimesterAttendanceEntry,
    TrimesterGradeEntry,
};

pub(super) const CURRENT_YEAR: &str = "2024";
pub(super) const NEXT_YEAR: &str = "2025";
pub(super) const CURRENT_COURSE: &str = "grade-1-2024";
pub(super) const NEXT_COURSE: &str = "grade-2-2025";
pub(super) const SKIP_COURSE: &str = "grade-3-2025";

pub(super) fn year_id(id: &str) -> YearId {
    YearId::new(id)
}

pub(super) fn course_id(id: &str) -> CourseId {
    CourseId::new(id)
}

pub(super) fn student_id(id: &str) -> StudentId {
    StudentId::new(id)
}

pub(super) fn academic_year(id: &str, ordering: i32, active: bool) -> AcademicYear {
    AcademicYear {
        id: YearId::new(id),
        name: format!("School year {id}"),
        ordering,
        starts_on: NaiveDate::from_ymd_opt(ordering, 3, 1).expect("valid date"),
        ends_on: NaiveDate::from_ymd_opt(ordering, 12, 13).expect("valid date"),
        active,
    }
}

pub(super) fn course(id: &str, year: &str, ordering: u32, next: Option<&str>) -> Course {
    Course {
        id: CourseId::new(id),
        name: id.replace('-', " "),
        year_id: YearId::new(year),
        ordering,
        next_course: next.map(CourseId::new),
        subjects: vec![SubjectId::new("math"), SubjectId::new("lang")],
    }
}

/// Years 2024 and 2025, subjects, and the 2024 first-grade course without next-year courses.
pub(super) fn base_store(current_course: Course) -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store
        .insert_year(academic_year(CURRENT_YEAR, 2024, true))
        .expect("year stored");
    store
        .insert_year(academic_year(NEXT_YEAR, 2025, true))
        .expect("year stored");
    for (id, name) in [("math", "Mathematics"), ("lang", "Language")] {
        store
            .insert_subject(Subject {
                id: SubjectId::new(id),
                name: name.to_string(),
            })
            .expect("subject stored");
    }
    store.insert_course(current_course).expect("course stored");
    Arc::new(store)
}

/// Standard layout: first grade points at second grade, and a third-grade course exists
/// in the next year as well.
pub(super) fn school() -> Arc<MemoryStore> {
    let store = base_store(course(CURRENT_COURSE, CURRENT_YEAR, 1, Some(NEXT_COURSE)));
    store
        .insert_course(course(NEXT_COURSE, NEXT_YEAR, 2, None))
        .expect("course stored");
    store
        .insert_course(course(SKIP_COURSE, NEXT_YEAR, 3, None))
        .expect("course stored");
    store
}

pub(super) fn enroll_student(store: &MemoryStore, id: &str, name: &str) {
    store
        .insert_student(Student {
            id: StudentId::new(id),
            full_name: name.to_string(),
        })
        .expect("student stored");
    store
        .seed_enrollment(Enrollment {
            id: EnrollmentId(format!("seed-{id}")),
            key: current_enrollment(id),
            status: EnrollmentStatus::Active,
            created_at: Utc
                .with_ymd_and_hms(2024, 2, 20, 12, 0, 0)
                .single()
                .expect("valid timestamp"),
        })
        .expect("enrollment seeded");
}

pub(super) fn current_enrollment(student: &str) -> EnrollmentKey {
    EnrollmentKey {
        student_id: StudentId::new(student),
        year_id: YearId::new(CURRENT_YEAR),
        course_id: CourseId::new(CURRENT_COURSE),
    }
}

pub(super) fn next_enrollment(student: &str, course: &str) -> EnrollmentKey {
    EnrollmentKey {
        student_id: StudentId::new(student),
        year_id: YearId::new(NEXT_YEAR),
        course_id: CourseId::new(course),
    }
}

pub(super) fn offering(subject: &str) -> SubjectOffering {
    SubjectOffering {
        course_id: CourseId::new(CURRENT_COURSE),
        subject_id: SubjectId::new(subject),
        year_id: YearId::new(CURRENT_YEAR),
    }
}

/// Record the same average for every trimester of both subjects, plus full attendance
/// minus `unjustified` absences per trimester and subject over 20 working days.
pub(super) fn grade_student(store: &Arc<MemoryStore>, student: &str, average: f64, unjustified: i32) {
    let gradebook = GradebookService::new(
        Arc::clone(store),
        GradebookConfig::default(),
        PromotionWeighting::default(),
    );
    for subject in ["math", "lang"] {
        let key = RecordKey::new(StudentId::new(student), &offering(subject));
        for trimester in Trimester::ordered() {
            gradebook
                .record_trimester_grade(
                    &key,
                    trimester,
                    TrimesterGradeEntry {
                        average: Some(average),
                        justified_absences: 0,
                        unjustified_absences: unjustified,
                    },
                )
                .expect("grade stored");
            gradebook
                .record_trimester_attendance(
                    &key,
                    trimester,
                    TrimesterAttendanceEntry {
                        justified_absences: 0,
                        unjustified_absences: unjustified,
                        working_days: Some(20),
                    },
                )
                .expect("attendance stored");
        }
    }
}

pub(super) fn graded(subject: &str, averages: [Option<f64>; 3]) -> GradeRecord {
    let mut record = GradeRecord::new(RecordKey::new(StudentId::new("s-1"), &offering(subject)));
    for (trimester, average) in Trimester::ordered().into_iter().zip(averages) {
        record.trimesters.get_mut(trimester).average = average;
    }
    recompute_grade_record(record)
}

pub(super) fn attended(subject: &str, unjustified_per_trimester: i32, working_days: i32) -> AttendanceRecord {
    let mut record = AttendanceRecord::new(RecordKey::new(StudentId::new("s-1"), &offering(subject)));
    for trimester in Trimester::ordered() {
        *record.trimesters.get_mut(trimester) = TrimesterAttendance {
            justified_absences: 0,
            unjustified_absences: unjustified_per_trimester,
            working_days,
        };
    }
    record
}

pub(super) fn service<S>(store: Arc<S>) -> PromotionService<S>
where
    S: CatalogRepository + GradeRepository + AttendanceRepository + EnrollmentRepository,
{
    PromotionService::new(store, PromotionConfig::default()).expect("default config is valid")
}

/// Delegates to a real store, with knobs for the failures the promotion paths must survive.
pub(super) struct ScriptedStore {
    pub inner: Arc<MemoryStore>,
    pub fail_commits: bool,
    /// Answer every enrollment lookup with `None`, as a reader racing another writer would.
    pub stale_enrollment_reads: bool,
    /// 1-based call number of `courses_in_year` that answers with no courses.
    pub empty_course_listing_on_call: Option<usize>,
    course_listings: AtomicUsize,
}

impl ScriptedStore {
    pub fn failing_commits(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_commits: true,
            stale_enrollment_reads: false,
            empty_course_listing_on_call: None,
            course_listings: AtomicUsize::new(0),
        }
    }

    pub fn empty_course_listing_on_call(inner: Arc<MemoryStore>, call: usize) -> Self {
        Self {
            inner,
            fail_commits: false,
            stale_enrollment_reads: false,
            empty_course_listing_on_call: Some(call),
            course_listings: AtomicUsize::new(0),
        }
    }

    pub fn stale_enrollment_reads(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_commits: false,
            stale_enrollment_reads: true,
            empty_course_listing_on_call: None,
            course_listings: AtomicUsize::new(0),
        }
    }
}

impl CatalogRepository for ScriptedStore {
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
        let call = self.course_listings.fetch_add(1, Ordering::SeqCst) + 1;
        if self.empty_course_listing_on_call == Some(call) {
            return Ok(Vec::new());
        }
        self.inner.courses_in_year(year_id)
    }
}

impl GradeRepository for ScriptedStore {
    fn fetch_grade(&self, key: &RecordKey) -> Result<Option<Versioned<GradeRecord>>, RepositoryError> {
        self.inner.fetch_grade(key)
    }

    fn store_grade(
        &self,
        record: GradeRecord,
        expected: Option<u64>,
    ) -> Result<u64, RepositoryError> {
        self.inner.store_grade(record, expected)
    }

    fn grades_for_student(
        &self,
        student_id: &StudentId,
        year_id: &YearId,
    ) -> Result<Vec<GradeRecord>, RepositoryError> {
        self.inner.grades_for_student(student_id, year_id)
    }
}

impl AttendanceRepository for ScriptedStore {
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

impl EnrollmentRepository for ScriptedStore {
    fn fetch_enrollment(&self, key: &EnrollmentKey) -> Result<Option<Enrollment>, RepositoryError> {
        if self.stale_enrollment_reads {
            return Ok(None);
        }
        self.inner.fetch_enrollment(key)
    }

    fn enrollments_in(
        &self,
        year_id: &YearId,
        course_id: &CourseId,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        self.inner.enrollments_in(year_id, course_id)
    }

    fn update_enrollment_status(
        &self,
        key: &EnrollmentKey,
        status: EnrollmentStatus,
    ) -> Result<Enrollment, RepositoryError> {
        self.inner.update_enrollment_status(key, status)
    }

    fn commit_promotion(&self, commit: PromotionCommit) -> Result<(), RepositoryError> {
        if self.fail_commits {
            return Err(RepositoryError::Unavailable(
                "transaction aborted by primary failover".to_string(),
            ));
        }
        self.inner.commit_promotion(commit)
    }

    fn decisions_for_year(
        &self,
        year_from: &YearId,
    ) -> Result<Vec<PromotionDecision>, RepositoryError> {
        self.inner.decisions_for_year(year_from)
    }
}
