use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

record_id!(
    /// Identifier wrapper for enrolled students.
    StudentId
);
record_id!(
    /// Identifier wrapper for courses (a grade level within one academic year).
    CourseId
);
record_id!(SubjectId);
record_id!(
    /// Identifier wrapper for academic years.
    YearId
);
record_id!(EnrollmentId);
record_id!(
    /// Identifier for an immutable promotion audit entry.
    DecisionId
);

/// One of the three fixed grading periods of an academic year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Trimester {
    T1,
    T2,
    T3,
}

impl Trimester {
    pub const fn ordered() -> [Self; 3] {
        [Self::T1, Self::T2, Self::T3]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::T1 => "T1",
            Self::T2 => "T2",
            Self::T3 => "T3",
        }
    }
}

impl fmt::Display for Trimester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fixed three-slot container keyed by trimester.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimesterMap<T> {
    #[serde(rename = "T1")]
    pub t1: T,
    #[serde(rename = "T2")]
    pub t2: T,
    #[serde(rename = "T3")]
    pub t3: T,
}

impl<T> TrimesterMap<T> {
    pub fn get(&self, trimester: Trimester) -> &T {
        match trimester {
            Trimester::T1 => &self.t1,
            Trimester::T2 => &self.t2,
            Trimester::T3 => &self.t3,
        }
    }

    pub fn get_mut(&mut self, trimester: Trimester) -> &mut T {
        match trimester {
            Trimester::T1 => &mut self.t1,
            Trimester::T2 => &mut self.t2,
            Trimester::T3 => &mut self.t3,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Trimester, &T)> {
        Trimester::ordered()
            .into_iter()
            .map(move |trimester| (trimester, self.get(trimester)))
    }

    pub fn values_mut(&mut self) -> [&mut T; 3] {
        [&mut self.t1, &mut self.t2, &mut self.t3]
    }
}

/// Letter band derived from a numeric trimester average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualitativeBand {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C-")]
    CMinus,
    D,
    E,
}

impl QualitativeBand {
    pub const fn label(self) -> &'static str {
        match self {
            Self::APlus => "A+",
            Self::AMinus => "A-",
            Self::BPlus => "B+",
            Self::BMinus => "B-",
            Self::CPlus => "C+",
            Self::CMinus => "C-",
            Self::D => "D",
            Self::E => "E",
        }
    }
}

impl fmt::Display for QualitativeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identity of a subject taught in one course during one academic year.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectOffering {
    pub course_id: CourseId,
    pub subject_id: SubjectId,
    pub year_id: YearId,
}

/// Unique identity shared by grade and attendance records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub student_id: StudentId,
    pub course_id: CourseId,
    pub subject_id: SubjectId,
    pub year_id: YearId,
}

impl RecordKey {
    pub fn new(student_id: StudentId, offering: &SubjectOffering) -> Self {
        Self {
            student_id,
            course_id: offering.course_id.clone(),
            subject_id: offering.subject_id.clone(),
            year_id: offering.year_id.clone(),
        }
    }

    pub fn offering(&self) -> SubjectOffering {
        SubjectOffering {
            course_id: self.course_id.clone(),
            subject_id: self.subject_id.clone(),
            year_id: self.year_id.clone(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.student_id, self.course_id, self.subject_id, self.year_id
        )
    }
}

/// Values entered for a single trimester plus its derived band.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrimesterGrade {
    pub average: Option<f64>,
    pub justified_absences: i32,
    pub unjustified_absences: i32,
    pub band: Option<QualitativeBand>,
}

/// Aggregate-of-trimesters grade record. Derived fields are owned by the grade aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub key: RecordKey,
    pub trimesters: TrimesterMap<TrimesterGrade>,
    pub annual_average: Option<f64>,
    pub final_evaluation: Option<f64>,
    pub promotion_score: Option<f64>,
}

impl GradeRecord {
    pub fn new(key: RecordKey) -> Self {
        Self {
            key,
            trimesters: TrimesterMap::default(),
            annual_average: None,
            final_evaluation: None,
            promotion_score: None,
        }
    }

    pub fn present_averages(&self) -> impl Iterator<Item = (Trimester, f64)> + '_ {
        self.trimesters
            .iter()
            .filter_map(|(trimester, grade)| grade.average.map(|average| (trimester, average)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimesterAttendance {
    pub justified_absences: i32,
    pub unjustified_absences: i32,
    pub working_days: i32,
}

/// Aggregate-of-trimesters attendance record for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub key: RecordKey,
    pub trimesters: TrimesterMap<TrimesterAttendance>,
}

impl AttendanceRecord {
    pub fn new(key: RecordKey) -> Self {
        Self {
            key,
            trimesters: TrimesterMap::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
}

/// Academic year ordered by `ordering`; only active years receive promotions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcademicYear {
    pub id: YearId,
    pub name: String,
    pub ordering: i32,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Grade level offered in a specific academic year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    pub year_id: YearId,
    pub ordering: u32,
    #[serde(default)]
    pub next_course: Option<CourseId>,
    #[serde(default)]
    pub subjects: Vec<SubjectId>,
}

/// Promotion only ever moves a source enrollment to `Passed`. A student who does not pass keeps
/// `Active` so a later run can re-evaluate them; `Failed` is set by the school (or a snapshot)
/// to close the year, and such enrollments are skipped by batch promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Withdrawn,
    Passed,
    Failed,
}

impl EnrollmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Withdrawn => "withdrawn",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

/// Idempotence key for enrollments: a student is registered at most once per course and year.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnrollmentKey {
    pub student_id: StudentId,
    pub year_id: YearId,
    pub course_id: CourseId,
}

impl fmt::Display for EnrollmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.student_id, self.year_id, self.course_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub key: EnrollmentKey,
    pub status: EnrollmentStatus,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit entry written alongside a promotion enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionDecision {
    pub id: DecisionId,
    pub student_id: StudentId,
    pub year_from: YearId,
    pub course_from: CourseId,
    pub year_to: YearId,
    pub course_to: CourseId,
    pub final_average: Option<f64>,
    pub attendance_ratio: Option<f64>,
    /// Always true today: decisions are only recorded for created enrollments.
    pub passed: bool,
    pub created_at: DateTime<Utc>,
}
