//! End-to-end year-close scenarios driven through the public gradebook and promotion facades.

mod common {
    use std::sync::Arc;

    use chrono::{NaiveDate, TimeZone, Utc};

    use academic_records::workflows::records::{
        AcademicYear, Course, CourseId, Enrollment, EnrollmentId, EnrollmentKey,
        EnrollmentStatus, GradebookConfig, GradebookService, MemoryStore, PromotionWeighting,
        Student, StudentId, Subject, SubjectId, SubjectOffering, YearId,
    };

    pub(super) fn year(id: &str, ordering: i32) -> AcademicYear {
        AcademicYear {
            id: YearId::new(id),
            name: format!("Year {id}"),
            ordering,
            starts_on: NaiveDate::from_ymd_opt(ordering, 3, 4).expect("valid date"),
            ends_on: NaiveDate::from_ymd_opt(ordering, 12, 6).expect("valid date"),
            active: true,
        }
    }

    pub(super) fn offering(subject: &str) -> SubjectOffering {
        SubjectOffering {
            course_id: CourseId::new("fifth-2024"),
            subject_id: SubjectId::new(subject),
            year_id: YearId::new("2024"),
        }
    }

    pub(super) fn school(students: &[&str]) -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store.insert_year(year("2024", 2024)).expect("year stored");
        store.insert_year(year("2025", 2025)).expect("year stored");
        for subject in ["history", "science"] {
            store
                .insert_subject(Subject {
                    id: SubjectId::new(subject),
                    name: subject.to_string(),
                })
                .expect("subject stored");
        }
        store
            .insert_course(Course {
                id: CourseId::new("fifth-2024"),
                name: "Fifth grade".to_string(),
                year_id: YearId::new("2024"),
                ordering: 5,
                next_course: None,
                subjects: vec![SubjectId::new("history"), SubjectId::new("science")],
            })
            .expect("course stored");
        store
            .insert_course(Course {
                id: CourseId::new("sixth-2025"),
                name: "Sixth grade".to_string(),
                year_id: YearId::new("2025"),
                ordering: 6,
                next_course: None,
                subjects: vec![SubjectId::new("history"), SubjectId::new("science")],
            })
            .expect("course stored");
        for id in students {
            store
                .insert_student(Student {
                    id: StudentId::new(*id),
                    full_name: format!("Student {id}"),
                })
                .expect("student stored");
            store
                .seed_enrollment(Enrollment {
                    id: EnrollmentId(format!("seed-{id}")),
                    key: EnrollmentKey {
                        student_id: StudentId::new(*id),
                        year_id: YearId::new("2024"),
                        course_id: CourseId::new("fifth-2024"),
                    },
                    status: EnrollmentStatus::Active,
                    created_at: Utc
                        .with_ymd_and_hms(2024, 3, 1, 8, 0, 0)
                        .single()
                        .expect("valid timestamp"),
                })
                .expect("enrollment seeded");
        }
        Arc::new(store)
    }

    pub(super) fn gradebook(store: &Arc<MemoryStore>) -> GradebookService<MemoryStore> {
        GradebookService::new(
            Arc::clone(store),
            GradebookConfig::default(),
            PromotionWeighting::default(),
        )
    }
}

use std::sync::Arc;

use academic_records::workflows::promotion::{
    PromotionConfig, PromotionOutcome, PromotionRejection, PromotionService,
};
use academic_records::workflows::records::{
    CourseId, EnrollmentKey, EnrollmentRepository, RecordKey, StudentId, Trimester,
    TrimesterAttendanceEntry, TrimesterGradeEntry, YearId,
};
use common::*;

fn grade(average: f64) -> TrimesterGradeEntry {
    TrimesterGradeEntry {
        average: Some(average),
        justified_absences: 0,
        unjustified_absences: 0,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn year_close_promotes_passing_students_once() {
    let store = school(&["ana", "bruno", "carla"]);
    let gradebook = gradebook(&store);

    for subject in ["history", "science"] {
        for trimester in Trimester::ordered() {
            gradebook
                .record_trimester_grades_bulk(
                    &offering(subject),
                    trimester,
                    vec![
                        (StudentId::new("ana"), grade(8.2)),
                        (StudentId::new("bruno"), grade(6.1)),
                        (StudentId::new("carla"), grade(7.4)),
                    ],
                )
                .expect("bulk grades stored");
            gradebook
                .set_working_days(&offering(subject), trimester, 50)
                .expect("calendar stored");
        }
        gradebook
            .record_trimester_absences_bulk(
                &offering(subject),
                Trimester::T2,
                vec![
                    (
                        StudentId::new("carla"),
                        TrimesterAttendanceEntry {
                            justified_absences: 10,
                            unjustified_absences: 15,
                            working_days: None,
                        },
                    ),
                    (
                        StudentId::new("ana"),
                        TrimesterAttendanceEntry {
                            justified_absences: 2,
                            unjustified_absences: 1,
                            working_days: None,
                        },
                    ),
                ],
            )
            .expect("absences stored");
    }

    let ana_history = gradebook
        .attendance_record(&RecordKey::new(StudentId::new("ana"), &offering("history")))
        .expect("read succeeds")
        .expect("attendance present");
    assert_eq!(ana_history.trimesters.get(Trimester::T2).working_days, 50);

    let service = PromotionService::new(store.clone(), PromotionConfig::default())
        .expect("default config is valid");
    let report = service
        .promote_all(&YearId::new("2024"), &CourseId::new("fifth-2024"))
        .await
        .expect("batch runs");

    assert_eq!(report.created, 1);
    assert_eq!(report.not_passed, 2);

    let retry = service
        .promote(
            &StudentId::new("ana"),
            &YearId::new("2024"),
            &CourseId::new("fifth-2024"),
        )
        .expect("retry runs");
    assert_eq!(
        retry,
        PromotionOutcome::AlreadyEnrolled {
            enrollment: EnrollmentKey {
                student_id: StudentId::new("ana"),
                year_id: YearId::new("2025"),
                course_id: CourseId::new("sixth-2025"),
            },
        }
    );

    let carla = service
        .evaluator()
        .evaluate(&StudentId::new("carla"), &YearId::new("2024"))
        .expect("evaluation runs");
    assert!(!carla.passed);
    assert_eq!(carla.final_average, Some(7.4));
    assert_eq!(carla.attendance_ratio, Some(0.7));

    let sixth = store
        .enrollments_in(&YearId::new("2025"), &CourseId::new("sixth-2025"))
        .expect("enrollments readable");
    assert_eq!(sixth.len(), 1);
    assert_eq!(
        service
            .decisions_for_year(&YearId::new("2024"))
            .expect("decisions readable")
            .len(),
        1
    );
}

#[test]
fn final_year_students_have_nowhere_to_go() {
    let store = school(&["dario"]);
    let gradebook = gradebook(&store);
    let key = RecordKey::new(StudentId::new("dario"), &offering("science"));
    for trimester in Trimester::ordered() {
        gradebook
            .record_trimester_grade(&key, trimester, grade(9.0))
            .expect("grade stored");
    }
    store
        .insert_year(academic_records::workflows::records::AcademicYear {
            active: false,
            ..year("2025", 2025)
        })
        .expect("year replaced");

    let service = PromotionService::new(Arc::clone(&store), PromotionConfig::default())
        .expect("default config is valid");
    let outcome = service
        .promote(
            &StudentId::new("dario"),
            &YearId::new("2024"),
            &CourseId::new("fifth-2024"),
        )
        .expect("promotion runs");

    assert_eq!(outcome, PromotionOutcome::Rejected(PromotionRejection::NoNextYear));
    assert_eq!(outcome.summary(), "no later academic year is configured");
}
