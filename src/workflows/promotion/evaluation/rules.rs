use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::config::PromotionConfig;
use crate::workflows::records::domain::{GradeRecord, SubjectId, Trimester};
use crate::workflows::records::grading::{mean, round_half_up};

/// Per-subject average that contributed to the final average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectAverage {
    pub subject_id: SubjectId,
    pub average: f64,
    pub trimesters_used: usize,
}

/// Subject left out of the final average, with how many trimesters it had.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExcludedSubject {
    pub subject_id: SubjectId,
    pub trimesters_present: usize,
}

pub(crate) struct GradeSignals {
    pub subjects: Vec<SubjectAverage>,
    pub excluded: Vec<ExcludedSubject>,
    pub final_average: Option<f64>,
    pub failed_subjects: usize,
}

pub(crate) fn grade_signals(grades: &[GradeRecord], config: &PromotionConfig) -> GradeSignals {
    let mut by_subject: BTreeMap<&SubjectId, Vec<(Trimester, f64)>> = BTreeMap::new();
    for record in grades {
        by_subject
            .entry(&record.key.subject_id)
            .or_default()
            .extend(record.present_averages());
    }

    let mut subjects = Vec::new();
    let mut excluded = Vec::new();
    for (subject_id, entries) in by_subject {
        let covered = Trimester::ordered()
            .into_iter()
            .filter(|trimester| entries.iter().any(|(present, _)| present == trimester))
            .count();
        let values: Vec<f64> = entries.iter().map(|(_, value)| *value).collect();

        let usable = !values.is_empty()
            && (!config.require_all_trimesters || covered == Trimester::ordered().len());
        match mean(&values).filter(|_| usable) {
            Some(average) => subjects.push(SubjectAverage {
                subject_id: subject_id.clone(),
                average: round_half_up(average, config.subject_average_precision),
                trimesters_used: values.len(),
            }),
            None => excluded.push(ExcludedSubject {
                subject_id: subject_id.clone(),
                trimesters_present: covered,
            }),
        }
    }

    let per_subject: Vec<f64> = subjects.iter().map(|subject| subject.average).collect();
    let final_average =
        mean(&per_subject).map(|value| round_half_up(value, config.final_average_precision));
    let failed_subjects = subjects
        .iter()
        .filter(|subject| subject.average < config.minimum_passing_average)
        .count();

    GradeSignals {
        subjects,
        excluded,
        final_average,
        failed_subjects,
    }
}

/// Percentage of working days missed without justification, rounded to two places.
pub(crate) fn absence_percentage(attendance_ratio: f64) -> f64 {
    round_half_up((1.0 - attendance_ratio).max(0.0) * 100.0, 2)
}
