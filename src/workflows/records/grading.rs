use serde::{Deserialize, Serialize};

use super::domain::{GradeRecord, QualitativeBand, TrimesterGrade};

pub const MIN_GRADE: f64 = 0.0;
pub const MAX_GRADE: f64 = 10.0;

/// Decimal places kept on derived grade fields.
pub const DERIVED_PRECISION: u32 = 2;

/// Lower bounds evaluated high-to-low; the first bound at or below the average wins.
const BANDS: [(f64, QualitativeBand); 8] = [
    (9.5, QualitativeBand::APlus),
    (9.0, QualitativeBand::AMinus),
    (8.5, QualitativeBand::BPlus),
    (8.0, QualitativeBand::BMinus),
    (7.0, QualitativeBand::CPlus),
    (6.0, QualitativeBand::CMinus),
    (4.0, QualitativeBand::D),
    (0.0, QualitativeBand::E),
];

/// Weights applied when blending the annual average with the final evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PromotionWeighting {
    pub annual: f64,
    pub final_evaluation: f64,
}

impl Default for PromotionWeighting {
    fn default() -> Self {
        Self {
            annual: 0.9,
            final_evaluation: 0.1,
        }
    }
}

/// Pure recomputation of every derived field on a [`GradeRecord`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GradeAggregator {
    weighting: PromotionWeighting,
}

impl GradeAggregator {
    pub fn new(weighting: PromotionWeighting) -> Self {
        Self { weighting }
    }

    pub fn weighting(&self) -> PromotionWeighting {
        self.weighting
    }

    pub fn recompute(&self, mut record: GradeRecord) -> GradeRecord {
        for grade in record.trimesters.values_mut() {
            normalize_trimester(grade);
        }

        let present: Vec<f64> = record.present_averages().map(|(_, value)| value).collect();
        record.annual_average = mean(&present).map(|value| round_half_up(value, DERIVED_PRECISION));
        record.final_evaluation = clamp_grade(record.final_evaluation);

        record.promotion_score = match (record.annual_average, record.final_evaluation) {
            (Some(annual), Some(final_evaluation)) => Some(round_half_up(
                annual * self.weighting.annual + final_evaluation * self.weighting.final_evaluation,
                DERIVED_PRECISION,
            )),
            (Some(annual), None) => Some(annual),
            _ => None,
        };

        record
    }
}

/// Recompute derived fields with the default 90/10 weighting.
pub fn recompute_grade_record(record: GradeRecord) -> GradeRecord {
    GradeAggregator::default().recompute(record)
}

fn normalize_trimester(grade: &mut TrimesterGrade) {
    grade.average = clamp_grade(grade.average);
    grade.justified_absences = grade.justified_absences.max(0);
    grade.unjustified_absences = grade.unjustified_absences.max(0);
    grade.band = grade.average.map(qualitative_band);
}

/// Clamp into `[0, 10]`; non-finite input is treated as missing.
pub fn clamp_grade(value: Option<f64>) -> Option<f64> {
    value
        .filter(|value| value.is_finite())
        .map(|value| value.clamp(MIN_GRADE, MAX_GRADE))
}

pub fn qualitative_band(average: f64) -> QualitativeBand {
    let average = average.clamp(MIN_GRADE, MAX_GRADE);
    BANDS
        .iter()
        .find(|(lower, _)| average >= *lower)
        .map(|(_, band)| *band)
        .unwrap_or(QualitativeBand::E)
}

/// Half-up rounding for non-negative values. The nudge absorbs binary representation error
/// so that e.g. 8.675 rounds to 8.68.
pub fn round_half_up(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    let scaled = value * factor;
    let rounded = if scaled >= 0.0 {
        (scaled + 0.5 + 1e-9).floor()
    } else {
        -(-scaled + 0.5 + 1e-9).floor()
    };
    rounded / factor
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
