use serde::{Deserialize, Serialize};

use super::domain::{AttendanceRecord, Trimester};

/// Summed absence and working-day counts across a set of attendance records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceTotals {
    pub justified_absences: i64,
    pub unjustified_absences: i64,
    pub working_days: i64,
}

impl AttendanceTotals {
    /// Days counted as attended. Justified absences never count against the student.
    pub fn attended_days(&self) -> i64 {
        (self.working_days - self.unjustified_absences).max(0)
    }

    /// `None` when no working days were recorded; a ratio cannot be judged without data.
    pub fn ratio(&self) -> Option<f64> {
        if self.working_days <= 0 {
            return None;
        }
        Some(self.attended_days() as f64 / self.working_days as f64)
    }
}

pub fn attendance_totals(records: &[AttendanceRecord]) -> AttendanceTotals {
    let mut totals = AttendanceTotals::default();
    for record in records {
        for (_, trimester) in record.trimesters.iter() {
            totals.justified_absences += i64::from(trimester.justified_absences.max(0));
            totals.unjustified_absences += i64::from(trimester.unjustified_absences.max(0));
            totals.working_days += i64::from(trimester.working_days.max(0));
        }
    }
    totals
}

/// Totals restricted to one trimester, used for per-period summaries.
pub fn trimester_totals(records: &[AttendanceRecord], trimester: Trimester) -> AttendanceTotals {
    records
        .iter()
        .map(|record| record.trimesters.get(trimester))
        .fold(AttendanceTotals::default(), |mut totals, entry| {
            totals.justified_absences += i64::from(entry.justified_absences.max(0));
            totals.unjustified_absences += i64::from(entry.unjustified_absences.max(0));
            totals.working_days += i64::from(entry.working_days.max(0));
            totals
        })
}

/// Annual attendance ratio in `[0, 1]` across the supplied subject records.
pub fn recompute_attendance_ratio(records: &[AttendanceRecord]) -> Option<f64> {
    attendance_totals(records).ratio()
}

/// Clamp every count on the record to zero or above.
pub fn normalize_attendance_record(mut record: AttendanceRecord) -> AttendanceRecord {
    for trimester in record.trimesters.values_mut() {
        trimester.justified_absences = trimester.justified_absences.max(0);
        trimester.unjustified_absences = trimester.unjustified_absences.max(0);
        trimester.working_days = trimester.working_days.max(0);
    }
    record
}
