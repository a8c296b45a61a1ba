use indexmap::IndexMap;
use serde::Serialize;

use crate::ingest::UploadPayload;

/// 1-decimal rounding used everywhere a mark average is displayed:
/// `Int(10*x + 0.5) / 10`
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// Mean of the non-null current scores per subject, in subject order.
/// `None` when no student has a mark for that subject.
pub fn subject_averages(payload: &UploadPayload) -> IndexMap<String, Option<f64>> {
    let mut averages = IndexMap::new();
    for subject in &payload.meta.subjects {
        let vals: Vec<f64> = payload
            .records
            .iter()
            .filter_map(|r| r.scores.get(subject).and_then(|s| s.current))
            .collect();
        let avg = if vals.is_empty() {
            None
        } else {
            Some(round_off_1_decimal(
                vals.iter().sum::<f64>() / vals.len() as f64,
            ))
        };
        averages.insert(subject.clone(), avg);
    }
    averages
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub name: String,
    pub total_current: f64,
    pub total_previous: Option<f64>,
    pub delta: Option<f64>,
}

/// Compact per-student rows for the summary request, capped so a large class
/// list cannot blow up the outbound payload.
pub fn student_summaries(payload: &UploadPayload, cap: usize) -> Vec<StudentSummary> {
    payload
        .records
        .iter()
        .take(cap)
        .map(|r| StudentSummary {
            name: r.name.clone(),
            total_current: r.total_current,
            total_previous: r.total_previous,
            delta: r.delta,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPassStats {
    pub subject: String,
    pub attempted: usize,
    pub passed: usize,
}

/// Per-subject attempted/passed counts against the exam's passing mark.
/// Empty when no passing mark was supplied.
pub fn pass_stats(payload: &UploadPayload) -> Vec<SubjectPassStats> {
    let Some(passing) = payload.meta.passing_marks.filter(|p| *p > 0) else {
        return Vec::new();
    };
    let passing = passing as f64;

    payload
        .meta
        .subjects
        .iter()
        .map(|subject| {
            let mut attempted = 0;
            let mut passed = 0;
            for r in &payload.records {
                if let Some(v) = r.scores.get(subject).and_then(|s| s.current) {
                    attempted += 1;
                    if v >= passing {
                        passed += 1;
                    }
                }
            }
            SubjectPassStats {
                subject: subject.clone(),
                attempted,
                passed,
            }
        })
        .collect()
}
