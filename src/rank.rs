use std::collections::BTreeMap;

use crate::models::{RankedResult, StudentAggregate};

/// Dense competition ranking of one grade cohort, descending by average
/// score. Tied averages share a rank; the next distinct score takes its
/// 1-based position (90, 90, 80 ranks as 1, 1, 3). Ties order by ascending
/// student id so output is deterministic.
pub fn rank_cohort(mut cohort: Vec<StudentAggregate>) -> Vec<RankedResult> {
    cohort.sort_by(|a, b| {
        b.average_score
            .partial_cmp(&a.average_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.student_id.cmp(&b.student_id))
    });

    let mut ranked = Vec::with_capacity(cohort.len());
    let mut current_rank = 1i64;
    let mut prev_score: Option<f64> = None;

    for (position, student) in cohort.into_iter().enumerate() {
        if prev_score != Some(student.average_score) {
            current_rank = position as i64 + 1;
        }
        prev_score = Some(student.average_score);
        ranked.push(RankedResult {
            student_id: student.student_id,
            grade_id: student.grade_id,
            total_marks: student.total_marks,
            average_score: student.average_score,
            grade_rank: current_rank,
        });
    }

    ranked
}

/// Splits computed results into per-grade cohorts and ranks each one.
pub fn rank_by_grade(results: Vec<StudentAggregate>) -> Vec<RankedResult> {
    let mut by_grade: BTreeMap<i64, Vec<StudentAggregate>> = BTreeMap::new();
    for result in results {
        by_grade.entry(result.grade_id).or_default().push(result);
    }
    by_grade.into_values().flat_map(rank_cohort).collect()
}
