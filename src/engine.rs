use std::collections::HashMap;

use anyhow::Context;
use sqlx::SqlitePool;
use tracing::info;

use crate::aggregate;
use crate::db;
use crate::models::{ExamKind, ExamRecord, ScoreEntry, StudentAggregate};
use crate::rank;

/// What to do when exams of kind `other` sit inside a computation scope.
/// They never contribute marks either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnclassifiedExamPolicy {
    /// Log the exclusion and carry on.
    Lenient,
    /// Fail the run, naming the offending exams.
    Strict,
}

/// Computes, ranks and stores semester results for every student enrolled in
/// the academic year. Idempotent: rerunning with unchanged inputs overwrites
/// each row with identical values. Returns the number of students processed.
pub async fn compute_semester_results(
    pool: &SqlitePool,
    academic_year_id: i64,
    semester_id: i64,
    policy: UnclassifiedExamPolicy,
) -> anyhow::Result<usize> {
    let students = db::fetch_enrolled_students(pool, academic_year_id).await?;
    if students.is_empty() {
        info!(academic_year_id, "no students enrolled; nothing to compute");
        return Ok(0);
    }

    let exams = db::fetch_exams(pool, academic_year_id, Some(semester_id)).await?;
    let unclassified: Vec<&ExamRecord> =
        exams.iter().filter(|e| e.kind == ExamKind::Other).collect();
    if !unclassified.is_empty() {
        let names: Vec<&str> = unclassified.iter().map(|e| e.name.as_str()).collect();
        match policy {
            UnclassifiedExamPolicy::Strict => anyhow::bail!(
                "exams without a semester/CAT kind in scope: {}",
                names.join(", ")
            ),
            UnclassifiedExamPolicy::Lenient => {
                info!(exams = %names.join(", "), "excluding unclassified exams")
            }
        }
    }

    let graded_exams: HashMap<i64, ExamRecord> = exams
        .into_iter()
        .filter(|e| e.kind != ExamKind::Other)
        .map(|e| (e.id, e))
        .collect();
    if graded_exams.is_empty() {
        info!(
            academic_year_id,
            semester_id, "no semester or CAT exams in scope; nothing to compute"
        );
        return Ok(0);
    }

    let entries = db::fetch_score_entries(pool, academic_year_id, semester_id).await?;
    let mut entries_by_student: HashMap<i64, Vec<&ScoreEntry>> = HashMap::new();
    for entry in &entries {
        entries_by_student.entry(entry.student_id).or_default().push(entry);
    }

    let mut aggregates = Vec::new();
    for student in &students {
        let Some(student_entries) = entries_by_student.get(&student.student_id) else {
            info!(student_id = student.student_id, "no score entries; skipping");
            continue;
        };
        let subjects = aggregate::collect_subject_scores(student_entries, &graded_exams);
        let Some(totals) = aggregate::semester_totals(&subjects) else {
            info!(
                student_id = student.student_id,
                "no subject contributed; skipping"
            );
            continue;
        };
        info!(
            student_id = student.student_id,
            total_marks = totals.total_marks,
            average_score = totals.average_score,
            subjects = totals.subjects_counted,
            "semester totals computed"
        );
        aggregates.push(StudentAggregate {
            student_id: student.student_id,
            grade_id: student.grade_id,
            total_marks: totals.total_marks,
            average_score: totals.average_score,
        });
    }

    let ranked = rank::rank_by_grade(aggregates);
    for result in &ranked {
        db::upsert_semester_result(
            pool,
            result.student_id,
            semester_id,
            academic_year_id,
            result.total_marks,
            result.average_score,
            result.grade_rank,
        )
        .await
        .with_context(|| {
            format!(
                "failed to store semester result for student {} in grade {}",
                result.student_id, result.grade_id
            )
        })?;
    }

    Ok(ranked.len())
}

/// Rolls the year's stored semester results up into yearly results, one per
/// student, ranked within each grade. Idempotent like the semester run.
pub async fn compute_yearly_results(
    pool: &SqlitePool,
    academic_year_id: i64,
) -> anyhow::Result<usize> {
    let semester_rows = db::fetch_semester_result_rows(pool, academic_year_id).await?;
    if semester_rows.is_empty() {
        info!(
            academic_year_id,
            "no semester results for this year; nothing to compute"
        );
        return Ok(0);
    }

    let mut per_student: HashMap<i64, (i64, Vec<(f64, f64)>)> = HashMap::new();
    for row in &semester_rows {
        per_student
            .entry(row.student_id)
            .or_insert_with(|| (row.grade_id, Vec::new()))
            .1
            .push((row.total_marks, row.average_score));
    }

    let mut aggregates = Vec::new();
    for (student_id, (grade_id, semesters)) in per_student {
        let Some((total_marks, average_score)) = aggregate::yearly_totals(&semesters) else {
            continue;
        };
        aggregates.push(StudentAggregate {
            student_id,
            grade_id,
            total_marks,
            average_score,
        });
    }

    let ranked = rank::rank_by_grade(aggregates);
    for result in &ranked {
        db::upsert_yearly_result(
            pool,
            result.student_id,
            academic_year_id,
            result.total_marks,
            result.average_score,
            result.grade_rank,
        )
        .await
        .with_context(|| {
            format!(
                "failed to store yearly result for student {} in grade {}",
                result.student_id, result.grade_id
            )
        })?;
    }

    Ok(ranked.len())
}
