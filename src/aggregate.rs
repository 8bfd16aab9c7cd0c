use std::collections::{BTreeMap, HashMap};

use crate::models::{ExamKind, ExamRecord, ScoreEntry};

/// Scores recorded for one student in one subject within a semester scope.
#[derive(Debug, Clone, Default)]
pub struct SubjectScores {
    /// The semester exam entry as (marks, max_marks). If several semester
    /// exams carry entries for the subject, the one with the lowest exam id
    /// wins.
    pub semester: Option<(f64, f64)>,
    /// All CAT entries as (marks, max_marks).
    pub cats: Vec<(f64, f64)>,
}

impl SubjectScores {
    /// The subject's (achieved, possible) contribution: semester exam marks
    /// plus the mean of CAT marks. A subject with possible == 0 has nothing
    /// recorded and drops out of the semester total entirely.
    pub fn contribution(&self) -> Option<(f64, f64)> {
        let (semester_score, semester_max) = self.semester.unwrap_or((0.0, 0.0));

        let (cat_avg_score, cat_avg_max) = if self.cats.is_empty() {
            (0.0, 0.0)
        } else {
            let count = self.cats.len() as f64;
            let score_sum: f64 = self.cats.iter().map(|(marks, _)| marks).sum();
            let max_sum: f64 = self.cats.iter().map(|(_, max)| max).sum();
            (score_sum / count, max_sum / count)
        };

        let achieved = semester_score + cat_avg_score;
        let possible = semester_max + cat_avg_max;

        if possible > 0.0 {
            Some((achieved, possible))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct SemesterTotals {
    pub total_marks: f64,
    pub average_score: f64,
    pub subjects_counted: usize,
}

/// Groups one student's score entries by subject, pairing each entry with its
/// exam. Entries against exams outside the map (unknown or `Other` kind) are
/// ignored.
pub fn collect_subject_scores(
    entries: &[&ScoreEntry],
    exams_by_id: &HashMap<i64, ExamRecord>,
) -> BTreeMap<i64, SubjectScores> {
    let mut sorted: Vec<&ScoreEntry> = entries.to_vec();
    sorted.sort_by_key(|entry| entry.exam_id);

    let mut subjects: BTreeMap<i64, SubjectScores> = BTreeMap::new();
    for entry in sorted {
        let Some(exam) = exams_by_id.get(&entry.exam_id) else {
            continue;
        };
        let scores = subjects.entry(entry.subject_id).or_default();
        match exam.kind {
            ExamKind::Semester => {
                if scores.semester.is_none() {
                    scores.semester = Some((entry.marks, exam.max_marks));
                }
            }
            ExamKind::Cat => scores.cats.push((entry.marks, exam.max_marks)),
            ExamKind::Other => {}
        }
    }
    subjects
}

/// Sums subject contributions into the student's semester totals. Returns
/// `None` when no subject contributed, in which case the student is skipped
/// and no result row is written.
pub fn semester_totals(subjects: &BTreeMap<i64, SubjectScores>) -> Option<SemesterTotals> {
    let mut total_achieved = 0.0;
    let mut total_possible = 0.0;
    let mut subjects_counted = 0;

    for scores in subjects.values() {
        if let Some((achieved, possible)) = scores.contribution() {
            total_achieved += achieved;
            total_possible += possible;
            subjects_counted += 1;
        }
    }

    if subjects_counted == 0 || total_possible <= 0.0 {
        return None;
    }

    Some(SemesterTotals {
        total_marks: total_achieved,
        average_score: total_achieved / total_possible * 100.0,
        subjects_counted,
    })
}

/// Rolls one student's semester results, as (total_marks, average_score)
/// pairs, into the yearly (total, average). The yearly average is the mean of
/// the per-semester percentages, not a recomputation from raw scores.
pub fn yearly_totals(semesters: &[(f64, f64)]) -> Option<(f64, f64)> {
    if semesters.is_empty() {
        return None;
    }
    let total_marks: f64 = semesters.iter().map(|(total, _)| total).sum();
    let average_sum: f64 = semesters.iter().map(|(_, average)| average).sum();
    Some((total_marks, average_sum / semesters.len() as f64))
}
