use serde::Serialize;

/// How an exam contributes to semester computation. Set when the exam row is
/// created; `Other` exams are excluded from aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExamKind {
    Semester,
    Cat,
    Other,
}

impl ExamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExamKind::Semester => "semester",
            ExamKind::Cat => "cat",
            ExamKind::Other => "other",
        }
    }

    pub fn parse(value: &str) -> ExamKind {
        match value.to_ascii_lowercase().as_str() {
            "semester" => ExamKind::Semester,
            "cat" => ExamKind::Cat,
            _ => ExamKind::Other,
        }
    }

    /// Fallback classification from the display name, used at the import/seed
    /// boundary when no explicit kind is given.
    pub fn classify_name(name: &str) -> ExamKind {
        if name.contains("Semester") {
            ExamKind::Semester
        } else if name.contains("CAT") {
            ExamKind::Cat
        } else {
            ExamKind::Other
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExamRecord {
    pub id: i64,
    pub name: String,
    pub kind: ExamKind,
    pub max_marks: f64,
}

#[derive(Debug, Clone)]
pub struct ScoreEntry {
    pub student_id: i64,
    pub subject_id: i64,
    pub exam_id: i64,
    pub marks: f64,
}

#[derive(Debug, Clone)]
pub struct EnrolledStudent {
    pub student_id: i64,
    pub grade_id: i64,
}

/// One student's computed totals before ranking.
#[derive(Debug, Clone)]
pub struct StudentAggregate {
    pub student_id: i64,
    pub grade_id: i64,
    pub total_marks: f64,
    pub average_score: f64,
}

#[derive(Debug, Clone)]
pub struct RankedResult {
    pub student_id: i64,
    pub grade_id: i64,
    pub total_marks: f64,
    pub average_score: f64,
    pub grade_rank: i64,
}

/// A stored semester result joined with the student's current grade, the
/// input rows for yearly aggregation.
#[derive(Debug, Clone)]
pub struct SemesterResultRow {
    pub student_id: i64,
    pub grade_id: i64,
    pub total_marks: f64,
    pub average_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SemesterResultDisplay {
    pub student_name: String,
    pub student_code: String,
    pub grade_name: String,
    pub semester_name: String,
    pub academic_year_name: String,
    pub total_marks: f64,
    pub average_score: f64,
    pub grade_rank: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct YearlyResultDisplay {
    pub student_name: String,
    pub student_code: String,
    pub grade_name: String,
    pub academic_year_name: String,
    pub total_marks: f64,
    pub average_score: f64,
    pub grade_rank: i64,
}
