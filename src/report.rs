use std::collections::BTreeMap;
use std::fmt::Write;

use crate::models::SemesterResultDisplay;

/// Renders a per-grade ranking table for one computed semester as markdown.
pub fn build_semester_report(
    year_name: &str,
    semester_name: &str,
    results: &[SemesterResultDisplay],
) -> String {
    let mut by_grade: BTreeMap<&str, Vec<&SemesterResultDisplay>> = BTreeMap::new();
    for result in results {
        by_grade.entry(result.grade_name.as_str()).or_default().push(result);
    }

    let mut output = String::new();
    let _ = writeln!(output, "# Semester Results");
    let _ = writeln!(output, "{semester_name}, academic year {year_name}");

    if by_grade.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "No computed results for this semester.");
        return output;
    }

    for (grade_name, mut cohort) in by_grade {
        cohort.sort_by(|a, b| {
            a.grade_rank
                .cmp(&b.grade_rank)
                .then_with(|| a.student_name.cmp(&b.student_name))
        });

        let _ = writeln!(output);
        let _ = writeln!(output, "## {grade_name}");
        let _ = writeln!(output);
        let _ = writeln!(output, "| Rank | Student | Code | Total | Average |");
        let _ = writeln!(output, "| ---- | ------- | ---- | ----- | ------- |");
        for result in cohort {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {:.2} | {:.2}% |",
                result.grade_rank,
                result.student_name,
                result.student_code,
                result.total_marks,
                result.average_score
            );
        }
    }

    output
}
