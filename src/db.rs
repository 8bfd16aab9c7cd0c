use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{Row, SqlitePool};

use crate::models::{
    EnrolledStudent, ExamKind, ExamRecord, ScoreEntry, SemesterResultDisplay, SemesterResultRow,
    YearlyResultDisplay,
};

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn academic_year_id_by_name(pool: &SqlitePool, year_name: &str) -> anyhow::Result<i64> {
    let row = sqlx::query("SELECT id FROM academic_years WHERE year_name = ?")
        .bind(year_name)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("academic year '{year_name}' not found"))?;
    Ok(row.get("id"))
}

pub async fn semester_id_by_name(pool: &SqlitePool, name: &str) -> anyhow::Result<i64> {
    let row = sqlx::query("SELECT id FROM semesters WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("semester '{name}' not found"))?;
    Ok(row.get("id"))
}

pub async fn upsert_grade(pool: &SqlitePool, name: &str) -> anyhow::Result<i64> {
    let row = sqlx::query(
        r#"
        INSERT INTO grades (name) VALUES (?)
        ON CONFLICT (name) DO UPDATE SET name = excluded.name
        RETURNING id
        "#,
    )
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

pub async fn upsert_subject(pool: &SqlitePool, name: &str) -> anyhow::Result<i64> {
    let row = sqlx::query(
        r#"
        INSERT INTO subjects (name) VALUES (?)
        ON CONFLICT (name) DO UPDATE SET name = excluded.name
        RETURNING id
        "#,
    )
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

pub async fn upsert_academic_year(
    pool: &SqlitePool,
    year_name: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> anyhow::Result<i64> {
    let row = sqlx::query(
        r#"
        INSERT INTO academic_years (year_name, start_date, end_date)
        VALUES (?, ?, ?)
        ON CONFLICT (year_name) DO UPDATE
        SET start_date = excluded.start_date, end_date = excluded.end_date
        RETURNING id
        "#,
    )
    .bind(year_name)
    .bind(start_date)
    .bind(end_date)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

pub async fn upsert_semester(
    pool: &SqlitePool,
    name: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> anyhow::Result<i64> {
    let row = sqlx::query(
        r#"
        INSERT INTO semesters (name, start_date, end_date)
        VALUES (?, ?, ?)
        ON CONFLICT (name) DO UPDATE
        SET start_date = excluded.start_date, end_date = excluded.end_date
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(start_date)
    .bind(end_date)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

pub async fn upsert_student(
    pool: &SqlitePool,
    student_code: &str,
    name: &str,
    contact_info: Option<&str>,
    current_grade_id: i64,
) -> anyhow::Result<i64> {
    let row = sqlx::query(
        r#"
        INSERT INTO students (name, student_code, contact_info, current_grade_id)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (student_code) DO UPDATE
        SET name = excluded.name,
            contact_info = excluded.contact_info,
            current_grade_id = excluded.current_grade_id
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(student_code)
    .bind(contact_info)
    .bind(current_grade_id)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

pub async fn upsert_enrollment(
    pool: &SqlitePool,
    student_id: i64,
    academic_year_id: i64,
    grade_id: i64,
) -> anyhow::Result<i64> {
    let row = sqlx::query(
        r#"
        INSERT INTO enrollments (student_id, academic_year_id, grade_id)
        VALUES (?, ?, ?)
        ON CONFLICT (student_id, academic_year_id) DO UPDATE
        SET grade_id = excluded.grade_id
        RETURNING id
        "#,
    )
    .bind(student_id)
    .bind(academic_year_id)
    .bind(grade_id)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

pub async fn upsert_exam(
    pool: &SqlitePool,
    name: &str,
    kind: ExamKind,
    semester_id: Option<i64>,
    academic_year_id: i64,
    max_marks: f64,
) -> anyhow::Result<i64> {
    let row = sqlx::query(
        r#"
        INSERT INTO exams (name, kind, semester_id, academic_year_id, max_marks)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (name, semester_id, academic_year_id) DO UPDATE
        SET kind = excluded.kind, max_marks = excluded.max_marks
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(kind.as_str())
    .bind(semester_id)
    .bind(academic_year_id)
    .bind(max_marks)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

pub async fn upsert_score_entry(
    pool: &SqlitePool,
    student_id: i64,
    exam_id: i64,
    subject_id: i64,
    marks: f64,
) -> anyhow::Result<i64> {
    let row = sqlx::query(
        r#"
        INSERT INTO score_entries (student_id, exam_id, subject_id, marks)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (student_id, exam_id, subject_id) DO UPDATE
        SET marks = excluded.marks
        RETURNING id
        "#,
    )
    .bind(student_id)
    .bind(exam_id)
    .bind(subject_id)
    .bind(marks)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

/// Students enrolled in the academic year, with the grade used for ranking.
/// Membership comes from enrollments; the grade is the student's current one.
pub async fn fetch_enrolled_students(
    pool: &SqlitePool,
    academic_year_id: i64,
) -> anyhow::Result<Vec<EnrolledStudent>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id AS student_id, s.current_grade_id AS grade_id
        FROM students s
        JOIN enrollments e ON e.student_id = s.id
        WHERE e.academic_year_id = ? AND s.current_grade_id IS NOT NULL
        ORDER BY s.id
        "#,
    )
    .bind(academic_year_id)
    .fetch_all(pool)
    .await?;

    let mut students = Vec::new();
    for row in rows {
        students.push(EnrolledStudent {
            student_id: row.get("student_id"),
            grade_id: row.get("grade_id"),
        });
    }
    Ok(students)
}

/// Exams in scope. `None` for the semester selects yearly exams (those tied
/// to no semester).
pub async fn fetch_exams(
    pool: &SqlitePool,
    academic_year_id: i64,
    semester_id: Option<i64>,
) -> anyhow::Result<Vec<ExamRecord>> {
    let mut query =
        String::from("SELECT id, name, kind, max_marks FROM exams WHERE academic_year_id = ?");
    if semester_id.is_some() {
        query.push_str(" AND semester_id = ?");
    } else {
        query.push_str(" AND semester_id IS NULL");
    }
    query.push_str(" ORDER BY id");

    let mut rows = sqlx::query(&query).bind(academic_year_id);
    if let Some(value) = semester_id {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut exams = Vec::new();
    for row in records {
        let kind: String = row.get("kind");
        exams.push(ExamRecord {
            id: row.get("id"),
            name: row.get("name"),
            kind: ExamKind::parse(&kind),
            max_marks: row.get("max_marks"),
        });
    }
    Ok(exams)
}

/// Every score entry recorded against the scope's exams, for all students at
/// once; the engine groups them in memory.
pub async fn fetch_score_entries(
    pool: &SqlitePool,
    academic_year_id: i64,
    semester_id: i64,
) -> anyhow::Result<Vec<ScoreEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT se.student_id, se.subject_id, se.exam_id, se.marks
        FROM score_entries se
        JOIN exams e ON e.id = se.exam_id
        WHERE e.academic_year_id = ? AND e.semester_id = ?
        ORDER BY se.student_id, se.subject_id, se.exam_id
        "#,
    )
    .bind(academic_year_id)
    .bind(semester_id)
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(ScoreEntry {
            student_id: row.get("student_id"),
            subject_id: row.get("subject_id"),
            exam_id: row.get("exam_id"),
            marks: row.get("marks"),
        });
    }
    Ok(entries)
}

/// Stored semester results for the year, the yearly aggregator's input.
pub async fn fetch_semester_result_rows(
    pool: &SqlitePool,
    academic_year_id: i64,
) -> anyhow::Result<Vec<SemesterResultRow>> {
    let rows = sqlx::query(
        r#"
        SELECT sr.student_id, sr.total_marks, sr.average_score,
               s.current_grade_id AS grade_id
        FROM semester_results sr
        JOIN students s ON s.id = sr.student_id
        WHERE sr.academic_year_id = ? AND s.current_grade_id IS NOT NULL
        ORDER BY sr.student_id, sr.semester_id
        "#,
    )
    .bind(academic_year_id)
    .fetch_all(pool)
    .await?;

    let mut results = Vec::new();
    for row in rows {
        results.push(SemesterResultRow {
            student_id: row.get("student_id"),
            grade_id: row.get("grade_id"),
            total_marks: row.get("total_marks"),
            average_score: row.get("average_score"),
        });
    }
    Ok(results)
}

pub async fn upsert_semester_result(
    pool: &SqlitePool,
    student_id: i64,
    semester_id: i64,
    academic_year_id: i64,
    total_marks: f64,
    average_score: f64,
    grade_rank: i64,
) -> anyhow::Result<i64> {
    let row = sqlx::query(
        r#"
        INSERT INTO semester_results
        (student_id, semester_id, academic_year_id, total_marks, average_score, grade_rank)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (student_id, semester_id, academic_year_id) DO UPDATE
        SET total_marks = excluded.total_marks,
            average_score = excluded.average_score,
            grade_rank = excluded.grade_rank
        RETURNING id
        "#,
    )
    .bind(student_id)
    .bind(semester_id)
    .bind(academic_year_id)
    .bind(total_marks)
    .bind(average_score)
    .bind(grade_rank)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

pub async fn upsert_yearly_result(
    pool: &SqlitePool,
    student_id: i64,
    academic_year_id: i64,
    total_marks: f64,
    average_score: f64,
    grade_rank: i64,
) -> anyhow::Result<i64> {
    let row = sqlx::query(
        r#"
        INSERT INTO yearly_results
        (student_id, academic_year_id, total_marks, average_score, grade_rank)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (student_id, academic_year_id) DO UPDATE
        SET total_marks = excluded.total_marks,
            average_score = excluded.average_score,
            grade_rank = excluded.grade_rank
        RETURNING id
        "#,
    )
    .bind(student_id)
    .bind(academic_year_id)
    .bind(total_marks)
    .bind(average_score)
    .bind(grade_rank)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

pub async fn list_semester_results(
    pool: &SqlitePool,
    student_code: Option<&str>,
    year_name: Option<&str>,
    semester_name: Option<&str>,
) -> anyhow::Result<Vec<SemesterResultDisplay>> {
    let mut query = String::from(
        "SELECT st.name AS student_name, st.student_code, g.name AS grade_name, \
         sem.name AS semester_name, ay.year_name AS academic_year_name, \
         sr.total_marks, sr.average_score, sr.grade_rank \
         FROM semester_results sr \
         JOIN students st ON st.id = sr.student_id \
         JOIN grades g ON g.id = st.current_grade_id \
         JOIN semesters sem ON sem.id = sr.semester_id \
         JOIN academic_years ay ON ay.id = sr.academic_year_id",
    );

    let mut conditions = Vec::new();
    if student_code.is_some() {
        conditions.push("st.student_code = ?");
    }
    if year_name.is_some() {
        conditions.push("ay.year_name = ?");
    }
    if semester_name.is_some() {
        conditions.push("sem.name = ?");
    }
    if !conditions.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&conditions.join(" AND "));
    }
    query.push_str(
        " ORDER BY ay.year_name DESC, sem.name, g.name, sr.grade_rank, st.name",
    );

    let mut rows = sqlx::query(&query);
    if let Some(value) = student_code {
        rows = rows.bind(value);
    }
    if let Some(value) = year_name {
        rows = rows.bind(value);
    }
    if let Some(value) = semester_name {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut results = Vec::new();
    for row in records {
        results.push(SemesterResultDisplay {
            student_name: row.get("student_name"),
            student_code: row.get("student_code"),
            grade_name: row.get("grade_name"),
            semester_name: row.get("semester_name"),
            academic_year_name: row.get("academic_year_name"),
            total_marks: row.get("total_marks"),
            average_score: row.get("average_score"),
            grade_rank: row.get("grade_rank"),
        });
    }
    Ok(results)
}

pub async fn list_yearly_results(
    pool: &SqlitePool,
    student_code: Option<&str>,
    year_name: Option<&str>,
) -> anyhow::Result<Vec<YearlyResultDisplay>> {
    let mut query = String::from(
        "SELECT st.name AS student_name, st.student_code, g.name AS grade_name, \
         ay.year_name AS academic_year_name, \
         yr.total_marks, yr.average_score, yr.grade_rank \
         FROM yearly_results yr \
         JOIN students st ON st.id = yr.student_id \
         JOIN grades g ON g.id = st.current_grade_id \
         JOIN academic_years ay ON ay.id = yr.academic_year_id",
    );

    let mut conditions = Vec::new();
    if student_code.is_some() {
        conditions.push("st.student_code = ?");
    }
    if year_name.is_some() {
        conditions.push("ay.year_name = ?");
    }
    if !conditions.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&conditions.join(" AND "));
    }
    query.push_str(" ORDER BY ay.year_name DESC, g.name, yr.grade_rank, st.name");

    let mut rows = sqlx::query(&query);
    if let Some(value) = student_code {
        rows = rows.bind(value);
    }
    if let Some(value) = year_name {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut results = Vec::new();
    for row in records {
        results.push(YearlyResultDisplay {
            student_name: row.get("student_name"),
            student_code: row.get("student_code"),
            grade_name: row.get("grade_name"),
            academic_year_name: row.get("academic_year_name"),
            total_marks: row.get("total_marks"),
            average_score: row.get("average_score"),
            grade_rank: row.get("grade_rank"),
        });
    }
    Ok(results)
}

pub async fn seed(pool: &SqlitePool) -> anyhow::Result<()> {
    let grade_1 = upsert_grade(pool, "Grade 1").await?;
    let grade_2 = upsert_grade(pool, "Grade 2").await?;

    let mathematics = upsert_subject(pool, "Mathematics").await?;
    let science = upsert_subject(pool, "Science").await?;
    let english = upsert_subject(pool, "English").await?;

    let year = upsert_academic_year(
        pool,
        "2025/2026",
        NaiveDate::from_ymd_opt(2025, 9, 1).context("invalid date")?,
        NaiveDate::from_ymd_opt(2026, 7, 31).context("invalid date")?,
    )
    .await?;
    let semester_1 = upsert_semester(
        pool,
        "Semester 1",
        NaiveDate::from_ymd_opt(2025, 9, 1).context("invalid date")?,
        NaiveDate::from_ymd_opt(2026, 1, 31).context("invalid date")?,
    )
    .await?;
    let semester_2 = upsert_semester(
        pool,
        "Semester 2",
        NaiveDate::from_ymd_opt(2026, 2, 1).context("invalid date")?,
        NaiveDate::from_ymd_opt(2026, 7, 31).context("invalid date")?,
    )
    .await?;

    let avery = upsert_student(pool, "S001", "Avery Lee", Some("avery.lee@example.com"), grade_1)
        .await?;
    let jules = upsert_student(
        pool,
        "S002",
        "Jules Moreno",
        Some("jules.moreno@example.com"),
        grade_1,
    )
    .await?;
    let kiara = upsert_student(
        pool,
        "S003",
        "Kiara Patel",
        Some("kiara.patel@example.com"),
        grade_2,
    )
    .await?;

    upsert_enrollment(pool, avery, year, grade_1).await?;
    upsert_enrollment(pool, jules, year, grade_1).await?;
    upsert_enrollment(pool, kiara, year, grade_2).await?;

    let s1_exam =
        upsert_exam(pool, "Semester 1 Exam", ExamKind::Semester, Some(semester_1), year, 100.0)
            .await?;
    let s1_cat1 = upsert_exam(pool, "CAT 1", ExamKind::Cat, Some(semester_1), year, 30.0).await?;
    let s1_cat2 = upsert_exam(pool, "CAT 2", ExamKind::Cat, Some(semester_1), year, 30.0).await?;
    let s2_exam =
        upsert_exam(pool, "Semester 2 Exam", ExamKind::Semester, Some(semester_2), year, 100.0)
            .await?;
    let s2_cat1 = upsert_exam(pool, "CAT 1", ExamKind::Cat, Some(semester_2), year, 30.0).await?;
    let s2_cat2 = upsert_exam(pool, "CAT 2", ExamKind::Cat, Some(semester_2), year, 30.0).await?;

    let scores = vec![
        (avery, s1_exam, mathematics, 70.0),
        (avery, s1_cat1, mathematics, 25.0),
        (avery, s1_cat2, mathematics, 28.0),
        (avery, s1_exam, science, 65.0),
        (avery, s1_cat1, science, 20.0),
        (avery, s1_cat2, science, 22.0),
        (avery, s2_exam, mathematics, 75.0),
        (avery, s2_cat1, mathematics, 26.0),
        (avery, s2_cat2, mathematics, 29.0),
        (avery, s2_exam, science, 70.0),
        (avery, s2_cat1, science, 23.0),
        (avery, s2_cat2, science, 25.0),
        (jules, s1_exam, mathematics, 80.0),
        (jules, s1_cat1, mathematics, 28.0),
        (jules, s1_cat2, mathematics, 29.0),
        (jules, s1_exam, english, 75.0),
        (jules, s1_cat1, english, 26.0),
        (jules, s1_cat2, english, 27.0),
        (jules, s2_exam, mathematics, 85.0),
        (jules, s2_cat1, mathematics, 29.0),
        (jules, s2_cat2, mathematics, 30.0),
        (jules, s2_exam, english, 80.0),
        (jules, s2_cat1, english, 28.0),
        (jules, s2_cat2, english, 29.0),
        (kiara, s1_exam, mathematics, 90.0),
        (kiara, s1_cat1, mathematics, 29.0),
        (kiara, s1_cat2, mathematics, 30.0),
        (kiara, s2_exam, mathematics, 95.0),
        (kiara, s2_cat1, mathematics, 30.0),
        (kiara, s2_cat2, mathematics, 30.0),
    ];

    for (student_id, exam_id, subject_id, marks) in scores {
        upsert_score_entry(pool, student_id, exam_id, subject_id, marks).await?;
    }

    Ok(())
}

pub async fn import_scores_csv(
    pool: &SqlitePool,
    csv_path: &std::path::Path,
    year_name: &str,
    semester_name: &str,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_code: String,
        student_name: String,
        grade: String,
        subject: String,
        exam: String,
        exam_kind: Option<String>,
        max_marks: Option<f64>,
        marks: f64,
    }

    let academic_year_id = academic_year_id_by_name(pool, year_name).await?;
    let semester_id = semester_id_by_name(pool, semester_name).await?;

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut imported = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;

        let grade_id = upsert_grade(pool, &row.grade).await?;
        let student_id =
            upsert_student(pool, &row.student_code, &row.student_name, None, grade_id).await?;
        upsert_enrollment(pool, student_id, academic_year_id, grade_id).await?;
        let subject_id = upsert_subject(pool, &row.subject).await?;

        let kind = match row.exam_kind.as_deref() {
            Some(value) => ExamKind::parse(value),
            None => ExamKind::classify_name(&row.exam),
        };
        let exam_id = upsert_exam(
            pool,
            &row.exam,
            kind,
            Some(semester_id),
            academic_year_id,
            row.max_marks.unwrap_or(100.0),
        )
        .await?;

        upsert_score_entry(pool, student_id, exam_id, subject_id, row.marks).await?;
        imported += 1;
    }

    Ok(imported)
}
