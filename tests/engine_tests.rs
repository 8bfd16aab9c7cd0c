use academic_results::db;
use academic_results::engine::{self, UnclassifiedExamPolicy};
use academic_results::models::ExamKind;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// One-connection pool so every query sees the same in-memory database.
async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");
    pool
}

struct SemesterScope {
    year: i64,
    semester: i64,
    grade: i64,
    exam: i64,
    cat1: i64,
    cat2: i64,
    mathematics: i64,
}

/// A minimal (year, semester, grade) scope with one semester exam out of 100
/// and two CATs out of 30, mirroring the shape of real exam calendars.
async fn semester_scope(pool: &SqlitePool) -> SemesterScope {
    let year = db::upsert_academic_year(
        pool,
        "2025/2026",
        chrono::NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
        chrono::NaiveDate::from_ymd_opt(2026, 7, 31).unwrap(),
    )
    .await
    .unwrap();
    let semester = db::upsert_semester(
        pool,
        "Semester 1",
        chrono::NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
        chrono::NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
    )
    .await
    .unwrap();
    let grade = db::upsert_grade(pool, "Grade 1").await.unwrap();
    let exam = db::upsert_exam(
        pool,
        "Semester 1 Exam",
        ExamKind::Semester,
        Some(semester),
        year,
        100.0,
    )
    .await
    .unwrap();
    let cat1 = db::upsert_exam(pool, "CAT 1", ExamKind::Cat, Some(semester), year, 30.0)
        .await
        .unwrap();
    let cat2 = db::upsert_exam(pool, "CAT 2", ExamKind::Cat, Some(semester), year, 30.0)
        .await
        .unwrap();
    let mathematics = db::upsert_subject(pool, "Mathematics").await.unwrap();

    SemesterScope {
        year,
        semester,
        grade,
        exam,
        cat1,
        cat2,
        mathematics,
    }
}

async fn enroll_student(pool: &SqlitePool, scope: &SemesterScope, code: &str, name: &str) -> i64 {
    let student = db::upsert_student(pool, code, name, None, scope.grade)
        .await
        .unwrap();
    db::upsert_enrollment(pool, student, scope.year, scope.grade)
        .await
        .unwrap();
    student
}

async fn semester_snapshot(pool: &SqlitePool) -> Vec<(String, f64, f64, i64)> {
    db::list_semester_results(pool, None, None, None)
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.student_code, r.total_marks, r.average_score, r.grade_rank))
        .collect()
}

#[tokio::test]
async fn semester_computation_matches_worked_example() {
    let pool = test_pool().await;
    let scope = semester_scope(&pool).await;
    let student = enroll_student(&pool, &scope, "S001", "Avery Lee").await;

    db::upsert_score_entry(&pool, student, scope.exam, scope.mathematics, 70.0)
        .await
        .unwrap();
    db::upsert_score_entry(&pool, student, scope.cat1, scope.mathematics, 25.0)
        .await
        .unwrap();
    db::upsert_score_entry(&pool, student, scope.cat2, scope.mathematics, 28.0)
        .await
        .unwrap();

    let processed = engine::compute_semester_results(
        &pool,
        scope.year,
        scope.semester,
        UnclassifiedExamPolicy::Lenient,
    )
    .await
    .unwrap();
    assert_eq!(processed, 1);

    let results = semester_snapshot(&pool).await;
    assert_eq!(results.len(), 1);
    let (_, total_marks, average_score, grade_rank) = &results[0];
    // 70 + (25 + 28) / 2 = 96.5 out of 100 + 30 = 130.
    assert!((total_marks - 96.5).abs() < 0.001);
    assert!((average_score - 96.5 / 130.0 * 100.0).abs() < 0.001);
    assert_eq!(*grade_rank, 1);
}

#[tokio::test]
async fn tied_averages_share_rank() {
    let pool = test_pool().await;
    let scope = semester_scope(&pool).await;

    for (code, name, marks) in [
        ("S001", "Avery Lee", 90.0),
        ("S002", "Jules Moreno", 90.0),
        ("S003", "Kiara Patel", 80.0),
    ] {
        let student = enroll_student(&pool, &scope, code, name).await;
        db::upsert_score_entry(&pool, student, scope.exam, scope.mathematics, marks)
            .await
            .unwrap();
    }

    let processed = engine::compute_semester_results(
        &pool,
        scope.year,
        scope.semester,
        UnclassifiedExamPolicy::Lenient,
    )
    .await
    .unwrap();
    assert_eq!(processed, 3);

    let mut ranks: Vec<(String, i64)> = semester_snapshot(&pool)
        .await
        .into_iter()
        .map(|(code, _, _, rank)| (code, rank))
        .collect();
    ranks.sort();
    assert_eq!(
        ranks,
        vec![
            ("S001".to_string(), 1),
            ("S002".to_string(), 1),
            ("S003".to_string(), 3),
        ]
    );
}

#[tokio::test]
async fn enrolled_student_without_scores_is_skipped() {
    let pool = test_pool().await;
    let scope = semester_scope(&pool).await;

    let scored = enroll_student(&pool, &scope, "S001", "Avery Lee").await;
    enroll_student(&pool, &scope, "S002", "Jules Moreno").await;

    db::upsert_score_entry(&pool, scored, scope.exam, scope.mathematics, 64.0)
        .await
        .unwrap();

    let processed = engine::compute_semester_results(
        &pool,
        scope.year,
        scope.semester,
        UnclassifiedExamPolicy::Lenient,
    )
    .await
    .unwrap();

    // Two enrolled, one with scores: the result set is smaller by one.
    assert_eq!(processed, 1);
    let results = semester_snapshot(&pool).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "S001");
}

#[tokio::test]
async fn recomputation_is_idempotent() {
    let pool = test_pool().await;
    db::seed(&pool).await.unwrap();
    let year = db::academic_year_id_by_name(&pool, "2025/2026").await.unwrap();
    let semester = db::semester_id_by_name(&pool, "Semester 1").await.unwrap();

    let first =
        engine::compute_semester_results(&pool, year, semester, UnclassifiedExamPolicy::Lenient)
            .await
            .unwrap();
    let snapshot_one = semester_snapshot(&pool).await;

    let second =
        engine::compute_semester_results(&pool, year, semester, UnclassifiedExamPolicy::Lenient)
            .await
            .unwrap();
    let snapshot_two = semester_snapshot(&pool).await;

    assert_eq!(first, 3);
    assert_eq!(second, 3);
    assert_eq!(snapshot_one, snapshot_two);
}

#[tokio::test]
async fn score_edit_overwrites_in_place() {
    let pool = test_pool().await;
    let scope = semester_scope(&pool).await;
    let student = enroll_student(&pool, &scope, "S001", "Avery Lee").await;

    db::upsert_score_entry(&pool, student, scope.exam, scope.mathematics, 50.0)
        .await
        .unwrap();
    engine::compute_semester_results(
        &pool,
        scope.year,
        scope.semester,
        UnclassifiedExamPolicy::Lenient,
    )
    .await
    .unwrap();

    // Corrected mark, recomputed: same single row, new values.
    db::upsert_score_entry(&pool, student, scope.exam, scope.mathematics, 75.0)
        .await
        .unwrap();
    engine::compute_semester_results(
        &pool,
        scope.year,
        scope.semester,
        UnclassifiedExamPolicy::Lenient,
    )
    .await
    .unwrap();

    let results = semester_snapshot(&pool).await;
    assert_eq!(results.len(), 1);
    assert!((results[0].1 - 75.0).abs() < 0.001);
    assert!((results[0].2 - 75.0).abs() < 0.001);
}

#[tokio::test]
async fn yearly_rollup_sums_and_means() {
    let pool = test_pool().await;
    db::seed(&pool).await.unwrap();
    let year = db::academic_year_id_by_name(&pool, "2025/2026").await.unwrap();
    let semester_1 = db::semester_id_by_name(&pool, "Semester 1").await.unwrap();
    let semester_2 = db::semester_id_by_name(&pool, "Semester 2").await.unwrap();

    engine::compute_semester_results(&pool, year, semester_1, UnclassifiedExamPolicy::Lenient)
        .await
        .unwrap();
    engine::compute_semester_results(&pool, year, semester_2, UnclassifiedExamPolicy::Lenient)
        .await
        .unwrap();
    let processed = engine::compute_yearly_results(&pool, year).await.unwrap();
    assert_eq!(processed, 3);

    let semester_rows = db::list_semester_results(&pool, Some("S001"), None, None)
        .await
        .unwrap();
    assert_eq!(semester_rows.len(), 2);
    let expected_total: f64 = semester_rows.iter().map(|r| r.total_marks).sum();
    let expected_average: f64 =
        semester_rows.iter().map(|r| r.average_score).sum::<f64>() / semester_rows.len() as f64;

    let yearly = db::list_yearly_results(&pool, Some("S001"), None).await.unwrap();
    assert_eq!(yearly.len(), 1);
    assert!((yearly[0].total_marks - expected_total).abs() < 0.001);
    assert!((yearly[0].average_score - expected_average).abs() < 0.001);

    // Grade 1 has two students with distinct yearly averages, Grade 2 one.
    let all_yearly = db::list_yearly_results(&pool, None, None).await.unwrap();
    let mut ranks: Vec<(String, i64)> = all_yearly
        .into_iter()
        .map(|r| (r.student_code, r.grade_rank))
        .collect();
    ranks.sort();
    assert_eq!(
        ranks,
        vec![
            ("S001".to_string(), 2),
            ("S002".to_string(), 1),
            ("S003".to_string(), 1),
        ]
    );
}

#[tokio::test]
async fn empty_scopes_complete_with_zero() {
    let pool = test_pool().await;
    let scope = semester_scope(&pool).await;

    // No students enrolled at all.
    let processed = engine::compute_semester_results(
        &pool,
        scope.year,
        scope.semester,
        UnclassifiedExamPolicy::Lenient,
    )
    .await
    .unwrap();
    assert_eq!(processed, 0);

    // Students enrolled but not a single score entry.
    enroll_student(&pool, &scope, "S001", "Avery Lee").await;
    let processed = engine::compute_semester_results(
        &pool,
        scope.year,
        scope.semester,
        UnclassifiedExamPolicy::Lenient,
    )
    .await
    .unwrap();
    assert_eq!(processed, 0);
    assert!(semester_snapshot(&pool).await.is_empty());

    // No stored semester results for the yearly rollup either.
    let processed = engine::compute_yearly_results(&pool, scope.year).await.unwrap();
    assert_eq!(processed, 0);
}

#[tokio::test]
async fn unclassified_exams_are_excluded_or_rejected_by_policy() {
    let pool = test_pool().await;
    let scope = semester_scope(&pool).await;
    let student = enroll_student(&pool, &scope, "S001", "Avery Lee").await;

    let quiz = db::upsert_exam(
        &pool,
        "Pop Quiz",
        ExamKind::Other,
        Some(scope.semester),
        scope.year,
        20.0,
    )
    .await
    .unwrap();

    db::upsert_score_entry(&pool, student, scope.exam, scope.mathematics, 80.0)
        .await
        .unwrap();
    db::upsert_score_entry(&pool, student, quiz, scope.mathematics, 20.0)
        .await
        .unwrap();

    let processed = engine::compute_semester_results(
        &pool,
        scope.year,
        scope.semester,
        UnclassifiedExamPolicy::Lenient,
    )
    .await
    .unwrap();
    assert_eq!(processed, 1);

    // The quiz contributed nothing: 80 out of 100.
    let results = semester_snapshot(&pool).await;
    assert!((results[0].2 - 80.0).abs() < 0.001);

    let strict = engine::compute_semester_results(
        &pool,
        scope.year,
        scope.semester,
        UnclassifiedExamPolicy::Strict,
    )
    .await;
    let err = strict.expect_err("strict policy should reject unclassified exams");
    assert!(err.to_string().contains("Pop Quiz"));
}
