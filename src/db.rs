use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Postgres, Row, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    CourseEvaluation, CourseRecord, DayOfWeek, Evaluation, EvaluationInput, ScheduleSlot,
    SessionType, SlotCandidate, SlotInput, StudentRecord, TimeOfDay,
};
use crate::import;
use crate::schedule;
use crate::validation::{self, Outcome, Rejection};

/// Unwraps a pipeline step, handing a rejection straight back to the caller.
macro_rules! try_outcome {
    ($step:expr) => {
        match $step {
            Ok(value) => value,
            Err(rejection) => return Ok(Err(rejection)),
        }
    };
}

const EXCLUSION_VIOLATION: &str = "23P01";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        (
            Uuid::parse_str("6a1f0c3e-58b2-4d7a-b0e4-92c7d15f3a80")?,
            "ET2026001",
            "Nadia Okafor",
            "nadia.okafor@university.example",
        ),
        (
            Uuid::parse_str("e4b8297d-0f36-4c1b-8a5e-3d60c9f27b14")?,
            "ET2026002",
            "Tomas Reyes",
            "tomas.reyes@university.example",
        ),
    ];

    for (id, matricule, name, email) in students {
        sqlx::query(
            r#"
            INSERT INTO registrar.students (id, matricule, full_name, email)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (matricule) DO UPDATE
            SET full_name = EXCLUDED.full_name, email = EXCLUDED.email
            "#,
        )
        .bind(id)
        .bind(matricule)
        .bind(name)
        .bind(email)
        .execute(pool)
        .await?;
    }

    let courses = vec![
        (
            Uuid::parse_str("9b2e51c4-6d0a-4a55-9f3e-0d6f3c1e8a11")?,
            "MAT101",
            "Linear Algebra",
            3,
        ),
        (
            Uuid::parse_str("c1a4e7d2-3b58-4f09-a6c2-7e91b0d4f522")?,
            "INF201",
            "Data Structures",
            5,
        ),
    ];

    for (id, code, name, credits) in courses {
        sqlx::query(
            r#"
            INSERT INTO registrar.courses (id, code, name, credits)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (code) DO UPDATE
            SET name = EXCLUDED.name, credits = EXCLUDED.credits
            "#,
        )
        .bind(id)
        .bind(code)
        .bind(name)
        .bind(credits)
        .execute(pool)
        .await?;
    }

    for (matricule, code) in [
        ("ET2026001", "MAT101"),
        ("ET2026001", "INF201"),
        ("ET2026002", "MAT101"),
    ] {
        sqlx::query(
            r#"
            INSERT INTO registrar.enrollments (id, student_id, course_id)
            SELECT $1, s.id, c.id
            FROM registrar.students s, registrar.courses c
            WHERE s.matricule = $2 AND c.code = $3
            ON CONFLICT (student_id, course_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(matricule)
        .bind(code)
        .execute(pool)
        .await?;
    }

    let evaluations = vec![
        ("seed-001", "ET2026001", "MAT101", "midterm", 12.0, 1.0, NaiveDate::from_ymd_opt(2026, 2, 2)),
        ("seed-002", "ET2026001", "MAT101", "final", 14.5, 2.0, NaiveDate::from_ymd_opt(2026, 3, 16)),
        ("seed-003", "ET2026001", "INF201", "project", 16.0, 1.0, NaiveDate::from_ymd_opt(2026, 2, 20)),
        ("seed-004", "ET2026002", "MAT101", "midterm", 9.5, 1.0, NaiveDate::from_ymd_opt(2026, 2, 2)),
    ];

    for (source_key, matricule, code, evaluation_type, score, weight, date) in evaluations {
        sqlx::query(
            r#"
            INSERT INTO registrar.evaluations
            (id, student_id, course_id, evaluation_type, score, weight, evaluated_on, source_key)
            SELECT $1, s.id, c.id, $4, $5, $6, $7, $8
            FROM registrar.students s, registrar.courses c
            WHERE s.matricule = $2 AND c.code = $3
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(matricule)
        .bind(code)
        .bind(evaluation_type)
        .bind(score)
        .bind(weight)
        .bind(date.context("invalid date")?)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    let slots = vec![
        ("MAT101", "A101", DayOfWeek::Monday, "09:00", "10:30", SessionType::Lecture),
        ("MAT101", "B12", DayOfWeek::Wednesday, "14:00", "16:00", SessionType::Tutorial),
        ("INF201", "A101", DayOfWeek::Monday, "10:30", "12:00", SessionType::Lecture),
        ("INF201", "LAB2", DayOfWeek::Thursday, "13:00", "17:00", SessionType::Lab),
    ];

    for (code, room, day, start, end, session_type) in slots {
        let start: TimeOfDay = start.parse().map_err(anyhow::Error::msg)?;
        let end: TimeOfDay = end.parse().map_err(anyhow::Error::msg)?;
        // Re-seeding trips the overlap constraint, which DO NOTHING absorbs.
        sqlx::query(
            r#"
            INSERT INTO registrar.schedule_slots
            (id, course_id, room, day_of_week, start_minute, end_minute, session_type)
            SELECT $1, c.id, $3, $4, $5, $6, $7
            FROM registrar.courses c
            WHERE c.code = $2
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(room)
        .bind(day.as_str())
        .bind(i32::from(start.minutes()))
        .bind(i32::from(end.minutes()))
        .bind(session_type.as_str())
        .execute(pool)
        .await?;
    }

    Ok(())
}

fn student_from_row(row: &PgRow) -> StudentRecord {
    StudentRecord {
        id: row.get("id"),
        matricule: row.get("matricule"),
        full_name: row.get("full_name"),
        email: row.get("email"),
    }
}

fn course_from_row(row: &PgRow) -> CourseRecord {
    CourseRecord {
        id: row.get("id"),
        code: row.get("code"),
        name: row.get("name"),
        credits: row.get("credits"),
    }
}

fn evaluation_from_row(row: &PgRow) -> Evaluation {
    Evaluation {
        id: row.get("id"),
        student_id: row.get("student_id"),
        course_id: row.get("course_id"),
        evaluation_type: row.get("evaluation_type"),
        score: row.get("score"),
        weight: row.get("weight"),
        date: row.get("evaluated_on"),
        comment: row.get("comment"),
    }
}

fn time_from_column(row: &PgRow, column: &str) -> anyhow::Result<TimeOfDay> {
    let minutes: i32 = row.get(column);
    u16::try_from(minutes)
        .ok()
        .and_then(TimeOfDay::from_minutes)
        .with_context(|| format!("{column} holds out-of-range minute {minutes}"))
}

fn slot_from_row(row: &PgRow) -> anyhow::Result<ScheduleSlot> {
    let day: String = row.get("day_of_week");
    let session_type: String = row.get("session_type");
    Ok(ScheduleSlot {
        id: row.get("id"),
        course_id: row.get("course_id"),
        room: row.get("room"),
        day: day.parse().map_err(anyhow::Error::msg)?,
        start: time_from_column(row, "start_minute")?,
        end: time_from_column(row, "end_minute")?,
        session_type: session_type.parse().map_err(anyhow::Error::msg)?,
    })
}

pub async fn find_student(pool: &PgPool, matricule: &str) -> anyhow::Result<Option<StudentRecord>> {
    let row = sqlx::query(
        "SELECT id, matricule, full_name, email FROM registrar.students WHERE matricule = $1",
    )
    .bind(matricule)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(student_from_row))
}

pub async fn find_course(pool: &PgPool, code: &str) -> anyhow::Result<Option<CourseRecord>> {
    let row = sqlx::query("SELECT id, code, name, credits FROM registrar.courses WHERE code = $1")
        .bind(code)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(course_from_row))
}

pub async fn is_enrolled(pool: &PgPool, student_id: Uuid, course_id: Uuid) -> anyhow::Result<bool> {
    let row = sqlx::query(
        "SELECT 1 FROM registrar.enrollments \
         WHERE student_id = $1 AND course_id = $2 AND status = 'active'",
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

pub async fn require_student(pool: &PgPool, matricule: &str) -> anyhow::Result<Outcome<StudentRecord>> {
    Ok(find_student(pool, matricule)
        .await?
        .ok_or_else(|| Rejection::not_found("student", matricule)))
}

pub async fn require_course(pool: &PgPool, code: &str) -> anyhow::Result<Outcome<CourseRecord>> {
    Ok(find_course(pool, code)
        .await?
        .ok_or_else(|| Rejection::not_found("course", code)))
}

async fn resolve_enrollment(
    pool: &PgPool,
    matricule: &str,
    course_code: &str,
) -> anyhow::Result<Outcome<(StudentRecord, CourseRecord)>> {
    let student = try_outcome!(require_student(pool, matricule).await?);
    let course = try_outcome!(require_course(pool, course_code).await?);

    if !is_enrolled(pool, student.id, course.id).await? {
        return Ok(Err(Rejection::Invalid(vec![format!(
            "student {} is not enrolled in {}",
            student.matricule, course.code
        )])));
    }

    Ok(Ok((student, course)))
}

const EVALUATION_COLUMNS: &str =
    "id, student_id, course_id, evaluation_type, score, weight, evaluated_on, comment";

/// Snapshot read; writes racing with it may or may not be visible.
pub async fn find_evaluations(
    pool: &PgPool,
    student_id: Uuid,
    course_id: Uuid,
) -> anyhow::Result<Vec<Evaluation>> {
    let query = format!(
        "SELECT {EVALUATION_COLUMNS} FROM registrar.evaluations \
         WHERE student_id = $1 AND course_id = $2 \
         ORDER BY evaluated_on DESC"
    );
    let rows = sqlx::query(&query)
        .bind(student_id)
        .bind(course_id)
        .fetch_all(pool)
        .await?;

    debug!(%student_id, %course_id, count = rows.len(), "fetched evaluations");
    Ok(rows.iter().map(evaluation_from_row).collect())
}

pub async fn find_evaluation(pool: &PgPool, id: Uuid) -> anyhow::Result<Option<Evaluation>> {
    let query = format!("SELECT {EVALUATION_COLUMNS} FROM registrar.evaluations WHERE id = $1");
    let row = sqlx::query(&query).bind(id).fetch_optional(pool).await?;
    Ok(row.as_ref().map(evaluation_from_row))
}

pub async fn list_evaluations(
    pool: &PgPool,
    student_id: Option<Uuid>,
    course_id: Option<Uuid>,
    evaluation_type: Option<&str>,
) -> anyhow::Result<Vec<Evaluation>> {
    let mut query = format!("SELECT {EVALUATION_COLUMNS} FROM registrar.evaluations WHERE 1 = 1");
    let mut position = 0;

    if student_id.is_some() {
        position += 1;
        query.push_str(&format!(" AND student_id = ${position}"));
    }
    if course_id.is_some() {
        position += 1;
        query.push_str(&format!(" AND course_id = ${position}"));
    }
    if evaluation_type.is_some() {
        position += 1;
        query.push_str(&format!(" AND evaluation_type = ${position}"));
    }
    query.push_str(" ORDER BY evaluated_on DESC, created_at DESC");

    let mut rows = sqlx::query(&query);
    if let Some(value) = student_id {
        rows = rows.bind(value);
    }
    if let Some(value) = course_id {
        rows = rows.bind(value);
    }
    if let Some(value) = evaluation_type {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    Ok(records.iter().map(evaluation_from_row).collect())
}

pub async fn find_student_evaluations(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Vec<CourseEvaluation>> {
    let rows = sqlx::query(
        r#"
        SELECT e.course_id, c.code, c.name, c.credits, e.score, e.weight, e.evaluation_type
        FROM registrar.evaluations e
        JOIN registrar.courses c ON c.id = e.course_id
        WHERE e.student_id = $1
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    debug!(%student_id, count = rows.len(), "fetched student evaluations");
    Ok(rows
        .iter()
        .map(|row| CourseEvaluation {
            course_id: row.get("course_id"),
            course_code: row.get("code"),
            course_name: row.get("name"),
            credits: row.get("credits"),
            score: row.get("score"),
            weight: row.get("weight"),
            evaluation_type: row.get("evaluation_type"),
        })
        .collect())
}

pub async fn fetch_all_scores(pool: &PgPool) -> anyhow::Result<Vec<(String, f64)>> {
    let rows = sqlx::query("SELECT evaluation_type, score FROM registrar.evaluations")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("evaluation_type"), row.get("score")))
        .collect())
}

async fn insert_evaluation(
    pool: &PgPool,
    student_id: Uuid,
    course_id: Uuid,
    input: &EvaluationInput,
    source_key: Option<&str>,
) -> anyhow::Result<Option<Evaluation>> {
    let query = format!(
        "INSERT INTO registrar.evaluations \
         (id, student_id, course_id, evaluation_type, score, weight, evaluated_on, comment, source_key) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (source_key) DO NOTHING \
         RETURNING {EVALUATION_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(course_id)
        .bind(input.evaluation_type.trim())
        .bind(input.score)
        .bind(input.weight)
        .bind(input.date)
        .bind(input.comment.as_deref())
        .bind(source_key)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(evaluation_from_row))
}

pub async fn create_evaluation(
    pool: &PgPool,
    matricule: &str,
    course_code: &str,
    input: &EvaluationInput,
) -> anyhow::Result<Outcome<Evaluation>> {
    let resolved = resolve_enrollment(pool, matricule, course_code).await?;
    let (student, course) = try_outcome!(validation::admit_evaluation(resolved, input));

    let evaluation = insert_evaluation(pool, student.id, course.id, input, None)
        .await?
        .context("evaluation insert returned no row")?;

    info!(
        evaluation_id = %evaluation.id,
        student = %student.matricule,
        course = %course.code,
        "evaluation recorded"
    );
    Ok(Ok(evaluation))
}

pub async fn update_evaluation(
    pool: &PgPool,
    id: Uuid,
    input: &EvaluationInput,
) -> anyhow::Result<Outcome<Evaluation>> {
    if find_evaluation(pool, id).await?.is_none() {
        return Ok(Err(Rejection::not_found("evaluation", id)));
    }
    try_outcome!(validation::validate_evaluation(input));

    let query = format!(
        "UPDATE registrar.evaluations \
         SET evaluation_type = $2, score = $3, weight = $4, evaluated_on = $5, comment = $6 \
         WHERE id = $1 \
         RETURNING {EVALUATION_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(id)
        .bind(input.evaluation_type.trim())
        .bind(input.score)
        .bind(input.weight)
        .bind(input.date)
        .bind(input.comment.as_deref())
        .fetch_optional(pool)
        .await?;

    // Deleted between the existence check and the update.
    let Some(row) = row else {
        return Ok(Err(Rejection::not_found("evaluation", id)));
    };

    info!(evaluation_id = %id, "evaluation updated");
    Ok(Ok(evaluation_from_row(&row)))
}

pub async fn delete_evaluation(pool: &PgPool, id: Uuid) -> anyhow::Result<Outcome<()>> {
    let result = sqlx::query("DELETE FROM registrar.evaluations WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Ok(Err(Rejection::not_found("evaluation", id)));
    }

    info!(evaluation_id = %id, "evaluation deleted");
    Ok(Ok(()))
}

pub async fn import_evaluations_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let inserted = import_evaluations(pool, file).await?;
    info!(inserted, path = %csv_path.display(), "evaluation import finished");
    Ok(inserted)
}

/// Rows naming an unknown student or course, an unenrolled pair, or bad values
/// are logged and skipped. Rows whose `source_key` was already imported are not
/// counted.
pub async fn import_evaluations<R: std::io::Read>(pool: &PgPool, source: R) -> anyhow::Result<usize> {
    let rows = import::read_import_rows(source)?;
    let mut inserted = 0usize;

    for row in rows {
        let resolved = resolve_enrollment(pool, &row.matricule, &row.course_code).await?;
        let (student, course) = match validation::admit_evaluation(resolved, &row.input) {
            Ok(pair) => pair,
            Err(rejection) => {
                warn!(row = row.line, %rejection, "skipping evaluation row");
                continue;
            }
        };

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_evaluation(pool, student.id, course.id, &row.input, Some(&source_key))
            .await?
            .is_some()
        {
            inserted += 1;
        } else {
            debug!(%source_key, "evaluation already imported");
        }
    }

    Ok(inserted)
}

const SLOT_COLUMNS: &str =
    "id, course_id, room, day_of_week, start_minute, end_minute, session_type";

pub async fn find_slots<'e, E>(executor: E, room: &str, day: DayOfWeek) -> anyhow::Result<Vec<ScheduleSlot>>
where
    E: PgExecutor<'e>,
{
    let query = format!(
        "SELECT {SLOT_COLUMNS} FROM registrar.schedule_slots \
         WHERE room = $1 AND day_of_week = $2 \
         ORDER BY start_minute"
    );
    let rows = sqlx::query(&query)
        .bind(room)
        .bind(day.as_str())
        .fetch_all(executor)
        .await?;

    rows.iter().map(slot_from_row).collect()
}

pub async fn find_slot(pool: &PgPool, id: Uuid) -> anyhow::Result<Option<ScheduleSlot>> {
    let query = format!("SELECT {SLOT_COLUMNS} FROM registrar.schedule_slots WHERE id = $1");
    let row = sqlx::query(&query).bind(id).fetch_optional(pool).await?;
    row.as_ref().map(slot_from_row).transpose()
}

pub async fn list_slots(
    pool: &PgPool,
    day: Option<DayOfWeek>,
    course_id: Option<Uuid>,
) -> anyhow::Result<Vec<ScheduleSlot>> {
    let mut query = format!("SELECT {SLOT_COLUMNS} FROM registrar.schedule_slots WHERE 1 = 1");
    let mut position = 0;

    if day.is_some() {
        position += 1;
        query.push_str(&format!(" AND day_of_week = ${position}"));
    }
    if course_id.is_some() {
        position += 1;
        query.push_str(&format!(" AND course_id = ${position}"));
    }

    let mut rows = sqlx::query(&query);
    if let Some(value) = day {
        rows = rows.bind(value.as_str());
    }
    if let Some(value) = course_id {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut slots = records
        .iter()
        .map(slot_from_row)
        .collect::<anyhow::Result<Vec<_>>>()?;
    slots.sort_by(|a, b| (a.day, a.start, &a.room).cmp(&(b.day, b.start, &b.room)));
    Ok(slots)
}

/// Serialises check-then-write for one room and day until the transaction ends.
async fn lock_room_day(tx: &mut Transaction<'_, Postgres>, candidate: &SlotCandidate) -> anyhow::Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("{}|{}", candidate.room, candidate.day))
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn is_overlap_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db_error| db_error.code())
        .is_some_and(|code| code == EXCLUSION_VIOLATION)
}

fn conflict(candidate: &SlotCandidate, conflicting: Vec<ScheduleSlot>) -> Rejection {
    Rejection::Conflict {
        message: format!(
            "room {} is already booked on {} between {} and {}",
            candidate.room, candidate.day, candidate.start, candidate.end
        ),
        conflicting,
    }
}

/// Runs the conflict check and hands back the open transaction when it passes.
async fn check_room_free(
    pool: &PgPool,
    candidate: &SlotCandidate,
    exclude: Option<Uuid>,
) -> anyhow::Result<Outcome<Transaction<'static, Postgres>>> {
    let mut tx = pool.begin().await?;
    lock_room_day(&mut tx, candidate).await?;

    let existing = find_slots(&mut *tx, &candidate.room, candidate.day).await?;
    if !schedule::has_conflict(candidate, &existing, exclude) {
        return Ok(Ok(tx));
    }

    let conflicting = schedule::find_conflicts(candidate, &existing, exclude)
        .into_iter()
        .cloned()
        .collect();
    warn!(room = %candidate.room, day = %candidate.day, "room already booked");
    Ok(Err(conflict(candidate, conflicting)))
}

pub async fn create_slot(
    pool: &PgPool,
    course_code: &str,
    input: &SlotInput,
) -> anyhow::Result<Outcome<ScheduleSlot>> {
    let course = try_outcome!(require_course(pool, course_code).await?);
    let candidate = try_outcome!(validation::validate_slot(input));
    let mut tx = try_outcome!(check_room_free(pool, &candidate, None).await?);

    let slot = ScheduleSlot {
        id: Uuid::new_v4(),
        course_id: course.id,
        room: candidate.room.clone(),
        day: candidate.day,
        start: candidate.start,
        end: candidate.end,
        session_type: input.session_type,
    };

    let written = sqlx::query(
        r#"
        INSERT INTO registrar.schedule_slots
        (id, course_id, room, day_of_week, start_minute, end_minute, session_type)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(slot.id)
    .bind(slot.course_id)
    .bind(&slot.room)
    .bind(slot.day.as_str())
    .bind(i32::from(slot.start.minutes()))
    .bind(i32::from(slot.end.minutes()))
    .bind(slot.session_type.as_str())
    .execute(&mut *tx)
    .await;

    if let Err(error) = written {
        if is_overlap_violation(&error) {
            return Ok(Err(conflict(&candidate, Vec::new())));
        }
        return Err(error.into());
    }
    tx.commit().await?;

    info!(slot_id = %slot.id, course = %course.code, room = %slot.room, day = %slot.day, "slot scheduled");
    Ok(Ok(slot))
}

pub async fn update_slot(pool: &PgPool, id: Uuid, input: &SlotInput) -> anyhow::Result<Outcome<ScheduleSlot>> {
    let current = try_outcome!(find_slot(pool, id)
        .await?
        .ok_or_else(|| Rejection::not_found("schedule slot", id)));
    let candidate = try_outcome!(validation::validate_slot(input));
    let mut tx = try_outcome!(check_room_free(pool, &candidate, Some(id)).await?);

    let written = sqlx::query(
        r#"
        UPDATE registrar.schedule_slots
        SET room = $2, day_of_week = $3, start_minute = $4, end_minute = $5, session_type = $6
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&candidate.room)
    .bind(candidate.day.as_str())
    .bind(i32::from(candidate.start.minutes()))
    .bind(i32::from(candidate.end.minutes()))
    .bind(input.session_type.as_str())
    .execute(&mut *tx)
    .await;

    let written = match written {
        Err(error) if is_overlap_violation(&error) => return Ok(Err(conflict(&candidate, Vec::new()))),
        other => other?,
    };
    if written.rows_affected() == 0 {
        return Ok(Err(Rejection::not_found("schedule slot", id)));
    }
    tx.commit().await?;

    info!(slot_id = %id, room = %candidate.room, day = %candidate.day, "slot rescheduled");
    Ok(Ok(ScheduleSlot {
        id,
        course_id: current.course_id,
        room: candidate.room,
        day: candidate.day,
        start: candidate.start,
        end: candidate.end,
        session_type: input.session_type,
    }))
}

pub async fn delete_slot(pool: &PgPool, id: Uuid) -> anyhow::Result<Outcome<()>> {
    let result = sqlx::query("DELETE FROM registrar.schedule_slots WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Ok(Err(Rejection::not_found("schedule slot", id)));
    }

    info!(slot_id = %id, "slot removed");
    Ok(Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgQueryResult;

    async fn add_student(pool: &PgPool, matricule: &str) -> Uuid {
        sqlx::query(
            "INSERT INTO registrar.students (id, matricule, full_name, email) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(matricule)
        .bind(format!("Student {matricule}"))
        .bind(format!("{}@university.example", matricule.to_lowercase()))
        .fetch_one(pool)
        .await
        .unwrap()
        .get("id")
    }

    async fn add_course(pool: &PgPool, code: &str, credits: i32) -> Uuid {
        sqlx::query(
            "INSERT INTO registrar.courses (id, code, name, credits) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(format!("Course {code}"))
        .bind(credits)
        .fetch_one(pool)
        .await
        .unwrap()
        .get("id")
    }

    async fn enroll(pool: &PgPool, student_id: Uuid, course_id: Uuid) {
        sqlx::query("INSERT INTO registrar.enrollments (id, student_id, course_id) VALUES ($1, $2, $3)")
            .bind(Uuid::new_v4())
            .bind(student_id)
            .bind(course_id)
            .execute(pool)
            .await
            .unwrap();
    }

    async fn raw_slot(pool: &PgPool, course_id: Uuid, start: i32, end: i32) -> Result<PgQueryResult, sqlx::Error> {
        sqlx::query(
            "INSERT INTO registrar.schedule_slots \
             (id, course_id, room, day_of_week, start_minute, end_minute, session_type) \
             VALUES ($1, $2, 'R1', 'monday', $3, $4, 'lecture')",
        )
        .bind(Uuid::new_v4())
        .bind(course_id)
        .bind(start)
        .bind(end)
        .execute(pool)
        .await
    }

    fn evaluation_input(score: f64) -> EvaluationInput {
        EvaluationInput {
            evaluation_type: "midterm".to_string(),
            score,
            weight: 1.0,
            date: NaiveDate::from_ymd_opt(2026, 2, 9).unwrap(),
            comment: None,
        }
    }

    fn slot_input(room: &str, start: &str, end: &str) -> SlotInput {
        SlotInput {
            room: room.to_string(),
            day: DayOfWeek::Monday,
            start: start.parse().unwrap(),
            end: end.parse().unwrap(),
            session_type: SessionType::Lecture,
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn overlapping_booking_is_refused_without_writing(pool: PgPool) {
        add_course(&pool, "MAT101", 3).await;
        let first = create_slot(&pool, "MAT101", &slot_input("A101", "09:00", "10:00"))
            .await
            .unwrap()
            .unwrap();

        match create_slot(&pool, "MAT101", &slot_input("A101", "09:30", "10:30")).await.unwrap() {
            Err(Rejection::Conflict { conflicting, .. }) => {
                assert_eq!(conflicting.len(), 1);
                assert_eq!(conflicting[0].id, first.id);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(list_slots(&pool, None, None).await.unwrap().len(), 1);

        let adjacent = create_slot(&pool, "MAT101", &slot_input("A101", "10:00", "11:00")).await.unwrap();
        assert!(adjacent.is_ok());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn conflicting_reschedule_leaves_slot_untouched(pool: PgPool) {
        add_course(&pool, "INF201", 5).await;
        create_slot(&pool, "INF201", &slot_input("LAB2", "09:00", "10:00"))
            .await
            .unwrap()
            .unwrap();
        let second = create_slot(&pool, "INF201", &slot_input("LAB2", "10:00", "11:00"))
            .await
            .unwrap()
            .unwrap();

        let moved = update_slot(&pool, second.id, &slot_input("LAB2", "09:30", "10:30")).await.unwrap();
        assert!(matches!(moved, Err(Rejection::Conflict { .. })));

        let stored = find_slot(&pool, second.id).await.unwrap().unwrap();
        assert_eq!(stored.start.to_string(), "10:00");
        assert_eq!(stored.end.to_string(), "11:00");

        let mut same_times = slot_input("LAB2", "10:00", "11:00");
        same_times.session_type = SessionType::Lab;
        let kept = update_slot(&pool, second.id, &same_times).await.unwrap().unwrap();
        assert_eq!(kept.session_type, SessionType::Lab);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn store_constraint_reports_overlap_code(pool: PgPool) {
        let course_id = add_course(&pool, "PHY110", 4).await;
        raw_slot(&pool, course_id, 540, 600).await.unwrap();

        let error = raw_slot(&pool, course_id, 570, 630).await.unwrap_err();
        assert!(is_overlap_violation(&error));

        assert!(raw_slot(&pool, course_id, 600, 660).await.is_ok());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn evaluation_checks_run_in_order(pool: PgPool) {
        let student_id = add_student(&pool, "ET2026101").await;
        let course_id = add_course(&pool, "MAT101", 3).await;
        add_course(&pool, "INF201", 5).await;
        enroll(&pool, student_id, course_id).await;

        let unknown_student = create_evaluation(&pool, "ET9999999", "MAT101", &evaluation_input(25.0)).await.unwrap();
        assert!(matches!(unknown_student, Err(Rejection::NotFound { entity: "student", .. })));

        let unknown_course = create_evaluation(&pool, "ET2026101", "XXX000", &evaluation_input(25.0)).await.unwrap();
        assert!(matches!(unknown_course, Err(Rejection::NotFound { entity: "course", .. })));

        match create_evaluation(&pool, "ET2026101", "INF201", &evaluation_input(25.0)).await.unwrap() {
            Err(Rejection::Invalid(problems)) => assert!(problems[0].contains("not enrolled")),
            other => panic!("expected enrollment rejection, got {other:?}"),
        }

        match create_evaluation(&pool, "ET2026101", "MAT101", &evaluation_input(25.0)).await.unwrap() {
            Err(Rejection::Invalid(problems)) => assert!(problems[0].contains("score")),
            other => panic!("expected score rejection, got {other:?}"),
        }
        assert!(find_evaluations(&pool, student_id, course_id).await.unwrap().is_empty());

        create_evaluation(&pool, "ET2026101", "MAT101", &evaluation_input(14.0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(find_evaluations(&pool, student_id, course_id).await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn import_skips_rejected_rows_and_repeats(pool: PgPool) {
        let student_id = add_student(&pool, "ET2026101").await;
        let course_id = add_course(&pool, "MAT101", 3).await;
        add_course(&pool, "INF201", 5).await;
        enroll(&pool, student_id, course_id).await;

        let data = "\
matricule,course_code,evaluation_type,score,weight,date,comment,source_key
ET2026101,MAT101,midterm,13.5,2,2026-02-09,,term-1
ET9999999,MAT101,midterm,12,1,2026-02-09,,term-2
ET2026101,MAT101,quiz,21,1,2026-02-10,,term-3
ET2026101,INF201,project,15,1,2026-02-11,,term-4
";
        assert_eq!(import_evaluations(&pool, data.as_bytes()).await.unwrap(), 1);
        assert_eq!(import_evaluations(&pool, data.as_bytes()).await.unwrap(), 0);

        let stored = list_evaluations(&pool, Some(student_id), None, None).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].score, 13.5);
        assert_eq!(stored[0].weight, 2.0);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn lists_evaluations_by_filter_newest_first(pool: PgPool) {
        let student_id = add_student(&pool, "ET2026101").await;
        let course_id = add_course(&pool, "MAT101", 3).await;
        enroll(&pool, student_id, course_id).await;

        let mut quiz = evaluation_input(11.0);
        quiz.evaluation_type = "quiz".to_string();
        quiz.date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        create_evaluation(&pool, "ET2026101", "MAT101", &evaluation_input(14.0)).await.unwrap().unwrap();
        let latest = create_evaluation(&pool, "ET2026101", "MAT101", &quiz).await.unwrap().unwrap();

        let all = list_evaluations(&pool, Some(student_id), Some(course_id), None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, latest.id);

        let quizzes = list_evaluations(&pool, None, None, Some("quiz")).await.unwrap();
        assert_eq!(quizzes.len(), 1);
        assert_eq!(find_evaluation(&pool, latest.id).await.unwrap().unwrap().score, 11.0);
    }
}
