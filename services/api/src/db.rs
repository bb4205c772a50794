//! Data Access Layer
//!
//! Postgres implementations of the playback engine's collaborator contracts.
//! Catalog rows are read-only here; attendance and transcript writes go
//! through `commit`, one transaction per playback step.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use tutor_core::{
    Collaborators, LessonCode,
    enrollment::trial_enrollment,
    model::{
        Attendance, CompletionCheck, Course, Lesson, Role, Script, ScriptKind, TranscriptEntry,
    },
    store::{AttendanceStore, CatalogStore, EntitlementGate, ProfileAccessor, StepCommit},
};
use uuid::Uuid;

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// This database behind every collaborator slot of the engine.
    pub fn collaborators(self: Arc<Self>) -> Collaborators {
        Collaborators {
            catalog: self.clone(),
            attendance: self.clone(),
            profiles: self.clone(),
            entitlement: self,
        }
    }
}

const LESSON_COLUMNS: &str = "id, course_id, name, code, active, hidden";
const SCRIPT_COLUMNS: &str = "id, lesson_id, ordinal, kind, media_url, template, check_prompt, \
     control_token, ui, ui_payload, profile_keys";
const ATTENDANCE_COLUMNS: &str = "id, learner_id, course_id, lesson_id, status, position";

#[derive(FromRow)]
struct CourseRow {
    id: String,
    name: String,
}

#[derive(FromRow)]
struct LessonRow {
    id: String,
    course_id: String,
    name: String,
    code: String,
    active: bool,
    hidden: bool,
}

impl TryFrom<LessonRow> for Lesson {
    type Error = anyhow::Error;

    fn try_from(row: LessonRow) -> Result<Self> {
        Ok(Lesson {
            code: LessonCode::parse(&row.code)
                .with_context(|| format!("lesson {} has a malformed code", row.id))?,
            id: row.id,
            course_id: row.course_id,
            name: row.name,
            active: row.active,
            hidden: row.hidden,
        })
    }
}

#[derive(FromRow)]
struct ScriptRow {
    id: String,
    lesson_id: String,
    ordinal: i32,
    kind: String,
    media_url: Option<String>,
    template: String,
    check_prompt: Option<String>,
    control_token: Option<String>,
    ui: String,
    ui_payload: serde_json::Value,
    profile_keys: Vec<String>,
}

impl TryFrom<ScriptRow> for Script {
    type Error = anyhow::Error;

    fn try_from(row: ScriptRow) -> Result<Self> {
        let kind = match row.kind.as_str() {
            "fixed" => ScriptKind::Fixed {
                media_url: row.media_url.filter(|url| !url.is_empty()),
            },
            "generated" => ScriptKind::Generated,
            other => bail!("script {} has unknown kind {:?}", row.id, other),
        };
        let check = match (row.check_prompt, row.control_token) {
            (Some(prompt), Some(control_token)) => Some(CompletionCheck {
                prompt,
                control_token,
            }),
            _ => None,
        };
        Ok(Script {
            ordinal: u32::try_from(row.ordinal)?,
            ui: row.ui.parse().map_err(anyhow::Error::msg)?,
            id: row.id,
            lesson_id: row.lesson_id,
            kind,
            template: row.template,
            check,
            ui_payload: row.ui_payload,
            profile_keys: row.profile_keys,
        })
    }
}

#[derive(FromRow)]
struct AttendanceRow {
    id: Uuid,
    learner_id: String,
    course_id: String,
    lesson_id: String,
    status: String,
    position: i32,
}

impl TryFrom<AttendanceRow> for Attendance {
    type Error = anyhow::Error;

    fn try_from(row: AttendanceRow) -> Result<Self> {
        Ok(Attendance {
            id: row.id,
            learner_id: row.learner_id,
            course_id: row.course_id,
            lesson_id: row.lesson_id,
            status: row.status.parse().map_err(anyhow::Error::msg)?,
            position: u32::try_from(row.position)?,
        })
    }
}

#[derive(FromRow)]
struct TranscriptRow {
    attendance_id: Uuid,
    ordinal: i32,
    lesson_id: String,
    script_id: String,
    script_ordinal: i32,
    role: String,
    content: String,
}

impl TryFrom<TranscriptRow> for TranscriptEntry {
    type Error = anyhow::Error;

    fn try_from(row: TranscriptRow) -> Result<Self> {
        Ok(TranscriptEntry {
            attendance_id: row.attendance_id,
            ordinal: u32::try_from(row.ordinal)?,
            lesson_id: row.lesson_id,
            script_id: row.script_id,
            script_ordinal: u32::try_from(row.script_ordinal)?,
            role: row.role.parse::<Role>().map_err(anyhow::Error::msg)?,
            content: row.content,
        })
    }
}

fn convert<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = anyhow::Error>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl CatalogStore for Db {
    async fn course(&self, course_id: &str) -> Result<Option<Course>> {
        let row = sqlx::query_as::<_, CourseRow>("SELECT id, name FROM courses WHERE id = $1")
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Course {
            id: r.id,
            name: r.name,
        }))
    }

    async fn lesson(&self, lesson_id: &str) -> Result<Option<Lesson>> {
        let sql = format!("SELECT {LESSON_COLUMNS} FROM lessons WHERE id = $1");
        sqlx::query_as::<_, LessonRow>(&sql)
            .bind(lesson_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Lesson::try_from)
            .transpose()
    }

    async fn lessons_of(&self, course_id: &str) -> Result<Vec<Lesson>> {
        let sql = format!(
            "SELECT {LESSON_COLUMNS} FROM lessons \
             WHERE course_id = $1 AND active AND NOT hidden \
             ORDER BY LENGTH(code), code"
        );
        let rows = sqlx::query_as::<_, LessonRow>(&sql)
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?;
        convert(rows)
    }

    async fn lessons_under(&self, course_id: &str, prefix: &LessonCode) -> Result<Vec<Lesson>> {
        let sql = format!(
            "SELECT {LESSON_COLUMNS} FROM lessons \
             WHERE course_id = $1 AND code LIKE $2 || '%' AND active AND NOT hidden \
             ORDER BY LENGTH(code), code"
        );
        let rows = sqlx::query_as::<_, LessonRow>(&sql)
            .bind(course_id)
            .bind(prefix.as_str())
            .fetch_all(&self.pool)
            .await?;
        convert(rows)
    }

    async fn scripts_of(&self, lesson_id: &str) -> Result<Vec<Script>> {
        let sql = format!("SELECT {SCRIPT_COLUMNS} FROM scripts WHERE lesson_id = $1 ORDER BY ordinal");
        let rows = sqlx::query_as::<_, ScriptRow>(&sql)
            .bind(lesson_id)
            .fetch_all(&self.pool)
            .await?;
        convert(rows)
    }

    async fn script_at(&self, lesson_id: &str, ordinal: u32) -> Result<Option<Script>> {
        let sql = format!("SELECT {SCRIPT_COLUMNS} FROM scripts WHERE lesson_id = $1 AND ordinal = $2");
        sqlx::query_as::<_, ScriptRow>(&sql)
            .bind(lesson_id)
            .bind(i32::try_from(ordinal)?)
            .fetch_optional(&self.pool)
            .await?
            .map(Script::try_from)
            .transpose()
    }
}

#[async_trait]
impl AttendanceStore for Db {
    async fn find(
        &self,
        learner_id: &str,
        course_id: &str,
        lesson_id: &str,
    ) -> Result<Option<Attendance>> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendances \
             WHERE learner_id = $1 AND course_id = $2 AND lesson_id = $3"
        );
        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(learner_id)
            .bind(course_id)
            .bind(lesson_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Attendance::try_from)
            .transpose()
    }

    async fn for_lessons(&self, learner_id: &str, lesson_ids: &[String]) -> Result<Vec<Attendance>> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendances \
             WHERE learner_id = $1 AND lesson_id = ANY($2)"
        );
        let rows = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(learner_id)
            .bind(lesson_ids)
            .fetch_all(&self.pool)
            .await?;
        convert(rows)
    }

    async fn for_course(&self, learner_id: &str, course_id: &str) -> Result<Vec<Attendance>> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendances \
             WHERE learner_id = $1 AND course_id = $2"
        );
        let rows = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(learner_id)
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?;
        convert(rows)
    }

    /// Applies one playback step in a single transaction.
    async fn commit(&self, step: StepCommit) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for attendance in &step.attendances {
            let updated = sqlx::query(
                "UPDATE attendances SET status = $1, position = $2, updated_at = NOW() WHERE id = $3",
            )
            .bind(attendance.status.as_str())
            .bind(i32::try_from(attendance.position)?)
            .bind(attendance.id)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() != 1 {
                return Err(anyhow!("attendance {} does not exist", attendance.id));
            }
        }

        for entry in &step.transcript {
            sqlx::query(
                r#"
                INSERT INTO transcript_entries
                    (attendance_id, ordinal, lesson_id, script_id, script_ordinal, role, content)
                SELECT $1, COALESCE(MAX(ordinal), 0) + 1, $2, $3, $4, $5, $6
                FROM transcript_entries
                WHERE attendance_id = $1
                "#,
            )
            .bind(entry.attendance_id)
            .bind(&entry.lesson_id)
            .bind(&entry.script_id)
            .bind(i32::try_from(entry.script_ordinal)?)
            .bind(entry.role.as_str())
            .bind(&entry.content)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            attendances = step.attendances.len(),
            transcript = step.transcript.len(),
            "Step committed"
        );
        Ok(())
    }

    async fn transcript(&self, attendance_id: Uuid) -> Result<Vec<TranscriptEntry>> {
        let rows = sqlx::query_as::<_, TranscriptRow>(
            r#"
            SELECT attendance_id, ordinal, lesson_id, script_id, script_ordinal, role, content
            FROM transcript_entries
            WHERE attendance_id = $1
            ORDER BY ordinal ASC
            "#,
        )
        .bind(attendance_id)
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }
}

#[async_trait]
impl ProfileAccessor for Db {
    async fn get(&self, learner_id: &str, keys: &[String]) -> Result<HashMap<String, String>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT key, value FROM learner_profiles WHERE learner_id = $1 AND key = ANY($2)",
        )
        .bind(learner_id)
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn set(&self, learner_id: &str, updates: &HashMap<String, String>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in updates {
            sqlx::query(
                r#"
                INSERT INTO learner_profiles (learner_id, key, value)
                VALUES ($1, $2, $3)
                ON CONFLICT (learner_id, key)
                DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
                "#,
            )
            .bind(learner_id)
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl EntitlementGate for Db {
    async fn has_entitlement(&self, learner_id: &str, course_id: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM purchases WHERE learner_id = $1 AND course_id = $2)",
        )
        .bind(learner_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Creates any missing attendances of the trial plan. Concurrent callers
    /// may race on the same rows; the unique key keeps the first insert.
    async fn bootstrap_trial(&self, learner_id: &str, course_id: &str) -> Result<Vec<Attendance>> {
        let lessons = self.lessons_of(course_id).await?;
        let existing = AttendanceStore::for_course(self, learner_id, course_id).await?;
        let plan = trial_enrollment(learner_id, course_id, &lessons, &existing);
        if plan.created.is_empty() {
            return Ok(plan.attendances);
        }

        let mut tx = self.pool.begin().await?;
        for attendance in &plan.created {
            sqlx::query(
                r#"
                INSERT INTO attendances (id, learner_id, course_id, lesson_id, status, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (learner_id, lesson_id) DO NOTHING
                "#,
            )
            .bind(attendance.id)
            .bind(&attendance.learner_id)
            .bind(&attendance.course_id)
            .bind(&attendance.lesson_id)
            .bind(attendance.status.as_str())
            .bind(i32::try_from(attendance.position)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        info!(
            learner = %learner_id,
            course = %course_id,
            created = plan.created.len(),
            "Trial enrollment created"
        );

        let stored = AttendanceStore::for_course(self, learner_id, course_id).await?;
        Ok(trial_enrollment(learner_id, course_id, &lessons, &stored).attendances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_core::model::{AttendanceStatus, UiDirective};

    fn script_row() -> ScriptRow {
        ScriptRow {
            id: "s1".to_string(),
            lesson_id: "l1".to_string(),
            ordinal: 2,
            kind: "fixed".to_string(),
            media_url: None,
            template: "Hello {{name}}".to_string(),
            check_prompt: None,
            control_token: None,
            ui: "await-text-input".to_string(),
            ui_payload: serde_json::json!({"placeholder": "Type here"}),
            profile_keys: vec!["name".to_string()],
        }
    }

    #[test]
    fn test_script_row_conversion() {
        let script = Script::try_from(script_row()).unwrap();
        assert_eq!(script.ordinal, 2);
        assert_eq!(script.kind, ScriptKind::Fixed { media_url: None });
        assert_eq!(script.ui, UiDirective::AwaitTextInput);
        assert!(script.check.is_none());
        assert_eq!(script.profile_keys, vec!["name"]);
    }

    #[test]
    fn test_script_row_with_check_and_image() {
        let mut row = script_row();
        row.media_url = Some("https://cdn.example.com/a.png".to_string());
        row.check_prompt = Some("Is {{input}} right?".to_string());
        row.control_token = Some("[[OK]]".to_string());
        let script = Script::try_from(row).unwrap();
        assert_eq!(
            script.kind,
            ScriptKind::Fixed {
                media_url: Some("https://cdn.example.com/a.png".to_string())
            }
        );
        assert_eq!(script.check.unwrap().control_token, "[[OK]]");
    }

    #[test]
    fn test_script_row_rejects_unknown_values() {
        let mut row = script_row();
        row.kind = "video".to_string();
        assert!(Script::try_from(row).is_err());

        let mut row = script_row();
        row.ui = "await-voice".to_string();
        assert!(Script::try_from(row).is_err());

        let mut row = script_row();
        row.ordinal = -1;
        assert!(Script::try_from(row).is_err());
    }

    #[test]
    fn test_attendance_row_conversion() {
        let id = Uuid::new_v4();
        let attendance = Attendance::try_from(AttendanceRow {
            id,
            learner_id: "u1".to_string(),
            course_id: "c1".to_string(),
            lesson_id: "l1".to_string(),
            status: "in-progress".to_string(),
            position: 3,
        })
        .unwrap();
        assert_eq!(attendance.id, id);
        assert_eq!(attendance.status, AttendanceStatus::InProgress);
        assert_eq!(attendance.position, 3);
    }

    #[test]
    fn test_lesson_row_rejects_malformed_code() {
        let row = LessonRow {
            id: "l1".to_string(),
            course_id: "c1".to_string(),
            name: "Intro".to_string(),
            code: "1".to_string(),
            active: true,
            hidden: false,
        };
        assert!(Lesson::try_from(row).is_err());
    }
}
