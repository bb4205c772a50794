//! Collaborator contracts the playback engine is written against.
//!
//! Catalog, profile and entitlement data live outside the engine; attendance
//! and transcript state are written only through [`AttendanceStore::commit`],
//! once per completed step.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::lesson_code::LessonCode;
use crate::model::{Attendance, Course, Lesson, NewTranscriptEntry, Script, TranscriptEntry};

/// Read-only access to courses, lessons and their ordered scripts.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn course(&self, course_id: &str) -> Result<Option<Course>>;

    async fn lesson(&self, lesson_id: &str) -> Result<Option<Lesson>>;

    /// Active, visible lessons of a course, in no particular order.
    async fn lessons_of(&self, course_id: &str) -> Result<Vec<Lesson>>;

    /// Active, visible lessons whose code starts with `prefix`.
    async fn lessons_under(&self, course_id: &str, prefix: &LessonCode) -> Result<Vec<Lesson>>;

    /// Scripts of a lesson ordered by ordinal.
    async fn scripts_of(&self, lesson_id: &str) -> Result<Vec<Script>>;

    async fn script_at(&self, lesson_id: &str, ordinal: u32) -> Result<Option<Script>>;
}

/// Everything one step writes, applied atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepCommit {
    pub attendances: Vec<Attendance>,
    pub transcript: Vec<NewTranscriptEntry>,
}

impl StepCommit {
    pub fn is_empty(&self) -> bool {
        self.attendances.is_empty() && self.transcript.is_empty()
    }
}

/// Per-learner progress and the append-only transcript.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn find(&self, learner_id: &str, course_id: &str, lesson_id: &str)
    -> Result<Option<Attendance>>;

    async fn for_lessons(&self, learner_id: &str, lesson_ids: &[String]) -> Result<Vec<Attendance>>;

    async fn for_course(&self, learner_id: &str, course_id: &str) -> Result<Vec<Attendance>>;

    /// Overwrites the listed attendances and appends the transcript entries,
    /// all or nothing.
    async fn commit(&self, step: StepCommit) -> Result<()>;

    /// Transcript of one attendance in creation order.
    async fn transcript(&self, attendance_id: Uuid) -> Result<Vec<TranscriptEntry>>;
}

/// Named learner attributes that templates draw on.
#[async_trait]
pub trait ProfileAccessor: Send + Sync {
    /// Values for the requested keys; keys without a value are absent.
    async fn get(&self, learner_id: &str, keys: &[String]) -> Result<HashMap<String, String>>;

    async fn set(&self, learner_id: &str, updates: &HashMap<String, String>) -> Result<()>;
}

/// Purchase records and trial enrollment.
#[async_trait]
pub trait EntitlementGate: Send + Sync {
    async fn has_entitlement(&self, learner_id: &str, course_id: &str) -> Result<bool>;

    /// Ensures the learner has attendance rows for the course and returns them
    /// in lesson order. Existing rows are kept as they are.
    async fn bootstrap_trial(&self, learner_id: &str, course_id: &str) -> Result<Vec<Attendance>>;
}
