//! In-process collaborators for development and tests.
//!
//! `InMemoryStore` implements every store contract over one shared state, and
//! `ScriptedProvider` replays canned generation responses, so a playback can
//! run end to end without a database or a live model.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::stream;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::engine::Collaborators;
use crate::enrollment::trial_enrollment;
use crate::lesson_code::LessonCode;
use crate::llm_client::{GenerationProvider, GenerationRequest, TextStream};
use crate::model::{Attendance, Course, Lesson, Script, TranscriptEntry};
use crate::store::{AttendanceStore, CatalogStore, EntitlementGate, ProfileAccessor, StepCommit};

#[derive(Default)]
struct State {
    courses: HashMap<String, Course>,
    lessons: Vec<Lesson>,
    scripts: Vec<Script>,
    purchases: HashSet<(String, String)>,
    attendances: Vec<Attendance>,
    transcript: Vec<TranscriptEntry>,
    profiles: HashMap<String, HashMap<String, String>>,
    commits: usize,
}

/// A cloneable handle to one shared in-memory catalog and progress store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// This store behind every collaborator slot of the engine.
    pub fn collaborators(&self) -> Collaborators {
        let shared = Arc::new(self.clone());
        Collaborators {
            catalog: shared.clone(),
            attendance: shared.clone(),
            profiles: shared.clone(),
            entitlement: shared,
        }
    }

    pub async fn put_course(&self, id: &str, name: &str) {
        let course = Course {
            id: id.to_string(),
            name: name.to_string(),
        };
        self.state.lock().await.courses.insert(id.to_string(), course);
    }

    /// Adds an active, visible lesson with id `lesson-<code>`.
    pub async fn put_lesson(&self, course_id: &str, code: &str, name: &str) -> crate::error::Result<Lesson> {
        let lesson = Lesson {
            id: format!("lesson-{}", code),
            course_id: course_id.to_string(),
            name: name.to_string(),
            code: LessonCode::parse(code)?,
            active: true,
            hidden: false,
        };
        self.state.lock().await.lessons.push(lesson.clone());
        Ok(lesson)
    }

    pub async fn hide_lesson(&self, lesson_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(lesson) = state.lessons.iter_mut().find(|l| l.id == lesson_id) {
            lesson.hidden = true;
        }
    }

    pub async fn put_script(&self, script: Script) {
        self.state.lock().await.scripts.push(script);
    }

    pub async fn put_purchase(&self, learner_id: &str, course_id: &str) {
        self.state
            .lock()
            .await
            .purchases
            .insert((learner_id.to_string(), course_id.to_string()));
    }

    pub async fn put_attendance(&self, attendance: Attendance) {
        let mut state = self.state.lock().await;
        state.attendances.retain(|a| a.id != attendance.id);
        state.attendances.push(attendance);
    }

    pub async fn put_profile(&self, learner_id: &str, key: &str, value: &str) {
        self.state
            .lock()
            .await
            .profiles
            .entry(learner_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub async fn profile(&self, learner_id: &str) -> HashMap<String, String> {
        self.state
            .lock()
            .await
            .profiles
            .get(learner_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of step commits applied so far.
    pub async fn commit_count(&self) -> usize {
        self.state.lock().await.commits
    }

    pub async fn attendance_count(&self) -> usize {
        self.state.lock().await.attendances.len()
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn course(&self, course_id: &str) -> Result<Option<Course>> {
        Ok(self.state.lock().await.courses.get(course_id).cloned())
    }

    async fn lesson(&self, lesson_id: &str) -> Result<Option<Lesson>> {
        let state = self.state.lock().await;
        Ok(state.lessons.iter().find(|l| l.id == lesson_id).cloned())
    }

    async fn lessons_of(&self, course_id: &str) -> Result<Vec<Lesson>> {
        let state = self.state.lock().await;
        Ok(state
            .lessons
            .iter()
            .filter(|l| l.course_id == course_id && l.is_playable())
            .cloned()
            .collect())
    }

    async fn lessons_under(&self, course_id: &str, prefix: &LessonCode) -> Result<Vec<Lesson>> {
        let state = self.state.lock().await;
        Ok(state
            .lessons
            .iter()
            .filter(|l| l.course_id == course_id && l.is_playable() && l.code.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn scripts_of(&self, lesson_id: &str) -> Result<Vec<Script>> {
        let state = self.state.lock().await;
        let mut scripts: Vec<Script> = state
            .scripts
            .iter()
            .filter(|s| s.lesson_id == lesson_id)
            .cloned()
            .collect();
        scripts.sort_by_key(|s| s.ordinal);
        Ok(scripts)
    }

    async fn script_at(&self, lesson_id: &str, ordinal: u32) -> Result<Option<Script>> {
        let state = self.state.lock().await;
        Ok(state
            .scripts
            .iter()
            .find(|s| s.lesson_id == lesson_id && s.ordinal == ordinal)
            .cloned())
    }
}

#[async_trait]
impl AttendanceStore for InMemoryStore {
    async fn find(
        &self,
        learner_id: &str,
        course_id: &str,
        lesson_id: &str,
    ) -> Result<Option<Attendance>> {
        let state = self.state.lock().await;
        Ok(state
            .attendances
            .iter()
            .find(|a| a.learner_id == learner_id && a.course_id == course_id && a.lesson_id == lesson_id)
            .cloned())
    }

    async fn for_lessons(&self, learner_id: &str, lesson_ids: &[String]) -> Result<Vec<Attendance>> {
        let state = self.state.lock().await;
        Ok(state
            .attendances
            .iter()
            .filter(|a| a.learner_id == learner_id && lesson_ids.contains(&a.lesson_id))
            .cloned()
            .collect())
    }

    async fn for_course(&self, learner_id: &str, course_id: &str) -> Result<Vec<Attendance>> {
        let state = self.state.lock().await;
        Ok(state
            .attendances
            .iter()
            .filter(|a| a.learner_id == learner_id && a.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn commit(&self, step: StepCommit) -> Result<()> {
        let mut state = self.state.lock().await;
        for attendance in &step.attendances {
            if !state.attendances.iter().any(|a| a.id == attendance.id) {
                return Err(anyhow!("attendance {} does not exist", attendance.id));
            }
        }
        for attendance in step.attendances {
            if let Some(existing) = state.attendances.iter_mut().find(|a| a.id == attendance.id) {
                *existing = attendance;
            }
        }
        for entry in step.transcript {
            let ordinal = state
                .transcript
                .iter()
                .filter(|e| e.attendance_id == entry.attendance_id)
                .count() as u32
                + 1;
            state.transcript.push(TranscriptEntry {
                attendance_id: entry.attendance_id,
                ordinal,
                lesson_id: entry.lesson_id,
                script_id: entry.script_id,
                script_ordinal: entry.script_ordinal,
                role: entry.role,
                content: entry.content,
            });
        }
        state.commits += 1;
        Ok(())
    }

    async fn transcript(&self, attendance_id: Uuid) -> Result<Vec<TranscriptEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .transcript
            .iter()
            .filter(|e| e.attendance_id == attendance_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProfileAccessor for InMemoryStore {
    async fn get(&self, learner_id: &str, keys: &[String]) -> Result<HashMap<String, String>> {
        let state = self.state.lock().await;
        let Some(profile) = state.profiles.get(learner_id) else {
            return Ok(HashMap::new());
        };
        Ok(keys
            .iter()
            .filter_map(|k| profile.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    async fn set(&self, learner_id: &str, updates: &HashMap<String, String>) -> Result<()> {
        let mut state = self.state.lock().await;
        let profile = state.profiles.entry(learner_id.to_string()).or_default();
        for (key, value) in updates {
            profile.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl EntitlementGate for InMemoryStore {
    async fn has_entitlement(&self, learner_id: &str, course_id: &str) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .purchases
            .contains(&(learner_id.to_string(), course_id.to_string())))
    }

    async fn bootstrap_trial(&self, learner_id: &str, course_id: &str) -> Result<Vec<Attendance>> {
        let lessons = self.lessons_of(course_id).await?;
        let existing = AttendanceStore::for_course(self, learner_id, course_id).await?;
        let enrollment = trial_enrollment(learner_id, course_id, &lessons, &existing);
        if !enrollment.created.is_empty() {
            self.state
                .lock()
                .await
                .attendances
                .extend(enrollment.created);
        }
        Ok(enrollment.attendances)
    }
}

/// A generation provider that replays queued responses in order.
///
/// Each call takes the next queued response, already split into chunks. Once
/// the queue is empty it answers by echoing the prompt word by word, which is
/// enough to click through a course locally.
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Vec<String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I, R, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queued = responses
            .into_iter()
            .map(|chunks| chunks.into_iter().map(Into::into).collect())
            .collect();
        Self {
            responses: Mutex::new(queued),
            requests: Mutex::default(),
        }
    }

    /// Requests received so far, oldest first.
    pub async fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn stream_complete(&self, request: GenerationRequest) -> Result<TextStream> {
        let queued = self.responses.lock().await.pop_front();
        let chunks = queued.unwrap_or_else(|| {
            request
                .prompt
                .split_inclusive(' ')
                .map(str::to_string)
                .collect()
        });
        self.requests.lock().await.push(request);
        Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }
}
