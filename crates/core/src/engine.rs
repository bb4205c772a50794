//! Script playback.
//!
//! [`PlaybackEngine::play`] turns one request into a lazily produced stream of
//! frames. Nothing survives between requests: the attendance is re-read at the
//! start, every step commits its position change and transcript together once
//! the step's frames have been produced, and a dropped stream leaves the store
//! at the last committed step.

use async_stream::{stream, try_stream};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::cascade::cascade_completion;
use crate::check::{ControlTokenWatch, WatchAction};
use crate::enrollment::current_attendance;
use crate::error::{PlaybackError, Result};
use crate::frame::Frame;
use crate::llm_client::{GenerationProvider, GenerationRequest, TextStream};
use crate::model::{Attendance, NewTranscriptEntry, Role, ScriptKind, UiDirective};
use crate::prompt::format_prompt;
use crate::selector::{select_next, select_reply_target};
use crate::store::{AttendanceStore, CatalogStore, EntitlementGate, ProfileAccessor, StepCommit};
use crate::study::{self, CourseTree, StudyRecord};

pub const PURCHASE_PROMPT: &str = "Please purchase this course to continue.";

pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Pause after each revealed character of fixed content.
    pub reveal_delay: Duration,
    /// Pause after each character of a check response flushed from the buffer.
    pub flush_delay: Duration,
    /// Limit on opening a generation stream and on each chunk wait.
    pub generation_timeout: Option<Duration>,
    pub check_temperature: f32,
    pub content_temperature: f32,
    pub refusal_message: String,
    /// Enroll non-entitled learners into a trial instead of refusing them.
    pub auto_trial: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            reveal_delay: Duration::from_millis(40),
            flush_delay: Duration::from_millis(100),
            generation_timeout: Some(Duration::from_secs(60)),
            check_temperature: 0.1,
            content_temperature: 0.5,
            refusal_message: PURCHASE_PROMPT.to_string(),
            auto_trial: false,
        }
    }
}

impl PlaybackConfig {
    /// Production settings without pacing delays.
    pub fn immediate() -> Self {
        Self {
            reveal_delay: Duration::ZERO,
            flush_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// A learner's reply to an `await-text-input` script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub script_id: String,
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackRequest {
    pub learner_id: String,
    pub course_id: String,
    pub lesson_id: Option<String>,
    pub reply: Option<Reply>,
}

impl PlaybackRequest {
    pub fn new(learner_id: &str, course_id: &str) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            course_id: course_id.to_string(),
            lesson_id: None,
            reply: None,
        }
    }

    pub fn lesson(mut self, lesson_id: &str) -> Self {
        self.lesson_id = Some(lesson_id.to_string());
        self
    }

    pub fn reply(mut self, script_id: &str, input: &str) -> Self {
        self.reply = Some(Reply {
            script_id: script_id.to_string(),
            input: input.to_string(),
        });
        self
    }
}

/// The stores the engine reads and writes.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogStore>,
    pub attendance: Arc<dyn AttendanceStore>,
    pub profiles: Arc<dyn ProfileAccessor>,
    pub entitlement: Arc<dyn EntitlementGate>,
}

#[derive(Clone)]
pub struct PlaybackEngine {
    stores: Collaborators,
    provider: Arc<dyn GenerationProvider>,
    config: PlaybackConfig,
}

impl PlaybackEngine {
    pub fn new(
        stores: Collaborators,
        provider: Arc<dyn GenerationProvider>,
        config: PlaybackConfig,
    ) -> Self {
        Self {
            stores,
            provider,
            config,
        }
    }

    /// Plays from the learner's current position until they must act.
    pub fn play(&self, request: PlaybackRequest) -> FrameStream {
        Box::pin(run(self.clone(), request))
    }

    pub async fn lesson_tree(&self, learner_id: &str, course_id: &str) -> Result<Option<CourseTree>> {
        study::lesson_tree(
            self.stores.catalog.as_ref(),
            self.stores.attendance.as_ref(),
            learner_id,
            course_id,
        )
        .await
    }

    pub async fn study_record(&self, learner_id: &str, lesson_id: &str) -> Result<Option<Vec<StudyRecord>>> {
        study::study_record(
            self.stores.catalog.as_ref(),
            self.stores.attendance.as_ref(),
            learner_id,
            lesson_id,
        )
        .await
    }

    /// The attendance to play, or `None` when the learner must be refused.
    async fn resolve_attendance(&self, request: &PlaybackRequest) -> Result<Option<Attendance>> {
        let learner = request.learner_id.as_str();
        let course = request.course_id.as_str();

        if let Some(lesson_id) = &request.lesson_id {
            let playable = self
                .stores
                .catalog
                .lesson(lesson_id)
                .await?
                .is_some_and(|lesson| lesson.is_playable());
            if !playable {
                warn!(learner, lesson = %lesson_id, "Refusing playback of a lesson that is hidden or unknown");
                return Ok(None);
            }
            let found = self.stores.attendance.find(learner, course, lesson_id).await?;
            if found.is_none() {
                let refusal = PlaybackError::AttendanceMissing {
                    learner: learner.to_string(),
                    lesson: lesson_id.clone(),
                };
                warn!(%refusal, "Refusing playback");
            }
            return Ok(found);
        }

        let entitled = self.stores.entitlement.has_entitlement(learner, course).await?;
        if !entitled && !self.config.auto_trial {
            let refusal = PlaybackError::NotEnrolled {
                learner: learner.to_string(),
                course: course.to_string(),
            };
            warn!(%refusal, "Refusing playback");
            return Ok(None);
        }
        let attendances = self.stores.entitlement.bootstrap_trial(learner, course).await?;
        let lessons = self.stores.catalog.lessons_of(course).await?;
        Ok(current_attendance(&attendances, &lessons).cloned())
    }

    async fn commit(&self, step: StepCommit) -> Result<()> {
        if !step.is_empty() {
            self.stores.attendance.commit(step).await?;
        }
        Ok(())
    }

    async fn prompt_for(
        &self,
        learner: &str,
        template: &str,
        keys: &[String],
        input: Option<&str>,
    ) -> Result<String> {
        format_prompt(self.stores.profiles.as_ref(), learner, template, keys, input).await
    }

    async fn open_stream(&self, request: GenerationRequest) -> Result<TextStream> {
        let call = self.provider.stream_complete(request);
        let opened = match self.config.generation_timeout {
            Some(limit) => timeout(limit, call)
                .await
                .map_err(|_| PlaybackError::GenerationTimeout)?,
            None => call.await,
        };
        opened.map_err(PlaybackError::Generation)
    }

    async fn next_chunk(&self, stream: &mut TextStream) -> Result<Option<String>> {
        let next = stream.next();
        let item = match self.config.generation_timeout {
            Some(limit) => timeout(limit, next)
                .await
                .map_err(|_| PlaybackError::GenerationTimeout)?,
            None => next.await,
        };
        item.transpose().map_err(PlaybackError::Generation)
    }
}

/// Emits `text` one character per frame, pausing `delay` after each.
fn reveal(text: String, script_id: Option<String>, delay: Duration) -> impl Stream<Item = Frame> + Send {
    stream! {
        for ch in text.chars() {
            yield Frame::text(ch.to_string(), script_id.as_deref());
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
    }
}

fn run(engine: PlaybackEngine, request: PlaybackRequest) -> impl Stream<Item = Result<Frame>> + Send {
    try_stream! {
        let learner = request.learner_id.as_str();
        let Some(mut attendance) = engine.resolve_attendance(&request).await? else {
            let refusal = engine.config.refusal_message.clone();
            for await frame in reveal(refusal, None, engine.config.reveal_delay) {
                yield frame;
            }
            yield Frame::text_end(None);
            return;
        };
        let catalog = engine.stores.catalog.as_ref();
        let mut reply = request.reply.clone();

        loop {
            if let Some(Reply { script_id, input }) = reply.take() {
                let script = select_reply_target(catalog, &attendance, &script_id).await?;
                let learner_entry = NewTranscriptEntry::new(&attendance, &script, Role::Learner, input.clone());

                let Some(check) = script.check.clone() else {
                    info!(learner, script_id = %script.id, "Reply recorded for unchecked script");
                    engine.commit(StepCommit { attendances: vec![], transcript: vec![learner_entry] }).await?;
                    continue;
                };

                info!(learner, script_id = %script.id, "Checking reply");
                let prompt = engine
                    .prompt_for(learner, &check.prompt, &script.profile_keys, Some(&input))
                    .await?;
                let mut response = engine
                    .open_stream(GenerationRequest { prompt, temperature: engine.config.check_temperature })
                    .await?;
                let mut watch = ControlTokenWatch::new(&check.control_token);
                loop {
                    let (action, done) = match engine.next_chunk(&mut response).await? {
                        Some(chunk) => (watch.push(&chunk), false),
                        None => (watch.finish(), true),
                    };
                    match action {
                        WatchAction::Hold => {}
                        WatchAction::Flush(buffered) => {
                            for await frame in reveal(buffered, Some(script.id.clone()), engine.config.flush_delay) {
                                yield frame;
                            }
                        }
                        WatchAction::Forward(chunk) => {
                            yield Frame::text(chunk, Some(script.id.as_str()));
                        }
                    }
                    if done {
                        break;
                    }
                }

                if watch.is_matched() {
                    let response = watch.text().to_string();
                    let parsed = watch.into_profile_updates();
                    if let Err(err) = &parsed {
                        error!(learner, script_id = %script.id, error = %err, "Checked reply carried no readable profile update");
                        let tutor_entry = NewTranscriptEntry::new(&attendance, &script, Role::Tutor, response);
                        engine.commit(StepCommit { attendances: vec![], transcript: vec![learner_entry.clone(), tutor_entry] }).await?;
                    }
                    let updates = parsed?;
                    info!(learner, script_id = %script.id, updated = updates.len(), "Reply passed check");
                    engine.stores.profiles.set(learner, &updates).await?;
                    engine.commit(StepCommit { attendances: vec![], transcript: vec![learner_entry] }).await?;
                    continue;
                }

                info!(learner, script_id = %script.id, "Reply did not pass check");
                let tutor_entry = NewTranscriptEntry::new(&attendance, &script, Role::Tutor, watch.text().to_string());
                engine.commit(StepCommit { attendances: vec![], transcript: vec![learner_entry, tutor_entry] }).await?;
                yield Frame::text_end(Some(script.id.as_str()));
                if script.ui == UiDirective::AwaitTextInput {
                    yield Frame::input_request(script.ui_payload.clone(), &script.id);
                }
                return;
            }

            let selection = select_next(catalog, &attendance).await?;
            let Some(script) = selection.script else {
                yield Frame::lesson_complete();
                let cascade = cascade_completion(catalog, engine.stores.attendance.as_ref(), &attendance).await?;
                engine.commit(StepCommit { attendances: cascade.attendances, transcript: vec![] }).await?;
                for change in &cascade.changes {
                    yield Frame::lesson_status_update(change);
                }
                return;
            };
            let advanced = selection.attendance;

            info!(learner, script_id = %script.id, ordinal = script.ordinal, ui = script.ui.as_str(), "Running script");
            let content = match &script.kind {
                ScriptKind::Fixed { media_url: Some(url) } => {
                    let image = format!("![img]({})", url);
                    yield Frame::text(image.clone(), Some(script.id.as_str()));
                    image
                }
                ScriptKind::Fixed { media_url: None } => {
                    let text = engine.prompt_for(learner, &script.template, &script.profile_keys, None).await?;
                    for await frame in reveal(text.clone(), Some(script.id.clone()), engine.config.reveal_delay) {
                        yield frame;
                    }
                    text
                }
                ScriptKind::Generated => {
                    let prompt = engine.prompt_for(learner, &script.template, &script.profile_keys, None).await?;
                    let mut generated = engine
                        .open_stream(GenerationRequest { prompt, temperature: engine.config.content_temperature })
                        .await?;
                    let mut text = String::new();
                    while let Some(chunk) = engine.next_chunk(&mut generated).await? {
                        text.push_str(&chunk);
                        yield Frame::text(chunk, Some(script.id.as_str()));
                    }
                    text
                }
            };

            let entry = NewTranscriptEntry::new(&advanced, &script, Role::Tutor, content);
            engine.commit(StepCommit { attendances: vec![advanced.clone()], transcript: vec![entry] }).await?;
            attendance = advanced;
            yield Frame::text_end(Some(script.id.as_str()));

            match script.ui {
                UiDirective::AutoContinue => continue,
                UiDirective::AwaitTextInput => {
                    yield Frame::input_request(script.ui_payload.clone(), &script.id);
                    return;
                }
                UiDirective::AwaitChoice => {
                    yield Frame::choice_request(script.ui_payload.clone(), &script.id);
                    return;
                }
            }
        }
    }
}
