//! Catalog and progress records.
//!
//! Lessons and scripts are authored elsewhere and read-only here. Attendances
//! and transcript entries are the only state the engine writes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::lesson_code::LessonCode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    pub course_id: String,
    pub name: String,
    pub code: LessonCode,
    pub active: bool,
    /// Hidden branch lessons never take part in traversal or playback.
    pub hidden: bool,
}

impl Lesson {
    pub fn is_playable(&self) -> bool {
        self.active && !self.hidden
    }
}

/// What a script puts in front of the learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptKind {
    /// Static text revealed progressively, or a single image.
    Fixed { media_url: Option<String> },
    /// Text streamed from the generation provider.
    Generated,
}

/// How the learner proceeds once a script has played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UiDirective {
    AutoContinue,
    AwaitTextInput,
    AwaitChoice,
}

impl UiDirective {
    pub fn as_str(&self) -> &'static str {
        match self {
            UiDirective::AutoContinue => "auto-continue",
            UiDirective::AwaitTextInput => "await-text-input",
            UiDirective::AwaitChoice => "await-choice",
        }
    }
}

impl FromStr for UiDirective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto-continue" => Ok(UiDirective::AutoContinue),
            "await-text-input" => Ok(UiDirective::AwaitTextInput),
            "await-choice" => Ok(UiDirective::AwaitChoice),
            other => Err(format!("unknown ui directive: {}", other)),
        }
    }
}

/// A prompt that judges a learner's reply, and the token the model starts
/// its answer with when the reply passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionCheck {
    pub prompt: String,
    pub control_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub id: String,
    pub lesson_id: String,
    /// 1-based position within the lesson.
    pub ordinal: u32,
    pub kind: ScriptKind,
    /// Static payload for fixed scripts, prompt template for generated ones.
    pub template: String,
    pub check: Option<CompletionCheck>,
    pub ui: UiDirective,
    /// Payload of the input or choice request (placeholder text, buttons).
    pub ui_payload: serde_json::Value,
    /// Profile variables the templates reference.
    pub profile_keys: Vec<String>,
}

/// Lifecycle of one learner's progress through one lesson.
///
/// Variants are declared in transition order; status only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttendanceStatus {
    Locked,
    NotStarted,
    InProgress,
    Completed,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Locked => "locked",
            AttendanceStatus::NotStarted => "not-started",
            AttendanceStatus::InProgress => "in-progress",
            AttendanceStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "locked" => Ok(AttendanceStatus::Locked),
            "not-started" => Ok(AttendanceStatus::NotStarted),
            "in-progress" => Ok(AttendanceStatus::InProgress),
            "completed" => Ok(AttendanceStatus::Completed),
            other => Err(format!("unknown attendance status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendance {
    pub id: Uuid,
    pub learner_id: String,
    pub course_id: String,
    pub lesson_id: String,
    pub status: AttendanceStatus,
    /// Ordinal of the last script played; 0 until the lesson starts.
    pub position: u32,
}

impl Attendance {
    pub fn new(learner_id: &str, course_id: &str, lesson_id: &str, status: AttendanceStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            learner_id: learner_id.to_string(),
            course_id: course_id.to_string(),
            lesson_id: lesson_id.to_string(),
            status,
            position: 0,
        }
    }

    /// Moves status forward to `status`. Returns false, leaving the record
    /// untouched, when that would be a regression or no change.
    pub fn advance_status(&mut self, status: AttendanceStatus) -> bool {
        if status > self.status {
            self.status = status;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Learner,
    Tutor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Learner => "learner",
            Role::Tutor => "tutor",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "learner" => Ok(Role::Learner),
            "tutor" => Ok(Role::Tutor),
            other => Err(format!("unknown transcript role: {}", other)),
        }
    }
}

/// A transcript line waiting to be appended by the next step commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTranscriptEntry {
    pub attendance_id: Uuid,
    pub lesson_id: String,
    pub script_id: String,
    pub script_ordinal: u32,
    pub role: Role,
    pub content: String,
}

impl NewTranscriptEntry {
    pub fn new(attendance: &Attendance, script: &Script, role: Role, content: String) -> Self {
        Self {
            attendance_id: attendance.id,
            lesson_id: script.lesson_id.clone(),
            script_id: script.id.clone(),
            script_ordinal: script.ordinal,
            role,
            content,
        }
    }
}

/// A persisted transcript line. Entries are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub attendance_id: Uuid,
    /// Creation order within the attendance, starting at 1.
    pub ordinal: u32,
    pub lesson_id: String,
    pub script_id: String,
    pub script_ordinal: u32,
    pub role: Role,
    pub content: String,
}

/// One lesson whose attendance status changed during a cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub lesson_no: LessonCode,
    pub lesson_name: String,
    pub lesson_id: String,
    pub status: AttendanceStatus,
}

impl StatusChange {
    pub fn new(lesson: &Lesson, status: AttendanceStatus) -> Self {
        Self {
            lesson_no: lesson.code.clone(),
            lesson_name: lesson.name.clone(),
            lesson_id: lesson.id.clone(),
            status,
        }
    }
}
