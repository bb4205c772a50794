use thiserror::Error;

/// Failures a playback invocation can run into.
///
/// `NotEnrolled` and `AttendanceMissing` are recovered inside the engine into
/// the scripted refusal stream; every other variant ends the invocation and
/// leaves the store at its last committed step.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("learner {learner} is not enrolled in course {course}")]
    NotEnrolled { learner: String, course: String },

    #[error("no attendance for learner {learner} in lesson {lesson}")]
    AttendanceMissing { learner: String, lesson: String },

    #[error("script {script_id} not found in lesson {lesson_id}")]
    ScriptNotFound { script_id: String, lesson_id: String },

    #[error("lesson {0} not found")]
    LessonNotFound(String),

    #[error("invalid lesson code: {0:?}")]
    InvalidLessonCode(String),

    #[error("checked response is not a profile update: {0}")]
    ProfileParse(#[from] serde_json::Error),

    #[error("generation failed: {0}")]
    Generation(anyhow::Error),

    #[error("generation timed out")]
    GenerationTimeout,

    #[error("store failure: {0}")]
    Store(#[from] anyhow::Error),
}

pub type Result<T, E = PlaybackError> = std::result::Result<T, E>;
