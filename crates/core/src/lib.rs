pub mod cascade;
pub mod check;
pub mod engine;
pub mod enrollment;
pub mod error;
pub mod frame;
pub mod lesson_code;
pub mod llm_client;
pub mod memory;
pub mod model;
pub mod prompt;
pub mod selector;
pub mod store;
pub mod study;

pub use engine::{Collaborators, FrameStream, PlaybackConfig, PlaybackEngine, PlaybackRequest, Reply};
pub use error::{PlaybackError, Result};
pub use frame::{Frame, FrameKind};
pub use lesson_code::LessonCode;
