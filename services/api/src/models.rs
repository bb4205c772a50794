//! API Models
//!
//! Request and response bodies of the study endpoints, documented for OpenAPI
//! with `utoipa`. Response types mirror the engine's values so the wire shape
//! is owned here rather than by the core crate.

use serde::{Deserialize, Serialize};
use tutor_core::{
    Frame, FrameKind, PlaybackRequest,
    study::{CourseTree, LessonNode, StudyRecord},
};
use utoipa::{IntoParams, ToSchema};

/// Body of `POST /study/run`. `script_id` and `input` are given together when
/// the learner replies to an input request.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct RunScriptPayload {
    #[schema(example = "course-rust")]
    pub course_id: String,
    #[schema(example = "lesson-0101")]
    pub lesson_id: Option<String>,
    pub script_id: Option<String>,
    #[schema(example = "I have used Python before")]
    pub input: Option<String>,
}

impl RunScriptPayload {
    /// Builds the engine request, or explains why the body is inconsistent.
    pub fn into_request(self, learner_id: &str) -> Result<PlaybackRequest, String> {
        let mut request = PlaybackRequest::new(learner_id, &self.course_id);
        if let Some(lesson_id) = &self.lesson_id {
            request = request.lesson(lesson_id);
        }
        match (self.script_id, self.input) {
            (Some(_), Some(input)) if input.trim().is_empty() => {
                Err("input must not be empty".to_string())
            }
            (Some(script_id), Some(input)) => Ok(request.reply(&script_id, &input)),
            (None, None) => Ok(request),
            (Some(_), None) => Err("input is required when script_id is given".to_string()),
            (None, Some(_)) => Err("script_id is required when input is given".to_string()),
        }
    }
}

/// One Output Frame as carried in an SSE `data:` line.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FramePayload {
    /// One of `text`, `text-end`, `input-request`, `choice-request`,
    /// `lesson-complete`, `lesson-status-update`.
    #[schema(example = "text")]
    pub kind: String,
    /// A string for text frames, structured data for requests and updates.
    #[schema(value_type = Object)]
    pub content: serde_json::Value,
    pub script_id: Option<String>,
}

impl From<Frame> for FramePayload {
    fn from(frame: Frame) -> Self {
        let kind = match frame.kind {
            FrameKind::Text => "text",
            FrameKind::TextEnd => "text-end",
            FrameKind::InputRequest => "input-request",
            FrameKind::ChoiceRequest => "choice-request",
            FrameKind::LessonComplete => "lesson-complete",
            FrameKind::LessonStatusUpdate => "lesson-status-update",
        };
        Self {
            kind: kind.to_string(),
            content: frame.content,
            script_id: frame.script_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LessonNodeResponse {
    #[schema(example = "0101")]
    pub lesson_no: String,
    pub lesson_name: String,
    pub lesson_id: String,
    #[schema(example = "in-progress")]
    pub status: String,
    #[schema(no_recursion)]
    pub children: Vec<LessonNodeResponse>,
}

impl From<LessonNode> for LessonNodeResponse {
    fn from(node: LessonNode) -> Self {
        Self {
            lesson_no: node.lesson_no.to_string(),
            lesson_name: node.lesson_name,
            lesson_id: node.lesson_id,
            status: node.status,
            children: node.children.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CourseTreeResponse {
    pub course_id: String,
    pub course_name: String,
    pub lessons: Vec<LessonNodeResponse>,
}

impl From<CourseTree> for CourseTreeResponse {
    fn from(tree: CourseTree) -> Self {
        Self {
            course_id: tree.course_id,
            course_name: tree.course_name,
            lessons: tree.lessons.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StudyRecordResponse {
    pub ordinal: u32,
    #[schema(example = "tutor")]
    pub role: String,
    pub script_ordinal: u32,
    pub content: String,
}

impl From<StudyRecord> for StudyRecordResponse {
    fn from(record: StudyRecord) -> Self {
        Self {
            ordinal: record.ordinal,
            role: record.role.as_str().to_string(),
            script_ordinal: record.script_ordinal,
            content: record.content,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TreeQuery {
    /// Course whose lessons to list.
    pub course_id: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecordQuery {
    /// Lesson whose transcript to return.
    pub lesson_id: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tutor_core::LessonCode;
    use tutor_core::model::Role;

    fn payload(script_id: Option<&str>, input: Option<&str>) -> RunScriptPayload {
        RunScriptPayload {
            course_id: "c1".to_string(),
            lesson_id: None,
            script_id: script_id.map(str::to_string),
            input: input.map(str::to_string),
        }
    }

    #[test]
    fn test_run_payload_deserialization_with_optional_fields() {
        let body: RunScriptPayload = serde_json::from_str(r#"{"course_id": "c1"}"#).unwrap();
        assert_eq!(body.course_id, "c1");
        assert!(body.lesson_id.is_none());
        assert!(body.script_id.is_none());
        assert!(body.input.is_none());
    }

    #[test]
    fn test_run_payload_into_request() {
        let mut body = payload(Some("s1"), Some("hello"));
        body.lesson_id = Some("lesson-01".to_string());
        let request = body.into_request("u1").unwrap();
        assert_eq!(request.learner_id, "u1");
        assert_eq!(request.lesson_id.as_deref(), Some("lesson-01"));
        let reply = request.reply.unwrap();
        assert_eq!(reply.script_id, "s1");
        assert_eq!(reply.input, "hello");

        let request = payload(None, None).into_request("u1").unwrap();
        assert!(request.reply.is_none());
    }

    #[test]
    fn test_run_payload_rejects_half_replies() {
        assert!(payload(Some("s1"), None).into_request("u1").is_err());
        assert!(payload(None, Some("hi")).into_request("u1").is_err());
    }

    #[test]
    fn test_run_payload_rejects_blank_input() {
        assert!(payload(Some("s1"), Some("")).into_request("u1").is_err());
        assert!(payload(Some("s1"), Some("  ")).into_request("u1").is_err());
    }

    #[test]
    fn test_frame_payload_matches_frame_wire_shape() {
        let frame = Frame::input_request(json!({"placeholder": "Name"}), "s1");
        let from_payload = serde_json::to_value(FramePayload::from(frame.clone())).unwrap();
        let from_frame = serde_json::to_value(&frame).unwrap();
        assert_eq!(from_payload, from_frame);
        assert_eq!(from_payload["kind"], "input-request");

        let end = serde_json::to_value(FramePayload::from(Frame::text_end(None))).unwrap();
        assert_eq!(end, json!({"kind": "text-end", "content": "", "script_id": null}));
    }

    #[test]
    fn test_lesson_tree_response_keeps_nesting() {
        let tree = CourseTree {
            course_id: "c1".to_string(),
            course_name: "Rust".to_string(),
            lessons: vec![LessonNode {
                lesson_no: LessonCode::parse("01").unwrap(),
                lesson_name: "Basics".to_string(),
                lesson_id: "l01".to_string(),
                status: "completed".to_string(),
                children: vec![LessonNode {
                    lesson_no: LessonCode::parse("0101").unwrap(),
                    lesson_name: "Ownership".to_string(),
                    lesson_id: "l0101".to_string(),
                    status: "not-started".to_string(),
                    children: vec![],
                }],
            }],
        };

        let json = serde_json::to_value(CourseTreeResponse::from(tree)).unwrap();
        assert_eq!(json["lessons"][0]["lesson_no"], "01");
        assert_eq!(json["lessons"][0]["children"][0]["lesson_no"], "0101");
        assert_eq!(json["lessons"][0]["children"][0]["status"], "not-started");
    }

    #[test]
    fn test_study_record_response_role_label() {
        let record = StudyRecordResponse::from(StudyRecord {
            ordinal: 2,
            role: Role::Learner,
            script_ordinal: 1,
            content: "hi".to_string(),
        });
        assert_eq!(record.role, "learner");
        assert_eq!(record.ordinal, 2);
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "Lesson not found".to_string(),
        };
        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, r#"{"message":"Lesson not found"}"#);
    }
}
