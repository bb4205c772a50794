//! Output frames streamed to the caller during playback.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::StatusChange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameKind {
    Text,
    TextEnd,
    InputRequest,
    ChoiceRequest,
    LessonComplete,
    LessonStatusUpdate,
}

/// One unit of playback output: `{kind, content, script_id}` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub kind: FrameKind,
    pub content: Value,
    pub script_id: Option<String>,
}

impl Frame {
    pub fn text(content: impl Into<String>, script_id: Option<&str>) -> Self {
        Self::new(FrameKind::Text, Value::String(content.into()), script_id)
    }

    pub fn text_end(script_id: Option<&str>) -> Self {
        Self::new(FrameKind::TextEnd, Value::String(String::new()), script_id)
    }

    pub fn input_request(payload: Value, script_id: &str) -> Self {
        Self::new(FrameKind::InputRequest, payload, Some(script_id))
    }

    pub fn choice_request(payload: Value, script_id: &str) -> Self {
        Self::new(FrameKind::ChoiceRequest, payload, Some(script_id))
    }

    pub fn lesson_complete() -> Self {
        Self::new(FrameKind::LessonComplete, Value::String(String::new()), None)
    }

    pub fn lesson_status_update(change: &StatusChange) -> Self {
        let content = serde_json::to_value(change).unwrap_or(Value::Null);
        Self::new(FrameKind::LessonStatusUpdate, content, None)
    }

    fn new(kind: FrameKind, content: Value, script_id: Option<&str>) -> Self {
        Self {
            kind,
            content,
            script_id: script_id.map(str::to_string),
        }
    }

    /// Text payload of a `text` frame, if this is one.
    pub fn as_text(&self) -> Option<&str> {
        match (self.kind, &self.content) {
            (FrameKind::Text, Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// True for frames that end one invocation's output.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            FrameKind::TextEnd
                | FrameKind::InputRequest
                | FrameKind::ChoiceRequest
                | FrameKind::LessonStatusUpdate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lesson_code::LessonCode;
    use crate::model::AttendanceStatus;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let frame = Frame::text("H", Some("s1"));
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"kind": "text", "content": "H", "script_id": "s1"})
        );
        assert_eq!(
            serde_json::to_value(Frame::text_end(None)).unwrap(),
            json!({"kind": "text-end", "content": "", "script_id": null})
        );
    }

    #[test]
    fn test_status_update_carries_structured_content() {
        let change = StatusChange {
            lesson_no: LessonCode::parse("0102").unwrap(),
            lesson_name: "Loops".to_string(),
            lesson_id: "l-0102".to_string(),
            status: AttendanceStatus::NotStarted,
        };
        let frame = Frame::lesson_status_update(&change);
        assert_eq!(frame.kind, FrameKind::LessonStatusUpdate);
        assert_eq!(
            frame.content,
            json!({
                "lesson_no": "0102",
                "lesson_name": "Loops",
                "lesson_id": "l-0102",
                "status": "not-started"
            })
        );
        assert!(frame.is_terminal());
        assert!(!Frame::lesson_complete().is_terminal());
    }
}
