//! Control-token detection over a streamed check response.
//!
//! The model answers a completion check either with the control token (the
//! learner's reply passed, followed by profile updates) or with feedback for
//! the learner. Nothing can be shown until the first characters have arrived,
//! so the watch buffers, then either suppresses the whole response or flushes
//! the buffer and forwards everything after it.

use std::collections::HashMap;

use crate::error::Result;

/// Where the token may start: position 0, or 1 behind a single stray
/// character the model sometimes emits first.
const MAX_TOKEN_OFFSET: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Not enough text yet to decide.
    Buffering,
    /// The token was not found; text goes to the learner.
    Streaming,
    /// The token was found; the response stays hidden.
    Matched,
}

/// What the caller should emit for one pushed chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    Hold,
    /// Emit all text buffered so far; detection just failed.
    Flush(String),
    /// Emit this chunk as it arrived.
    Forward(String),
}

#[derive(Debug)]
pub struct ControlTokenWatch {
    token: String,
    text: String,
    state: WatchState,
}

impl ControlTokenWatch {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            text: String::new(),
            state: WatchState::Buffering,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn push(&mut self, chunk: &str) -> WatchAction {
        self.text.push_str(chunk);
        match self.state {
            WatchState::Matched => WatchAction::Hold,
            WatchState::Streaming => WatchAction::Forward(chunk.to_string()),
            WatchState::Buffering => self.classify(false),
        }
    }

    /// Settles a response that ended while still buffering.
    pub fn finish(&mut self) -> WatchAction {
        match self.state {
            WatchState::Buffering => self.classify(true),
            _ => WatchAction::Hold,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.state == WatchState::Matched
    }

    fn classify(&mut self, complete: bool) -> WatchAction {
        let token_len = self.token.chars().count();
        if !complete && self.text.chars().count() < token_len {
            return WatchAction::Hold;
        }
        if self.token_offset().is_some() {
            self.state = WatchState::Matched;
            return WatchAction::Hold;
        }
        if !complete && self.may_match_after_artifact() {
            return WatchAction::Hold;
        }
        self.state = WatchState::Streaming;
        if self.text.is_empty() {
            WatchAction::Hold
        } else {
            WatchAction::Flush(self.text.clone())
        }
    }

    fn token_offset(&self) -> Option<usize> {
        (0..=MAX_TOKEN_OFFSET).find(|&skip| {
            self.text
                .char_indices()
                .nth(skip)
                .is_some_and(|(at, _)| self.text[at..].starts_with(&self.token))
        })
    }

    /// True while the text after one leading character is still a prefix of
    /// the token, so a match at offset 1 cannot be ruled out yet.
    fn may_match_after_artifact(&self) -> bool {
        let mut chars = self.text.char_indices();
        match chars.nth(1) {
            Some((at, _)) => self.token.starts_with(&self.text[at..]),
            None => true,
        }
    }

    /// Removes the token and parses the remainder as profile updates.
    pub fn into_profile_updates(self) -> Result<HashMap<String, String>> {
        parse_profile_updates(&self.text, &self.token)
    }
}

/// Parses a matched response (`<token>{"key": "value", ...}`) into updates.
/// Non-string JSON values are stored in their JSON text form.
pub fn parse_profile_updates(response: &str, token: &str) -> Result<HashMap<String, String>> {
    let payload = response.replacen(token, "", 1);
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(payload.trim())?;
    Ok(object
        .into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlaybackError;

    fn run(token: &str, chunks: &[&str]) -> (ControlTokenWatch, Vec<WatchAction>) {
        let mut watch = ControlTokenWatch::new(token);
        let mut actions: Vec<WatchAction> = chunks.iter().map(|c| watch.push(c)).collect();
        actions.push(watch.finish());
        actions.retain(|a| *a != WatchAction::Hold);
        (watch, actions)
    }

    #[test]
    fn test_token_at_start_suppresses_everything() {
        let (watch, actions) = run("PASS", &["PA", "SS{\"name\":", "\"Ana\"}"]);
        assert!(watch.is_matched());
        assert!(actions.is_empty());
    }

    #[test]
    fn test_token_behind_one_artifact_character_matches() {
        let (watch, actions) = run("PASS", &["\nPAS", "S{}"]);
        assert!(watch.is_matched());
        assert!(actions.is_empty());
    }

    #[test]
    fn test_miss_flushes_buffer_then_forwards_chunks() {
        let (watch, actions) = run("PASS", &["No", "t yet", ", try again"]);
        assert_eq!(watch.state(), WatchState::Streaming);
        assert_eq!(
            actions,
            vec![
                WatchAction::Flush("Not yet".to_string()),
                WatchAction::Forward(", try again".to_string()),
            ]
        );
        assert_eq!(watch.text(), "Not yet, try again");
    }

    #[test]
    fn test_token_later_in_text_is_not_a_match() {
        let (watch, actions) = run("PASS", &["I will PASS you"]);
        assert!(!watch.is_matched());
        assert_eq!(actions, vec![WatchAction::Flush("I will PASS you".to_string())]);
    }

    #[test]
    fn test_short_response_is_flushed_on_finish() {
        let (watch, actions) = run("PASS", &["No"]);
        assert_eq!(watch.state(), WatchState::Streaming);
        assert_eq!(actions, vec![WatchAction::Flush("No".to_string())]);
    }

    #[test]
    fn test_profile_updates_strip_token_and_stringify_values() {
        let updates = parse_profile_updates("PASS {\"name\": \"Ana\", \"age\": 7}", "PASS").unwrap();
        assert_eq!(updates.get("name").map(String::as_str), Some("Ana"));
        assert_eq!(updates.get("age").map(String::as_str), Some("7"));
    }

    #[test]
    fn test_malformed_profile_payload_is_a_parse_error() {
        let err = parse_profile_updates("PASS name=Ana", "PASS").unwrap_err();
        assert!(matches!(err, PlaybackError::ProfileParse(_)));
    }
}
