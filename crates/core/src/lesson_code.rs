//! Hierarchical lesson codes.
//!
//! A lesson's position in a course is a string of two-digit segments: `"01"` is
//! a chapter root, `"0102"` the second lesson of that chapter, and deeper codes
//! are sub-lessons. Codes are validated once when the catalog is loaded so the
//! rest of the engine can navigate the hierarchy without string slicing.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::PlaybackError;

const SEGMENT: usize = 2;

/// A validated hierarchical lesson code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LessonCode(String);

impl LessonCode {
    /// Parses a code, rejecting empty, odd-length, or non-digit input.
    pub fn parse(code: &str) -> Result<Self, PlaybackError> {
        let valid = !code.is_empty()
            && code.len() % SEGMENT == 0
            && code.bytes().all(|b| b.is_ascii_digit());
        if valid {
            Ok(Self(code.to_string()))
        } else {
            Err(PlaybackError::InvalidLessonCode(code.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Nesting depth: 1 for a chapter, 2 for a lesson, and so on.
    pub fn depth(&self) -> usize {
        self.0.len() / SEGMENT
    }

    pub fn is_chapter(&self) -> bool {
        self.depth() == 1
    }

    /// The chapter this code belongs to (itself when it is a chapter).
    pub fn chapter(&self) -> LessonCode {
        Self(self.0[..SEGMENT].to_string())
    }

    /// The enclosing code one level up, or `None` for a chapter.
    pub fn parent(&self) -> Option<LessonCode> {
        if self.is_chapter() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - SEGMENT].to_string()))
        }
    }

    /// The `01` sub-lesson directly below this code.
    pub fn first_child(&self) -> LessonCode {
        Self(format!("{}01", self.0))
    }

    /// The root of the chapter after this code's chapter, or `None` past `99`.
    pub fn next_sibling_chapter(&self) -> Option<LessonCode> {
        let number: u32 = self.chapter().0.parse().ok()?;
        let next = number + 1;
        if next > 99 {
            return None;
        }
        Some(Self(format!("{:02}", next)))
    }

    /// True when `prefix` is this code or one of its ancestors.
    pub fn starts_with(&self, prefix: &LessonCode) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl Ord for LessonCode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for LessonCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for LessonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LessonCode {
    type Error = PlaybackError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LessonCode> for String {
    fn from(code: LessonCode) -> Self {
        code.0
    }
}
