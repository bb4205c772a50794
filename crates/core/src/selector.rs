//! Chooses the next script for an attendance.
//!
//! Selection is a function of the attendance value passed in: it returns the
//! advanced attendance alongside the script instead of writing anything, and
//! the executor commits both together with the step that plays the script.

use tracing::info;

use crate::error::{PlaybackError, Result};
use crate::model::{Attendance, AttendanceStatus, Script};
use crate::store::CatalogStore;

/// The attendance after advancing, and the script to run at its position.
/// `script` is `None` when the lesson has no further scripts.
#[derive(Debug, Clone)]
pub struct Selection {
    pub attendance: Attendance,
    pub script: Option<Script>,
}

/// The ordinal the next script lives at.
pub fn next_position(attendance: &Attendance) -> u32 {
    match attendance.status {
        AttendanceStatus::Locked | AttendanceStatus::NotStarted => 1,
        AttendanceStatus::InProgress | AttendanceStatus::Completed => attendance.position + 1,
    }
}

/// Applies the outcome of looking up `next_position`.
///
/// A found script moves the position onto it (starting the lesson if needed);
/// a missing one completes the lesson and leaves the position on the last
/// script, so the position never exceeds the script count.
pub fn settle(attendance: &Attendance, found: bool) -> Attendance {
    let mut next = attendance.clone();
    if found {
        next.advance_status(AttendanceStatus::InProgress);
        next.position = next_position(attendance);
    } else {
        next.advance_status(AttendanceStatus::Completed);
    }
    next
}

/// Advances to the next script of the attendance's lesson.
pub async fn select_next(catalog: &dyn CatalogStore, attendance: &Attendance) -> Result<Selection> {
    let ordinal = next_position(attendance);
    let script = catalog.script_at(&attendance.lesson_id, ordinal).await?;
    if script.is_none() {
        info!(attendance_id = %attendance.id, lesson = %attendance.lesson_id, "No script left in lesson");
    }
    Ok(Selection {
        attendance: settle(attendance, script.is_some()),
        script,
    })
}

/// Resolves the script a learner is replying to, without advancing.
pub async fn select_reply_target(
    catalog: &dyn CatalogStore,
    attendance: &Attendance,
    script_id: &str,
) -> Result<Script> {
    catalog
        .scripts_of(&attendance.lesson_id)
        .await?
        .into_iter()
        .find(|script| script.id == script_id)
        .ok_or_else(|| PlaybackError::ScriptNotFound {
            script_id: script_id.to_string(),
            lesson_id: attendance.lesson_id.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attendance(status: AttendanceStatus, position: u32) -> Attendance {
        let mut a = Attendance::new("u1", "c1", "l1", status);
        a.position = position;
        a
    }

    #[test]
    fn test_not_started_begins_at_first_script() {
        let a = attendance(AttendanceStatus::NotStarted, 0);
        assert_eq!(next_position(&a), 1);
        let next = settle(&a, true);
        assert_eq!(next.status, AttendanceStatus::InProgress);
        assert_eq!(next.position, 1);
    }

    #[test]
    fn test_locked_lesson_played_explicitly_starts_like_not_started() {
        let next = settle(&attendance(AttendanceStatus::Locked, 0), true);
        assert_eq!(next.status, AttendanceStatus::InProgress);
        assert_eq!(next.position, 1);
    }

    #[test]
    fn test_in_progress_increments_position() {
        let next = settle(&attendance(AttendanceStatus::InProgress, 2), true);
        assert_eq!(next.position, 3);
        assert_eq!(next.status, AttendanceStatus::InProgress);
    }

    #[test]
    fn test_exhaustion_completes_without_overrunning_position() {
        let a = attendance(AttendanceStatus::InProgress, 3);
        let next = settle(&a, false);
        assert_eq!(next.status, AttendanceStatus::Completed);
        assert_eq!(next.position, 3);
        assert_eq!(next.id, a.id);
    }

    #[test]
    fn test_completed_lesson_stays_completed_when_replayed() {
        let next = settle(&attendance(AttendanceStatus::Completed, 3), false);
        assert_eq!(next.status, AttendanceStatus::Completed);
        assert_eq!(next.position, 3);
    }
}
