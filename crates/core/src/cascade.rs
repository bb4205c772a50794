//! Completion and unlock effects of finishing a lesson.
//!
//! Finishing the last lesson of a chapter completes the chapter root and
//! unlocks the next chapter's entry lessons; finishing any lesson unlocks the
//! one after it in its chapter. The cascade only computes the new attendance
//! values; the caller commits them in the same step as the completion.

use tracing::{debug, info};

use crate::error::{PlaybackError, Result};
use crate::lesson_code::LessonCode;
use crate::model::{Attendance, AttendanceStatus, Lesson, StatusChange};
use crate::store::{AttendanceStore, CatalogStore};

/// Attendances to write and the status changes to report, in order.
#[derive(Debug, Clone, Default)]
pub struct Cascade {
    pub attendances: Vec<Attendance>,
    pub changes: Vec<StatusChange>,
}

impl Cascade {
    fn current(&self, attendance: &Attendance) -> Attendance {
        self.attendances
            .iter()
            .find(|a| a.id == attendance.id)
            .cloned()
            .unwrap_or_else(|| attendance.clone())
    }

    fn record(&mut self, attendance: Attendance) {
        match self.attendances.iter_mut().find(|a| a.id == attendance.id) {
            Some(existing) => *existing = attendance,
            None => self.attendances.push(attendance),
        }
    }

    /// Moves `attendance` forward to `status`, reporting it only if it changed.
    fn transition(&mut self, lesson: &Lesson, attendance: &Attendance, status: AttendanceStatus) {
        let mut next = self.current(attendance);
        if next.advance_status(status) {
            debug!(lesson = %lesson.code, %status, "Cascading status");
            self.changes.push(StatusChange::new(lesson, status));
            self.record(next);
        }
    }
}

/// Lessons under `prefix` that the learner attends, ordered so the chapter
/// root precedes its children.
pub async fn chapter_roster(
    catalog: &dyn CatalogStore,
    store: &dyn AttendanceStore,
    learner_id: &str,
    course_id: &str,
    prefix: &LessonCode,
) -> Result<Vec<(Lesson, Attendance)>> {
    let lessons = catalog.lessons_under(course_id, prefix).await?;
    if lessons.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<String> = lessons.iter().map(|l| l.id.clone()).collect();
    let mut roster: Vec<(Lesson, Attendance)> = store
        .for_lessons(learner_id, &ids)
        .await?
        .into_iter()
        .filter_map(|attendance| {
            lessons
                .iter()
                .find(|l| l.id == attendance.lesson_id)
                .map(|lesson| (lesson.clone(), attendance))
        })
        .collect();
    roster.sort_by(|a, b| a.0.code.cmp(&b.0.code));
    Ok(roster)
}

/// Computes every status change caused by completing `completed`, given as it
/// was before completion. A lesson that was already completed reports no
/// change of its own.
pub async fn cascade_completion(
    catalog: &dyn CatalogStore,
    store: &dyn AttendanceStore,
    completed: &Attendance,
) -> Result<Cascade> {
    let lesson = catalog
        .lesson(&completed.lesson_id)
        .await?
        .ok_or_else(|| PlaybackError::LessonNotFound(completed.lesson_id.clone()))?;

    let mut cascade = Cascade::default();
    cascade.transition(&lesson, completed, AttendanceStatus::Completed);

    let chapter = lesson.code.chapter();
    let learner = completed.learner_id.as_str();
    let siblings = chapter_roster(catalog, store, learner, &lesson.course_id, &chapter).await?;

    let is_last = siblings
        .last()
        .is_some_and(|(_, attendance)| attendance.id == completed.id);
    if is_last {
        if let Some((root, attendance)) = siblings.first() {
            if root.code == chapter && attendance.id != completed.id {
                cascade.transition(root, attendance, AttendanceStatus::Completed);
            }
        }
        if let Some(next_chapter) = chapter.next_sibling_chapter() {
            let entry_child = next_chapter.first_child();
            let next = chapter_roster(catalog, store, learner, &lesson.course_id, &next_chapter).await?;
            for (next_lesson, attendance) in &next {
                if next_lesson.code == next_chapter || next_lesson.code == entry_child {
                    cascade.transition(next_lesson, attendance, AttendanceStatus::NotStarted);
                }
            }
        }
    }

    let following = siblings
        .iter()
        .position(|(_, attendance)| attendance.id == completed.id)
        .and_then(|idx| siblings.get(idx + 1));
    if let Some((next_lesson, attendance)) = following {
        cascade.transition(next_lesson, attendance, AttendanceStatus::NotStarted);
    }

    info!(
        lesson = %lesson.code,
        learner = %learner,
        changes = cascade.changes.len(),
        chapter_finished = is_last,
        "Lesson completion cascaded"
    );
    Ok(cascade)
}
