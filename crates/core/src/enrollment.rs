//! Attendance rows created when a learner joins a course.

use crate::model::{Attendance, AttendanceStatus, Lesson};

/// The learner's attendances for a course in lesson order, and which of them
/// did not exist before.
#[derive(Debug, Clone, Default)]
pub struct Enrollment {
    pub attendances: Vec<Attendance>,
    pub created: Vec<Attendance>,
}

/// Plans trial enrollment over a course's lessons.
///
/// Every playable lesson gets an attendance; the first chapter's root and its
/// `01` lesson open as not-started and the rest stay locked until a cascade
/// unlocks them. Rows in `existing` are kept unchanged. Attendances come back
/// in course order (a chapter root, then its lessons, then the next chapter).
pub fn trial_enrollment(
    learner_id: &str,
    course_id: &str,
    lessons: &[Lesson],
    existing: &[Attendance],
) -> Enrollment {
    let mut playable: Vec<&Lesson> = lessons.iter().filter(|l| l.is_playable()).collect();
    playable.sort_by(|a, b| a.code.as_str().cmp(b.code.as_str()));

    let entry_chapter = playable.iter().map(|l| l.code.chapter()).min();
    let entry_child = entry_chapter.as_ref().map(|c| c.first_child());

    let mut enrollment = Enrollment::default();
    for lesson in playable {
        if let Some(attendance) = existing.iter().find(|a| a.lesson_id == lesson.id) {
            enrollment.attendances.push(attendance.clone());
            continue;
        }
        let opens = Some(&lesson.code) == entry_chapter.as_ref()
            || Some(&lesson.code) == entry_child.as_ref();
        let status = if opens {
            AttendanceStatus::NotStarted
        } else {
            AttendanceStatus::Locked
        };
        let attendance = Attendance::new(learner_id, course_id, &lesson.id, status);
        enrollment.created.push(attendance.clone());
        enrollment.attendances.push(attendance);
    }
    enrollment
}

/// The attendance playback resumes when no lesson is named: the first one
/// in course order that is under way or open, else the first one.
///
/// A chapter root with lessons below it in `lessons` is passed over while an
/// open lesson follows it; the cascade completes the root once its last
/// lesson finishes.
pub fn current_attendance<'a>(
    attendances: &'a [Attendance],
    lessons: &[Lesson],
) -> Option<&'a Attendance> {
    let is_open = |a: &&Attendance| {
        matches!(
            a.status,
            AttendanceStatus::InProgress | AttendanceStatus::NotStarted
        )
    };
    let heads_chapter = |a: &&Attendance| {
        lessons.iter().find(|l| l.id == a.lesson_id).is_some_and(|root| {
            lessons
                .iter()
                .any(|l| l.code != root.code && l.code.starts_with(&root.code))
        })
    };
    attendances
        .iter()
        .filter(is_open)
        .find(|a| !heads_chapter(a))
        .or_else(|| attendances.iter().find(is_open))
        .or_else(|| attendances.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lesson_code::LessonCode;

    fn lesson(code: &str) -> Lesson {
        Lesson {
            id: format!("lesson-{}", code),
            course_id: "c1".to_string(),
            name: code.to_string(),
            code: LessonCode::parse(code).unwrap(),
            active: true,
            hidden: false,
        }
    }

    #[test]
    fn test_trial_opens_first_chapter_entry_only() {
        let lessons = vec![lesson("02"), lesson("0102"), lesson("01"), lesson("0101")];
        let enrollment = trial_enrollment("u1", "c1", &lessons, &[]);

        let plan: Vec<(&str, AttendanceStatus)> = enrollment
            .attendances
            .iter()
            .map(|a| (a.lesson_id.as_str(), a.status))
            .collect();
        assert_eq!(
            plan,
            vec![
                ("lesson-01", AttendanceStatus::NotStarted),
                ("lesson-0101", AttendanceStatus::NotStarted),
                ("lesson-0102", AttendanceStatus::Locked),
                ("lesson-02", AttendanceStatus::Locked),
            ]
        );
        assert_eq!(enrollment.created.len(), 4);
    }

    #[test]
    fn test_trial_keeps_existing_rows_and_skips_hidden() {
        let mut hidden = lesson("0103");
        hidden.hidden = true;
        let lessons = vec![lesson("01"), lesson("0101"), hidden];
        let mut started = Attendance::new("u1", "c1", "lesson-01", AttendanceStatus::InProgress);
        started.position = 2;

        let enrollment = trial_enrollment("u1", "c1", &lessons, &[started.clone()]);
        assert_eq!(enrollment.attendances.len(), 2);
        assert_eq!(enrollment.attendances[0], started);
        assert_eq!(enrollment.created.len(), 1);
        assert_eq!(enrollment.created[0].lesson_id, "lesson-0101");
    }

    #[test]
    fn test_current_attendance_prefers_open_lessons() {
        let done = Attendance::new("u1", "c1", "a", AttendanceStatus::Completed);
        let open = Attendance::new("u1", "c1", "b", AttendanceStatus::NotStarted);
        let locked = Attendance::new("u1", "c1", "c", AttendanceStatus::Locked);
        let all = vec![done.clone(), open.clone(), locked];
        assert_eq!(current_attendance(&all, &[]), Some(&open));
        assert_eq!(current_attendance(&[done.clone()], &[]), Some(&done));
        assert_eq!(current_attendance(&[], &[]), None);
    }

    #[test]
    fn test_current_attendance_passes_over_chapter_roots() {
        let lessons = vec![lesson("01"), lesson("0101"), lesson("02")];
        let enrollment = trial_enrollment("u1", "c1", &lessons, &[]);

        let current = current_attendance(&enrollment.attendances, &lessons).unwrap();
        assert_eq!(current.lesson_id, "lesson-0101");

        let mut finished = enrollment.attendances.clone();
        finished[1].status = AttendanceStatus::Completed;
        finished[2].status = AttendanceStatus::NotStarted;
        let current = current_attendance(&finished, &lessons).unwrap();
        assert_eq!(current.lesson_id, "lesson-02");
    }

    #[test]
    fn test_open_chapter_root_is_used_when_nothing_else_is_open() {
        let lessons = vec![lesson("01"), lesson("0101")];
        let root = Attendance::new("u1", "c1", "lesson-01", AttendanceStatus::NotStarted);
        let child = Attendance::new("u1", "c1", "lesson-0101", AttendanceStatus::Completed);
        let all = vec![root.clone(), child];
        assert_eq!(current_attendance(&all, &lessons), Some(&root));
    }
}
