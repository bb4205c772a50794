//! Read-only views over a learner's progress: the lesson tree with statuses,
//! and the transcript of one lesson.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::Result;
use crate::lesson_code::LessonCode;
use crate::model::Role;
use crate::store::{AttendanceStore, CatalogStore};

/// Status label for lessons the learner has no attendance for.
pub const UNAVAILABLE: &str = "unavailable";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonNode {
    pub lesson_no: LessonCode,
    pub lesson_name: String,
    pub lesson_id: String,
    pub status: String,
    pub children: Vec<LessonNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseTree {
    pub course_id: String,
    pub course_name: String,
    pub lessons: Vec<LessonNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyRecord {
    pub ordinal: u32,
    pub role: Role,
    pub script_ordinal: u32,
    pub content: String,
}

/// The course's visible lessons nested by code. Lessons whose parent is not
/// visible are left out. Returns `None` for an unknown course.
pub async fn lesson_tree(
    catalog: &dyn CatalogStore,
    store: &dyn AttendanceStore,
    learner_id: &str,
    course_id: &str,
) -> Result<Option<CourseTree>> {
    let Some(course) = catalog.course(course_id).await? else {
        return Ok(None);
    };
    let statuses: HashMap<String, String> = store
        .for_course(learner_id, course_id)
        .await?
        .into_iter()
        .map(|a| (a.lesson_id, a.status.to_string()))
        .collect();

    let mut nodes: BTreeMap<LessonCode, LessonNode> = catalog
        .lessons_of(course_id)
        .await?
        .into_iter()
        .filter(|lesson| lesson.is_playable())
        .map(|lesson| {
            let status = statuses
                .get(&lesson.id)
                .cloned()
                .unwrap_or_else(|| UNAVAILABLE.to_string());
            let node = LessonNode {
                lesson_no: lesson.code.clone(),
                lesson_name: lesson.name,
                lesson_id: lesson.id,
                status,
                children: Vec::new(),
            };
            (lesson.code, node)
        })
        .collect();

    // Deepest codes first, so every subtree is complete before it moves.
    let codes: Vec<LessonCode> = nodes.keys().cloned().collect();
    for code in codes.iter().rev() {
        let Some(parent) = code.parent() else {
            continue;
        };
        if let Some(node) = nodes.remove(code) {
            if let Some(parent_node) = nodes.get_mut(&parent) {
                parent_node.children.insert(0, node);
            }
        }
    }

    Ok(Some(CourseTree {
        course_id: course.id,
        course_name: course.name,
        lessons: nodes.into_values().collect(),
    }))
}

/// The learner's transcript for a lesson, or `None` without an attendance.
pub async fn study_record(
    catalog: &dyn CatalogStore,
    store: &dyn AttendanceStore,
    learner_id: &str,
    lesson_id: &str,
) -> Result<Option<Vec<StudyRecord>>> {
    let Some(lesson) = catalog.lesson(lesson_id).await? else {
        return Ok(None);
    };
    let Some(attendance) = store.find(learner_id, &lesson.course_id, lesson_id).await? else {
        return Ok(None);
    };
    let records = store
        .transcript(attendance.id)
        .await?
        .into_iter()
        .map(|entry| StudyRecord {
            ordinal: entry.ordinal,
            role: entry.role,
            script_ordinal: entry.script_ordinal,
            content: entry.content,
        })
        .collect();
    Ok(Some(records))
}
