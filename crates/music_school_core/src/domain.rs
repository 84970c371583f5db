//! crates/music_school_core/src/domain.rs
//!
//! Defines the core data structures for the application.
//!
//! The course document (with its embedded lesson content) derives serde
//! traits because it is persisted as a single JSON document: content may
//! live under the legacy `modules` hierarchy, the newer `chapters`
//! hierarchy, or both, and no migration reconciles them. Every nested
//! collection defaults to empty so sparse documents from either era still
//! deserialize.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A course aggregate: pricing plus lesson content under two parallel,
/// independently-populated hierarchies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Price in minor currency units. Zero means the course is free.
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub is_free: bool,
    /// Legacy hierarchy: modules directly on the course.
    #[serde(default)]
    pub modules: Vec<CourseModule>,
    /// Current hierarchy: chapters, each holding modules.
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

impl Course {
    /// A course is free when either the explicit flag is set or the price
    /// is zero. Both spellings occur in stored documents.
    pub fn is_effectively_free(&self) -> bool {
        self.is_free || self.price == 0
    }

    /// Total lessons across both hierarchies.
    pub fn lesson_count(&self) -> usize {
        let legacy: usize = self.modules.iter().map(|m| m.lessons.len()).sum();
        let chaptered: usize = self
            .chapters
            .iter()
            .flat_map(|c| c.modules.iter())
            .map(|m| m.lessons.len())
            .sum();
        legacy + chaptered
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    #[serde(default)]
    pub modules: Vec<CourseModule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseModule {
    pub title: String,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

/// A lesson embedded in a course document. Lessons have no identity of
/// their own and are addressed positionally by index; deleting or
/// reordering a sibling silently shifts the addresses after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub title: String,
    pub kind: LessonKind,
    /// Relative storage path for video lessons. May be recorded as
    /// `/uploads/<name>`, `uploads/<name>`, or a bare filename.
    #[serde(default)]
    pub video_path: Option<String>,
    /// Relative storage path for PDF lessons, same three shapes.
    #[serde(default)]
    pub pdf_path: Option<String>,
    #[serde(default)]
    pub free_preview: bool,
    #[serde(default)]
    pub duration_sec: Option<u32>,
    #[serde(default)]
    pub order: u32,
}

impl Lesson {
    /// The stored path backing this lesson, whichever field its kind uses.
    pub fn storage_path(&self) -> Option<&str> {
        match self.kind {
            LessonKind::Video => self.video_path.as_deref(),
            LessonKind::Pdf => self.pdf_path.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonKind {
    Video,
    Pdf,
}

/// The positional address of a lesson within a course document.
///
/// `chapter` is `Some` only when the caller explicitly requested chapter
/// addressing; the locator never falls back to the legacy hierarchy in
/// that case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LessonAddress {
    pub chapter: Option<usize>,
    pub module: usize,
    pub lesson: usize,
}

/// Links a user identity to a course. The `user_id` may be a provider
/// user id or a synthesized `email:<address>` placeholder for users known
/// only by email. Access is granted only once `approved` is true;
/// pending or payment-unverified enrollments grant nothing.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub user_id: String,
    pub course_id: Uuid,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}
