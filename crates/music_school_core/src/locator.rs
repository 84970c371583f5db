//! crates/music_school_core/src/locator.rs
//!
//! Resolves a positional lesson address against a course document.
//!
//! A course may carry lesson content in the legacy `modules` hierarchy, the
//! newer `chapters` hierarchy, or both. Courses authored before chapters
//! existed were never migrated, so the locator tries the hierarchies under a
//! defined precedence instead of assuming one shape. Every index lookup is
//! bounds-checked; an out-of-range or missing link yields `None`, never a
//! panic.

use crate::domain::{Course, Lesson, LessonAddress};

/// Which hierarchy wins when a course has both populated and the caller did
/// not request explicit chapter addressing.
///
/// The deployed behavior is `LegacyModulesFirst`: callers that omit a
/// chapter index always resolve against `modules`, silently ignoring
/// chapter content. Whether that is intended for dual-hierarchy courses is
/// an open product question, so the choice lives here as a single constant
/// rather than being baked into branching code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyPrecedence {
    LegacyModulesFirst,
    ChaptersFirst,
}

pub const HIERARCHY_PRECEDENCE: HierarchyPrecedence = HierarchyPrecedence::LegacyModulesFirst;

/// Resolves `addr` against `course` under the deployed precedence.
pub fn locate_lesson<'a>(course: &'a Course, addr: &LessonAddress) -> Option<&'a Lesson> {
    locate_with_precedence(course, addr, HIERARCHY_PRECEDENCE)
}

/// Resolves `addr` against `course` under an explicit precedence.
///
/// Resolution rules, first match wins:
/// 1. An explicit chapter index resolves only through
///    `chapters[ci].modules[mi].lessons[li]` — a broken link anywhere in
///    that chain is "not found", with no fallback to the legacy hierarchy.
/// 2. Otherwise the first non-empty hierarchy (per `precedence`) is
///    selected; chapter addressing without an index assumes chapter 0.
/// 3. A course with neither hierarchy populated resolves nothing.
pub fn locate_with_precedence<'a>(
    course: &'a Course,
    addr: &LessonAddress,
    precedence: HierarchyPrecedence,
) -> Option<&'a Lesson> {
    if let Some(ci) = addr.chapter {
        return lesson_in_chapter(course, ci, addr.module, addr.lesson);
    }

    match precedence {
        HierarchyPrecedence::LegacyModulesFirst => {
            if !course.modules.is_empty() {
                lesson_in_modules(course, addr.module, addr.lesson)
            } else if !course.chapters.is_empty() {
                lesson_in_chapter(course, 0, addr.module, addr.lesson)
            } else {
                None
            }
        }
        HierarchyPrecedence::ChaptersFirst => {
            if !course.chapters.is_empty() {
                lesson_in_chapter(course, 0, addr.module, addr.lesson)
            } else if !course.modules.is_empty() {
                lesson_in_modules(course, addr.module, addr.lesson)
            } else {
                None
            }
        }
    }
}

/// Selects the module a write (append or delete) addresses, under the same
/// hierarchy-selection rules as lookup. Writes always use the deployed
/// precedence.
pub fn target_module_mut(
    course: &mut Course,
    chapter: Option<usize>,
    module: usize,
) -> Option<&mut crate::domain::CourseModule> {
    if let Some(ci) = chapter {
        return course.chapters.get_mut(ci)?.modules.get_mut(module);
    }
    match HIERARCHY_PRECEDENCE {
        HierarchyPrecedence::LegacyModulesFirst => {
            if !course.modules.is_empty() {
                course.modules.get_mut(module)
            } else if !course.chapters.is_empty() {
                course.chapters.get_mut(0)?.modules.get_mut(module)
            } else {
                None
            }
        }
        HierarchyPrecedence::ChaptersFirst => {
            if !course.chapters.is_empty() {
                course.chapters.get_mut(0)?.modules.get_mut(module)
            } else if !course.modules.is_empty() {
                course.modules.get_mut(module)
            } else {
                None
            }
        }
    }
}

/// Removes the addressed lesson and returns it, so the caller can dispose
/// of the backing file. Removal shifts the addresses of every later
/// sibling, which is inherent to positional addressing.
pub fn remove_lesson(course: &mut Course, addr: &LessonAddress) -> Option<Lesson> {
    let module = target_module_mut(course, addr.chapter, addr.module)?;
    if addr.lesson < module.lessons.len() {
        Some(module.lessons.remove(addr.lesson))
    } else {
        None
    }
}

fn lesson_in_modules<'a>(course: &'a Course, mi: usize, li: usize) -> Option<&'a Lesson> {
    course.modules.get(mi)?.lessons.get(li)
}

fn lesson_in_chapter<'a>(course: &'a Course, ci: usize, mi: usize, li: usize) -> Option<&'a Lesson> {
    course.chapters.get(ci)?.modules.get(mi)?.lessons.get(li)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Chapter, CourseModule, LessonKind};
    use uuid::Uuid;

    fn lesson(title: &str) -> Lesson {
        Lesson {
            title: title.to_string(),
            kind: LessonKind::Video,
            video_path: Some(format!("{title}.mp4")),
            pdf_path: None,
            free_preview: false,
            duration_sec: None,
            order: 0,
        }
    }

    fn course(modules: Vec<CourseModule>, chapters: Vec<Chapter>) -> Course {
        Course {
            id: Uuid::new_v4(),
            title: "Piano Foundations".to_string(),
            description: None,
            price: 1999,
            is_free: false,
            modules,
            chapters,
        }
    }

    fn module(lessons: Vec<Lesson>) -> CourseModule {
        CourseModule {
            title: "Module".to_string(),
            lessons,
        }
    }

    fn addr(chapter: Option<usize>, module: usize, lesson: usize) -> LessonAddress {
        LessonAddress {
            chapter,
            module,
            lesson,
        }
    }

    #[test]
    fn resolves_legacy_modules() {
        let c = course(vec![module(vec![lesson("a"), lesson("b")])], vec![]);
        let found = locate_lesson(&c, &addr(None, 0, 1)).unwrap();
        assert_eq!(found.title, "b");
    }

    #[test]
    fn falls_back_to_chapter_zero_when_no_legacy_modules() {
        let c = course(
            vec![],
            vec![Chapter {
                title: "Ch 1".to_string(),
                modules: vec![module(vec![lesson("c")])],
            }],
        );
        let found = locate_lesson(&c, &addr(None, 0, 0)).unwrap();
        assert_eq!(found.title, "c");
    }

    #[test]
    fn explicit_chapter_index_resolves_through_chapters_only() {
        let c = course(
            vec![module(vec![lesson("legacy")])],
            vec![
                Chapter {
                    title: "Ch 1".to_string(),
                    modules: vec![module(vec![lesson("ch1")])],
                },
                Chapter {
                    title: "Ch 2".to_string(),
                    modules: vec![module(vec![lesson("ch2")])],
                },
            ],
        );
        let found = locate_lesson(&c, &addr(Some(1), 0, 0)).unwrap();
        assert_eq!(found.title, "ch2");
    }

    #[test]
    fn explicit_chapter_miss_does_not_fall_back_to_modules() {
        // The course has legacy content that would satisfy the address, but
        // an explicitly requested chapter that does not exist must stay a
        // miss.
        let c = course(
            vec![module(vec![lesson("legacy")])],
            vec![Chapter {
                title: "Only chapter".to_string(),
                modules: vec![module(vec![lesson("ch1")])],
            }],
        );
        assert!(locate_lesson(&c, &addr(Some(2), 0, 0)).is_none());
    }

    #[test]
    fn out_of_range_indices_are_a_miss_not_a_panic() {
        let c = course(vec![module(vec![lesson("a")])], vec![]);
        assert!(locate_lesson(&c, &addr(None, 0, 5)).is_none());
        assert!(locate_lesson(&c, &addr(None, 3, 0)).is_none());
        assert!(locate_lesson(&c, &addr(Some(0), 0, 0)).is_none());
    }

    #[test]
    fn empty_course_resolves_nothing() {
        let c = course(vec![], vec![]);
        assert!(locate_lesson(&c, &addr(None, 0, 0)).is_none());
    }

    #[test]
    fn dual_hierarchy_precedence_is_explicit() {
        let c = course(
            vec![module(vec![lesson("legacy")])],
            vec![Chapter {
                title: "Ch 1".to_string(),
                modules: vec![module(vec![lesson("chapter")])],
            }],
        );
        let a = addr(None, 0, 0);

        let legacy =
            locate_with_precedence(&c, &a, HierarchyPrecedence::LegacyModulesFirst).unwrap();
        assert_eq!(legacy.title, "legacy");

        let chapters = locate_with_precedence(&c, &a, HierarchyPrecedence::ChaptersFirst).unwrap();
        assert_eq!(chapters.title, "chapter");
    }

    #[test]
    fn remove_lesson_shifts_later_siblings() {
        let mut c = course(
            vec![module(vec![lesson("a"), lesson("b"), lesson("c")])],
            vec![],
        );
        let removed = remove_lesson(&mut c, &addr(None, 0, 1)).unwrap();
        assert_eq!(removed.title, "b");
        // "c" now answers to the removed lesson's old address.
        assert_eq!(locate_lesson(&c, &addr(None, 0, 1)).unwrap().title, "c");
    }

    #[test]
    fn remove_lesson_respects_explicit_chapter_addressing() {
        let mut c = course(
            vec![module(vec![lesson("legacy")])],
            vec![Chapter {
                title: "Ch 1".to_string(),
                modules: vec![module(vec![lesson("ch1")])],
            }],
        );
        assert!(remove_lesson(&mut c, &addr(Some(4), 0, 0)).is_none());
        assert_eq!(c.modules[0].lessons.len(), 1);

        let removed = remove_lesson(&mut c, &addr(Some(0), 0, 0)).unwrap();
        assert_eq!(removed.title, "ch1");
        assert_eq!(c.modules[0].lessons.len(), 1);
    }

    #[test]
    fn resolution_is_idempotent() {
        let c = course(vec![module(vec![lesson("a")])], vec![]);
        let a = addr(None, 0, 0);
        let first = locate_lesson(&c, &a).map(|l| l.title.clone());
        let second = locate_lesson(&c, &a).map(|l| l.title.clone());
        assert_eq!(first, second);
    }
}
