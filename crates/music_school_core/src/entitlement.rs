//! crates/music_school_core/src/entitlement.rs
//!
//! Decides whether a requester may retrieve a lesson's media.
//!
//! The policy is an ordered list of rules, first true wins:
//! free preview, administrator, free course, approved enrollment. The
//! resolver holds the injected admin allow-list and consults the ports for
//! everything else, so evaluation is read-only and idempotent for a given
//! request context.

use std::collections::HashSet;

use tracing::debug;

use crate::domain::{Course, Lesson};
use crate::identity::RequestContext;
use crate::ports::{CatalogStore, IdentityDirectory, PortResult};

/// Why a request was allowed, mostly for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    FreePreview,
    Admin,
    FreeCourse,
    Enrollment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted(Grant),
    Denied,
}

impl Access {
    pub fn is_granted(&self) -> bool {
        matches!(self, Access::Granted(_))
    }
}

/// Evaluates the access policy for lesson media.
///
/// Administrators are defined by an allow-list of email addresses injected
/// at construction (trimmed, matched case-insensitively), never by a
/// runtime environment lookup.
pub struct EntitlementResolver {
    admin_emails: HashSet<String>,
}

impl EntitlementResolver {
    pub fn new<I, S>(admin_emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let admin_emails = admin_emails
            .into_iter()
            .map(|e| e.as_ref().trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { admin_emails }
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.contains(&email.trim().to_lowercase())
    }

    /// Checks whether any identity the request carries belongs to an
    /// allow-listed administrator.
    ///
    /// Every distinct extracted identity triggers its own directory lookup
    /// (unbatched, uncached — fine at this request volume). A lookup
    /// failure downgrades to "not admin" rather than failing the request.
    pub async fn is_admin(
        &self,
        ctx: &RequestContext,
        directory: &dyn IdentityDirectory,
    ) -> bool {
        if self.admin_emails.is_empty() {
            return false;
        }
        for candidate in ctx.candidates() {
            match directory.email_for_user(&candidate).await {
                Ok(Some(email)) if self.is_admin_email(&email) => return true,
                Ok(_) => {}
                Err(e) => {
                    debug!("directory lookup for {candidate} failed, treating as non-admin: {e}");
                }
            }
        }
        false
    }

    /// Evaluates the full policy for one lesson request.
    ///
    /// Store errors propagate (an unreachable store is a 503, not a
    /// denial); directory errors never do.
    pub async fn authorize(
        &self,
        ctx: &RequestContext,
        course: &Course,
        lesson: &Lesson,
        store: &dyn CatalogStore,
        directory: &dyn IdentityDirectory,
    ) -> PortResult<Access> {
        if lesson.free_preview {
            return Ok(Access::Granted(Grant::FreePreview));
        }

        if self.is_admin(ctx, directory).await {
            return Ok(Access::Granted(Grant::Admin));
        }

        // The free-course rule intentionally requires no identity at all.
        if course.is_effectively_free() {
            return Ok(Access::Granted(Grant::FreeCourse));
        }

        for candidate in ctx.candidates() {
            if store
                .find_approved_enrollment(&candidate, course.id)
                .await?
                .is_some()
            {
                return Ok(Access::Granted(Grant::Enrollment));
            }
        }

        Ok(Access::Denied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CourseModule, Enrollment, LessonKind};
    use crate::ports::PortError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    struct FakeStore {
        enrollments: Vec<Enrollment>,
        unavailable: bool,
    }

    #[async_trait]
    impl CatalogStore for FakeStore {
        async fn get_course(&self, course_id: Uuid) -> PortResult<Course> {
            Err(PortError::NotFound(course_id.to_string()))
        }

        async fn list_courses(&self) -> PortResult<Vec<Course>> {
            Ok(Vec::new())
        }

        async fn create_course(&self, course: Course) -> PortResult<Course> {
            Ok(course)
        }

        async fn update_course(&self, _course: &Course) -> PortResult<()> {
            Ok(())
        }

        async fn find_approved_enrollment(
            &self,
            user_id: &str,
            course_id: Uuid,
        ) -> PortResult<Option<Enrollment>> {
            if self.unavailable {
                return Err(PortError::Unavailable("store down".to_string()));
            }
            Ok(self
                .enrollments
                .iter()
                .find(|e| e.user_id == user_id && e.course_id == course_id && e.approved)
                .cloned())
        }

        async fn create_enrollment(
            &self,
            user_id: &str,
            course_id: Uuid,
            approved: bool,
        ) -> PortResult<Enrollment> {
            Ok(Enrollment {
                user_id: user_id.to_string(),
                course_id,
                approved,
                created_at: Utc::now(),
            })
        }

        async fn approve_enrollment(&self, _user_id: &str, _course_id: Uuid) -> PortResult<()> {
            Ok(())
        }
    }

    struct FakeDirectory {
        emails: HashMap<String, String>,
        failing: bool,
    }

    #[async_trait]
    impl IdentityDirectory for FakeDirectory {
        async fn verify_session(&self, _token: &str) -> PortResult<Option<String>> {
            Ok(None)
        }

        async fn email_for_user(&self, user_id: &str) -> PortResult<Option<String>> {
            if self.failing {
                return Err(PortError::Unavailable("provider down".to_string()));
            }
            Ok(self.emails.get(user_id).cloned())
        }
    }

    fn paid_course(lesson: Lesson) -> Course {
        Course {
            id: Uuid::new_v4(),
            title: "Jazz Improvisation".to_string(),
            description: None,
            price: 1999,
            is_free: false,
            modules: vec![CourseModule {
                title: "Module 1".to_string(),
                lessons: vec![lesson],
            }],
            chapters: vec![],
        }
    }

    fn video_lesson(free_preview: bool) -> Lesson {
        Lesson {
            title: "Lesson 1".to_string(),
            kind: LessonKind::Video,
            video_path: Some("lesson1.mp4".to_string()),
            pdf_path: None,
            free_preview,
            duration_sec: Some(600),
            order: 0,
        }
    }

    fn ctx_for(user: &str) -> RequestContext {
        RequestContext {
            user_hint: Some(user.to_string()),
            ..Default::default()
        }
    }

    fn empty_store() -> FakeStore {
        FakeStore {
            enrollments: vec![],
            unavailable: false,
        }
    }

    fn empty_directory() -> FakeDirectory {
        FakeDirectory {
            emails: HashMap::new(),
            failing: false,
        }
    }

    #[tokio::test]
    async fn free_preview_is_always_granted() {
        let resolver = EntitlementResolver::new(Vec::<String>::new());
        let course = paid_course(video_lesson(true));
        let lesson = &course.modules[0].lessons[0];

        // Even with no identity at all.
        let access = resolver
            .authorize(
                &RequestContext::default(),
                &course,
                lesson,
                &empty_store(),
                &empty_directory(),
            )
            .await
            .unwrap();
        assert_eq!(access, Access::Granted(Grant::FreePreview));
    }

    #[tokio::test]
    async fn free_course_requires_no_identity() {
        let resolver = EntitlementResolver::new(Vec::<String>::new());
        let mut course = paid_course(video_lesson(false));
        course.is_free = true;

        let lesson = course.modules[0].lessons[0].clone();
        let access = resolver
            .authorize(
                &RequestContext::default(),
                &course,
                &lesson,
                &empty_store(),
                &empty_directory(),
            )
            .await
            .unwrap();
        assert_eq!(access, Access::Granted(Grant::FreeCourse));
    }

    #[tokio::test]
    async fn zero_price_counts_as_free() {
        let resolver = EntitlementResolver::new(Vec::<String>::new());
        let mut course = paid_course(video_lesson(false));
        course.price = 0;

        let lesson = course.modules[0].lessons[0].clone();
        let access = resolver
            .authorize(
                &ctx_for("user_1"),
                &course,
                &lesson,
                &empty_store(),
                &empty_directory(),
            )
            .await
            .unwrap();
        assert_eq!(access, Access::Granted(Grant::FreeCourse));
    }

    #[tokio::test]
    async fn paid_lesson_gated_exactly_on_approved_enrollment() {
        let resolver = EntitlementResolver::new(Vec::<String>::new());
        let course = paid_course(video_lesson(false));
        let lesson = course.modules[0].lessons[0].clone();

        let no_enrollment = empty_store();
        let access = resolver
            .authorize(
                &ctx_for("user_1"),
                &course,
                &lesson,
                &no_enrollment,
                &empty_directory(),
            )
            .await
            .unwrap();
        assert_eq!(access, Access::Denied);

        let enrolled = FakeStore {
            enrollments: vec![Enrollment {
                user_id: "user_1".to_string(),
                course_id: course.id,
                approved: true,
                created_at: Utc::now(),
            }],
            unavailable: false,
        };
        let access = resolver
            .authorize(
                &ctx_for("user_1"),
                &course,
                &lesson,
                &enrolled,
                &empty_directory(),
            )
            .await
            .unwrap();
        assert_eq!(access, Access::Granted(Grant::Enrollment));
    }

    #[tokio::test]
    async fn unapproved_enrollment_grants_nothing() {
        let resolver = EntitlementResolver::new(Vec::<String>::new());
        let course = paid_course(video_lesson(false));
        let lesson = course.modules[0].lessons[0].clone();

        let pending = FakeStore {
            enrollments: vec![Enrollment {
                user_id: "user_1".to_string(),
                course_id: course.id,
                approved: false,
                created_at: Utc::now(),
            }],
            unavailable: false,
        };
        let access = resolver
            .authorize(
                &ctx_for("user_1"),
                &course,
                &lesson,
                &pending,
                &empty_directory(),
            )
            .await
            .unwrap();
        assert_eq!(access, Access::Denied);
    }

    #[tokio::test]
    async fn admin_email_match_is_case_insensitive() {
        let resolver = EntitlementResolver::new(["Admin@School.Example ".to_string()]);
        let course = paid_course(video_lesson(false));
        let lesson = course.modules[0].lessons[0].clone();

        let directory = FakeDirectory {
            emails: HashMap::from([(
                "user_admin".to_string(),
                "admin@school.example".to_string(),
            )]),
            failing: false,
        };
        let access = resolver
            .authorize(
                &ctx_for("user_admin"),
                &course,
                &lesson,
                &empty_store(),
                &directory,
            )
            .await
            .unwrap();
        assert_eq!(access, Access::Granted(Grant::Admin));
    }

    #[tokio::test]
    async fn directory_failure_downgrades_to_not_admin() {
        let resolver = EntitlementResolver::new(["admin@school.example".to_string()]);
        let course = paid_course(video_lesson(false));
        let lesson = course.modules[0].lessons[0].clone();

        let directory = FakeDirectory {
            emails: HashMap::new(),
            failing: true,
        };
        let access = resolver
            .authorize(
                &ctx_for("user_admin"),
                &course,
                &lesson,
                &empty_store(),
                &directory,
            )
            .await
            .unwrap();
        assert_eq!(access, Access::Denied);
    }

    #[tokio::test]
    async fn store_unavailability_propagates() {
        let resolver = EntitlementResolver::new(Vec::<String>::new());
        let course = paid_course(video_lesson(false));
        let lesson = course.modules[0].lessons[0].clone();

        let down = FakeStore {
            enrollments: vec![],
            unavailable: true,
        };
        let result = resolver
            .authorize(
                &ctx_for("user_1"),
                &course,
                &lesson,
                &down,
                &empty_directory(),
            )
            .await;
        assert!(matches!(result, Err(PortError::Unavailable(_))));
    }

    #[tokio::test]
    async fn every_candidate_identity_is_tried_for_enrollment() {
        let resolver = EntitlementResolver::new(Vec::<String>::new());
        let course = paid_course(video_lesson(false));
        let lesson = course.modules[0].lessons[0].clone();

        // Enrollment exists under the synthesized email placeholder carried
        // in the header channel, not under the hint identity.
        let ctx = RequestContext {
            user_hint: Some("user_1".to_string()),
            header_user: Some("email:student@school.example".to_string()),
            ..Default::default()
        };
        let store = FakeStore {
            enrollments: vec![Enrollment {
                user_id: "email:student@school.example".to_string(),
                course_id: course.id,
                approved: true,
                created_at: Utc::now(),
            }],
            unavailable: false,
        };
        let access = resolver
            .authorize(&ctx, &course, &lesson, &store, &empty_directory())
            .await
            .unwrap();
        assert_eq!(access, Access::Granted(Grant::Enrollment));
    }
}
