//! Shared fixtures for the API integration tests: an in-memory catalog
//! store, a canned identity directory, and helpers to stand up the full
//! router against a throwaway uploads directory.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use api_lib::config::Config;
use api_lib::web::{build_router, state::AppState};
use async_trait::async_trait;
use chrono::Utc;
use axum::body::Body;
use axum::http::Request;
use axum::Router;
use music_school_core::domain::{
    Chapter, Course, CourseModule, Enrollment, Lesson, LessonKind,
};
use music_school_core::ports::{CatalogStore, IdentityDirectory, PortError, PortResult};
use serde_json::Value;
use uuid::Uuid;

//=========================================================================================
// In-Memory Port Implementations
//=========================================================================================

#[derive(Default)]
pub struct InMemoryStore {
    pub courses: Mutex<HashMap<Uuid, Course>>,
    pub enrollments: Mutex<Vec<Enrollment>>,
    /// Flip to make every operation fail as if the database were down.
    pub unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn with_course(course: Course) -> Arc<Self> {
        let store = Self::default();
        store
            .courses
            .lock()
            .unwrap()
            .insert(course.id, course);
        Arc::new(store)
    }

    pub fn enroll(&self, user_id: &str, course_id: Uuid, approved: bool) {
        self.enrollments.lock().unwrap().push(Enrollment {
            user_id: user_id.to_string(),
            course_id,
            approved,
            created_at: Utc::now(),
        });
    }

    fn check_up(&self) -> PortResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(PortError::Unavailable("store down".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn get_course(&self, course_id: Uuid) -> PortResult<Course> {
        self.check_up()?;
        self.courses
            .lock()
            .unwrap()
            .get(&course_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Course {} not found", course_id)))
    }

    async fn list_courses(&self) -> PortResult<Vec<Course>> {
        self.check_up()?;
        let mut courses: Vec<Course> = self.courses.lock().unwrap().values().cloned().collect();
        courses.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(courses)
    }

    async fn create_course(&self, course: Course) -> PortResult<Course> {
        self.check_up()?;
        self.courses
            .lock()
            .unwrap()
            .insert(course.id, course.clone());
        Ok(course)
    }

    async fn update_course(&self, course: &Course) -> PortResult<()> {
        self.check_up()?;
        let mut courses = self.courses.lock().unwrap();
        if !courses.contains_key(&course.id) {
            return Err(PortError::NotFound(format!("Course {} not found", course.id)));
        }
        courses.insert(course.id, course.clone());
        Ok(())
    }

    async fn find_approved_enrollment(
        &self,
        user_id: &str,
        course_id: Uuid,
    ) -> PortResult<Option<Enrollment>> {
        self.check_up()?;
        Ok(self
            .enrollments
            .lock()
            .unwrap()
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
        self.check_up()?;
        let mut enrollments = self.enrollments.lock().unwrap();
        if let Some(existing) = enrollments
            .iter_mut()
            .find(|e| e.user_id == user_id && e.course_id == course_id)
        {
            existing.approved = existing.approved || approved;
            return Ok(existing.clone());
        }
        let enrollment = Enrollment {
            user_id: user_id.to_string(),
            course_id,
            approved,
            created_at: Utc::now(),
        };
        enrollments.push(enrollment.clone());
        Ok(enrollment)
    }

    async fn approve_enrollment(&self, user_id: &str, course_id: Uuid) -> PortResult<()> {
        self.check_up()?;
        let mut enrollments = self.enrollments.lock().unwrap();
        match enrollments
            .iter_mut()
            .find(|e| e.user_id == user_id && e.course_id == course_id)
        {
            Some(e) => {
                e.approved = true;
                Ok(())
            }
            None => Err(PortError::NotFound("Enrollment not found".to_string())),
        }
    }
}

/// A directory with canned answers: token -> user id, user id -> email.
#[derive(Default)]
pub struct FakeDirectory {
    pub sessions: HashMap<String, String>,
    pub emails: HashMap<String, String>,
    pub failing: bool,
}

#[async_trait]
impl IdentityDirectory for FakeDirectory {
    async fn verify_session(&self, token: &str) -> PortResult<Option<String>> {
        if self.failing {
            return Err(PortError::Unavailable("provider down".to_string()));
        }
        Ok(self.sessions.get(token).cloned())
    }

    async fn email_for_user(&self, user_id: &str) -> PortResult<Option<String>> {
        if self.failing {
            return Err(PortError::Unavailable("provider down".to_string()));
        }
        Ok(self.emails.get(user_id).cloned())
    }
}

//=========================================================================================
// App Construction
//=========================================================================================

pub fn test_config(uploads_dir: &Path, admin_emails: Vec<String>) -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
        database_url: "postgres://unused".to_string(),
        log_level: tracing::Level::INFO,
        uploads_dir: uploads_dir.to_path_buf(),
        admin_emails,
        identity_api_url: "http://identity.invalid".to_string(),
        identity_api_key: None,
        cors_origin: "http://localhost:3000".to_string(),
        media_cache_max_age: 3600,
    }
}

pub fn test_app(
    store: Arc<InMemoryStore>,
    directory: FakeDirectory,
    uploads_dir: &Path,
    admin_emails: Vec<String>,
) -> Router {
    let state = AppState::new(
        store,
        Arc::new(directory),
        Arc::new(test_config(uploads_dir, admin_emails)),
    );
    build_router(state)
}

//=========================================================================================
// Course Fixtures
//=========================================================================================

pub fn video_lesson(title: &str, stored_path: &str, free_preview: bool) -> Lesson {
    Lesson {
        title: title.to_string(),
        kind: LessonKind::Video,
        video_path: Some(stored_path.to_string()),
        pdf_path: None,
        free_preview,
        duration_sec: Some(300),
        order: 0,
    }
}

pub fn pdf_lesson(title: &str, stored_path: &str) -> Lesson {
    Lesson {
        title: title.to_string(),
        kind: LessonKind::Pdf,
        video_path: None,
        pdf_path: Some(stored_path.to_string()),
        free_preview: false,
        duration_sec: None,
        order: 0,
    }
}

pub fn paid_course(lessons: Vec<Lesson>) -> Course {
    Course {
        id: Uuid::new_v4(),
        title: "Jazz Improvisation".to_string(),
        description: Some("Intermediate jazz course".to_string()),
        price: 1999,
        is_free: false,
        modules: vec![CourseModule {
            title: "Module 1".to_string(),
            lessons,
        }],
        chapters: vec![],
    }
}

pub fn chaptered_course(lessons: Vec<Lesson>) -> Course {
    Course {
        id: Uuid::new_v4(),
        title: "Music Theory".to_string(),
        description: None,
        price: 2999,
        is_free: false,
        modules: vec![],
        chapters: vec![Chapter {
            title: "Chapter 1".to_string(),
            modules: vec![CourseModule {
                title: "Module 1".to_string(),
                lessons,
            }],
        }],
    }
}

//=========================================================================================
// Request Helpers
//=========================================================================================

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn get_with_headers(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, json: Value, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(json.to_string())).unwrap()
}

pub async fn body_bytes(body: Body) -> Vec<u8> {
    axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body")
        .to_vec()
}

pub async fn extract_json(body: Body) -> Value {
    let bytes = body_bytes(body).await;
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}
