//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `CatalogStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! The course row keeps its lesson content in a single JSONB `content`
//! column, preserving the document shape the rest of the system expects: a
//! course may carry the legacy `modules` hierarchy, the newer `chapters`
//! hierarchy, or both, and the column is deserialized as-is without
//! reconciling them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use music_school_core::domain::{Chapter, Course, CourseModule, Enrollment};
use music_school_core::ports::{CatalogStore, PortError, PortResult};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `CatalogStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps a sqlx error to the port taxonomy. Connection-level failures become
/// `Unavailable` so the web layer can answer 503 without retry.
fn store_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound("row not found".to_string()),
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Tls(_) => PortError::Unavailable(e.to_string()),
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

/// The JSONB document stored in the `content` column.
#[derive(Serialize, Deserialize, Default)]
struct ContentDoc {
    #[serde(default)]
    modules: Vec<CourseModule>,
    #[serde(default)]
    chapters: Vec<Chapter>,
}

#[derive(FromRow)]
struct CourseRecord {
    id: Uuid,
    title: String,
    description: Option<String>,
    price: i64,
    is_free: bool,
    content: serde_json::Value,
}

impl CourseRecord {
    fn to_domain(self) -> PortResult<Course> {
        let content: ContentDoc = serde_json::from_value(self.content)
            .map_err(|e| PortError::Unexpected(format!("Malformed course content: {}", e)))?;
        Ok(Course {
            id: self.id,
            title: self.title,
            description: self.description,
            price: self.price,
            is_free: self.is_free,
            modules: content.modules,
            chapters: content.chapters,
        })
    }
}

#[derive(FromRow)]
struct EnrollmentRecord {
    user_id: String,
    course_id: Uuid,
    approved: bool,
    created_at: DateTime<Utc>,
}

impl EnrollmentRecord {
    fn to_domain(self) -> Enrollment {
        Enrollment {
            user_id: self.user_id,
            course_id: self.course_id,
            approved: self.approved,
            created_at: self.created_at,
        }
    }
}

fn content_json(course: &Course) -> PortResult<serde_json::Value> {
    serde_json::to_value(ContentDoc {
        modules: course.modules.clone(),
        chapters: course.chapters.clone(),
    })
    .map_err(|e| PortError::Unexpected(e.to_string()))
}

//=========================================================================================
// `CatalogStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CatalogStore for DbAdapter {
    async fn get_course(&self, course_id: Uuid) -> PortResult<Course> {
        let record = sqlx::query_as::<_, CourseRecord>(
            "SELECT id, title, description, price, is_free, content FROM courses WHERE id = $1",
        )
        .bind(course_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Course {} not found", course_id))
            }
            _ => store_error(e),
        })?;
        record.to_domain()
    }

    async fn list_courses(&self) -> PortResult<Vec<Course>> {
        let records = sqlx::query_as::<_, CourseRecord>(
            "SELECT id, title, description, price, is_free, content FROM courses ORDER BY title",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn create_course(&self, course: Course) -> PortResult<Course> {
        let content = content_json(&course)?;
        sqlx::query(
            "INSERT INTO courses (id, title, description, price, is_free, content) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(course.id)
        .bind(&course.title)
        .bind(&course.description)
        .bind(course.price)
        .bind(course.is_free)
        .bind(content)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(course)
    }

    async fn update_course(&self, course: &Course) -> PortResult<()> {
        let content = content_json(course)?;
        let result = sqlx::query(
            "UPDATE courses SET title = $2, description = $3, price = $4, is_free = $5, \
             content = $6 WHERE id = $1",
        )
        .bind(course.id)
        .bind(&course.title)
        .bind(&course.description)
        .bind(course.price)
        .bind(course.is_free)
        .bind(content)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Course {} not found",
                course.id
            )));
        }
        Ok(())
    }

    async fn find_approved_enrollment(
        &self,
        user_id: &str,
        course_id: Uuid,
    ) -> PortResult<Option<Enrollment>> {
        let record = sqlx::query_as::<_, EnrollmentRecord>(
            "SELECT user_id, course_id, approved, created_at FROM enrollments \
             WHERE user_id = $1 AND course_id = $2 AND approved = TRUE",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(record.map(|r| r.to_domain()))
    }

    async fn create_enrollment(
        &self,
        user_id: &str,
        course_id: Uuid,
        approved: bool,
    ) -> PortResult<Enrollment> {
        // Re-enrolling must never downgrade an already-approved record.
        let record = sqlx::query_as::<_, EnrollmentRecord>(
            "INSERT INTO enrollments (user_id, course_id, approved) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, course_id) \
             DO UPDATE SET approved = enrollments.approved OR EXCLUDED.approved \
             RETURNING user_id, course_id, approved, created_at",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(approved)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(record.to_domain())
    }

    async fn approve_enrollment(&self, user_id: &str, course_id: Uuid) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE enrollments SET approved = TRUE WHERE user_id = $1 AND course_id = $2",
        )
        .bind(user_id)
        .bind(course_id)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Enrollment for {} in course {} not found",
                user_id, course_id
            )));
        }
        Ok(())
    }
}
