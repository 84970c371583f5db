//! crates/music_school_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or the
//! identity provider's API.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Course, Enrollment};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The backing service could not be reached at all. Surfaced to clients
    /// as 503 without retry.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait CatalogStore: Send + Sync {
    // --- Courses ---
    async fn get_course(&self, course_id: Uuid) -> PortResult<Course>;

    async fn list_courses(&self) -> PortResult<Vec<Course>>;

    async fn create_course(&self, course: Course) -> PortResult<Course>;

    /// Replaces the stored content document for an existing course.
    async fn update_course(&self, course: &Course) -> PortResult<()>;

    // --- Enrollments ---
    /// Looks up an enrollment for `(user_id, course_id)` that has already
    /// been approved. `Ok(None)` means "not enrolled" rather than an error.
    async fn find_approved_enrollment(
        &self,
        user_id: &str,
        course_id: Uuid,
    ) -> PortResult<Option<Enrollment>>;

    async fn create_enrollment(
        &self,
        user_id: &str,
        course_id: Uuid,
        approved: bool,
    ) -> PortResult<Enrollment>;

    async fn approve_enrollment(&self, user_id: &str, course_id: Uuid) -> PortResult<()>;
}

/// Lookup operations against the external identity provider.
///
/// Both operations are best-effort from the caller's perspective: a failure
/// to reach the provider downgrades the check that needed it, it never fails
/// the whole request.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Verifies a bearer session token and returns the subject's user id.
    /// `Ok(None)` means the token did not verify.
    async fn verify_session(&self, token: &str) -> PortResult<Option<String>>;

    /// Resolves a user id to the account's primary email address.
    async fn email_for_user(&self, user_id: &str) -> PortResult<Option<String>>;
}
