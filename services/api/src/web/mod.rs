pub mod media;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};

use state::AppState;

/// Builds the application router: public catalog/media routes plus the
/// admin surface behind the allow-list gate. The session-identity
/// middleware wraps everything so any route can see a verified bearer
/// identity when one is present.
pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(rest::health_handler))
        .route("/courses", get(rest::list_courses_handler))
        .route("/courses/{course_id}", get(rest::get_course_handler))
        .route("/courses/{course_id}/enroll", post(rest::enroll_handler))
        .route(
            "/media/video/{course_id}/{module_index}/{lesson_index}",
            get(media::stream_video),
        )
        .route(
            "/media/pdf/{course_id}/{module_index}/{lesson_index}",
            get(media::serve_pdf),
        );

    let admin = Router::new()
        .route("/admin/courses", post(rest::create_course_handler))
        .route(
            "/admin/courses/{course_id}/chapters",
            post(rest::add_chapter_handler),
        )
        .route(
            "/admin/courses/{course_id}/modules",
            post(rest::add_module_handler),
        )
        .route(
            "/admin/courses/{course_id}/lessons",
            post(rest::upload_lesson_handler),
        )
        .route(
            "/admin/courses/{course_id}/lessons/{module_index}/{lesson_index}",
            delete(rest::delete_lesson_handler),
        )
        .route("/admin/enrollments", post(rest::admin_enroll_handler))
        .route(
            "/admin/enrollments/approve",
            post(rest::approve_enrollment_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_admin,
        ))
        // Lesson uploads carry whole video files.
        .layer(DefaultBodyLimit::max(250 * 1024 * 1024));

    Router::new()
        .merge(public)
        .merge(admin)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::attach_session_identity,
        ))
        .with_state(state)
}
