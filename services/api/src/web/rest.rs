//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Everything here is plain catalog/enrollment plumbing; the interesting
//! read-path lives in `web/media.rs`. Admin handlers assume the
//! `require_admin` middleware has already gated the route.

use crate::web::media::{self, port_error_response};
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use music_school_core::domain::{
    Chapter, Course, CourseModule, Lesson, LessonAddress, LessonKind,
};
use music_school_core::locator::{remove_lesson, target_module_mut};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        list_courses_handler,
        get_course_handler,
        enroll_handler,
        create_course_handler,
        add_chapter_handler,
        add_module_handler,
        upload_lesson_handler,
        delete_lesson_handler,
        admin_enroll_handler,
        approve_enrollment_handler,
        crate::web::media::stream_video,
        crate::web::media::serve_pdf,
    ),
    components(
        schemas(
            CourseSummary,
            CourseDetail,
            ChapterView,
            ModuleView,
            LessonView,
            EnrollRequest,
            EnrollmentResponse,
            CreateCourseRequest,
            AddChapterRequest,
            AddModuleRequest,
            LessonAddressResponse,
            AdminEnrollRequest,
        )
    ),
    tags(
        (name = "Music School API", description = "Course catalog, enrollment, and lesson media delivery.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct CourseSummary {
    id: Uuid,
    title: String,
    description: Option<String>,
    price: i64,
    is_free: bool,
    lesson_count: usize,
}

impl CourseSummary {
    fn from_course(course: &Course) -> Self {
        Self {
            id: course.id,
            title: course.title.clone(),
            description: course.description.clone(),
            price: course.price,
            is_free: course.is_free,
            lesson_count: course.lesson_count(),
        }
    }
}

/// Full catalog view of a course. Lesson entries intentionally never carry
/// storage paths; media is only reachable through the entitlement-gated
/// endpoints.
#[derive(Serialize, ToSchema)]
pub struct CourseDetail {
    id: Uuid,
    title: String,
    description: Option<String>,
    price: i64,
    is_free: bool,
    modules: Vec<ModuleView>,
    chapters: Vec<ChapterView>,
}

#[derive(Serialize, ToSchema)]
pub struct ChapterView {
    title: String,
    modules: Vec<ModuleView>,
}

#[derive(Serialize, ToSchema)]
pub struct ModuleView {
    title: String,
    lessons: Vec<LessonView>,
}

#[derive(Serialize, ToSchema)]
pub struct LessonView {
    title: String,
    kind: String,
    free_preview: bool,
    duration_sec: Option<u32>,
    order: u32,
}

impl LessonView {
    fn from_lesson(lesson: &Lesson) -> Self {
        Self {
            title: lesson.title.clone(),
            kind: match lesson.kind {
                LessonKind::Video => "video".to_string(),
                LessonKind::Pdf => "pdf".to_string(),
            },
            free_preview: lesson.free_preview,
            duration_sec: lesson.duration_sec,
            order: lesson.order,
        }
    }
}

fn module_view(module: &CourseModule) -> ModuleView {
    ModuleView {
        title: module.title.clone(),
        lessons: module.lessons.iter().map(LessonView::from_lesson).collect(),
    }
}

impl CourseDetail {
    fn from_course(course: &Course) -> Self {
        Self {
            id: course.id,
            title: course.title.clone(),
            description: course.description.clone(),
            price: course.price,
            is_free: course.is_free,
            modules: course.modules.iter().map(module_view).collect(),
            chapters: course
                .chapters
                .iter()
                .map(|c| ChapterView {
                    title: c.title.clone(),
                    modules: c.modules.iter().map(module_view).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct EnrollRequest {
    pub user_id: String,
}

#[derive(Serialize, ToSchema)]
pub struct EnrollmentResponse {
    user_id: String,
    course_id: Uuid,
    approved: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateCourseRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub is_free: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct AddChapterRequest {
    pub title: String,
}

#[derive(Deserialize, ToSchema)]
pub struct AddModuleRequest {
    pub title: String,
    /// When set, the module is appended inside this chapter; otherwise it
    /// goes on the legacy hierarchy.
    pub chapter: Option<usize>,
}

#[derive(Serialize, ToSchema)]
pub struct LessonAddressResponse {
    module_index: usize,
    lesson_index: usize,
}

#[derive(Deserialize, ToSchema)]
pub struct AdminEnrollRequest {
    pub user_id: String,
    pub course_id: Uuid,
}

#[derive(Deserialize)]
pub struct ChapterSelector {
    pub chapter: Option<usize>,
}

//=========================================================================================
// Public Handlers
//=========================================================================================

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "music-school-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// List the public course catalog.
#[utoipa::path(
    get,
    path = "/courses",
    responses(
        (status = 200, description = "Course catalog", body = [CourseSummary]),
        (status = 503, description = "Course store unavailable")
    )
)]
pub async fn list_courses_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let courses = state
        .store
        .list_courses()
        .await
        .map_err(port_error_response)?;
    let summaries: Vec<CourseSummary> = courses.iter().map(CourseSummary::from_course).collect();
    Ok(Json(summaries))
}

/// Fetch one course with its full lesson tree (minus storage paths).
#[utoipa::path(
    get,
    path = "/courses/{course_id}",
    responses(
        (status = 200, description = "Course detail", body = CourseDetail),
        (status = 404, description = "No such course"),
        (status = 503, description = "Course store unavailable")
    ),
    params(("course_id" = Uuid, Path, description = "Course id"))
)]
pub async fn get_course_handler(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let course = state
        .store
        .get_course(course_id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(CourseDetail::from_course(&course)))
}

/// Enroll a user in a course.
///
/// Free courses enroll approved immediately; paid courses create a pending
/// enrollment that grants nothing until an administrator (or the payment
/// flow) approves it.
#[utoipa::path(
    post,
    path = "/courses/{course_id}/enroll",
    request_body = EnrollRequest,
    responses(
        (status = 201, description = "Enrollment created", body = EnrollmentResponse),
        (status = 404, description = "No such course"),
        (status = 503, description = "Course store unavailable")
    ),
    params(("course_id" = Uuid, Path, description = "Course id"))
)]
pub async fn enroll_handler(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<EnrollRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. The course must exist before anyone can enroll in it.
    let course = state
        .store
        .get_course(course_id)
        .await
        .map_err(port_error_response)?;

    // 2. Create the enrollment, approved up front only for free courses.
    let enrollment = state
        .store
        .create_enrollment(&req.user_id, course_id, course.is_effectively_free())
        .await
        .map_err(|e| {
            error!("Failed to create enrollment: {:?}", e);
            port_error_response(e)
        })?;

    info!(
        "enrolled {} in course {} (approved: {})",
        enrollment.user_id, enrollment.course_id, enrollment.approved
    );
    Ok((
        StatusCode::CREATED,
        Json(EnrollmentResponse {
            user_id: enrollment.user_id,
            course_id: enrollment.course_id,
            approved: enrollment.approved,
        }),
    ))
}

//=========================================================================================
// Admin Handlers (behind `require_admin`)
//=========================================================================================

/// Create an empty course.
#[utoipa::path(
    post,
    path = "/admin/courses",
    request_body = CreateCourseRequest,
    responses(
        (status = 201, description = "Course created", body = CourseSummary),
        (status = 503, description = "Course store unavailable")
    )
)]
pub async fn create_course_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let course = Course {
        id: Uuid::new_v4(),
        title: req.title,
        description: req.description,
        price: req.price,
        is_free: req.is_free,
        modules: Vec::new(),
        chapters: Vec::new(),
    };

    let course = state
        .store
        .create_course(course)
        .await
        .map_err(|e| {
            error!("Failed to create course: {:?}", e);
            port_error_response(e)
        })?;

    Ok((StatusCode::CREATED, Json(CourseSummary::from_course(&course))))
}

/// Append a chapter to a course (current hierarchy).
#[utoipa::path(
    post,
    path = "/admin/courses/{course_id}/chapters",
    request_body = AddChapterRequest,
    responses(
        (status = 201, description = "Chapter appended"),
        (status = 404, description = "No such course")
    ),
    params(("course_id" = Uuid, Path, description = "Course id"))
)]
pub async fn add_chapter_handler(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<AddChapterRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut course = state
        .store
        .get_course(course_id)
        .await
        .map_err(port_error_response)?;

    course.chapters.push(Chapter {
        title: req.title,
        modules: Vec::new(),
    });
    state
        .store
        .update_course(&course)
        .await
        .map_err(port_error_response)?;

    Ok(StatusCode::CREATED)
}

/// Append a module, either to the legacy hierarchy or inside a chapter.
#[utoipa::path(
    post,
    path = "/admin/courses/{course_id}/modules",
    request_body = AddModuleRequest,
    responses(
        (status = 201, description = "Module appended"),
        (status = 404, description = "No such course or chapter")
    ),
    params(("course_id" = Uuid, Path, description = "Course id"))
)]
pub async fn add_module_handler(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<AddModuleRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut course = state
        .store
        .get_course(course_id)
        .await
        .map_err(port_error_response)?;

    let module = CourseModule {
        title: req.title,
        lessons: Vec::new(),
    };
    match req.chapter {
        Some(ci) => {
            let chapter = course
                .chapters
                .get_mut(ci)
                .ok_or((StatusCode::NOT_FOUND, "Chapter not found".to_string()))?;
            chapter.modules.push(module);
        }
        None => course.modules.push(module),
    }

    state
        .store
        .update_course(&course)
        .await
        .map_err(port_error_response)?;

    Ok(StatusCode::CREATED)
}

/// Upload a lesson file and append the lesson to the addressed module.
///
/// Accepts a multipart/form-data request with a `file` part plus text
/// parts: `title`, `kind` (`video`|`pdf`), `module_index`, and optionally
/// `chapter_index`, `free_preview`, `duration_sec`.
#[utoipa::path(
    post,
    path = "/admin/courses/{course_id}/lessons",
    request_body(content_type = "multipart/form-data", description = "Lesson file and metadata."),
    responses(
        (status = 201, description = "Lesson created", body = LessonAddressResponse),
        (status = 400, description = "Bad request (e.g., missing field)"),
        (status = 404, description = "No such course or module"),
        (status = 500, description = "Internal server error")
    ),
    params(("course_id" = Uuid, Path, description = "Course id"))
)]
pub async fn upload_lesson_handler(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Drain the multipart form.
    let mut title: Option<String> = None;
    let mut kind: Option<LessonKind> = None;
    let mut module_index: Option<usize> = None;
    let mut chapter_index: Option<usize> = None;
    let mut free_preview = false;
    let mut duration_sec: Option<u32> = None;
    let mut file: Option<(String, bytes::Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        match field.name().unwrap_or_default() {
            "file" => {
                let name = field.file_name().unwrap_or("upload.bin").to_string();
                let data = field.bytes().await.map_err(|e| {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("Failed to read file bytes: {}", e),
                    )
                })?;
                file = Some((name, data));
            }
            "title" => title = Some(text_field(field).await?),
            "kind" => {
                kind = Some(match text_field(field).await?.as_str() {
                    "video" => LessonKind::Video,
                    "pdf" => LessonKind::Pdf,
                    other => {
                        return Err((
                            StatusCode::BAD_REQUEST,
                            format!("Unknown lesson kind '{}'", other),
                        ))
                    }
                })
            }
            "module_index" => module_index = Some(parse_field(field, "module_index").await?),
            "chapter_index" => chapter_index = Some(parse_field(field, "chapter_index").await?),
            "free_preview" => free_preview = text_field(field).await? == "true",
            "duration_sec" => duration_sec = Some(parse_field(field, "duration_sec").await?),
            _ => {}
        }
    }

    let title = title.ok_or((StatusCode::BAD_REQUEST, "title is required".to_string()))?;
    let kind = kind.ok_or((StatusCode::BAD_REQUEST, "kind is required".to_string()))?;
    let module_index = module_index.ok_or((
        StatusCode::BAD_REQUEST,
        "module_index is required".to_string(),
    ))?;
    let (original_name, data) =
        file.ok_or((StatusCode::BAD_REQUEST, "file is required".to_string()))?;

    // 2. The addressed module must exist before any bytes hit the disk.
    let mut course = state
        .store
        .get_course(course_id)
        .await
        .map_err(port_error_response)?;
    if target_module_mut(&mut course, chapter_index, module_index).is_none() {
        return Err((StatusCode::NOT_FOUND, "Module not found".to_string()));
    }

    // 3. Store the file under a collision-proof name.
    let safe_name = std::path::Path::new(&original_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.bin".to_string());
    let stored_name = format!("{}-{}", Uuid::new_v4(), safe_name);

    tokio::fs::create_dir_all(&state.config.uploads_dir)
        .await
        .map_err(|e| {
            error!("Failed to create uploads directory: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to store file".to_string(),
            )
        })?;
    tokio::fs::write(state.config.uploads_dir.join(&stored_name), &data)
        .await
        .map_err(|e| {
            error!("Failed to write upload: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to store file".to_string(),
            )
        })?;

    // 4. Append the lesson and persist the updated document.
    let stored_path = format!("uploads/{}", stored_name);
    let module = target_module_mut(&mut course, chapter_index, module_index)
        .ok_or((StatusCode::NOT_FOUND, "Module not found".to_string()))?;
    let lesson_index = module.lessons.len();
    module.lessons.push(Lesson {
        title,
        kind,
        video_path: (kind == LessonKind::Video).then(|| stored_path.clone()),
        pdf_path: (kind == LessonKind::Pdf).then(|| stored_path.clone()),
        free_preview,
        duration_sec,
        order: lesson_index as u32,
    });

    state
        .store
        .update_course(&course)
        .await
        .map_err(port_error_response)?;

    Ok((
        StatusCode::CREATED,
        Json(LessonAddressResponse {
            module_index,
            lesson_index,
        }),
    ))
}

/// Delete a lesson and, best-effort, its backing file.
///
/// The file delete is non-transactional on purpose: a failure is logged
/// and the request still succeeds with the document record updated, so the
/// worst case is an orphaned file on disk.
#[utoipa::path(
    delete,
    path = "/admin/courses/{course_id}/lessons/{module_index}/{lesson_index}",
    responses(
        (status = 204, description = "Lesson removed"),
        (status = 404, description = "No such course or lesson")
    ),
    params(
        ("course_id" = Uuid, Path, description = "Course id"),
        ("module_index" = usize, Path, description = "Module position"),
        ("lesson_index" = usize, Path, description = "Lesson position"),
        ("chapter" = Option<usize>, Query, description = "Explicit chapter position")
    )
)]
pub async fn delete_lesson_handler(
    State(state): State<AppState>,
    Path((course_id, module_index, lesson_index)): Path<(Uuid, usize, usize)>,
    Query(selector): Query<ChapterSelector>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut course = state
        .store
        .get_course(course_id)
        .await
        .map_err(port_error_response)?;

    let addr = LessonAddress {
        chapter: selector.chapter,
        module: module_index,
        lesson: lesson_index,
    };
    let removed = remove_lesson(&mut course, &addr)
        .ok_or((StatusCode::NOT_FOUND, "Lesson not found".to_string()))?;

    state
        .store
        .update_course(&course)
        .await
        .map_err(port_error_response)?;

    if let Some(stored) = removed.storage_path() {
        if let Some(path) = media::resolve_upload_path(&state.config.uploads_dir, stored) {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(
                    "failed to delete file {} for removed lesson, continuing: {}",
                    path.display(),
                    e
                );
            }
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Manually enroll a user, already approved.
#[utoipa::path(
    post,
    path = "/admin/enrollments",
    request_body = AdminEnrollRequest,
    responses(
        (status = 201, description = "Enrollment created approved", body = EnrollmentResponse),
        (status = 404, description = "No such course")
    )
)]
pub async fn admin_enroll_handler(
    State(state): State<AppState>,
    Json(req): Json<AdminEnrollRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .store
        .get_course(req.course_id)
        .await
        .map_err(port_error_response)?;

    let enrollment = state
        .store
        .create_enrollment(&req.user_id, req.course_id, true)
        .await
        .map_err(port_error_response)?;

    Ok((
        StatusCode::CREATED,
        Json(EnrollmentResponse {
            user_id: enrollment.user_id,
            course_id: enrollment.course_id,
            approved: enrollment.approved,
        }),
    ))
}

/// Approve a pending enrollment.
#[utoipa::path(
    post,
    path = "/admin/enrollments/approve",
    request_body = AdminEnrollRequest,
    responses(
        (status = 200, description = "Enrollment approved"),
        (status = 404, description = "No such enrollment")
    )
)]
pub async fn approve_enrollment_handler(
    State(state): State<AppState>,
    Json(req): Json<AdminEnrollRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .store
        .approve_enrollment(&req.user_id, req.course_id)
        .await
        .map_err(port_error_response)?;

    info!("approved enrollment of {} in {}", req.user_id, req.course_id);
    Ok(StatusCode::OK)
}

//=========================================================================================
// Multipart Helpers
//=========================================================================================

async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, (StatusCode, String)> {
    field.text().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Unreadable form field: {}", e),
        )
    })
}

async fn parse_field<T: std::str::FromStr>(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<T, (StatusCode, String)> {
    text_field(field).await?.parse::<T>().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            format!("Invalid value for {}", name),
        )
    })
}
