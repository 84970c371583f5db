//! services/api/src/web/media.rs
//!
//! Access-controlled media delivery: the locate → entitle → stream pipeline
//! for lesson video and PDF files.
//!
//! Video responses honor the single-range `Range: bytes=` convention so
//! players can seek; only the requested byte window is read from disk. A
//! missing lesson or file is always a 404, kept distinct from an
//! entitlement denial (401). Once access is granted the bytes are not
//! per-user, so both response shapes carry a bounded public cache-control
//! directive.

use std::io::SeekFrom;
use std::path::{Path as FsPath, PathBuf};

use axum::{
    body::Body,
    extract::{Extension, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use music_school_core::domain::{Course, Lesson, LessonAddress, LessonKind};
use music_school_core::identity::RequestContext;
use music_school_core::locator::locate_lesson;
use music_school_core::ports::PortError;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::web::middleware::SessionIdentity;
use crate::web::state::AppState;

//=========================================================================================
// Request Types
//=========================================================================================

/// Query parameters shared by the media endpoints.
///
/// `chapter` selects explicit chapter addressing; `user` and `token` are
/// fallback identity channels for contexts (iframe embeds, bare players)
/// that cannot send an Authorization header.
#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    pub chapter: Option<usize>,
    pub user: Option<String>,
    pub token: Option<String>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Stream a lesson video, honoring HTTP Range requests.
#[utoipa::path(
    get,
    path = "/media/video/{course_id}/{module_index}/{lesson_index}",
    responses(
        (status = 200, description = "Full video content"),
        (status = 206, description = "Requested byte range of the video"),
        (status = 401, description = "Requester is not entitled to this lesson"),
        (status = 404, description = "Lesson or file not found"),
        (status = 416, description = "Requested range not satisfiable"),
        (status = 503, description = "Course store unavailable")
    ),
    params(
        ("course_id" = Uuid, Path, description = "Course id"),
        ("module_index" = usize, Path, description = "Module position"),
        ("lesson_index" = usize, Path, description = "Lesson position"),
        ("chapter" = Option<usize>, Query, description = "Explicit chapter position"),
        ("user" = Option<String>, Query, description = "Fallback identity hint"),
        ("token" = Option<String>, Query, description = "Fallback bearer token")
    )
)]
pub async fn stream_video(
    State(state): State<AppState>,
    Path((course_id, module_index, lesson_index)): Path<(Uuid, usize, usize)>,
    Query(query): Query<MediaQuery>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, String)> {
    let (course, lesson) =
        locate(&state, course_id, module_index, lesson_index, query.chapter).await?;
    if lesson.kind != LessonKind::Video {
        return Err((StatusCode::NOT_FOUND, "Not a video lesson".to_string()));
    }

    let ctx = request_context(session, &headers, query.user, query.token);
    authorize(&state, &ctx, &course, &lesson).await?;

    let path = stored_file_path(&state, &lesson)?;
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    serve_video_file(&path, range, state.config.media_cache_max_age).await
}

/// Serve a lesson PDF inline. Same entitlement policy as video, no Range
/// support.
#[utoipa::path(
    get,
    path = "/media/pdf/{course_id}/{module_index}/{lesson_index}",
    responses(
        (status = 200, description = "The PDF document"),
        (status = 401, description = "Requester is not entitled to this lesson"),
        (status = 404, description = "Lesson or file not found"),
        (status = 503, description = "Course store unavailable")
    ),
    params(
        ("course_id" = Uuid, Path, description = "Course id"),
        ("module_index" = usize, Path, description = "Module position"),
        ("lesson_index" = usize, Path, description = "Lesson position"),
        ("chapter" = Option<usize>, Query, description = "Explicit chapter position"),
        ("user" = Option<String>, Query, description = "Fallback identity hint")
    )
)]
pub async fn serve_pdf(
    State(state): State<AppState>,
    Path((course_id, module_index, lesson_index)): Path<(Uuid, usize, usize)>,
    Query(query): Query<MediaQuery>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, String)> {
    let (course, lesson) =
        locate(&state, course_id, module_index, lesson_index, query.chapter).await?;
    if lesson.kind != LessonKind::Pdf {
        return Err((StatusCode::NOT_FOUND, "Not a PDF lesson".to_string()));
    }

    let ctx = request_context(session, &headers, query.user, query.token);
    authorize(&state, &ctx, &course, &lesson).await?;

    let path = stored_file_path(&state, &lesson)?;
    let metadata = tokio::fs::metadata(&path).await.map_err(|_| {
        warn!("PDF file missing on disk: {}", path.display());
        (StatusCode::NOT_FOUND, "PDF file not found".to_string())
    })?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| (StatusCode::NOT_FOUND, "PDF file not found".to_string()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "lesson.pdf".to_string());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_LENGTH, metadata.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", filename),
        )
        .header(
            header::CACHE_CONTROL,
            format!("public, max-age={}", state.config.media_cache_max_age),
        )
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(internal)
}

//=========================================================================================
// Locate / Entitle Steps
//=========================================================================================

async fn locate(
    state: &AppState,
    course_id: Uuid,
    module_index: usize,
    lesson_index: usize,
    chapter: Option<usize>,
) -> Result<(Course, Lesson), (StatusCode, String)> {
    let course = state
        .store
        .get_course(course_id)
        .await
        .map_err(port_error_response)?;

    let addr = LessonAddress {
        chapter,
        module: module_index,
        lesson: lesson_index,
    };
    let lesson = locate_lesson(&course, &addr)
        .cloned()
        .ok_or((StatusCode::NOT_FOUND, "Lesson not found".to_string()))?;

    Ok((course, lesson))
}

async fn authorize(
    state: &AppState,
    ctx: &RequestContext,
    course: &Course,
    lesson: &Lesson,
) -> Result<(), (StatusCode, String)> {
    let access = state
        .resolver
        .authorize(
            ctx,
            course,
            lesson,
            state.store.as_ref(),
            state.directory.as_ref(),
        )
        .await
        .map_err(port_error_response)?;

    if !access.is_granted() {
        debug!(
            "denied media request for course {} by {:?}",
            course.id,
            ctx.primary_identity()
        );
        return Err((
            StatusCode::UNAUTHORIZED,
            "Not entitled to this lesson".to_string(),
        ));
    }
    Ok(())
}

fn request_context(
    session: SessionIdentity,
    headers: &HeaderMap,
    user_hint: Option<String>,
    token: Option<String>,
) -> RequestContext {
    RequestContext {
        session_user: session.0,
        user_hint,
        token,
        header_user: headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

fn stored_file_path(state: &AppState, lesson: &Lesson) -> Result<PathBuf, (StatusCode, String)> {
    let stored = lesson
        .storage_path()
        .ok_or((StatusCode::NOT_FOUND, "Lesson has no file".to_string()))?;
    resolve_upload_path(&state.config.uploads_dir, stored)
        .ok_or((StatusCode::NOT_FOUND, "Lesson has no file".to_string()))
}

/// Normalizes the three stored path shapes (`/uploads/<name>`,
/// `uploads/<name>`, bare `<name>`) to the same file under the uploads
/// root. Only the basename is kept, which also discards any
/// directory-traversal attempt.
pub fn resolve_upload_path(uploads_dir: &FsPath, stored: &str) -> Option<PathBuf> {
    let name = FsPath::new(stored).file_name()?;
    Some(uploads_dir.join(name))
}

//=========================================================================================
// Range-Request Streaming
//=========================================================================================

#[derive(Debug, PartialEq, Eq)]
enum RangeRequest {
    Full,
    Window { start: u64, end: u64 },
    Unsatisfiable,
}

/// Parses a `Range: bytes=<start>-[<end>]` header against the file size.
///
/// `start` is required; `end` defaults to (and is clamped at) end-of-file.
/// A malformed header serves the full file, the lenient behavior players
/// rely on; a well-formed start past end-of-file is unsatisfiable.
fn parse_range(raw: Option<&str>, total: u64) -> RangeRequest {
    let Some(raw) = raw else {
        return RangeRequest::Full;
    };
    let Some(spec) = raw.trim().strip_prefix("bytes=") else {
        return RangeRequest::Full;
    };

    let mut parts = spec.splitn(2, '-');
    let start = match parts.next().and_then(|s| s.trim().parse::<u64>().ok()) {
        Some(start) => start,
        None => return RangeRequest::Full,
    };
    let end = parts
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<u64>().ok());

    if start >= total {
        return RangeRequest::Unsatisfiable;
    }
    let end = end.unwrap_or(total - 1).min(total - 1);
    if end < start {
        return RangeRequest::Full;
    }
    RangeRequest::Window { start, end }
}

/// Serves the file at `path` as `video/mp4`, honoring a single byte range.
/// The requested window is streamed straight from disk; the whole file is
/// never buffered.
async fn serve_video_file(
    path: &FsPath,
    range: Option<&str>,
    cache_max_age: u32,
) -> Result<Response, (StatusCode, String)> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(_) => {
            warn!("video file missing on disk: {}", path.display());
            return Err((StatusCode::NOT_FOUND, "Video file not found".to_string()));
        }
    };
    let total = metadata.len();
    let cache_control = format!("public, max-age={}", cache_max_age);

    match parse_range(range, total) {
        RangeRequest::Unsatisfiable => Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{}", total))
            .header(header::ACCEPT_RANGES, "bytes")
            .body(Body::empty())
            .map_err(internal),

        RangeRequest::Window { start, end } => {
            let mut file = tokio::fs::File::open(path)
                .await
                .map_err(|_| (StatusCode::NOT_FOUND, "Video file not found".to_string()))?;
            file.seek(SeekFrom::Start(start)).await.map_err(internal)?;

            let len = end - start + 1;
            let stream = ReaderStream::new(file.take(len));

            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, "video/mp4")
                .header(header::CONTENT_LENGTH, len)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, total),
                )
                .header(header::ACCEPT_RANGES, "bytes")
                .header(header::CACHE_CONTROL, cache_control)
                .body(Body::from_stream(stream))
                .map_err(internal)
        }

        RangeRequest::Full => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|_| (StatusCode::NOT_FOUND, "Video file not found".to_string()))?;
            let stream = ReaderStream::new(file);

            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "video/mp4")
                .header(header::CONTENT_LENGTH, total)
                .header(header::ACCEPT_RANGES, "bytes")
                .header(header::CACHE_CONTROL, cache_control)
                .body(Body::from_stream(stream))
                .map_err(internal)
        }
    }
}

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Maps port errors to the HTTP taxonomy: 404 for a missing lesson, 503
/// for an unreachable store (no retry), 500 for everything unexpected.
pub fn port_error_response(e: PortError) -> (StatusCode, String) {
    match e {
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::Unavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Service temporarily unavailable".to_string(),
        ),
        PortError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        PortError::Unexpected(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
    }
}

fn internal(e: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
