//! crates/music_school_core/src/identity.rs
//!
//! Multi-channel identity resolution for media requests.
//!
//! The requester's identity is not assumed to come from a single channel:
//! a video may be fetched with a verified session, embedded in an iframe
//! that only knows the user id, or requested with a raw provider token in
//! the query string. Each channel is a pure extractor from the request
//! context; extractors are attempted strictly in priority order and the
//! first success short-circuits the rest.
//!
//! None of this establishes entitlement on its own. The token extractor in
//! particular decodes the token payload *without verifying it* and is only
//! ever used as a best-effort answer to "who is asking" — entitlement still
//! requires a genuine enrollment record or a genuinely free course.

use serde_json::Value;

/// The identity-bearing parts of an inbound media request, gathered by the
/// web layer before the core gets involved.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Identity attached by upstream middleware after verifying a bearer
    /// session with the identity provider.
    pub session_user: Option<String>,
    /// Client-supplied `user` query parameter.
    pub user_hint: Option<String>,
    /// Opaque bearer-style `token` query parameter.
    pub token: Option<String>,
    /// Identity carried directly in the `x-user-id` request header.
    pub header_user: Option<String>,
}

/// A pure extractor from request context to an identity candidate.
pub type Extractor = fn(&RequestContext) -> Option<String>;

/// The extraction channels in priority order. First success wins for the
/// primary identity; the admin check walks all of them.
pub const EXTRACTORS: [(&str, Extractor); 4] = [
    ("session", extract_session),
    ("user-hint", extract_user_hint),
    ("token", extract_token_subject),
    ("header", extract_header),
];

pub fn extract_session(ctx: &RequestContext) -> Option<String> {
    non_empty(ctx.session_user.as_deref())
}

pub fn extract_user_hint(ctx: &RequestContext) -> Option<String> {
    non_empty(ctx.user_hint.as_deref())
}

pub fn extract_token_subject(ctx: &RequestContext) -> Option<String> {
    ctx.token.as_deref().and_then(token_subject)
}

pub fn extract_header(ctx: &RequestContext) -> Option<String> {
    non_empty(ctx.header_user.as_deref())
}

impl RequestContext {
    /// Every distinct identity the channels produce, in priority order.
    pub fn candidates(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for (_, extract) in EXTRACTORS {
            if let Some(id) = extract(self) {
                if !seen.contains(&id) {
                    seen.push(id);
                }
            }
        }
        seen
    }

    /// The first identity any channel yields.
    pub fn primary_identity(&self) -> Option<String> {
        EXTRACTORS.iter().find_map(|(_, extract)| extract(self))
    }
}

/// Best-effort subject extraction from a JWT-shaped token: decode the
/// second base64url segment as JSON and read its `sub` claim.
///
/// The signature is NOT checked here. Verification, if any, happens
/// upstream against the identity provider; this exists so a request that
/// carries only a raw token still names a subject.
pub fn token_subject(token: &str) -> Option<String> {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    let payload = URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
    let claims: Value = serde_json::from_slice(&payload).ok()?;
    claims.get("sub")?.as_str().map(str::to_owned)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}
