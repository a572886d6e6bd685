//! URL composition for the device endpoints
//!
//! Every URL the viewer requests is built here from the user-supplied base
//! address. An empty base means "same origin", which yields a relative path.
//! Relative paths only resolve for the browser page; requests made from this
//! process go to [`resolve_base`] instead.

/// Liveness endpoint path
pub const HEALTH_PATH: &str = "/api/health";

/// Camera stream endpoint path
pub const STREAM_PATH: &str = "/api/camera/video_feed";

/// Query parameter carrying the cache-defeat token
pub const CACHE_TOKEN_PARAM: &str = "t";

/// Trim surrounding whitespace and strip trailing slashes from a base address
pub fn normalize_base(base: &str) -> String {
    base.trim().trim_end_matches('/').to_string()
}

/// The address requests from this process use: `base` itself, or
/// `device_origin` when `base` is empty (same origin as the viewer page,
/// which proxies to the device)
pub fn resolve_base(base: &str, device_origin: &str) -> String {
    let base = normalize_base(base);
    if base.is_empty() {
        normalize_base(device_origin)
    } else {
        base
    }
}

/// `{base}/api/health`
pub fn health_url(base: &str) -> String {
    format!("{}{}", normalize_base(base), HEALTH_PATH)
}

/// `{base}/api/camera/video_feed`
pub fn stream_url(base: &str) -> String {
    format!("{}{}", normalize_base(base), STREAM_PATH)
}

/// The stream URL with the cache-defeat token appended, when one is set
pub fn stream_reference(base: &str, cache_token: Option<u64>) -> String {
    match cache_token {
        Some(token) => format!("{}?{}={}", stream_url(base), CACHE_TOKEN_PARAM, token),
        None => stream_url(base),
    }
}
