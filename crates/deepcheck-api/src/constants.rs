//! API constants.

/// Prefix under which every route is mounted a second time.
pub const API_PREFIX: &str = "/api";

/// Path of the served OpenAPI document.
pub const OPENAPI_PATH: &str = "/api/openapi.json";

/// Timeout applied to each dependency probe in `/health`.
pub const HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

/// Multipart framing allowance on top of the largest accepted file.
pub const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;
