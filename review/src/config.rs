//! Configuration for a review run.
//!
//! Every value has a compile-time default and can be overridden at runtime
//! via a dedicated environment variable. The CLI layers its flags on top.

use std::path::PathBuf;
use std::time::Duration;

use engine::SessionConfig;

use crate::report::ReportEndpoint;

/// Search depth requested for every position.
pub const DEFAULT_SEARCH_DEPTH: u8 = 16;

/// Default reporting endpoint.
const DEFAULT_REPORT_URL: &str = "http://localhost:3000/api/report";

/// Default number of consecutive engine restart attempts.
const DEFAULT_MAX_RESTARTS: u32 = 3;

/// Default timeout for the report request (in seconds).
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

/// Get the engine binary path from `CHESSREVIEW_ENGINE_PATH`.
///
/// Does not search the filesystem; callers fall back to
/// [`engine::find_engine_path`] (which runs candidate binaries) only when
/// neither this nor a CLI flag names an engine.
pub fn get_engine_path() -> Option<PathBuf> {
    std::env::var("CHESSREVIEW_ENGINE_PATH")
        .ok()
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}

/// Get the target search depth.
///
/// `CHESSREVIEW_SEARCH_DEPTH` if set and a valid non-zero `u8`, else 16.
pub fn get_search_depth() -> u8 {
    std::env::var("CHESSREVIEW_SEARCH_DEPTH")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|depth| *depth > 0)
        .unwrap_or(DEFAULT_SEARCH_DEPTH)
}

/// Get the reporting service URL.
pub fn get_report_url() -> String {
    std::env::var("CHESSREVIEW_REPORT_URL").unwrap_or_else(|_| DEFAULT_REPORT_URL.to_string())
}

/// Shared secret for the reporting API. When set, reports go straight to the
/// API (see [`ReportEndpoint::Upstream`]) instead of the web app's route.
pub fn get_api_secret() -> Option<String> {
    std::env::var("CHESSREVIEW_API_SECRET")
        .ok()
        .filter(|secret| !secret.is_empty())
}

/// Per-position search timeout. Unset means searches may run forever.
pub fn get_search_timeout() -> Option<Duration> {
    std::env::var("CHESSREVIEW_SEARCH_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

pub fn get_max_restarts() -> u32 {
    std::env::var("CHESSREVIEW_MAX_RESTARTS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_RESTARTS)
}

pub fn get_http_timeout() -> Duration {
    let secs = std::env::var("CHESSREVIEW_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

/// All runtime tunables for one review.
#[derive(Clone)]
pub struct ReviewConfig {
    pub engine_path: Option<PathBuf>,
    pub search_depth: u8,
    pub report_url: String,
    pub api_secret: Option<String>,
    pub search_timeout: Option<Duration>,
    pub max_restarts: u32,
    pub http_timeout: Duration,
}

impl ReviewConfig {
    pub fn from_env() -> Self {
        Self {
            engine_path: get_engine_path(),
            search_depth: get_search_depth(),
            report_url: get_report_url(),
            api_secret: get_api_secret(),
            search_timeout: get_search_timeout(),
            max_restarts: get_max_restarts(),
            http_timeout: get_http_timeout(),
        }
    }

    pub fn report_endpoint(&self) -> ReportEndpoint {
        match &self.api_secret {
            Some(api_secret) => ReportEndpoint::Upstream {
                api_secret: api_secret.clone(),
            },
            None => ReportEndpoint::Proxy,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_restarts: self.max_restarts,
            search_timeout: self.search_timeout,
            label: Some("review".to_string()),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for ReviewConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewConfig")
            .field("engine_path", &self.engine_path)
            .field("search_depth", &self.search_depth)
            .field("report_url", &self.report_url)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .field("search_timeout", &self.search_timeout)
            .field("max_restarts", &self.max_restarts)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}
