use std::time::Duration;

use chrono::Utc;
use reqwest::header::HeaderMap;

/// Longest a single rate-limit wait may take, whatever the server asks for.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Extract the server's wait hint from a 429 response.
///
/// `Retry-After` carries seconds; `X-RateLimit-Reset` carries the unix
/// timestamp (seconds or microseconds) at which the window resets. The
/// result is capped at [`MAX_RATE_LIMIT_WAIT`].
#[must_use]
pub fn rate_limit_wait(headers: &HeaderMap) -> Option<Duration> {
    if let Some(seconds) = header_u64(headers, "Retry-After") {
        return Some(Duration::from_secs(seconds).min(MAX_RATE_LIMIT_WAIT));
    }

    if let Some(reset) = header_u64(headers, "X-RateLimit-Reset") {
        let reset_seconds = if reset > 10_000_000_000 {
            // microsecond resolution
            reset / 1_000_000
        } else {
            reset
        };
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
        let wait = reset_seconds.saturating_sub(now);
        return Some(Duration::from_secs(wait).min(MAX_RATE_LIMIT_WAIT));
    }

    None
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)?
        .to_str()
        .ok()
        .and_then(|value| value.trim().parse().ok())
}
