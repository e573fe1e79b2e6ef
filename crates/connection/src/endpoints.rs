//! Candidate endpoint rotation.
//!
//! A deployment usually exposes the chat socket behind more than one
//! path (direct backend vs. reverse proxy), so each configured base URL
//! expands into itself plus a path variant with `/api/chat` and
//! `/ws/chat` swapped. Retries walk the candidate list in order and
//! park on the last entry once the list is exhausted.

/// WebSocket endpoints the manager rotates through.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub primary_url: String,
    pub fallback_url: String,
    /// Paths probed against the HTTP origin before early dial attempts.
    pub health_paths: Vec<String>,
}

impl Endpoints {
    pub fn new(primary_url: impl Into<String>, fallback_url: impl Into<String>) -> Self {
        Self {
            primary_url: primary_url.into(),
            fallback_url: fallback_url.into(),
            health_paths: vec!["/chat/health".to_string(), "/status".to_string()],
        }
    }

    pub fn with_health_paths(mut self, paths: Vec<String>) -> Self {
        self.health_paths = paths;
        self
    }

    /// Full candidate list, deduplicated, order-preserving: primary,
    /// primary's path variant, fallback, fallback's path variant.
    pub fn candidates(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(4);
        for base in [&self.primary_url, &self.fallback_url] {
            for url in std::iter::once(base.clone()).chain(path_variant(base)) {
                if !out.contains(&url) {
                    out.push(url);
                }
            }
        }
        out
    }
}

/// Alternate spelling of a chat endpoint path, if one exists.
fn path_variant(url: &str) -> Option<String> {
    if url.contains("/api/chat") {
        Some(url.replace("/api/chat", "/ws/chat"))
    } else if url.contains("/ws/chat") {
        Some(url.replace("/ws/chat", "/api/chat"))
    } else {
        None
    }
}

/// Candidate for the given retry count, clamped to the last entry.
pub(crate) fn candidate_for_attempt(candidates: &[String], retry_count: u32) -> &str {
    let idx = (retry_count as usize).min(candidates.len().saturating_sub(1));
    &candidates[idx]
}

/// HTTP origin for a WebSocket URL: `ws`/`http` map to `http`,
/// `wss`/`https` to `https`. Returns `None` for anything else.
pub(crate) fn origin_of(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let http_scheme = match scheme {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        _ => return None,
    };
    let host = rest.split('/').next()?;
    if host.is_empty() {
        return None;
    }
    Some(format!("{http_scheme}://{host}"))
}
