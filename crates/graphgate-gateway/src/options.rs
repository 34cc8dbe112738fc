use std::time::Duration;

use http::Method;

pub const DEFAULT_REQUEST_PATH: &str = "/GraphQL";
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// How the request path is compared against the configured endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PathMatch {
    /// Byte-for-byte comparison. `/graphql` does not match `/GraphQL`.
    #[default]
    Exact,
    /// ASCII case-insensitive comparison.
    IgnoreAsciiCase,
}

/// Static gateway configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    request_path: String,
    pub path_match: PathMatch,
    pub max_body_bytes: usize,
    /// Deadline applied to the per-request cancellation token. `None` means
    /// the engine runs until it finishes or the client goes away.
    pub execution_timeout: Option<Duration>,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            request_path: DEFAULT_REQUEST_PATH.to_string(),
            path_match: PathMatch::Exact,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            execution_timeout: None,
        }
    }
}

impl GatewayOptions {
    /// An empty path falls back to [`DEFAULT_REQUEST_PATH`].
    pub fn new(request_path: impl Into<String>) -> Self {
        let request_path = request_path.into();
        if request_path.is_empty() {
            return Self::default();
        }
        Self {
            request_path,
            ..Self::default()
        }
    }

    pub fn request_path(&self) -> &str {
        &self.request_path
    }

    pub fn with_path_match(mut self, path_match: PathMatch) -> Self {
        self.path_match = path_match;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.execution_timeout = timeout;
        self
    }

    pub fn matches(&self, method: &Method, path: &str) -> bool {
        if method != Method::POST {
            return false;
        }
        match self.path_match {
            PathMatch::Exact => path == self.request_path,
            PathMatch::IgnoreAsciiCase => path.eq_ignore_ascii_case(&self.request_path),
        }
    }
}
