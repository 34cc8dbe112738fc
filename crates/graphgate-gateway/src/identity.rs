use std::convert::Infallible;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request},
    middleware::Next,
    response::Response,
};

use graphgate_common::Principal;

/// Header carrying an identity that an upstream proxy has already verified.
#[derive(Debug, Clone)]
pub struct TrustedIdentity {
    pub header: HeaderName,
    pub roles_header: Option<HeaderName>,
}

impl TrustedIdentity {
    pub fn new(header: HeaderName) -> Self {
        Self {
            header,
            roles_header: None,
        }
    }

    pub fn with_roles_header(mut self, header: HeaderName) -> Self {
        self.roles_header = Some(header);
        self
    }

    fn principal<B>(&self, req: &Request<B>) -> Option<Principal> {
        let name = req
            .headers()
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())?;

        let roles = self
            .roles_header
            .as_ref()
            .and_then(|h| req.headers().get(h))
            .and_then(|v| v.to_str().ok())
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Some(Principal {
            name: name.to_string(),
            roles,
        })
    }
}

/// Attach a [`Principal`] extension when the trusted header is present.
/// Requests without it continue anonymously; nothing is rejected here.
pub async fn attach_principal(
    State(identity): State<TrustedIdentity>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Infallible> {
    if let Some(principal) = identity.principal(&req) {
        tracing::debug!(principal = %principal.name, "request identity attached");
        req.extensions_mut().insert(principal);
    }
    Ok(next.run(req).await)
}
