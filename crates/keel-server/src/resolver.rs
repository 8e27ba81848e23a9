//! Turning a request into an [`InfraTarget`].
//!
//! Authentication and job lookup live behind [`InfraResolver`]; the server
//! ships [`DirectResolver`], which trusts the path and query.

use async_trait::async_trait;
use keel_core::InfraTarget;
use keel_core::infra::DEFAULT_INFRA_KIND;
use serde::Deserialize;
use thiserror::Error;

/// Query parameters on the state stream route.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StateStreamQuery {
    /// Infra kind; defaults to `infra`.
    pub kind: Option<String>,
    /// Infra suffix; defaults to empty.
    pub suffix: Option<String>,
}

/// An unresolved state stream request.
#[derive(Clone, Debug)]
pub struct StateStreamRequest {
    /// Project from the path.
    pub project_id: u64,
    /// Infra from the path.
    pub infra_id: u64,
    /// Operation from the path.
    pub operation_id: String,
    /// Query parameters.
    pub query: StateStreamQuery,
}

/// Resolution failures.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The infra or operation does not exist (or is not visible).
    #[error("{0}")]
    NotFound(String),
    /// The request is malformed.
    #[error("{0}")]
    Invalid(String),
}

/// Resolves a request to the target whose state is streamed.
#[async_trait]
pub trait InfraResolver: Send + Sync {
    /// Resolve or refuse `request`.
    async fn resolve(&self, request: StateStreamRequest) -> Result<InfraTarget, ResolveError>;
}

/// Builds the target straight from the request after validating it.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectResolver;

#[async_trait]
impl InfraResolver for DirectResolver {
    async fn resolve(&self, request: StateStreamRequest) -> Result<InfraTarget, ResolveError> {
        let kind = request
            .query
            .kind
            .unwrap_or_else(|| DEFAULT_INFRA_KIND.to_string());
        let suffix = request.query.suffix.unwrap_or_default();

        validate_segment("operation id", &request.operation_id, false)?;
        validate_segment("kind", &kind, false)?;
        validate_segment("suffix", &suffix, true)?;

        Ok(
            InfraTarget::new(request.project_id, request.infra_id, request.operation_id)
                .with_kind(kind)
                .with_suffix(suffix),
        )
    }
}

/// Workspace IDs are `-`-joined, so each part is limited to a safe charset.
fn validate_segment(name: &str, value: &str, allow_empty: bool) -> Result<(), ResolveError> {
    if value.is_empty() {
        return if allow_empty {
            Ok(())
        } else {
            Err(ResolveError::Invalid(format!("{name} must not be empty")))
        };
    }
    if value.len() > 128 {
        return Err(ResolveError::Invalid(format!("{name} is too long")));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ResolveError::Invalid(format!(
            "{name} may only contain letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}
