//! Actor identity for the audit trail.
//!
//! The identity is injected by whoever owns the request or session; the
//! save pipeline only reads it, once per save.

/// Identity recorded when no actor is available.
pub const UNAUTHENTICATED: &str = "unauthenticated";

/// Source of the acting user's identity.
pub trait ActorProvider {
    /// Current actor, or `None` when the caller is unauthenticated.
    fn current_actor(&self) -> Option<String>;
}

impl ActorProvider for Option<String> {
    fn current_actor(&self) -> Option<String> {
        self.clone()
    }
}

impl<F> ActorProvider for F
where
    F: Fn() -> Option<String>,
{
    fn current_actor(&self) -> Option<String> {
        self()
    }
}

/// Resolve the recorded identity, falling back to [`UNAUTHENTICATED`] for
/// missing or blank actors.
#[must_use]
pub fn resolve_actor(provider: &dyn ActorProvider) -> String {
    provider
        .current_actor()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| UNAUTHENTICATED.to_string())
}
