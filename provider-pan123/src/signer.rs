//! Request signing hook.
//!
//! The 123pan web API expects some endpoints to carry a signature query
//! parameter derived from the request path. The algorithm lives with the
//! host; the store only asks for the parameter.

/// Produces the `(name, value)` query parameter that signs `path`.
pub trait RequestSigner: Send + Sync {
    fn sign(&self, path: &str) -> Option<(String, String)>;
}

/// Signer for deployments that authenticate with the bearer token alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSigner;

impl RequestSigner for NoopSigner {
    fn sign(&self, _path: &str) -> Option<(String, String)> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_signer_adds_nothing() {
        assert_eq!(NoopSigner.sign("/b/api/file/list/new"), None);
    }
}
