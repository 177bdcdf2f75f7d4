//! Request authorization.
//!
//! Gates every Git request before a backend subprocess is started.  The
//! decision is a pure function over the requested service, the supplied
//! basic-auth credentials, and the immutable [`AccessPolicy`] loaded at
//! startup: private repositories require a reader credential to fetch, and
//! pushes always require a writer credential.

use std::collections::HashMap;

use axum::http::{header, HeaderMap};
use base64::Engine;

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// The Git smart HTTP service a request is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// fetch / clone / pull (`git-upload-pack`).
    UploadPack,
    /// push (`git-receive-pack`).
    ReceivePack,
}

impl Service {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "git-upload-pack" => Some(Self::UploadPack),
            "git-receive-pack" => Some(Self::ReceivePack),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }
}

// ---------------------------------------------------------------------------
// Policy and credentials
// ---------------------------------------------------------------------------

/// A basic-auth credential pair extracted from the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Immutable access policy, loaded once from configuration.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    pub private: bool,
    pub readers: HashMap<String, String>,
    pub writers: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Decide whether a request for `service` with `credentials` may proceed.
///
/// Rules:
/// - `upload-pack` on a private repository requires a reader credential;
///   public repositories allow reads unconditionally.
/// - `receive-pack` always requires a writer credential.
/// - Requests naming no known service pass through; the backend rejects
///   anything it does not understand.
pub fn authorize(
    service: Option<Service>,
    credentials: Option<&Credentials>,
    policy: &AccessPolicy,
) -> Decision {
    match service {
        Some(Service::UploadPack) if policy.private => check(credentials, &policy.readers),
        Some(Service::ReceivePack) => check(credentials, &policy.writers),
        _ => Decision::Allow,
    }
}

/// Exact-match credential lookup.  Absent credentials never match.
fn check(credentials: Option<&Credentials>, table: &HashMap<String, String>) -> Decision {
    match credentials {
        Some(c) if table.get(&c.username).is_some_and(|secret| *secret == c.password) => {
            Decision::Allow
        }
        _ => Decision::Deny,
    }
}

// ---------------------------------------------------------------------------
// Basic-auth extraction
// ---------------------------------------------------------------------------

/// Extract `(user, password)` from an `Authorization: Basic` header.
///
/// Any malformed header (wrong scheme, invalid base64, missing colon) yields
/// `None`, which the authorizer treats as "no credentials supplied".
pub fn basic_credentials(headers: &HeaderMap) -> Option<Credentials> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn policy(private: bool) -> AccessPolicy {
        AccessPolicy {
            private,
            readers: HashMap::from([("alice".to_string(), "reads".to_string())]),
            writers: HashMap::from([("bob".to_string(), "writes".to_string())]),
        }
    }

    fn creds(user: &str, password: &str) -> Credentials {
        Credentials {
            username: user.to_string(),
            password: password.to_string(),
        }
    }

    // ── read path ────────────────────────────────────────────────────

    #[test]
    fn test_private_read_requires_reader_credential() {
        let p = policy(true);
        assert_eq!(
            authorize(Some(Service::UploadPack), None, &p),
            Decision::Deny
        );
        assert_eq!(
            authorize(Some(Service::UploadPack), Some(&creds("alice", "wrong")), &p),
            Decision::Deny
        );
        assert_eq!(
            authorize(Some(Service::UploadPack), Some(&creds("bob", "writes")), &p),
            Decision::Deny
        );
        assert_eq!(
            authorize(Some(Service::UploadPack), Some(&creds("alice", "reads")), &p),
            Decision::Allow
        );
    }

    #[test]
    fn test_public_read_allowed_without_credentials() {
        let p = policy(false);
        assert_eq!(
            authorize(Some(Service::UploadPack), None, &p),
            Decision::Allow
        );
        // Garbage credentials do not hurt a public read either.
        assert_eq!(
            authorize(Some(Service::UploadPack), Some(&creds("who", "ever")), &p),
            Decision::Allow
        );
    }

    // ── write path ───────────────────────────────────────────────────

    #[test]
    fn test_write_requires_writer_credential_regardless_of_privacy() {
        for private in [false, true] {
            let p = policy(private);
            assert_eq!(
                authorize(Some(Service::ReceivePack), None, &p),
                Decision::Deny
            );
            assert_eq!(
                authorize(Some(Service::ReceivePack), Some(&creds("alice", "reads")), &p),
                Decision::Deny
            );
            assert_eq!(
                authorize(Some(Service::ReceivePack), Some(&creds("bob", "wrong")), &p),
                Decision::Deny
            );
            assert_eq!(
                authorize(Some(Service::ReceivePack), Some(&creds("bob", "writes")), &p),
                Decision::Allow
            );
        }
    }

    #[test]
    fn test_comparison_is_case_sensitive() {
        let p = policy(true);
        assert_eq!(
            authorize(Some(Service::UploadPack), Some(&creds("Alice", "reads")), &p),
            Decision::Deny
        );
        assert_eq!(
            authorize(Some(Service::UploadPack), Some(&creds("alice", "Reads")), &p),
            Decision::Deny
        );
    }

    #[test]
    fn test_unknown_service_passes_through() {
        let p = policy(true);
        assert_eq!(authorize(None, None, &p), Decision::Allow);
    }

    #[test]
    fn test_decision_is_stable_across_repeated_calls() {
        let p = policy(true);
        let c = creds("mallory", "guess");
        for _ in 0..3 {
            assert_eq!(
                authorize(Some(Service::ReceivePack), Some(&c), &p),
                Decision::Deny
            );
        }
    }

    // ── service names ────────────────────────────────────────────────

    #[test]
    fn test_service_from_name() {
        assert_eq!(Service::from_name("git-upload-pack"), Some(Service::UploadPack));
        assert_eq!(Service::from_name("git-receive-pack"), Some(Service::ReceivePack));
        assert_eq!(Service::from_name("git-upload-archive"), None);
        assert_eq!(Service::from_name(""), None);
    }

    // ── basic-auth extraction ────────────────────────────────────────

    fn header_map(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_basic_credentials_decoded() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("alice:reads");
        let headers = header_map(&format!("Basic {encoded}"));
        assert_eq!(basic_credentials(&headers), Some(creds("alice", "reads")));
    }

    #[test]
    fn test_basic_credentials_password_may_contain_colon() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("alice:a:b:c");
        let headers = header_map(&format!("Basic {encoded}"));
        assert_eq!(basic_credentials(&headers), Some(creds("alice", "a:b:c")));
    }

    #[test]
    fn test_basic_credentials_malformed() {
        assert_eq!(basic_credentials(&HeaderMap::new()), None);
        assert_eq!(basic_credentials(&header_map("Bearer token")), None);
        assert_eq!(basic_credentials(&header_map("Basic not-base64!!")), None);
        // Valid base64 but no colon inside.
        let encoded = base64::engine::general_purpose::STANDARD.encode("nocolon");
        assert_eq!(basic_credentials(&header_map(&format!("Basic {encoded}"))), None);
    }
}
