//! Git transport backend bridge.
//!
//! Everything that talks to the backend subprocess lives here.  Request
//! handlers dispatch through the [`Transport`] trait so that tests can
//! substitute a scripted backend; the production implementation
//! ([`http_backend::GitHttpBackend`]) spawns `git http-backend` per request
//! with a CGI environment overlay.

pub mod cgi;
pub mod http_backend;

use std::fmt;

use bytes::Bytes;

// ---------------------------------------------------------------------------
// Invocation and output
// ---------------------------------------------------------------------------

/// Everything one backend run needs to know about the inbound request.
///
/// Created per request and never reused.
#[derive(Debug, Clone)]
pub struct BackendInvocation {
    /// HTTP method, verbatim (`GET`, `POST`, ...).
    pub method: String,
    /// Repository-relative path plus service suffix, e.g. `/myrepo.git/info/refs`.
    pub path_info: String,
    /// Raw query string without the leading `?`.
    pub query_string: String,
    /// `Content-Type` header, forwarded verbatim when present.
    pub content_type: Option<String>,
    /// Authenticated identity, when basic-auth credentials were supplied.
    pub remote_user: Option<String>,
    /// Peer IP address of the inbound connection.
    pub remote_addr: Option<String>,
    /// Raw request body.  Only forwarded to the backend for POST.
    pub body: Bytes,
}

/// Raw result of one backend run.
#[derive(Debug, Clone)]
pub struct BackendOutput {
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Captured stdout, read to completion.  CGI-framed on success.
    pub stdout: Bytes,
    /// Captured stderr, used as the failure diagnostic body.
    pub stderr: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures of the bridge itself, as opposed to a backend that ran and
/// exited non-zero (which is reported through [`BackendOutput::success`]).
#[derive(Debug)]
pub enum TransportError {
    /// The subprocess could not be created (missing binary, permissions,
    /// resource exhaustion).
    Spawn(std::io::Error),
    /// Pipe I/O or process wait failed after a successful spawn.
    Io(std::io::Error),
    /// The invocation exceeded the configured deadline; the child was killed.
    Timeout,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "failed to spawn backend process: {e}"),
            Self::Io(e) => write!(f, "backend pipe I/O failed: {e}"),
            Self::Timeout => write!(f, "backend process timed out"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(e) | Self::Io(e) => Some(e),
            Self::Timeout => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over the backend subprocess.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Run the backend once for `invocation` and capture its output.
    async fn invoke(&self, invocation: BackendInvocation)
        -> Result<BackendOutput, TransportError>;
}
