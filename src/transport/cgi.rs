//! CGI-style output parsing.
//!
//! `git http-backend` writes an RFC-822-like header block, a blank line, and
//! the payload body.  The separator is the first `\r\n\r\n`; everything after
//! it is binary-safe body bytes.  Output without the separator is malformed
//! and reported to the caller instead of faulting.

use bytes::Bytes;

/// Parsed backend stdout: verbatim headers plus the binary-safe body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgiResponse {
    /// Header `(name, value)` pairs in output order.  Values are trimmed of
    /// leading whitespace only.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Split backend stdout into headers and body.
///
/// Returns `None` when the `\r\n\r\n` separator is missing or the header
/// block is not valid UTF-8.
pub fn parse(output: &[u8]) -> Option<CgiResponse> {
    let separator = output.windows(4).position(|w| w == b"\r\n\r\n")?;
    let header_block = std::str::from_utf8(&output[..separator]).ok()?;
    let body = Bytes::copy_from_slice(&output[separator + 4..]);

    let mut headers = Vec::new();
    for line in header_block.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        // Split on the first colon; the value is everything after it.
        let (name, value) = line.split_once(':')?;
        headers.push((name.to_string(), value.trim_start().to_string()));
    }

    Some(CgiResponse { headers, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_header_and_body() {
        let parsed = parse(b"Content-Type: text/plain\r\n\r\nhello").unwrap();
        assert_eq!(
            parsed.headers,
            vec![("Content-Type".to_string(), "text/plain".to_string())]
        );
        assert_eq!(&parsed.body[..], b"hello");
    }

    #[test]
    fn test_multiple_headers() {
        let parsed = parse(
            b"Status: 200 OK\r\nContent-Type: application/x-git-upload-pack-advertisement\r\nCache-Control: no-cache\r\n\r\nbody",
        )
        .unwrap();
        assert_eq!(parsed.headers.len(), 3);
        assert_eq!(parsed.headers[0], ("Status".to_string(), "200 OK".to_string()));
        assert_eq!(
            parsed.headers[1],
            (
                "Content-Type".to_string(),
                "application/x-git-upload-pack-advertisement".to_string()
            )
        );
        assert_eq!(
            parsed.headers[2],
            ("Cache-Control".to_string(), "no-cache".to_string())
        );
        assert_eq!(&parsed.body[..], b"body");
    }

    #[test]
    fn test_value_split_on_first_colon_only() {
        let parsed = parse(b"WWW-Authenticate: Basic realm=\"git:ops\"\r\n\r\n").unwrap();
        assert_eq!(
            parsed.headers,
            vec![(
                "WWW-Authenticate".to_string(),
                "Basic realm=\"git:ops\"".to_string()
            )]
        );
        assert!(parsed.body.is_empty());
    }

    #[test]
    fn test_body_is_binary_safe() {
        // Body bytes containing another CRLF-CRLF sequence stay in the body.
        let parsed = parse(b"Content-Type: application/octet-stream\r\n\r\n\x00\x01\r\n\r\n\xff").unwrap();
        assert_eq!(&parsed.body[..], b"\x00\x01\r\n\r\n\xff");
    }

    #[test]
    fn test_missing_separator_is_malformed() {
        assert_eq!(parse(b""), None);
        assert_eq!(parse(b"no headers here"), None);
        // LF-only blank line is not the CGI separator.
        assert_eq!(parse(b"Content-Type: text/plain\n\nbody"), None);
    }

    #[test]
    fn test_header_line_without_colon_is_malformed() {
        assert_eq!(parse(b"not-a-header\r\n\r\nbody"), None);
    }

    #[test]
    fn test_empty_body() {
        let parsed = parse(b"Content-Type: text/plain\r\n\r\n").unwrap();
        assert!(parsed.body.is_empty());
    }
}
