//! Transport layer: HTTP session with NTLM negotiation and per-message
//! encryption.
//!
//! A [`Session`] owns the HTTP connection and the security context. After
//! [`Session::login`] completes the bounded negotiation loop, every SOAP
//! document goes out sealed inside a two-part `Encrypted Boundary`
//! multipart body and every response is unsealed the same way; the HTTP
//! layer itself stays plain.

pub mod ntlm;

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::{Client, StatusCode};
use tracing::{debug, trace, warn};

use crate::error::{Result, WrError};
use ntlm::{NtlmCredentials, NtlmMechanism, SIGNATURE_LEN};

// ============================================================================
// Constants
// ============================================================================

/// Default WinRM HTTP port.
pub const DEFAULT_PORT: u16 = 5985;

/// Default round-trip timeout in seconds.
pub const DEFAULT_TIMEOUT: u64 = 60;

const BOUNDARY: &[u8] = b"--Encrypted Boundary";
const FINAL_BOUNDARY: &[u8] = b"--Encrypted Boundary--\r\n";
const ORIGINAL_CONTENT_MARKER: &[u8] =
    b"OriginalContent: type=application/soap+xml;charset=UTF-8;Length=";
const OCTET_STREAM_MARKER: &[u8] = b"Content-Type: application/octet-stream";
const MULTIPART_CONTENT_TYPE: &str = "multipart/encrypted;\
protocol=\"application/HTTP-SPNEGO-session-encrypted\";\
boundary=\"Encrypted Boundary\"";

/// Build the `/wsman` endpoint URL for a host.
pub fn endpoint_url(host: &str, port: u16) -> String {
    format!("http://{host}:{port}/wsman")
}

// ============================================================================
// Security mechanism seam
// ============================================================================

/// One negotiation round's outcome.
pub enum Step {
    /// Send this token and feed the server's challenge back in.
    Continue(Vec<u8>),
    /// Context established; send the final token if one is produced.
    Complete(Option<Vec<u8>>),
}

/// GSSAPI-style security mechanism: token exchange plus message
/// protection once the context is established.
pub trait Mechanism: Send {
    /// Produce the next outbound token from the previous server challenge.
    fn step(&mut self, input: Option<&[u8]>) -> Result<Step>;
    /// Seal and sign one message.
    fn wrap(&mut self, msg: &[u8]) -> Result<Vec<u8>>;
    /// Verify and open one sealed token.
    fn unwrap(&mut self, token: &[u8]) -> Result<Vec<u8>>;
}

/// Round-trip seam between the protocol layer and the wire, so protocol
/// sequencing is testable without a server.
#[async_trait]
pub trait Transport: Send {
    /// Address the requests are sent to, for the `a:To` header.
    fn endpoint(&self) -> &str;
    /// Send one SOAP document and return the peer's SOAP bytes.
    async fn round_trip(&mut self, soap: &[u8]) -> Result<Vec<u8>>;
}

// ============================================================================
// Session
// ============================================================================

/// Authenticated WS-Management session against one endpoint.
pub struct Session {
    endpoint: String,
    client: Client,
    mechanism: NtlmMechanism,
    established: bool,
}

impl Session {
    /// Create a session. No traffic happens until [`Session::login`].
    pub fn new(
        endpoint: impl Into<String>,
        credentials: NtlmCredentials,
        timeout: Duration,
    ) -> Result<Self> {
        // NTLM binds the security context to one connection; keep a
        // single idle connection so follow-up requests reuse it.
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wrmon/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(1)
            .build()
            .map_err(|e| WrError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Session {
            endpoint: endpoint.into(),
            client,
            mechanism: NtlmMechanism::new(credentials),
            established: false,
        })
    }

    /// Run the negotiation loop until the mechanism reports completion.
    ///
    /// Each round POSTs the current token in an `Authorization: Negotiate`
    /// header with an empty body and feeds the Base64 challenge from
    /// `WWW-Authenticate` back into the mechanism. The final HTTP status
    /// must be 200 or authentication fails outright.
    pub async fn login(&mut self) -> Result<()> {
        let mut input: Option<Vec<u8>> = None;
        let mut status = StatusCode::UNAUTHORIZED;

        loop {
            match self.mechanism.step(input.as_deref())? {
                Step::Continue(token) => {
                    let (s, challenge) = self.post_auth_token(&token).await?;
                    status = s;
                    let challenge = challenge.ok_or_else(|| {
                        WrError::Auth("server did not send a challenge".to_string())
                    })?;
                    input = Some(challenge);
                }
                Step::Complete(Some(token)) => {
                    let (s, _) = self.post_auth_token(&token).await?;
                    status = s;
                    break;
                }
                Step::Complete(None) => break,
            }
        }

        if status != StatusCode::OK {
            return Err(WrError::Auth(format!(
                "server answered {status} after negotiation"
            )));
        }
        self.established = true;
        debug!(endpoint = %self.endpoint, "session established");
        Ok(())
    }

    /// POST one negotiation token; returns the status and the decoded
    /// challenge from `WWW-Authenticate: Negotiate`, if any.
    async fn post_auth_token(&self, token: &[u8]) -> Result<(StatusCode, Option<Vec<u8>>)> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Negotiate {}", BASE64_STANDARD.encode(token)))
            .header(CONTENT_LENGTH, "0")
            .send()
            .await?;

        let status = response.status();
        let challenge = match response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Negotiate "))
        {
            Some(b64) => Some(BASE64_STANDARD.decode(b64.trim()).map_err(|e| {
                WrError::Auth(format!("challenge is not valid base64: {e}"))
            })?),
            None => None,
        };

        trace!(%status, challenge = challenge.is_some(), "negotiation round");
        Ok((status, challenge))
    }

    /// Seal one SOAP document, POST it, and unseal the response.
    pub async fn send(&mut self, soap: &[u8]) -> Result<Vec<u8>> {
        if !self.established {
            return Err(WrError::Auth("session is not authenticated".to_string()));
        }

        let wrapped = self.mechanism.wrap(soap)?;
        let payload = encode_payload(&wrapped);

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, MULTIPART_CONTENT_TYPE)
            .body(payload)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        // Unseal before the status check: faults arrive sealed too, and
        // the cipher stream must advance once per server message.
        let unsealed = decode_payload(&body).and_then(|token| self.mechanism.unwrap(token));

        if status != StatusCode::OK {
            if let Ok(fault) = &unsealed {
                warn!(%status, fault = %String::from_utf8_lossy(fault), "request failed");
            }
            return Err(WrError::Transport(format!("server answered {status}")));
        }
        unsealed
    }
}

#[async_trait]
impl Transport for Session {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn round_trip(&mut self, soap: &[u8]) -> Result<Vec<u8>> {
        self.send(soap).await
    }
}

// ============================================================================
// Multipart framing
// ============================================================================

/// Frame a wrapped message (16-byte signature + ciphertext) as the
/// two-part multipart body: a clear declaration of the original content
/// length, then the opaque octets prefixed with the 4-byte
/// signature-length field.
fn encode_payload(wrapped: &[u8]) -> Vec<u8> {
    let original_len = wrapped.len() - SIGNATURE_LEN;
    let mut out = Vec::with_capacity(wrapped.len() + 256);
    out.extend_from_slice(BOUNDARY);
    out.extend_from_slice(b"\r\n\tContent-Type: application/HTTP-SPNEGO-session-encrypted\r\n\t");
    out.extend_from_slice(ORIGINAL_CONTENT_MARKER);
    out.extend_from_slice(original_len.to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(BOUNDARY);
    out.extend_from_slice(b"\r\n\t");
    out.extend_from_slice(OCTET_STREAM_MARKER);
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&(SIGNATURE_LEN as u32).to_le_bytes());
    out.extend_from_slice(wrapped);
    out.extend_from_slice(FINAL_BOUNDARY);
    out
}

/// Locate and slice the wrapped message out of a multipart body. Returns
/// the signature + ciphertext, with the 4-byte header-length field
/// stripped and validated.
fn decode_payload(body: &[u8]) -> Result<&[u8]> {
    let length_at = find(body, ORIGINAL_CONTENT_MARKER, 0).ok_or_else(|| {
        WrError::Transport("multipart body has no original content declaration".to_string())
    })? + ORIGINAL_CONTENT_MARKER.len();
    let original_len = ascii_number(&body[length_at..]).ok_or_else(|| {
        WrError::Transport("multipart content length is not a number".to_string())
    })?;

    let data_marker = find(body, OCTET_STREAM_MARKER, length_at).ok_or_else(|| {
        WrError::Transport("multipart body has no encrypted part".to_string())
    })?;
    let start = data_marker + OCTET_STREAM_MARKER.len() + 2; // past \r\n
    let end = start + original_len + 4 + SIGNATURE_LEN;
    let part = body.get(start..end).ok_or_else(|| {
        WrError::Transport("multipart body is shorter than its declared length".to_string())
    })?;

    let header_len = u32::from_le_bytes(part[0..4].try_into().unwrap()) as usize;
    if header_len != SIGNATURE_LEN {
        return Err(WrError::Transport(format!(
            "unexpected signature header length {header_len}"
        )));
    }
    Ok(&part[4..])
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn ascii_number(bytes: &[u8]) -> Option<usize> {
    let digits: Vec<u8> = bytes
        .iter()
        .copied()
        .take_while(u8::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return None;
    }
    std::str::from_utf8(&digits).ok()?.parse().ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_format() {
        assert_eq!(
            endpoint_url("winserver.example.com", 5985),
            "http://winserver.example.com:5985/wsman"
        );
    }

    #[test]
    fn multipart_roundtrip() {
        // 16-byte signature plus ciphertext, as wrap() produces.
        let mut wrapped = vec![0u8; SIGNATURE_LEN];
        wrapped.extend_from_slice(b"\x02\x88sealed soap bytes\xff\x00\x01");

        let payload = encode_payload(&wrapped);
        let text = String::from_utf8_lossy(&payload);
        assert!(text.starts_with("--Encrypted Boundary\r\n"));
        assert!(text.contains(
            "OriginalContent: type=application/soap+xml;charset=UTF-8;Length=22"
        ));
        assert!(text.ends_with("--Encrypted Boundary--\r\n"));

        let decoded = decode_payload(&payload).unwrap();
        assert_eq!(decoded, &wrapped[..]);
    }

    #[test]
    fn multipart_decode_handles_binary_boundary_bytes() {
        // Ciphertext containing the marker text must not confuse the
        // scanner, which anchors on the clear-text part headers.
        let mut wrapped = vec![1u8; SIGNATURE_LEN];
        wrapped.extend_from_slice(b"--Encrypted Boundary inside data");
        let payload = encode_payload(&wrapped);
        assert_eq!(decode_payload(&payload).unwrap(), &wrapped[..]);
    }

    #[test]
    fn truncated_multipart_is_rejected() {
        let mut wrapped = vec![0u8; SIGNATURE_LEN];
        wrapped.extend_from_slice(b"data");
        let payload = encode_payload(&wrapped);
        let truncated = &payload[..payload.len() - 30];
        assert!(matches!(
            decode_payload(truncated),
            Err(WrError::Transport(_))
        ));
    }

    #[test]
    fn garbage_body_is_rejected() {
        assert!(matches!(
            decode_payload(b"<html>401 unauthorized</html>"),
            Err(WrError::Transport(_))
        ));
    }
}
