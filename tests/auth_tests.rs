//! NTLM negotiation over a mock HTTP server.

mod common;

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wrmon::error::WrError;
use wrmon::transport::ntlm::NtlmCredentials;
use wrmon::transport::Session;

/// Minimal NTLM Type 2 (Challenge) token: server challenge, flags,
/// empty target name/info buffers.
fn challenge_token() -> Vec<u8> {
    const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
    const NEGOTIATE_KEY_EXCH: u32 = 0x4000_0000;

    let mut token = b"NTLMSSP\0".to_vec();
    token.extend_from_slice(&2u32.to_le_bytes());
    token.extend_from_slice(&0u16.to_le_bytes());
    token.extend_from_slice(&0u16.to_le_bytes());
    token.extend_from_slice(&48u32.to_le_bytes());
    token.extend_from_slice(&(NEGOTIATE_UNICODE | NEGOTIATE_KEY_EXCH).to_le_bytes());
    token.extend_from_slice(&[0xAA; 8]);
    token.extend_from_slice(&[0u8; 8]);
    token.extend_from_slice(&0u16.to_le_bytes());
    token.extend_from_slice(&0u16.to_le_bytes());
    token.extend_from_slice(&48u32.to_le_bytes());
    token
}

fn challenge_header() -> String {
    format!("Negotiate {}", BASE64_STANDARD.encode(challenge_token()))
}

async fn session_for(server: &MockServer) -> Session {
    Session::new(
        format!("{}/wsman", server.uri()),
        NtlmCredentials::new("TESTDOMAIN\\testuser", "testpass"),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn two_round_exchange_establishes_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/wsman"))
        .respond_with(
            ResponseTemplate::new(401).insert_header("WWW-Authenticate", challenge_header()),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/wsman"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut session = session_for(&server).await;
    session.login().await.unwrap();
}

#[tokio::test]
async fn non_200_on_final_round_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/wsman"))
        .respond_with(
            ResponseTemplate::new(401).insert_header("WWW-Authenticate", challenge_header()),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    // The authenticate token is rejected even though the exchange itself
    // completed.
    Mock::given(method("POST"))
        .and(path("/wsman"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut session = session_for(&server).await;
    let err = session.login().await.unwrap_err();
    assert!(matches!(err, WrError::Auth(_)), "{err}");
}

#[tokio::test]
async fn missing_challenge_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/wsman"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut session = session_for(&server).await;
    let err = session.login().await.unwrap_err();
    match err {
        WrError::Auth(msg) => assert!(msg.contains("challenge"), "{msg}"),
        other => panic!("expected auth error, got {other}"),
    }
}

#[tokio::test]
async fn send_requires_authentication() {
    let server = MockServer::start().await;
    let mut session = session_for(&server).await;
    let err = session.send(b"<Envelope/>").await.unwrap_err();
    assert!(matches!(err, WrError::Auth(_)), "{err}");
}

#[tokio::test]
async fn unframed_response_body_is_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/wsman"))
        .respond_with(
            ResponseTemplate::new(401).insert_header("WWW-Authenticate", challenge_header()),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/wsman"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not multipart</html>"))
        .mount(&server)
        .await;

    let mut session = session_for(&server).await;
    session.login().await.unwrap();

    let err = session.send(b"<Envelope/>").await.unwrap_err();
    assert!(matches!(err, WrError::Transport(_)), "{err}");
}
