//! HTTP timestamp authority tests against a mock server

use ats_client::authority::{TIMESTAMP_QUERY, TIMESTAMP_REPLY};
use ats_client::testutil::FakeAuthority;
use ats_client::{AuthorityError, HttpTimestampAuthority, TimestampAuthority};
use ats_types::hash::digest;
use ats_types::messages::pki_status;
use ats_types::{HashAlgorithm, TimestampRequest, TimestampResponse};

fn request() -> TimestampRequest {
    TimestampRequest::new(
        HashAlgorithm::Sha256,
        digest(b"tree root", HashAlgorithm::Sha256),
    )
    .with_nonce(0x1234_5678)
}

fn granted_body(request: &TimestampRequest) -> Vec<u8> {
    let token = FakeAuthority::new().issue(request).unwrap();
    TimestampResponse::granted(token).to_der().unwrap()
}

#[tokio::test]
async fn test_granted_response() {
    let mut server = mockito::Server::new_async().await;
    let req = request();
    let mock = server
        .mock("POST", "/tsa")
        .match_header("content-type", TIMESTAMP_QUERY)
        .match_header("accept", TIMESTAMP_REPLY)
        .with_status(200)
        .with_header("content-type", TIMESTAMP_REPLY)
        .with_body(granted_body(&req))
        .create_async()
        .await;

    let authority = HttpTimestampAuthority::new(format!("{}/tsa", server.url())).unwrap();
    let token = authority.request_timestamp(&req).await.expect("request failed");

    let info = token.info().unwrap();
    assert_eq!(info.message_imprint.digest, req.digest);
    assert_eq!(info.nonce, Some(0x1234_5678));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_random_nonce_is_attached() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_body_from_request(|request| {
            let body = request.body().map(|b| b.to_vec()).unwrap_or_default();
            match TimestampRequest::from_der(&body) {
                Ok(parsed) if parsed.nonce.is_some() => granted_body(&parsed),
                _ => Vec::new(),
            }
        })
        .create_async()
        .await;

    let authority = HttpTimestampAuthority::new(server.url()).unwrap();
    let without_nonce = TimestampRequest::new(
        HashAlgorithm::Sha256,
        digest(b"no nonce given", HashAlgorithm::Sha256),
    );
    let token = authority.request_timestamp(&without_nonce).await.unwrap();
    assert!(token.info().unwrap().nonce.is_some());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_http_error_status() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let authority = HttpTimestampAuthority::new(server.url()).unwrap();
    let err = authority.request_timestamp(&request()).await.unwrap_err();
    assert_eq!(err, AuthorityError::HttpStatus { status: 500 });
}

#[tokio::test]
async fn test_not_found_status() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/missing")
        .with_status(404)
        .create_async()
        .await;

    let authority = HttpTimestampAuthority::new(format!("{}/missing", server.url())).unwrap();
    let err = authority.request_timestamp(&request()).await.unwrap_err();
    assert_eq!(err, AuthorityError::HttpStatus { status: 404 });
}

#[tokio::test]
async fn test_rejection_status() {
    let mut server = mockito::Server::new_async().await;
    let body = TimestampResponse::rejected(pki_status::REJECTION, "unaccepted policy")
        .to_der()
        .unwrap();
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let authority = HttpTimestampAuthority::new(server.url()).unwrap();
    let err = authority.request_timestamp(&request()).await.unwrap_err();
    assert_eq!(
        err,
        AuthorityError::Rejected {
            status: pki_status::REJECTION,
            text: "unaccepted policy".to_string(),
        }
    );
}

#[tokio::test]
async fn test_garbage_body() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_body("<html>not a timestamp</html>")
        .create_async()
        .await;

    let authority = HttpTimestampAuthority::new(server.url()).unwrap();
    let err = authority.request_timestamp(&request()).await.unwrap_err();
    assert!(matches!(err, AuthorityError::MalformedResponse(_)), "got: {err}");
}

#[tokio::test]
async fn test_token_for_other_digest() {
    let mut server = mockito::Server::new_async().await;
    let mut other = request();
    other.digest = digest(b"something else", HashAlgorithm::Sha256);
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_body(granted_body(&other))
        .create_async()
        .await;

    let authority = HttpTimestampAuthority::new(server.url()).unwrap();
    let err = authority.request_timestamp(&request()).await.unwrap_err();
    assert_eq!(err, AuthorityError::ImprintMismatch);
}

#[tokio::test]
async fn test_token_with_wrong_nonce() {
    let mut server = mockito::Server::new_async().await;
    let replayed = request().with_nonce(1);
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_body(granted_body(&replayed))
        .create_async()
        .await;

    let authority = HttpTimestampAuthority::new(server.url()).unwrap();
    let err = authority.request_timestamp(&request()).await.unwrap_err();
    assert_eq!(err, AuthorityError::NonceMismatch);
}
