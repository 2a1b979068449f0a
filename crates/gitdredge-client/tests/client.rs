use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gitdredge_client::{Error, FetchClient, MAX_BODY_BYTES};

#[tokio::test]
async fn fetches_body_with_a_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.git/HEAD"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes("ref: refs/heads/master\n"))
        .expect(1)
        .mount(&server)
        .await;

    let client = FetchClient::builder().build();
    let url = Url::parse(&format!("{}/.git/HEAD", server.uri())).unwrap();
    let fetched = client.get(url, &CancellationToken::new()).await.unwrap();

    assert_eq!(fetched.status.as_u16(), 200);
    assert_eq!(fetched.body, b"ref: refs/heads/master\n");
}

#[tokio::test]
async fn missing_files_surface_their_status() {
    let server = MockServer::start().await;

    let client = FetchClient::builder().build();
    let url = Url::parse(&format!("{}/.git/packed-refs", server.uri())).unwrap();
    let fetched = client.get(url, &CancellationToken::new()).await.unwrap();

    assert_eq!(fetched.status.as_u16(), 404);
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.git/objects/pack/pack-big.pack"))
        .respond_with(
            ResponseTemplate::new(200).set_body_bytes(vec![0u8; MAX_BODY_BYTES as usize + 1]),
        )
        .mount(&server)
        .await;

    let client = FetchClient::builder().build();
    let url = Url::parse(&format!(
        "{}/.git/objects/pack/pack-big.pack",
        server.uri()
    ))
    .unwrap();
    let err = client
        .get(url, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TooLarge { .. }), "{err}");
}

#[tokio::test]
async fn canceled_fetches_return_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(30)))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let client = FetchClient::builder().build();
    let url = Url::parse(&format!("{}/.git/HEAD", server.uri())).unwrap();
    let err = client.get(url, &cancel).await.unwrap_err();

    assert!(matches!(err, Error::Canceled), "{err}");
}
