use crate::hls::{media_playlist, HlsMock};
use hls_sync::{HlsSync, HttpClient, Retention, SyncConfig, Transport};
use reqwest::Client;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

#[tokio::test]
async fn referer_is_sent_with_every_request() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vod/index.m3u8"))
        .and(header("referer", "https://example.com/player"))
        .respond_with(ResponseTemplate::new(200).set_body_string(media_playlist(0, 2, 0.5, true)))
        .expect(1)
        .mount(&server)
        .await;
    for sequence in 0..2 {
        Mock::given(method("GET"))
            .and(path(format!("/vod/seg{sequence}.ts")))
            .and(header("referer", "https://example.com/player"))
            .respond_with(ResponseTemplate::new(200).set_body_string("segment"))
            .expect(1)
            .mount(&server)
            .await;
    }

    let config = SyncConfig::default()
        .with_referer("https://example.com/player")
        .with_retention(Retention::Unbounded);
    let mut sync = HlsSync::new(
        format!("{}/vod/index.m3u8", server.uri()).parse()?,
        config,
    )?;
    sync.start().await?;
    sync.finished().await?;
    assert_eq!(sync.cache().sequences().await, vec![0, 1]);

    Ok(())
}

#[tokio::test]
async fn cookies_set_by_playlist_are_sent_back() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vod/index.m3u8"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "session=abc; Path=/")
                .set_body_string(media_playlist(0, 1, 0.5, true)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/vod/seg0.ts"))
        .and(header("cookie", "session=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("segment"))
        .expect(1)
        .mount(&server)
        .await;

    let config = SyncConfig::default().with_retention(Retention::Unbounded);
    let mut sync = HlsSync::new(
        format!("{}/vod/index.m3u8", server.uri()).parse()?,
        config,
    )?;
    let first = sync.start().await?;
    assert_eq!(first.sequence, 0);
    assert_eq!(sync.transport().cookie_count(&server.uri().parse()?), 1);

    Ok(())
}

#[tokio::test]
async fn error_status_is_reported() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server.mock("/ok.ts", "payload").await;

    let client = HttpClient::new(Client::builder())?;
    let body = Transport::get(&client, format!("{}/ok.ts", server.uri()).parse()?).await?;
    assert_eq!(&body[..], b"payload");

    let error = Transport::get(&client, format!("{}/missing.ts", server.uri()).parse()?)
        .await
        .unwrap_err();
    assert!(error.is_transport());
    assert!(matches!(
        error,
        hls_sync::HlsSyncError::HttpError(status) if status == reqwest::StatusCode::NOT_FOUND
    ));

    Ok(())
}

#[tokio::test]
async fn reset_cookies_empties_the_jar() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "session=abc; Path=/"),
        )
        .mount(&server)
        .await;

    let client = HttpClient::new(Client::builder())?;
    let url: reqwest::Url = server.uri().parse()?;
    Transport::get(&client, url.join("/login")?).await?;
    assert_eq!(client.cookie_count(&url), 1);

    client.reset_cookies();
    assert_eq!(client.cookie_count(&url), 0);

    Ok(())
}
