use std::time::Duration;

use crate::hls::{media_playlist, setup_mock_server, HlsMock};
use hls_sync::{
    HlsSync, HlsSyncError, PlaybackController, Retention, Storage, SyncConfig,
};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

fn file_names(dir: &std::path::Path) -> anyhow::Result<Vec<String>> {
    let mut names = std::fs::read_dir(dir)?
        .map(|entry| Ok(entry?.file_name().to_string_lossy().to_string()))
        .collect::<anyhow::Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}

#[tokio::test]
async fn sync_finished_playlist_keeps_last_segments() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock("/vod/index.m3u8", media_playlist(0, 5, 0.5, true))
        .await
        .mock_segments("/vod", 0..5)
        .await;

    let dir = tempfile::tempdir()?;
    let config = SyncConfig::default()
        .with_path(dir.path())
        .with_retention(Retention::Keep(2));
    let mut sync = HlsSync::new(
        format!("{}/vod/index.m3u8", server.uri()).parse()?,
        config,
    )?;

    let first = sync.start().await?;
    assert_eq!(first.sequence, 0);

    sync.finished().await?;
    assert_eq!(sync.cache().sequences().await, vec![3, 4]);
    assert_eq!(file_names(dir.path())?, vec!["seg3.ts", "seg4.ts"]);
    assert_eq!(std::fs::read_to_string(dir.path().join("seg4.ts"))?, "segment 4");

    assert!(matches!(
        sync.request_segment(5).await,
        Err(HlsSyncError::EndOfMedia)
    ));

    Ok(())
}

#[tokio::test]
async fn sync_discard_writes_nothing() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock("/vod/index.m3u8", media_playlist(0, 3, 0.5, true))
        .await
        .mock_segments("/vod", 0..3)
        .await;

    let dir = tempfile::tempdir()?;
    let config = SyncConfig::default()
        .with_path(dir.path())
        .with_retention(Retention::Discard);
    let mut sync = HlsSync::new(
        format!("{}/vod/index.m3u8", server.uri()).parse()?,
        config,
    )?;

    let first = sync.start().await?;
    assert_eq!(first.storage, Storage::Discarded);
    sync.finished().await?;

    assert!(sync.cache().is_empty().await);
    assert!(file_names(dir.path())?.is_empty());

    Ok(())
}

#[tokio::test]
async fn sync_selects_variant_closest_to_bitrate() -> anyhow::Result<()> {
    let master = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=150000,RESOLUTION=416x234
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=250000,RESOLUTION=640x360
mid/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1500000,RESOLUTION=1280x720
high/index.m3u8
";
    let (uri, server) = setup_mock_server(master).await;
    server
        .mock("/low/index.m3u8", media_playlist(0, 2, 0.5, true))
        .await
        .mock_segments("/low", 0..2)
        .await;

    let config = SyncConfig::default().with_bitrate(200000);
    let mut sync = HlsSync::new(uri.parse()?, config)?;

    let first = sync.start().await?;
    assert_eq!(first.url.path(), "/low/seg0.ts");
    sync.finished().await?;

    Ok(())
}

#[tokio::test]
async fn sync_follows_live_playlist_until_end() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live/index.m3u8"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(media_playlist(0, 3, 0.2, false)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    server
        .mock("/live/index.m3u8", media_playlist(0, 5, 0.2, true))
        .await
        .mock_segments("/live", 0..5)
        .await;

    let config = SyncConfig::default()
        .with_retention(Retention::Unbounded)
        .with_buffer(1)
        .with_reload_interval(Duration::from_millis(200));
    let sync = HlsSync::new(
        format!("{}/live/index.m3u8", server.uri()).parse()?,
        config,
    )?;
    let mut controller = PlaybackController::new(sync).await;

    let mut played = vec![controller.start().await?.sequence];
    loop {
        match controller.next().await {
            Ok(segment) => played.push(segment.sequence),
            Err(HlsSyncError::EndOfMedia) => break,
            Err(e) => return Err(e.into()),
        }
    }
    assert_eq!(played, vec![0, 1, 2, 3, 4]);

    controller.stop().await;
    assert!(controller.sync().cache().is_empty().await);

    Ok(())
}

#[tokio::test]
async fn sync_missing_playlist() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir()?;

    let config = SyncConfig::default()
        .with_max_reload_failures(1)
        .with_path(dir.path().join("segments"));
    let mut sync = HlsSync::new(
        format!("{}/missing.m3u8", server.uri()).parse()?,
        config,
    )?;
    assert!(sync.working_dir().exists());

    assert!(matches!(
        sync.start().await,
        Err(HlsSyncError::ReloadFailed(1))
    ));

    Ok(())
}
