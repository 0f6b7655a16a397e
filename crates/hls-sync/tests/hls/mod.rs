mod http;
mod sync;

use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

async fn setup_mock_server(body: &str) -> (String, MockServer) {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/playlist.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&mock_server)
        .await;

    (format!("{}/playlist.m3u8", mock_server.uri()), mock_server)
}

/// A media playlist with segments `first..first + count` named `seg{n}.ts`.
fn media_playlist(first: u64, count: u64, duration: f32, end: bool) -> String {
    let mut body = format!(
        "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:{}
#EXT-X-MEDIA-SEQUENCE:{first}
",
        duration.ceil() as u64
    );
    for sequence in first..first + count {
        body.push_str(&format!("#EXTINF:{duration:.3},\nseg{sequence}.ts\n"));
    }
    if end {
        body.push_str("#EXT-X-ENDLIST\n");
    }
    body
}

trait HlsMock {
    async fn mock<S>(&self, mock_path: &str, body: S) -> &Self
    where
        S: AsRef<str>;

    /// Serve `seg{n}.ts` under `dir` for every sequence in `sequences`.
    async fn mock_segments<I>(&self, dir: &str, sequences: I) -> &Self
    where
        I: IntoIterator<Item = u64>;
}

impl HlsMock for MockServer {
    async fn mock<S>(&self, mock_path: &str, body: S) -> &Self
    where
        S: AsRef<str>,
    {
        Mock::given(method("GET"))
            .and(path(mock_path))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.as_ref()))
            .mount(self)
            .await;
        self
    }

    async fn mock_segments<I>(&self, dir: &str, sequences: I) -> &Self
    where
        I: IntoIterator<Item = u64>,
    {
        for sequence in sequences {
            self.mock(
                &format!("{dir}/seg{sequence}.ts"),
                format!("segment {sequence}"),
            )
            .await;
        }
        self
    }
}
