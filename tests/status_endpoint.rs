//! End-to-end: real listener, real probe client, wiremock upstream.

use std::net::SocketAddr;
use std::time::Duration;

use plex_monitor::config::MonitorConfig;
use plex_monitor::telemetry::Telemetry;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const IDENTITY: &str = r#"<MediaContainer size="0" claimed="1" machineIdentifier="abc" version="1.32.5.7516-8f4248874"/>"#;

struct RunningMonitor {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<(), plex_monitor::ServeError>>,
}

impl RunningMonitor {
    fn url(&self, route: &str) -> String {
        format!("http://{}{route}", self.addr)
    }

    async fn stop(self) {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
            .expect("server returned an error");
    }
}

async fn start_monitor(upstream: &str) -> RunningMonitor {
    let (host, port) = upstream
        .trim_start_matches("http://")
        .rsplit_once(':')
        .expect("upstream uri has a port");
    let config = MonitorConfig::from_yaml(&format!(
        "PlexAddress: http://{host}\nPlexPort: {port}\nProbeTimeoutSeconds: 2\n"
    ))
    .unwrap();

    let monitor = plex_monitor::build_monitor(&config, Telemetry::start()).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(plex_monitor::serve(listener, monitor, shutdown.clone()));

    RunningMonitor {
        addr,
        shutdown,
        handle,
    }
}

async fn refused_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

#[tokio::test]
async fn test_status_reports_up_with_normalized_version() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/identity"))
        .respond_with(ResponseTemplate::new(200).set_body_string(IDENTITY))
        .mount(&upstream)
        .await;

    let monitor = start_monitor(&upstream.uri()).await;
    let response = reqwest::get(monitor.url("/status")).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "application/json"
    );
    let text = response.text().await.unwrap();
    assert!(text.contains(r#""Status":"Up""#), "{text}");
    assert!(text.contains(r#""Version":"1.32.5.7516""#), "{text}");

    monitor.stop().await;
}

#[tokio::test]
async fn test_refused_upstream_is_down_and_unhealthy() {
    let monitor = start_monitor(&refused_upstream().await).await;

    let status = reqwest::get(monitor.url("/status")).await.unwrap();
    assert_eq!(status.status(), 200);
    let text = status.text().await.unwrap();
    assert!(text.contains(r#""Status":"Down""#), "{text}");
    assert!(text.contains(r#""Version":"""#), "{text}");

    let health = reqwest::get(monitor.url("/health")).await.unwrap();
    assert_eq!(health.status(), 503);

    monitor.stop().await;
}

#[tokio::test]
async fn test_health_tracks_upstream_body() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/identity"))
        .respond_with(ResponseTemplate::new(200).set_body_string(IDENTITY))
        .up_to_n_times(1)
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/identity"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&upstream)
        .await;

    let monitor = start_monitor(&upstream.uri()).await;

    let first = reqwest::get(monitor.url("/health")).await.unwrap();
    assert_eq!(first.status(), 200);
    let second = reqwest::get(monitor.url("/health")).await.unwrap();
    assert_eq!(second.status(), 503);

    monitor.stop().await;
}

#[tokio::test]
async fn test_request_duration_reflects_upstream_delay() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/identity"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(IDENTITY)
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&upstream)
        .await;

    let monitor = start_monitor(&upstream.uri()).await;
    let json: Value = reqwest::get(monitor.url("/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let duration = json["RequestDuration"].as_u64().unwrap();
    assert!(duration >= 300, "duration {duration}ms");
    assert_eq!(json["Status"], "Up");

    monitor.stop().await;
}

#[tokio::test]
async fn test_upstream_slower_than_timeout_is_down() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/identity"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(IDENTITY)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&upstream)
        .await;

    let monitor = start_monitor(&upstream.uri()).await;
    let json: Value = reqwest::get(monitor.url("/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(json["Status"], "Down");
    assert!(json["RequestDuration"].as_u64().unwrap() < 5000);

    monitor.stop().await;
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let monitor = start_monitor(&refused_upstream().await).await;
    let addr = monitor.addr;
    monitor.stop().await;

    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}
