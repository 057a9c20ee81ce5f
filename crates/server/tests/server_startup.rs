use std::io::Write;
use std::net::TcpListener;
use std::time::Duration;

use reqwest::Client;
use tempfile::{NamedTempFile, TempDir};
use tokio::time::{sleep, timeout};

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Create a minimal valid config rooted in `dir`
fn minimal_config(port: u16, dir: &TempDir) -> String {
    format!(
        r#"
[server]
host = "127.0.0.1"
port = {}

[storage]
uploads_dir = "{}"

[proxy]
package_dirs = ["{}"]

[client]
config_path = "{}"
"#,
        port,
        dir.path().join("uploads").display(),
        dir.path().join("wheels").display(),
        dir.path().join("config.json").display(),
    )
}

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

/// Spawn the server and return a handle
async fn spawn_server(config_path: &std::path::Path) -> tokio::process::Child {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_idswidget"))
        .env("IDSWIDGET_CONFIG", config_path)
        .env("RUST_LOG", "error") // Quiet logs during tests
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn server")
}

/// Wait for server to be ready
async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    let client = Client::new();
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{}/health", port))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = TempDir::new().unwrap();
    let port = get_available_port();
    let temp_file = write_config(&minimal_config(port, &dir));

    // Start server
    let mut server = spawn_server(temp_file.path()).await;

    // Wait for server to be ready
    assert!(
        wait_for_server(port, 40).await,
        "Server did not start in time"
    );

    let client = Client::new();
    let response = client
        .get(format!("http://127.0.0.1:{}/health", port))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["status"], "healthy");

    // Cleanup
    server.kill().await.ok();
}

#[tokio::test]
async fn test_client_config_and_local_wheel_served() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.json"),
        r#"{"wasm":{"wheel_url":"/wheels/ifcopenshell.whl"}}"#,
    )
    .unwrap();
    std::fs::create_dir_all(dir.path().join("wheels")).unwrap();
    std::fs::write(dir.path().join("wheels/ifcopenshell.whl"), b"PK\x03\x04").unwrap();

    let port = get_available_port();
    let temp_file = write_config(&minimal_config(port, &dir));
    let mut server = spawn_server(temp_file.path()).await;
    assert!(
        wait_for_server(port, 40).await,
        "Server did not start in time"
    );

    let client = Client::new();
    let json: serde_json::Value = client
        .get(format!("http://127.0.0.1:{}/config.json", port))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(json["wasm"]["wheel_url"], "/wheels/ifcopenshell.whl");

    let wheel = client
        .get(format!("http://127.0.0.1:{}/wheels/ifcopenshell.whl", port))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(wheel.status(), 200);
    assert_eq!(wheel.bytes().await.unwrap().as_ref(), b"PK\x03\x04");

    server.kill().await.ok();
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let dir = TempDir::new().unwrap();
    let port = get_available_port();
    let temp_file = write_config(&minimal_config(port, &dir));
    let mut server = spawn_server(temp_file.path()).await;
    assert!(
        wait_for_server(port, 40).await,
        "Server did not start in time"
    );

    let body = Client::new()
        .get(format!("http://127.0.0.1:{}/metrics", port))
        .send()
        .await
        .expect("Failed to send request")
        .text()
        .await
        .unwrap();
    assert!(body.contains("idswidget_http_requests_total"));

    server.kill().await.ok();
}

#[tokio::test]
async fn test_missing_config_exits_with_error() {
    let mut server = spawn_server(std::path::Path::new("/nonexistent/idswidget.toml")).await;

    let status = timeout(Duration::from_secs(10), server.wait())
        .await
        .expect("Server did not exit")
        .expect("Failed to wait for server");
    assert_eq!(status.code(), Some(1));
}

#[tokio::test]
async fn test_invalid_config_exits_with_error() {
    let temp_file = write_config(
        r#"
[engine]
url = "ftp://ifctester/ifctester"
"#,
    );
    let mut server = spawn_server(temp_file.path()).await;

    let status = timeout(Duration::from_secs(10), server.wait())
        .await
        .expect("Server did not exit")
        .expect("Failed to wait for server");
    assert!(!status.success());
}
