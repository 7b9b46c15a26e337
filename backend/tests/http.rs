use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use pamigrate_backend::{Backend, HttpBackend};
use pamigrate_core::{
    Error,
    error::REQUEST_FAILED,
    objects::{ObjectRef, ObjectType},
    profiles::{ConnectionProfile, ConnectionSettings, ProfileDraft, ProfileId},
};
use serde_json::{Value, json};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

/// What the fake server saw of a single request.
struct Captured {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl Captured {
    fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Answers exactly one request with `status` and `body`, returning the base
/// URL to point the client at and a handle yielding the captured request.
async fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let captured = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\n\
             content-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        captured
    });
    (format!("http://{addr}/api"), handle)
}

async fn read_request(socket: &mut TcpStream) -> Captured {
    let mut raw = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let read = socket.read(&mut chunk).await.unwrap();
        assert!(read > 0, "connection closed before the request head");
        raw.extend_from_slice(&chunk[..read]);
        if let Some(index) = raw.windows(4).position(|window| window == b"\r\n\r\n") {
            break index;
        }
    };

    let head = String::from_utf8(raw[..head_end].to_vec()).unwrap();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap().split(' ');
    let method = request_line.next().unwrap().to_string();
    let target = request_line.next().unwrap().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    let length = headers
        .iter()
        .find(|(key, _)| key == "content-length")
        .map(|(_, value)| value.parse::<usize>().unwrap())
        .unwrap_or(0);
    let mut body = raw[head_end + 4..].to_vec();
    while body.len() < length {
        let read = socket.read(&mut chunk).await.unwrap();
        assert!(read > 0, "connection closed before the request body");
        body.extend_from_slice(&chunk[..read]);
    }

    Captured {
        method,
        target,
        headers,
        body: String::from_utf8(body).unwrap(),
    }
}

fn client(base_url: &str) -> HttpBackend {
    HttpBackend::new(base_url, Duration::from_secs(5)).unwrap()
}

fn local_draft(name: &str) -> ProfileDraft {
    ProfileDraft::new(
        name,
        ConnectionSettings::Local {
            host: "tm1.local".into(),
            port: 8010,
            username: "admin".into(),
            password: "apple".into(),
            ssl_enabled: true,
        },
    )
    .unwrap()
}

fn created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
}

fn stored(name: &str) -> ConnectionProfile {
    ConnectionProfile::new(ProfileId::new_v4(), created_at(), local_draft(name))
}

#[tokio::test]
async fn json_requests_carry_one_content_type() {
    let (base_url, server) =
        serve_once("200 OK", json!({"success": true, "message": "ok"}).to_string()).await;

    let check = client(&base_url)
        .test_connection(&local_draft("Dev"))
        .await
        .unwrap();
    assert!(check.success);

    let request = server.await.unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.target, "/api/test-connection");
    assert_eq!(request.header_values("content-type"), vec!["application/json"]);
    assert_eq!(request.header_values("accept"), vec!["application/json"]);
    assert_eq!(request.json()["type"], "local");
    assert_eq!(request.json()["ssl"], true);
}

#[tokio::test]
async fn profiles_are_listed_per_user() {
    let profile = stored("Dev");
    let body = serde_json::to_string(&vec![profile.clone()]).unwrap();
    let (base_url, server) = serve_once("200 OK", body).await;

    let listed = client(&base_url).list_profiles("alice").await.unwrap();
    assert_eq!(listed, vec![profile]);

    let request = server.await.unwrap();
    assert_eq!(request.method, "GET");
    assert_eq!(request.target, "/api/environments?username=alice");
    assert!(request.body.is_empty());
}

#[tokio::test]
async fn update_puts_a_flat_scoped_body() {
    let draft = ProfileDraft::new(
        "Prod",
        ConnectionSettings::Aws {
            server_name: "Planning".into(),
            data_center: "us-east-1".into(),
            tenant: "T1".into(),
            api_key: "key".into(),
        },
    )
    .unwrap();
    let profile = ConnectionProfile::new(ProfileId::new_v4(), created_at(), draft);
    let (base_url, server) =
        serve_once("200 OK", serde_json::to_string(&profile).unwrap()).await;

    let updated = client(&base_url)
        .update_profile("alice", profile.id(), &profile.draft())
        .await
        .unwrap();
    assert_eq!(updated, profile);

    let request = server.await.unwrap();
    assert_eq!(request.method, "PUT");
    assert_eq!(request.target, format!("/api/environments/{}", profile.id()));
    assert_eq!(request.header_values("content-type"), vec!["application/json"]);
    assert_eq!(
        request.json(),
        json!({
            "username": "alice",
            "name": "Prod",
            "type": "aws",
            "serverName": "Planning",
            "dataCenter": "us-east-1",
            "tenant": "T1",
            "apiKey": "key",
        })
    );
}

#[tokio::test]
async fn refused_delete_is_rejected() {
    let id = ProfileId::new_v4();
    let (base_url, server) = serve_once(
        "200 OK",
        json!({"success": false, "message": "environment in use"}).to_string(),
    )
    .await;

    let err = client(&base_url)
        .delete_profile("alice", id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BackendRejected(ref message) if message == "environment in use"));

    let request = server.await.unwrap();
    assert_eq!(request.method, "DELETE");
    assert_eq!(request.target, format!("/api/environments/{id}?username=alice"));
}

#[tokio::test]
async fn error_status_surfaces_the_body_message() {
    let (base_url, _server) = serve_once(
        "500 Internal Server Error",
        json!({"success": false, "message": "TM1 server timed out"}).to_string(),
    )
    .await;

    let profile = stored("Dev");
    let err = client(&base_url).list_objects(&profile).await.unwrap_err();
    assert!(matches!(
        err,
        Error::BackendUnavailable(ref message) if message == "TM1 server timed out"
    ));
}

#[tokio::test]
async fn error_status_without_message_is_a_failed_request() {
    let (base_url, _server) =
        serve_once("502 Bad Gateway", "<html>bad gateway</html>".into()).await;

    let err = client(&base_url).list_profiles("alice").await.unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable(ref message) if message == REQUEST_FAILED));
}

#[tokio::test]
async fn malformed_success_body_names_the_decode_error() {
    let mut entry = serde_json::to_value(stored("Dev")).unwrap();
    entry["port"] = Value::Null;
    let (base_url, _server) = serve_once("200 OK", json!([entry]).to_string()).await;

    let err = client(&base_url).list_profiles("alice").await.unwrap_err();
    let Error::BackendUnavailable(message) = err else {
        panic!("expected an unavailable backend, got {err:?}");
    };
    assert!(message.starts_with(REQUEST_FAILED));
    assert!(message.contains("malformed response from /api/environments"));
    assert!(message.contains("null"));
}

#[tokio::test]
async fn migrate_posts_both_profiles_and_the_selection() {
    let source = stored("Dev");
    let target = stored("Prod");
    let objects = vec![ObjectRef::new(ObjectType::Cube, "Sales")];
    let (base_url, server) = serve_once(
        "200 OK",
        json!({
            "success": false,
            "error": "Invalid credentials",
        })
        .to_string(),
    )
    .await;

    let reply = client(&base_url)
        .migrate_objects(&source, &target, &objects)
        .await
        .unwrap();
    assert!(!reply.success);
    assert_eq!(reply.message, "Invalid credentials");
    assert!(reply.results.is_empty());

    let request = server.await.unwrap();
    assert_eq!(request.target, "/api/migrate");
    let body = request.json();
    assert_eq!(body["source"]["id"], source.id().to_string());
    assert_eq!(body["target"]["name"], "Prod");
    assert_eq!(body["objects"], json!([{"name": "Sales", "type": "cube"}]));
}
