//! End-to-end tests of the hyper transport against local HTTP servers.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use transfernet::http::{AcceptedEncodings, HttpMethod, HttpTransfer};
use transfernet::service::{HttpService, ServiceConfig};
use transfernet::TransferState;

const WAIT: Duration = Duration::from_secs(10);

/// Parsed request as seen by the test server.
struct Seen {
    method: String,
    path: String,
    head: String,
    body: Vec<u8>,
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<Seen> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    let mut body = buf[head_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    let mut parts = head.split_whitespace();
    Some(Seen {
        method: parts.next()?.to_string(),
        path: parts.next()?.to_string(),
        head,
        body,
    })
}

/// Serve every connection with `handler`, returning the base URL.
async fn serve<F>(handler: F) -> String
where
    F: Fn(Seen) -> String + Send + Sync + Clone + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    serve_on(listener, handler)
}

fn serve_on<F>(listener: TcpListener, handler: F) -> String
where
    F: Fn(Seen) -> String + Send + Sync + Clone + 'static,
{
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            if let Ok((mut socket, _)) = listener.accept().await {
                let handler = handler.clone();
                tokio::spawn(async move {
                    if let Some(seen) = read_request(&mut socket).await {
                        let response = handler(seen);
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    }
                });
            }
        }
    });

    format!("http://{addr}")
}

fn ok(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nDate: Sun, 06 Nov 1994 08:49:37 GMT\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn hyper_service(base_url: &str) -> HttpService {
    let service = HttpService::hyper().unwrap();
    service
        .initialize(&ServiceConfig::new().with_base_url(base_url), true)
        .unwrap();
    service
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_completes() {
    let base = serve(|_| ok(&"x".repeat(42))).await;
    let service = hyper_service(&base);

    let request = service.create_request(HttpMethod::Get, "/hello");
    let response = tokio::time::timeout(WAIT, service.send_request(&request).unwrap())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.state(), TransferState::Completed);
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.body_len(), 42);
    assert_eq!(response.expected_body_size(), 42);
    assert_eq!(response.content_type().as_deref(), Some("text/plain"));
    assert_eq!(response.charset().as_deref(), Some("utf-8"));
    assert_eq!(response.date().unwrap().year(), 1994);
    assert_eq!(response.local_address(), "127.0.0.1".parse().ok());
    assert_eq!(response.primary_address(), "127.0.0.1".parse().ok());
    assert!(response.total_raw_header_bytes() > 0);
    assert!(response.connection_duration().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_ipv6_literal() {
    // Hosts without IPv6 loopback have nothing to test.
    let Ok(listener) = TcpListener::bind("[::1]:0").await else {
        return;
    };
    let base = serve_on(listener, |seen| {
        assert!(seen.head.to_ascii_lowercase().contains("host: [::1]:"));
        ok("v6")
    });
    assert!(base.starts_with("http://[::1]:"));
    let service = hyper_service(&base);

    let request = service.create_request(HttpMethod::Get, "/six");
    let response = tokio::time::timeout(WAIT, service.send_request(&request).unwrap())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.state(), TransferState::Completed);
    assert_eq!(response.text().unwrap(), "v6");
    assert_eq!(response.primary_address(), "::1".parse().ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_request_headers_and_body_sent() {
    let base = serve(|seen| {
        assert_eq!(seen.method, "POST");
        assert_eq!(seen.path, "/echo");
        let head = seen.head.to_ascii_lowercase();
        assert!(head.contains("x-probe: 1"));
        assert!(head.contains("if-none-match: \"v1\""));
        assert!(head.contains("accept-encoding: gzip"));
        assert!(head.contains("user-agent: transfernet/"));
        ok(&String::from_utf8_lossy(&seen.body))
    })
    .await;
    let service = hyper_service(&base);

    let request = service.create_request(HttpMethod::Post, "echo");
    request.set_header("X-Probe", "1");
    request.set_if_none_match_etag("\"v1\"");
    request.set_accepted_encoding_types(AcceptedEncodings::GZIP);
    request.set_body(b"ping");

    let response = tokio::time::timeout(WAIT, service.send_request(&request).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(response.is_completed());
    assert_eq!(response.text().unwrap(), "ping");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_redirect_followed() {
    let base = serve(|seen| {
        if seen.path == "/start" {
            "HTTP/1.1 302 Found\r\nLocation: /final\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string()
        } else {
            ok("landed")
        }
    })
    .await;
    let service = hyper_service(&base);

    let request = service.create_request(HttpMethod::Get, "/start");
    let response = tokio::time::timeout(WAIT, service.send_request(&request).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(response.is_completed());
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.text().unwrap(), "landed");
    assert!(!response.has_header("Location"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_redirect_not_followed_when_disabled() {
    let base = serve(|_| {
        "HTTP/1.1 301 Moved Permanently\r\nLocation: /elsewhere\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            .to_string()
    })
    .await;
    let service = hyper_service(&base);

    let request = service.create_request(HttpMethod::Get, "/old");
    request.set_maximum_redirects(0);
    let response = tokio::time::timeout(WAIT, service.send_request(&request).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(response.is_completed());
    assert_eq!(response.status_code(), 301);
    assert_eq!(response.header("location").as_deref(), Some("/elsewhere"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_redirect_loop_fails() {
    let base = serve(|_| {
        "HTTP/1.1 302 Found\r\nLocation: /loop\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            .to_string()
    })
    .await;
    let service = hyper_service(&base);

    let request = service.create_request(HttpMethod::Get, "/loop");
    request.set_maximum_redirects(3);
    let response = tokio::time::timeout(WAIT, service.send_request(&request).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.state(), TransferState::Error);
    assert!(response.error_message().unwrap().contains("Too many redirects"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_truncated_body_is_error() {
    let base = serve(|_| {
        "HTTP/1.1 200 OK\r\nContent-Length: 42\r\nConnection: close\r\n\r\nonly-ten-b".to_string()
    })
    .await;
    let service = hyper_service(&base);

    let request = service.create_request(HttpMethod::Get, "/truncated");
    let response = tokio::time::timeout(WAIT, service.send_request(&request).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.state(), TransferState::Error);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_head_ignores_content_length() {
    let base = serve(|_| {
        "HTTP/1.1 200 OK\r\nContent-Length: 1234\r\nConnection: close\r\n\r\n".to_string()
    })
    .await;
    let service = hyper_service(&base);

    let request = service.create_request(HttpMethod::Head, "/meta");
    let response = tokio::time::timeout(WAIT, service.send_request(&request).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(response.is_completed());
    assert_eq!(response.body_len(), 0);
    assert_eq!(response.expected_body_size(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connection_refused_is_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let service = hyper_service(&format!("http://{addr}"));
    let request = service.create_request(HttpMethod::Get, "/");
    let response = tokio::time::timeout(WAIT, service.send_request(&request).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.state(), TransferState::Error);
    assert_eq!(response.status_code(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_abort_stalled_transfer() {
    // Accepts and reads, but never answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let service = hyper_service(&format!("http://{addr}"));
    let request = service.create_request(HttpMethod::Get, "/hang");
    let future = service.send_request(&request).unwrap();

    let mut attempts = 0;
    while service.active_count() == 0 && attempts < 500 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        attempts += 1;
    }
    assert!(service.abort_request(&request));

    let response = tokio::time::timeout(WAIT, future).await.unwrap().unwrap();
    assert_eq!(response.state(), TransferState::Aborted);
}

#[test]
fn test_send_request_and_wait_blocking() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let base = runtime.block_on(serve(|_| ok("sync")));

    let service = hyper_service(&base);
    let request = service.create_request(HttpMethod::Get, "/sync");
    let response = service.send_request_and_wait(&request).unwrap();
    assert!(response.is_completed());
    assert_eq!(response.text().unwrap(), "sync");
}
