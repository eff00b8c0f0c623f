//! End-to-end tests of the streaming pipeline.
//!
//! The mock connector drives parser, transport and mapper through scripted
//! SSE bytes; the local-server tests go through `reqwest` over a real socket.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use sc_backend::mock::{content_frame, finish_frame, fixtures};
use sc_backend::{
    collect_text, ChatClient, ClientConfig, Connector, MockConfig, MockConnector, MockResponse,
};
use sc_protocol::{ChatMessage, CompletionRequest, StreamError, StreamSignal};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn request() -> CompletionRequest {
    CompletionRequest::new(vec![ChatMessage::user("say hi")])
}

fn mock_client(connector: &Arc<MockConnector>, capacity: usize) -> ChatClient {
    let mut config = ClientConfig::new("http://localhost/v1/chat/completions", "sk-test");
    config.channel_capacity = capacity;
    ChatClient::with_connector(config, connector.clone() as Arc<dyn Connector>)
}

#[tokio::test]
async fn hi_there_scenario() {
    let connector = Arc::new(MockConnector::new(MockConfig::new().with_responses(vec![
        MockResponse::Raw {
            data: r#"{"choices":[{"index":0,"delta":{"content":"Hi"}}]}"#.to_string(),
        },
        MockResponse::Raw {
            data: r#"{"choices":[{"index":0,"delta":{"content":" there"}}]}"#.to_string(),
        },
        MockResponse::Done,
    ])));

    let signals: Vec<_> = mock_client(&connector, 8)
        .stream_completion(&request())
        .collect()
        .await;

    assert_eq!(
        signals,
        vec![
            StreamSignal::Delta("Hi".to_string()),
            StreamSignal::Delta(" there".to_string()),
            StreamSignal::completed(None),
        ]
    );
    assert_eq!(connector.released_count(), 1);
}

#[tokio::test]
async fn connection_reset_scenario() {
    let connector = Arc::new(MockConnector::new(MockConfig::new().with_responses(vec![
        MockResponse::Error {
            error: StreamError::Connect("connection reset".to_string()),
        },
    ])));

    let signals: Vec<_> = mock_client(&connector, 8)
        .stream_completion(&request())
        .collect()
        .await;

    assert_eq!(
        signals,
        vec![StreamSignal::Failed(StreamError::Connect(
            "connection reset".to_string()
        ))]
    );
}

#[tokio::test]
async fn failed_is_never_followed_by_delta() {
    let connector = Arc::new(MockConnector::new(fixtures::error_mid_stream("part", "reset")));

    let signals: Vec<_> = mock_client(&connector, 8)
        .stream_completion(&request())
        .collect()
        .await;

    assert_eq!(
        signals,
        vec![
            StreamSignal::Delta("part".to_string()),
            StreamSignal::Failed(StreamError::Body("reset".to_string())),
        ]
    );
}

#[tokio::test]
async fn sentinel_stops_reading_upstream() {
    let connector = Arc::new(MockConnector::new(MockConfig::new().with_responses(vec![
        MockResponse::Text {
            content: "a".to_string(),
        },
        MockResponse::Done,
        MockResponse::Hang,
    ])));

    let signals: Vec<_> = tokio::time::timeout(
        Duration::from_secs(2),
        mock_client(&connector, 8).stream_completion(&request()).collect(),
    )
    .await
    .unwrap();

    assert_eq!(
        signals,
        vec![StreamSignal::Delta("a".to_string()), StreamSignal::completed(None)]
    );
    assert_eq!(connector.released_count(), 1);
}

#[tokio::test]
async fn cancel_mid_stream_releases_once() {
    let connector = Arc::new(MockConnector::new(MockConfig::new().with_responses(vec![
        MockResponse::Text {
            content: "first".to_string(),
        },
        MockResponse::Hang,
    ])));
    let client = mock_client(&connector, 8);
    let mut signals = Box::pin(client.stream_completion(&request()));

    assert_eq!(
        signals.next().await,
        Some(StreamSignal::Delta("first".to_string()))
    );
    drop(signals);
    assert_eq!(connector.released_count(), 1);

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(connector.open_count(), 1);
    assert_eq!(connector.released_count(), 1);
}

#[tokio::test]
async fn slow_consumer_bounds_producer() {
    let responses = (0..200)
        .map(|i| MockResponse::Text {
            content: format!("{i} "),
        })
        .chain(std::iter::once(MockResponse::Done))
        .collect();
    let connector = Arc::new(MockConnector::new(
        MockConfig::new().with_responses(responses),
    ));
    let client = mock_client(&connector, 4);
    let mut signals = Box::pin(client.stream_completion(&request()));

    assert!(matches!(signals.next().await, Some(StreamSignal::Delta(_))));
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    assert!(connector.chunks_served() < 10, "served {}", connector.chunks_served());

    let mut count = 1;
    while let Some(signal) = signals.next().await {
        if let StreamSignal::Delta(_) = signal {
            count += 1;
        }
    }
    assert_eq!(count, 200);
}

#[tokio::test]
async fn open_failure_is_single_failed() {
    let connector = Arc::new(MockConnector::failing(StreamError::Status {
        status: 429,
        body: "slow down".to_string(),
    }));

    let result = collect_text(mock_client(&connector, 8).stream_completion(&request())).await;

    assert_eq!(
        result,
        Err(StreamError::Status {
            status: 429,
            body: "slow down".to_string()
        })
    );
}

/// Serve one HTTP response on a local port and return its endpoint URL.
async fn serve_once(status_line: &'static str, body: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        // Read headers and the full body before answering.
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + content_length {
                    break;
                }
            }
        }

        let head = format!(
            "{status_line}\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n"
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(body.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    format!("http://{addr}/v1/chat/completions")
}

#[tokio::test]
async fn streams_over_real_http() {
    let body = format!(
        "{}{}{}",
        content_frame("Hello"),
        content_frame(", world"),
        finish_frame("stop")
    );
    let endpoint = serve_once("HTTP/1.1 200 OK", body).await;
    let client = ChatClient::new(ClientConfig::new(endpoint, "sk-test").with_model("m")).unwrap();

    let (text, reason) = collect_text(client.stream_completion(&request()))
        .await
        .unwrap();

    assert_eq!(text, "Hello, world");
    assert_eq!(reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn server_close_without_sentinel_completes() {
    let endpoint = serve_once("HTTP/1.1 200 OK", content_frame("bye")).await;
    let client = ChatClient::new(ClientConfig::new(endpoint, "sk-test")).unwrap();

    let signals: Vec<_> = client.stream_completion(&request()).collect().await;

    assert_eq!(
        signals,
        vec![
            StreamSignal::Delta("bye".to_string()),
            StreamSignal::completed(None)
        ]
    );
}

#[tokio::test]
async fn non_success_status_fails() {
    let endpoint = serve_once("HTTP/1.1 401 Unauthorized", "bad key".to_string()).await;
    let client = ChatClient::new(ClientConfig::new(endpoint, "sk-test")).unwrap();

    let signals: Vec<_> = client.stream_completion(&request()).collect().await;

    assert_eq!(
        signals,
        vec![StreamSignal::Failed(StreamError::Status {
            status: 401,
            body: "bad key".to_string()
        })]
    );
}
