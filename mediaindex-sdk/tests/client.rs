//! Bot API client tests against a mock Telegram server.

use std::time::Duration;

use mediaindex_sdk::client::{Bot, PollConfig, connect};
use mediaindex_sdk::types::{ChatTarget, InlineKeyboardButton, InlineKeyboardMarkup};
use mediaindex_sdk::{ApiError, Event};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "123:abc";

fn bot(server: &MockServer) -> Bot {
    Bot::with_api_url(TOKEN, &server.uri())
}

#[tokio::test]
async fn send_message_posts_html_with_keyboard() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .and(body_partial_json(json!({
            "chat_id": 42,
            "parse_mode": "HTML",
            "reply_markup": {"inline_keyboard": [[{"text": "Go", "callback_data": "go"}]]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"message_id": 100, "chat": {"id": 42, "type": "private"}, "text": "hi"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let kb = InlineKeyboardMarkup {
        inline_keyboard: vec![vec![InlineKeyboardButton::callback("Go", "go")]],
    };
    let msg = bot(&server).send_message(42, "<b>hi</b>", Some(&kb)).await.unwrap();
    assert_eq!(msg.message_id, 100);
    assert_eq!(msg.chat.id, 42);
}

#[tokio::test]
async fn rate_limit_response_becomes_flood_wait() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/editMessageCaption")))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 3",
            "parameters": {"retry_after": 3}
        })))
        .mount(&server)
        .await;

    let err = bot(&server)
        .edit_message_caption(-1001, 5, "Video: H264 720p")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::FloodWait { retry_after: 3 }));
}

#[tokio::test]
async fn get_chat_accepts_usernames() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getChat")))
        .and(body_partial_json(json!({"chat_id": "@shows"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"id": -1009, "type": "channel", "title": "Shows"}
        })))
        .mount(&server)
        .await;

    let chat = bot(&server)
        .get_chat(&ChatTarget::Username("@shows".into()))
        .await
        .unwrap();
    assert_eq!(chat.id, -1009);
    assert_eq!(chat.display_name(), "Shows");
}

#[tokio::test]
async fn ranged_download_stops_at_cap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/file/bot{TOKEN}/videos/file_1.mkv")))
        .and(header("range", "bytes=0-9"))
        // Pretend the server ignored the Range header.
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 64]))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("part.mkv");
    let written = bot(&server)
        .download_file_range("videos/file_1.mkv", 10, &dest)
        .await
        .unwrap();
    assert_eq!(written, 10);
    assert_eq!(std::fs::read(&dest).unwrap().len(), 10);
}

#[tokio::test]
async fn poller_emits_connected_then_channel_posts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getMe")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"id": 1, "is_bot": true, "first_name": "Indexer", "username": "indexer_bot"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": [{
                "update_id": 10,
                "channel_post": {
                    "message_id": 3,
                    "chat": {"id": -1001, "type": "channel", "title": "Shows"},
                    "video": {"file_id": "f", "file_name": "Show.S01E01.mkv"}
                }
            }]
        })))
        .mount(&server)
        .await;

    let config = PollConfig {
        timeout_secs: 0,
        ..Default::default()
    };
    let mut events = connect(bot(&server), config);

    let first = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, Event::Connected { ref username } if username == "indexer_bot"));

    let second = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    match second {
        Event::ChannelPost(msg) => assert_eq!(msg.message_id, 3),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn poller_reports_an_outage_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getMe")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"id": 1, "is_bot": true, "first_name": "Indexer", "username": "indexer_bot"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "ok": false,
            "error_code": 409,
            "description": "Conflict: terminated by other getUpdates request"
        })))
        .mount(&server)
        .await;

    let config = PollConfig {
        timeout_secs: 0,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
        ..Default::default()
    };
    let mut events = connect(bot(&server), config);

    let first = tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
    assert!(matches!(first, Event::Connected { .. }));
    let second = tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
    assert!(matches!(second, Event::Disconnected { .. }));

    // Retries keep failing; the consumer hears nothing more.
    assert!(tokio::time::timeout(Duration::from_millis(300), events.recv()).await.is_err());
    assert!(server.received_requests().await.unwrap().len() > 4);
}
