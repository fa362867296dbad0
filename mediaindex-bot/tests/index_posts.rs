//! Index post creation and updates against mock Bot API and TVMaze servers.

use std::sync::Arc;

use clap::Parser;
use mediaindex_bot::app::App;
use mediaindex_bot::config::{Args, Config};
use mediaindex_bot::indexing::{PostOutcome, update_or_create_post};
use mediaindex_bot::parser::parse_media_info;
use mediaindex_bot::store::Store;
use mediaindex_sdk::client::Bot;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "123:abc";
const INDEX_CHANNEL: i64 = -1009;

fn app(server: &MockServer) -> Arc<App> {
    let uri = server.uri();
    let args = Args::try_parse_from([
        "mediaindex-bot",
        "--bot-token",
        TOKEN,
        "--owner-id",
        "1",
        "--index-channel-id",
        "-1009",
        "--api-url",
        &uri,
        "--tvmaze-url",
        &uri,
    ])
    .unwrap();
    let config = Config::from_args(args).unwrap();
    let store = Arc::new(Store::open_memory().unwrap());
    App::new(Bot::with_api_url(TOKEN, &uri), config, store)
}

fn store_episode(app: &App, message_id: i64, name: &str) -> String {
    let info = parse_media_info(name, None).unwrap();
    app.store.add_media_entry(-100, message_id, &info, 1000).unwrap();
    info.title
}

fn sent(message_id: i64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "ok": true,
        "result": {"message_id": message_id, "chat": {"id": INDEX_CHANNEL, "type": "channel"}, "text": "post"}
    }))
}

async fn mock_show(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/singlesearch/shows"))
        .and(query_param("embed", "episodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "name": "Byker Grove",
            "_embedded": {"episodes": [
                {"season": 1, "number": 1},
                {"season": 1, "number": 2},
                {"season": 1, "number": null}
            ]}
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn first_run_sends_then_later_runs_edit() {
    let server = MockServer::start().await;
    mock_show(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(sent(77))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/editMessageText")))
        .respond_with(sent(77))
        .expect(1)
        .mount(&server)
        .await;

    let app = app(&server);
    let title = store_episode(&app, 1, "Byker.Grove.S01E01.720p.x264-GHOST.mkv");

    let (outcome, complete) = update_or_create_post(&app, &title).await.unwrap();
    assert_eq!(outcome, PostOutcome::Created);
    assert_eq!(complete, Some(false));
    let post = app.store.get_or_create_post(&title, INDEX_CHANNEL).unwrap();
    assert_eq!(post.message_id, Some(77));

    store_episode(&app, 2, "Byker.Grove.S01E02.720p.x264-GHOST.mkv");
    let (outcome, complete) = update_or_create_post(&app, &title).await.unwrap();
    assert_eq!(outcome, PostOutcome::Updated);
    assert_eq!(complete, Some(true));
}

#[tokio::test]
async fn lost_post_is_replaced() {
    let server = MockServer::start().await;
    mock_show(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/editMessageText")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: message to edit not found"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(sent(88))
        .expect(1)
        .mount(&server)
        .await;

    let app = app(&server);
    let title = store_episode(&app, 1, "Byker.Grove.S01E01.720p.x264-GHOST.mkv");
    let post = app.store.get_or_create_post(&title, INDEX_CHANNEL).unwrap();
    app.store.update_post_message_id(post.id, 5).unwrap();

    let (outcome, _) = update_or_create_post(&app, &title).await.unwrap();
    assert_eq!(outcome, PostOutcome::Created);
    let post = app.store.get_or_create_post(&title, INDEX_CHANNEL).unwrap();
    assert_eq!(post.message_id, Some(88));
}

#[tokio::test]
async fn title_without_entries_posts_nothing() {
    let server = MockServer::start().await;
    let app = app(&server);
    let (outcome, complete) = update_or_create_post(&app, "Nothing Here").await.unwrap();
    assert_eq!(outcome, PostOutcome::Empty);
    assert_eq!(complete, None);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
