//! TVMaze lookups against a mock server.

use std::sync::Arc;

use mediaindex_bot::store::Store;
use mediaindex_bot::tvmaze::TvMaze;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> (TvMaze, Arc<Store>) {
    let store = Arc::new(Store::open_memory().unwrap());
    (TvMaze::new(&server.uri(), Arc::clone(&store)), store)
}

#[tokio::test]
async fn unknown_show_has_no_counts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/singlesearch/shows"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (tvmaze, _) = client(&server);
    assert!(tvmaze.search_show("No Such Show").await.unwrap().is_none());
    assert!(tvmaze.season_episode_counts("No Such Show").await.is_none());
}

#[tokio::test]
async fn counts_come_from_embedded_episodes_and_are_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/singlesearch/shows"))
        .and(query_param("q", "Fort Salem"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 31,
            "name": "Motherland: Fort Salem",
            "_embedded": {"episodes": [
                {"season": 1, "number": 1, "name": "Pilot"},
                {"season": 1, "number": 2},
                {"season": 2, "number": 1},
                {"season": 2, "number": null, "name": "Special"}
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (tvmaze, _) = client(&server);
    let counts = tvmaze.season_episode_counts("Fort Salem").await.unwrap();
    assert_eq!(counts.get(&1), Some(&2));
    assert_eq!(counts.get(&2), Some(&1));

    let again = tvmaze.season_episode_counts("  fort salem ").await.unwrap();
    assert_eq!(again, counts);
}

#[tokio::test]
async fn episodes_are_fetched_when_not_embedded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/singlesearch/shows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 5, "name": "Show"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/shows/5/episodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"season": 3, "number": 1},
            {"season": 3, "number": 2},
            {"season": 3, "number": 3}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let (tvmaze, store) = client(&server);
    let counts = tvmaze.season_episode_counts("Show").await.unwrap();
    assert_eq!(counts.get(&3), Some(&3));
    assert!(store.get_tvmaze_cache("episodes:5").unwrap().is_some());
}

#[tokio::test]
async fn server_errors_degrade_to_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/singlesearch/shows"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (tvmaze, _) = client(&server);
    assert!(tvmaze.season_episode_counts("Anything").await.is_none());
}
