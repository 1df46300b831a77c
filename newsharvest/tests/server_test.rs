use common::{Config, EngineKind};
use newsharvest::server::{build_rocket, AppState};
use newsharvest::HarvestService;
use rocket::http::Status;
use rocket::local::asynchronous::Client;
use serde_json::Value;
use std::sync::Arc;

async fn client() -> Client {
    let config = Arc::new(Config::default());
    let service = Arc::new(HarvestService::from_config(&config, Some(EngineKind::Mock)));
    let rocket = build_rocket(AppState::new(config, service), rocket::Config::figment());
    Client::tracked(rocket).await.expect("valid rocket instance")
}

async fn get_json(client: &Client, uri: &str) -> (Status, Value) {
    let response = client.get(uri).dispatch().await;
    let status = response.status();
    let body = response.into_json::<Value>().await.expect("json body");
    (status, body)
}

#[rocket::async_test]
async fn health_and_status() {
    let client = client().await;
    let response = client.get("/health").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(response.into_string().await.as_deref(), Some("OK"));

    let (status, body) = get_json(&client, "/api/v1/status").await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["engine"], "mock");
    assert_eq!(body["default_sources"], serde_json::json!(["us", "uk"]));
}

#[rocket::async_test]
async fn body_search_returns_matching_articles() {
    let client = client().await;
    let (status, body) = get_json(&client, "/crawl/body?keywords_include=climate").await;

    assert_eq!(status, Status::Ok);
    assert_eq!(body["message"], "Body crawler completed with 2 articles found");
    assert_eq!(body["state"], "completed");
    assert_eq!(body["skippedCount"], 0);
    let articles = body["articles"].as_array().expect("articles array");
    assert_eq!(articles.len(), 2);
    assert_eq!(articles[0]["title"], "Climate Change: A Global Challenge");
    assert!(articles[0]["publishingDate"].is_string());
    assert!(body["elapsedSeconds"].is_number());
}

#[rocket::async_test]
async fn keywords_accept_commas_and_repeats() {
    let client = client().await;
    let (_, commas) = get_json(&client, "/crawl/body?keywords_include=regulations,renewable").await;
    let (_, repeats) =
        get_json(&client, "/crawl/body?keywords_include=regulations&keywords_include=renewable").await;
    assert_eq!(commas["articles"].as_array().map(Vec::len), Some(2));
    assert_eq!(commas["articles"], repeats["articles"]);
}

#[rocket::async_test]
async fn body_search_reports_ignored_exclude_terms() {
    let client = client().await;
    let (status, body) = get_json(&client, "/crawl/body?keywords_include=climate&keywords_exclude=energy").await;
    assert_eq!(status, Status::Ok);
    let notices = body["notices"].as_array().expect("notices");
    assert!(notices[0].as_str().unwrap_or_default().contains("energy"));
    assert_eq!(body["articles"].as_array().map(Vec::len), Some(2));
}

#[rocket::async_test]
async fn url_search_inclusion_overrides_exclusion() {
    let client = client().await;
    // every mock URL is on example.com, so only the fully included one survives the exclusion
    let (status, body) = get_json(&client, "/crawl/url?keywords_include=climate&keywords_exclude=example").await;
    assert_eq!(status, Status::Ok);
    let articles = body["articles"].as_array().expect("articles");
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0]["url"], "https://example.com/climate-change");
}

#[rocket::async_test]
async fn unknown_source_is_bad_request_with_valid_names() {
    let client = client().await;
    let (status, body) = get_json(&client, "/crawl/body?keywords_include=climate&sources=Atlantis").await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["category"], "invalid-source");
    let error = body["error"].as_str().unwrap_or_default();
    assert!(error.contains("Atlantis"));
    assert!(error.contains("The Guardian"));
}

#[rocket::async_test]
async fn invalid_configuration_is_bad_request() {
    let client = client().await;

    let (status, body) = get_json(&client, "/crawl/body?keywords_include=climate&days_back=0").await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["category"], "configuration");

    let (status, body) = get_json(&client, "/crawl/url?keywords_include=%28unclosed").await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["category"], "configuration");
}

#[rocket::async_test]
async fn single_source_routes() {
    let client = client().await;

    let (status, body) = get_json(&client, "/crawl/guardian?days_back=2").await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["articles"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["message"], "The Guardian crawler completed with 1 articles found");

    let (status, body) = get_json(&client, "/crawl/ny?max_articles=1").await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["articles"][0]["source"], "The New Yorker");
    assert_eq!(body["articles"].as_array().map(Vec::len), Some(1));

    let (status, body) = get_json(&client, "/crawl/source/wired").await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["articles"][0]["title"], "Advances in AI Technology");

    let (status, _) = get_json(&client, "/crawl/source/uk").await;
    assert_eq!(status, Status::BadRequest);
}

#[rocket::async_test]
async fn sources_listing() {
    let client = client().await;
    let (status, body) = get_json(&client, "/api/v1/sources").await;
    assert_eq!(status, Status::Ok);
    let us = body["collections"]["us"].as_array().expect("us collection");
    assert!(us.iter().any(|n| n == "The New Yorker"));
    assert!(body["publishers"].as_array().map(|p| p.len() >= 5).unwrap_or(false));
}
