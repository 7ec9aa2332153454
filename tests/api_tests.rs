// Release resolution, catalog caching and downloads against a local mock server
// Network smoke tests against GitHub are ignored by default:
// cargo test --test api_tests -- --ignored


use nerdfont_installer::api::RateLimitBackoff;
use nerdfont_installer::config::{Config, DEFAULT_RELEASE_URL};
use nerdfont_installer::{FontError, FontsApi, catalog, download};
use serde_json::json;
use std::time::{Duration, Instant};
use test_helpers::{MockResponse, MockServer, TestEnvironment};

fn asset(server: &MockServer, name: &str) -> serde_json::Value {
    json!({ "name": name, "browser_download_url": server.url(&format!("/download/{}", name)) })
}

fn local_api(config: &Config) -> FontsApi {
    FontsApi::new(config).unwrap().with_github_host("127.0.0.1")
}

#[tokio::test]
async fn test_release_pagination_concatenates_assets() {
    let env = TestEnvironment::new();
    let server = MockServer::start();
    let next = format!("<{}>; rel=\"next\"", server.url("/releases/latest?page=2"));
    server.route(
        "/releases/latest",
        MockResponse::json(&json!({ "assets": [asset(&server, "Hack.zip")] })).header("Link", &next),
    );
    server.route(
        "/releases/latest?page=2",
        MockResponse::json(&json!([asset(&server, "Iosevka.zip")])),
    );

    let api = local_api(&env.config(&server));
    let release = api.fetch_release(&server.url("/releases/latest")).await.unwrap();

    let names: Vec<_> = release.assets.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["Hack.zip", "Iosevka.zip"]);
    assert!(release.checksums.is_none());
}

#[tokio::test]
async fn test_release_resolved_once_per_url() {
    let env = TestEnvironment::new();
    let server = MockServer::start();
    server.route(
        "/releases/latest",
        MockResponse::json(&json!({ "assets": [asset(&server, "Hack.zip"), asset(&server, "SHA-256.txt")] })),
    );
    server.route(
        "/download/SHA-256.txt",
        MockResponse::ok(format!("{}  Hack.zip\n", "a".repeat(64))),
    );

    let api = local_api(&env.config(&server));
    let url = server.url("/releases/latest");
    let first = api.fetch_release(&url).await.unwrap();
    let second = api.fetch_release(&url).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(server.hits("/releases/latest"), 1);
    assert_eq!(server.hits("/download/SHA-256.txt"), 1);
    assert_eq!(first.checksums.unwrap()["Hack.zip"], "a".repeat(64));
}

#[tokio::test]
async fn test_rate_limit_waits_for_retry_after() {
    let env = TestEnvironment::new();
    let server = MockServer::start();
    server.route(
        "/releases/latest",
        MockResponse::status(429).header("Retry-After", "1"),
    );
    server.route(
        "/releases/latest",
        MockResponse::json(&json!({ "assets": [asset(&server, "Hack.zip")] })),
    );

    let api = local_api(&env.config(&server));
    let start = Instant::now();
    let release = api.fetch_release(&server.url("/releases/latest")).await.unwrap();

    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(release.assets.len(), 1);
    assert_eq!(server.hits("/releases/latest"), 2);
}

#[tokio::test]
async fn test_rate_limit_budget_exhausted() {
    let env = TestEnvironment::new();
    let server = MockServer::start();
    server.route(
        "/releases/latest",
        MockResponse::status(403).header("Retry-After", "1"),
    );

    let api = local_api(&env.config(&server)).with_backoff(RateLimitBackoff { max_retries: 1 });
    let err = api
        .fetch_release(&server.url("/releases/latest"))
        .await
        .unwrap_err();

    match err {
        FontError::RateLimitExhausted { retries, .. } => assert_eq!(retries, 1),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(server.hits("/releases/latest"), 2);
}

#[tokio::test]
async fn test_other_http_errors_are_terminal() {
    let env = TestEnvironment::new();
    let server = MockServer::start();
    server.route("/releases/latest", MockResponse::status(500));

    let api = local_api(&env.config(&server));
    let err = api
        .fetch_release(&server.url("/releases/latest"))
        .await
        .unwrap_err();

    assert!(matches!(err, FontError::HttpStatus { status: 500, .. }));
    assert_eq!(server.hits("/releases/latest"), 1);
}

#[tokio::test]
async fn test_github_token_sent_as_bearer() {
    let env = TestEnvironment::new();
    let server = MockServer::start();
    server.route("/releases/latest", MockResponse::json(&json!({ "assets": [] })));

    let mut config = env.config(&server);
    config.github_token = Some("secret-token".to_string());
    local_api(&config)
        .fetch_release(&server.url("/releases/latest"))
        .await
        .unwrap();

    let request = server.last_request("/releases/latest").unwrap().to_lowercase();
    assert!(request.contains("authorization: bearer secret-token"));
    assert!(request.contains("accept: application/vnd.github+json"));
}

#[tokio::test]
async fn test_catalog_is_cached_and_merged() {
    let env = TestEnvironment::new();
    let server = MockServer::start();
    server.route(
        "/fonts.json",
        MockResponse::json(&json!({ "fonts": [
            { "unpatchedName": "Iosevka", "folderName": "Iosevka", "caskName": "iosevka" },
            { "unpatchedName": "Hack", "folderName": "Hack", "caskName": "hack" }
        ]})),
    );

    let config = env.config(&server);
    let api = local_api(&config);
    let first = catalog::load_catalog(&api, &config).await.unwrap();
    let second = catalog::load_catalog(&api, &config).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(server.hits("/fonts.json"), 1);
    assert!(config.catalog_cache_file().exists());

    let names: Vec<_> = first.iter().map(|e| e.cask_name.as_str()).collect();
    assert_eq!(names, ["cascadia-code", "cascadia-mono", "hack", "iosevka"]);
    assert_eq!(first[2].release_url, config.release_url);
}

#[tokio::test]
async fn test_catalog_returned_when_cache_write_fails() {
    let env = TestEnvironment::new();
    let server = MockServer::start();
    server.route(
        "/fonts.json",
        MockResponse::json(&json!([{ "unpatchedName": "Hack", "folderName": "Hack", "caskName": "hack" }])),
    );

    // A regular file where the cache directory should be
    let blocked = env.temp_dir.path().join("cache-is-a-file");
    std::fs::write(&blocked, b"not a directory").unwrap();
    let mut config = env.config(&server);
    config.cache_dir = blocked.clone();

    let api = local_api(&config);
    let catalog = catalog::load_catalog(&api, &config).await.unwrap();

    let names: Vec<_> = catalog.iter().map(|e| e.cask_name.as_str()).collect();
    assert_eq!(names, ["cascadia-code", "cascadia-mono", "hack"]);
    assert!(blocked.is_file());
    assert!(!config.catalog_cache_file().exists());

    // Nothing was cached, so the next load fetches again
    catalog::load_catalog(&api, &config).await.unwrap();
    assert_eq!(server.hits("/fonts.json"), 2);
}

#[tokio::test]
async fn test_catalog_fetch_failure_is_fatal() {
    let env = TestEnvironment::new();
    let server = MockServer::start();

    let config = env.config(&server);
    let err = catalog::load_catalog(&local_api(&config), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, FontError::HttpStatus { status: 404, .. }));
}

#[tokio::test]
async fn test_download_happens_once() {
    let env = TestEnvironment::new();
    let server = MockServer::start();
    server.route("/download/Hack.zip", MockResponse::ok(b"zip bytes".to_vec()));

    let api = local_api(&env.config(&server));
    let url = server.url("/download/Hack.zip");

    let (path, fetched) = download::download_asset(api.client(), &url, &env.staging, false)
        .await
        .unwrap();
    assert!(fetched);
    assert_eq!(path, env.staging.join("Hack.zip"));
    assert!(!env.staging.join("Hack.zip.part").exists());

    let (_, fetched) = download::download_asset(api.client(), &url, &env.staging, false)
        .await
        .unwrap();
    assert!(!fetched);
    assert_eq!(server.hits("/download/Hack.zip"), 1);
}

#[tokio::test]
#[ignore] // Requires network access to api.github.com
async fn test_live_nerd_fonts_release_has_hack() {
    let config = Config::from_env();
    let api = FontsApi::new(&config).unwrap();
    let release = api.fetch_release(DEFAULT_RELEASE_URL).await.unwrap();

    assert!(release.asset("Hack.zip").is_some());
    assert!(release.asset("Hack.tar.xz").is_some());
}
