use super::*;
use crate::testing::{FakeRegistry, image};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

const REPO: &str = "registry.test/team/app";

fn result(tag: &str, timestamp: &str, digest: &str) -> ImageResult {
    ImageResult {
        repository: "team/app".into(),
        registry: "registry.test".into(),
        tag: tag.into(),
        labels: HashMap::new(),
        tag_url: format!("{REPO}:{tag}"),
        digest_url: format!("{REPO}@{digest}"),
        image_digest: digest.into(),
        platform: "linux/amd64".into(),
        build_timestamp: timestamp.parse().unwrap(),
    }
}

fn tags_of(outcome: &QueryOutcome) -> Vec<&str> {
    outcome.results.iter().map(|r| r.tag.as_str()).collect()
}

#[test]
fn test_query_builder() {
    let query = ImageQuery::new(REPO)
        .tag_pattern("latest")
        .label("env", "prod")
        .platform("linux/amd64")
        .platform("linux/amd64")
        .most_recent_only(true);

    assert_eq!(query.repository, REPO);
    assert_eq!(query.tag_pattern, "latest");
    assert_eq!(query.required_labels.get("env").map(String::as_str), Some("prod"));
    assert_eq!(query.required_platforms.len(), 1);
    assert!(query.most_recent_only);
}

#[test]
fn test_sort_newest_first() {
    let mut results = vec![
        result("old", "2024-01-01T00:00:00Z", "sha256:bbb"),
        result("new", "2024-06-01T00:00:00Z", "sha256:aaa"),
    ];
    sort_results(&mut results);
    assert_eq!(results[0].tag, "new");
    assert_eq!(results[1].tag, "old");
}

#[test]
fn test_sort_ties_break_on_digest_descending() {
    let mut results = vec![
        result("a", "2024-01-01T00:00:00Z", "sha256:111"),
        result("b", "2024-01-01T00:00:00Z", "sha256:333"),
        result("c", "2024-01-01T00:00:00Z", "sha256:222"),
    ];
    sort_results(&mut results);
    let digests: Vec<_> = results.iter().map(|r| r.image_digest.as_str()).collect();
    assert_eq!(digests, vec!["sha256:333", "sha256:222", "sha256:111"]);
}

#[test]
fn test_sort_is_stable_for_equal_keys() {
    let mut results = vec![
        result("first", "2024-01-01T00:00:00Z", "sha256:same"),
        result("second", "2024-01-01T00:00:00Z", "sha256:same"),
        result("third", "2024-01-01T00:00:00Z", "sha256:same"),
    ];
    sort_results(&mut results);
    let tags: Vec<_> = results.iter().map(|r| r.tag.as_str()).collect();
    assert_eq!(tags, vec!["first", "second", "third"]);
}

#[test]
fn test_outcome_into_result() {
    let ok = QueryOutcome {
        results: vec![result("a", "2024-01-01T00:00:00Z", "sha256:1")],
        error: None,
    };
    assert!(ok.is_complete());
    assert_eq!(ok.into_result().unwrap().len(), 1);

    let failed = QueryOutcome {
        results: vec![result("a", "2024-01-01T00:00:00Z", "sha256:1")],
        error: Some(ImgqError::network("reset")),
    };
    assert!(!failed.is_complete());
    assert!(matches!(failed.into_result(), Err(ImgqError::Network { .. })));
}

#[test]
fn test_image_result_serializes_timestamp_as_rfc3339() {
    let value = serde_json::to_value(result("v1", "2024-05-01T10:00:00Z", "sha256:1")).unwrap();
    assert_eq!(value["build_timestamp"], "2024-05-01T10:00:00Z");
    assert_eq!(value["tag_url"], "registry.test/team/app:v1");
    assert_eq!(value["labels"], serde_json::json!({}));
}

#[tokio::test]
async fn test_regex_tag_filter_end_to_end() {
    let mut registry = FakeRegistry::new();
    registry.with_image("v1", image("linux", "amd64", "2024-01-01T00:00:00Z"));
    registry.with_image("v2", image("linux", "amd64", "2024-02-01T00:00:00Z"));
    registry.with_image("latest", image("linux", "amd64", "2024-03-01T00:00:00Z"));

    let outcome = run_query(
        registry.into_client(),
        &ImageQuery::new(REPO).tag_pattern(r"/^v\d+$/"),
    )
    .await;

    assert!(outcome.is_complete());
    assert_eq!(tags_of(&outcome), vec!["v2", "v1"]);
}

#[tokio::test]
async fn test_literal_tag_filter_end_to_end() {
    let mut registry = FakeRegistry::new();
    registry.with_image("latest", image("linux", "amd64", "2024-03-01T00:00:00Z"));
    registry.with_image("latest-alpine", image("linux", "amd64", "2024-03-01T00:00:00Z"));

    let outcome = run_query(
        registry.into_client(),
        &ImageQuery::new(REPO).tag_pattern("latest"),
    )
    .await;

    assert_eq!(tags_of(&outcome), vec!["latest"]);
}

#[tokio::test]
async fn test_label_filter_keeps_subset_matches() {
    let mut registry = FakeRegistry::new();
    registry.with_image(
        "prod",
        image("linux", "amd64", "2024-01-01T00:00:00Z")
            .label("env", "prod")
            .label("team", "x"),
    );
    registry.with_image(
        "staging",
        image("linux", "amd64", "2024-01-02T00:00:00Z").label("env", "staging"),
    );
    registry.with_image("bare", image("linux", "amd64", "2024-01-03T00:00:00Z"));
    let client = registry.into_client();

    let outcome = run_query(
        Arc::clone(&client),
        &ImageQuery::new(REPO).tag_pattern("/.*/").label("env", "prod"),
    )
    .await;
    assert_eq!(tags_of(&outcome), vec!["prod"]);

    let outcome = run_query(
        client,
        &ImageQuery::new(REPO).tag_pattern("/.*/").label("owner", "ops"),
    )
    .await;
    assert!(outcome.is_complete());
    assert!(outcome.results.is_empty());
}

#[tokio::test]
async fn test_sort_order_is_independent_of_arrival_order() {
    let mut registry = FakeRegistry::new();
    registry.with_image("newest", image("linux", "amd64", "2024-03-01T00:00:00Z"));
    registry.with_image("middle", image("linux", "amd64", "2024-02-01T00:00:00Z"));
    registry.with_image("oldest", image("linux", "amd64", "2024-01-01T00:00:00Z"));
    registry.delay("newest", Duration::from_millis(60));
    registry.delay("middle", Duration::from_millis(30));

    let outcome = run_query(registry.into_client(), &ImageQuery::new(REPO).tag_pattern("/.*/")).await;

    assert_eq!(tags_of(&outcome), vec!["newest", "middle", "oldest"]);
}

#[tokio::test]
async fn test_equal_timestamps_order_deterministically() {
    let mut registry = FakeRegistry::new();
    let mut digests = Vec::new();
    for tag in ["a", "b", "c", "d"] {
        digests.push(registry.with_image(
            tag,
            image("linux", "amd64", "2024-01-01T00:00:00.5Z").label("tag", tag),
        ));
    }
    digests.sort();
    digests.reverse();
    let client = registry.into_client();

    for _ in 0..5 {
        let outcome = run_query(Arc::clone(&client), &ImageQuery::new(REPO).tag_pattern("/.*/")).await;
        let observed: Vec<_> = outcome.results.iter().map(|r| r.image_digest.clone()).collect();
        assert_eq!(observed, digests);
    }
}

#[tokio::test]
async fn test_index_fan_out_completeness() {
    let mut registry = FakeRegistry::new();
    registry.with_index(
        "1.0",
        vec![
            image("linux", "amd64", "2024-01-01T00:00:00Z"),
            image("linux", "arm64", "2024-01-01T00:00:00Z"),
            image("linux", "ppc64le", "2024-01-01T00:00:00Z"),
        ],
    );

    let outcome = run_query(
        registry.into_client(),
        &ImageQuery::new(REPO)
            .tag_pattern("1.0")
            .platform("linux/amd64")
            .platform("linux/arm64"),
    )
    .await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.results.len(), 2);
    assert!(outcome.results.iter().all(|r| r.platform != "linux/ppc64le"));
}

#[tokio::test]
async fn test_mixed_schemas_in_one_query() {
    let mut registry = FakeRegistry::new();
    registry.with_image("v2", image("linux", "amd64", "2024-02-01T00:00:00Z"));
    registry.with_index("multi", vec![image("linux", "amd64", "2024-03-01T00:00:00Z")]);
    registry.with_legacy("v1", image("linux", "amd64", "2016-01-01T00:00:00Z"), "sha256:old");

    let outcome = run_query(registry.into_client(), &ImageQuery::new(REPO).tag_pattern("/.*/")).await;

    assert!(outcome.is_complete());
    assert_eq!(tags_of(&outcome), vec!["multi", "v2", "v1"]);
}

#[tokio::test]
async fn test_artifact_config_without_platform_resolves() {
    let mut registry = FakeRegistry::new();
    registry.with_image("v1", image("linux", "amd64", "2024-01-01T00:00:00Z"));
    let chart_digest =
        registry.with_artifact("chart", br#"{"name":"mychart","version":"1.2.3","apiVersion":"v2"}"#);

    let outcome = run_query(registry.into_client(), &ImageQuery::new(REPO).tag_pattern("/.*/")).await;

    assert!(outcome.is_complete());
    assert_eq!(tags_of(&outcome), vec!["v1", "chart"]);

    let chart = &outcome.results[1];
    assert_eq!(chart.platform, "/");
    assert_eq!(chart.image_digest, chart_digest);
    assert_eq!(chart.build_timestamp, crate::manifest::zero_time());
    assert!(chart.labels.is_empty());
}

#[tokio::test]
async fn test_first_error_wins() {
    let mut registry = FakeRegistry::new();
    registry.with_image("good", image("linux", "amd64", "2024-01-01T00:00:00Z"));
    registry.with_image("bad", image("linux", "amd64", "2024-01-01T00:00:00Z"));
    registry.fail("bad", || ImgqError::server("upstream unavailable", 502));

    let outcome = run_query(registry.into_client(), &ImageQuery::new(REPO).tag_pattern("/.*/")).await;

    assert!(matches!(outcome.error, Some(ImgqError::Server { .. })));
    assert!(outcome.results.len() <= 1);
    assert!(outcome.results.iter().all(|r| r.tag == "good"));
}

#[tokio::test]
async fn test_unsupported_manifest_fails_query() {
    let mut registry = FakeRegistry::new();
    registry.with_raw_manifest("chart", "application/vnd.cncf.helm.config.v1+json", b"{}");

    let outcome = run_query(registry.into_client(), &ImageQuery::new(REPO).tag_pattern("chart")).await;

    assert!(outcome.results.is_empty());
    assert!(matches!(
        outcome.error,
        Some(ImgqError::UnsupportedManifest { .. })
    ));
}

#[tokio::test]
async fn test_partial_results_are_returned_unfiltered() {
    let mut registry = FakeRegistry::new();
    registry.with_image("fast", image("linux", "amd64", "2024-01-01T00:00:00Z"));
    registry.with_image("slow", image("linux", "amd64", "2024-01-01T00:00:00Z"));
    registry.delay("slow", Duration::from_millis(50));
    registry.fail("slow", || ImgqError::network("connection reset"));

    let outcome = run_query(
        registry.into_client(),
        &ImageQuery::new(REPO)
            .tag_pattern("/.*/")
            .label("never", "present"),
    )
    .await;

    assert!(matches!(outcome.error, Some(ImgqError::Network { .. })));
    assert_eq!(tags_of(&outcome), vec!["fast"]);
}

#[tokio::test]
async fn test_tag_listing_failure_returns_no_results() {
    let mut registry = FakeRegistry::new();
    registry.with_image("v1", image("linux", "amd64", "2024-01-01T00:00:00Z"));
    registry.fail_tags(|| ImgqError::authentication("denied", Some(401)));

    let outcome = run_query(registry.into_client(), &ImageQuery::new(REPO).tag_pattern("/.*/")).await;

    assert!(outcome.results.is_empty());
    assert!(matches!(outcome.error, Some(ImgqError::Authentication { .. })));
}

#[tokio::test]
async fn test_bad_pattern_fails_before_any_fetch() {
    let mut registry = FakeRegistry::new();
    registry.with_image("v1", image("linux", "amd64", "2024-01-01T00:00:00Z"));
    let registry = Arc::new(registry);

    let outcome = run_query(registry.clone(), &ImageQuery::new(REPO).tag_pattern("/[/")).await;

    assert!(matches!(outcome.error, Some(ImgqError::Configuration { .. })));
    assert_eq!(registry.manifest_fetches(), 0);
}

#[tokio::test]
async fn test_bad_platform_is_configuration_error() {
    let outcome = run_query(
        FakeRegistry::new().into_client(),
        &ImageQuery::new(REPO).tag_pattern("/.*/").platform("linux"),
    )
    .await;

    assert!(matches!(outcome.error, Some(ImgqError::Configuration { .. })));
}

#[tokio::test]
async fn test_no_matching_tags_is_empty_success() {
    let mut registry = FakeRegistry::new();
    registry.with_image("v1", image("linux", "amd64", "2024-01-01T00:00:00Z"));
    let registry = Arc::new(registry);

    let outcome = run_query(registry.clone(), &ImageQuery::new(REPO).tag_pattern("v9")).await;

    assert!(outcome.is_complete());
    assert!(outcome.results.is_empty());
    assert_eq!(registry.manifest_fetches(), 0);
}

#[tokio::test]
async fn test_most_recent_only_keeps_newest() {
    let mut registry = FakeRegistry::new();
    registry.with_image("v1", image("linux", "amd64", "2024-01-01T00:00:00Z"));
    registry.with_image("v2", image("linux", "amd64", "2024-06-01T00:00:00Z"));

    let outcome = run_query(
        registry.into_client(),
        &ImageQuery::new(REPO).tag_pattern("/.*/").most_recent_only(true),
    )
    .await;

    assert_eq!(tags_of(&outcome), vec!["v2"]);
}

#[tokio::test]
async fn test_early_error_does_not_wait_for_slow_siblings() {
    let mut registry = FakeRegistry::new();
    registry.with_image("broken", image("linux", "amd64", "2024-01-01T00:00:00Z"));
    registry.fail("broken", || ImgqError::decode("garbage"));
    for i in 0..10 {
        let tag = format!("slow{i}");
        registry.with_image(&tag, image("linux", "amd64", "2024-01-01T00:00:00Z"));
        registry.delay(&tag, Duration::from_secs(30));
    }

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        run_query(registry.into_client(), &ImageQuery::new(REPO).tag_pattern("/.*/")),
    )
    .await
    .expect("query waited for abandoned siblings");

    assert!(matches!(outcome.error, Some(ImgqError::Decode { .. })));
    assert!(outcome.results.is_empty());
}

async fn assert_fuzzed_query(units: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut registry = FakeRegistry::new();
    let mut successes = 0;

    for i in 0..units {
        let tag = format!("t{i}");
        registry.with_image(&tag, image("linux", "amd64", "2024-01-01T00:00:00Z").label("i", &tag));
        registry.delay(&tag, Duration::from_millis(rng.gen_range(0..5)));
        if rng.gen_bool(0.1) {
            registry.fail(&tag, || ImgqError::server("injected", 500));
        } else {
            successes += 1;
        }
    }

    let outcome = run_query(registry.into_client(), &ImageQuery::new(REPO).tag_pattern("/.*/")).await;

    let mut seen = BTreeSet::new();
    for result in &outcome.results {
        assert!(seen.insert(result.tag.clone()), "seed {seed}: {} emitted twice", result.tag);
    }

    if successes == units {
        assert!(outcome.is_complete(), "seed {seed}: unexpected error");
        assert_eq!(outcome.results.len(), units);
    } else {
        assert!(outcome.error.is_some(), "seed {seed}: error was lost");
        assert!(outcome.results.len() <= successes);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fuzzed_outcomes_single_tag() {
    for seed in 0..10 {
        assert_fuzzed_query(1, seed).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fuzzed_outcomes_ten_tags() {
    for seed in 0..10 {
        assert_fuzzed_query(10, seed).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fuzzed_outcomes_hundred_tags() {
    for seed in 0..5 {
        assert_fuzzed_query(100, seed).await;
    }
}

#[test]
fn test_run_query_blocking() {
    let mut registry = FakeRegistry::new();
    registry.with_image("v1", image("linux", "amd64", "2024-01-01T00:00:00Z"));

    let outcome = run_query_blocking(registry.into_client(), &ImageQuery::new(REPO).tag_pattern("v1"));

    assert!(outcome.is_complete());
    assert_eq!(tags_of(&outcome), vec!["v1"]);
}
