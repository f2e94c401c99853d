//! End-to-end runs: simulated results page, real downloads from a local server

mod common;

use common::{SimImage, SimResult, SimSpec, SimulatedLauncher, count_jpegs, serve_images, served_results};
use image_harvest::harvest::Termination;
use image_harvest::{ErrorRateBasis, QuerySpec, RunCoordinator, ScrapeConfig, ScrapeError};
use mockito::{Server, ServerGuard};
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

fn config(dir: &Path, basis: ErrorRateBasis) -> ScrapeConfig {
    ScrapeConfig::builder()
        .output_dir(dir)
        .interaction_delay(Duration::ZERO)
        .download_timeout(Duration::from_secs(5))
        .header_timeout(Duration::from_secs(2))
        .error_rate_basis(basis)
        .rng_seed(Some(7))
        .build()
        .unwrap()
}

/// 100 results, three in every ten pointing at a 404
fn thirty_percent_missing(server: &ServerGuard) -> Vec<SimResult> {
    (0..100)
        .map(|i| {
            let path = if i % 10 < 3 { "missing" } else { "img" };
            SimResult::image(format!("{}/{path}/{i}.png", server.url()), format!("dog {i}"))
        })
        .collect()
}

fn metadata() -> Map<String, Value> {
    json!({"host": "worker-3", "batch": 12})
        .as_object()
        .cloned()
        .unwrap()
}

#[tokio::test]
async fn gathers_requested_images_and_writes_manifest() {
    let mut server = Server::new_async().await;
    let _mocks = serve_images(&mut server).await;
    let dir = tempfile::tempdir().unwrap();

    let launcher = SimulatedLauncher::new(SimSpec::new(served_results(&server, 100, "cute dog")));
    let probe = launcher.probe.clone();
    let coordinator = RunCoordinator::new(config(dir.path(), ErrorRateBasis::DistinctKinds), launcher);

    let outcome = coordinator
        .run("google-images", &QuerySpec::new("cute dog", 100), metadata())
        .await
        .unwrap();

    assert!(outcome.documents.len() >= 95);
    assert_eq!(outcome.termination, Some(Termination::TargetMet));
    assert!(outcome.errors.is_empty());

    let ids: HashSet<_> = outcome.documents.iter().map(|d| d.image_id.as_str()).collect();
    assert_eq!(ids.len(), outcome.documents.len());
    assert!(count_jpegs(dir.path()) >= 95);

    for document in &outcome.documents {
        assert_eq!(document.query, "cute dog");
        assert_eq!(document.metadata["host"], "worker-3");
        assert_eq!(document.metadata["endpoint"], "google-images");
    }

    let manifest: Vec<Value> =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("manifest.json")).unwrap())
            .unwrap();
    assert_eq!(manifest.len(), outcome.documents.len());
    assert_eq!(manifest[0]["query"], "cute dog");
    assert_eq!(manifest[0]["batch"], 12);

    assert_eq!(probe.opened(), 1);
    assert_eq!(probe.closed(), 1);
}

#[tokio::test]
async fn counting_every_failure_rejects_the_run() {
    let mut server = Server::new_async().await;
    let _mocks = serve_images(&mut server).await;
    let dir = tempfile::tempdir().unwrap();

    let launcher = SimulatedLauncher::new(SimSpec::new(thirty_percent_missing(&server)));
    let probe = launcher.probe.clone();
    let coordinator = RunCoordinator::new(config(dir.path(), ErrorRateBasis::Occurrences), launcher);

    let err = coordinator
        .run("google-images", &QuerySpec::new("dog", 100), Map::new())
        .await
        .unwrap_err();

    match err {
        ScrapeError::UnacceptableErrorRate { rate, acceptable, tally } => {
            assert!((rate - 0.3).abs() < 1e-9);
            assert!((acceptable - 0.2).abs() < 1e-9);
            assert_eq!(tally.get("http_status"), Some(&30));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(probe.closed(), 1);
    assert!(!dir.path().join("manifest.json").exists());
}

#[tokio::test]
async fn distinct_kind_basis_tolerates_one_recurring_failure() {
    let mut server = Server::new_async().await;
    let _mocks = serve_images(&mut server).await;
    let dir = tempfile::tempdir().unwrap();

    let launcher = SimulatedLauncher::new(SimSpec::new(thirty_percent_missing(&server)));
    let coordinator = RunCoordinator::new(config(dir.path(), ErrorRateBasis::DistinctKinds), launcher);

    let outcome = coordinator
        .run("google-images", &QuerySpec::new("dog", 100), Map::new())
        .await
        .unwrap();

    assert_eq!(outcome.documents.len(), 70);
    assert_eq!(outcome.errors.total(), 30);
    assert_eq!(outcome.errors.distinct_kinds(), 1);
    assert_eq!(count_jpegs(dir.path()), 70);
}

#[tokio::test]
async fn related_images_get_their_own_ids() {
    let mut server = Server::new_async().await;
    let _mocks = serve_images(&mut server).await;
    let dir = tempfile::tempdir().unwrap();

    let results = (0..5)
        .map(|i| {
            let related = (0..3)
                .map(|k| {
                    SimImage::new(
                        format!("{}/related/{}.png", server.url(), i * 3 + k),
                        format!("related {k}"),
                    )
                })
                .collect();
            SimResult::image(format!("{}/img/{i}.png", server.url()), format!("dog {i}"))
                .with_related(related)
        })
        .collect();

    let coordinator = RunCoordinator::new(
        config(dir.path(), ErrorRateBasis::DistinctKinds),
        SimulatedLauncher::new(SimSpec::new(results)),
    );
    let query = QuerySpec::new("dog", 5).track_related(true);

    let outcome = coordinator.run("google-images", &query, Map::new()).await.unwrap();

    assert_eq!(outcome.documents.len(), 5);
    for document in &outcome.documents {
        let related = document.related.as_ref().unwrap();
        assert_eq!(related.len(), 3);
        let ids: HashSet<_> = related.iter().map(|r| r.image_id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(document.image_id.as_str()));
        assert!(related.iter().all(|r| r.metadata["endpoint"] == "google-images"));
    }
    assert_eq!(count_jpegs(&dir.path().join("related")), 15);
}

#[tokio::test]
async fn exact_result_count_is_returned_without_errors() {
    let mut server = Server::new_async().await;
    let _mocks = serve_images(&mut server).await;
    let dir = tempfile::tempdir().unwrap();

    let coordinator = RunCoordinator::new(
        config(dir.path(), ErrorRateBasis::DistinctKinds),
        SimulatedLauncher::new(SimSpec::new(served_results(&server, 25, "cat"))),
    );

    let outcome = coordinator
        .run("google-images", &QuerySpec::new("cat", 25), Map::new())
        .await
        .unwrap();

    assert_eq!(outcome.documents.len(), 25);
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.termination, Some(Termination::TargetMet));
}

#[tokio::test]
async fn unknown_endpoint_never_opens_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = SimulatedLauncher::new(SimSpec::new(Vec::new()));
    let probe = launcher.probe.clone();
    let coordinator = RunCoordinator::new(config(dir.path(), ErrorRateBasis::DistinctKinds), launcher);

    let err = coordinator
        .run("bing-images", &QuerySpec::new("dog", 10), Map::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ScrapeError::UnimplementedEndpoint(name) if name == "bing-images"));
    assert_eq!(probe.opened(), 0);
}

#[tokio::test]
async fn empty_results_page_returns_no_documents() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = SimulatedLauncher::new(SimSpec::new(Vec::new()));
    let probe = launcher.probe.clone();
    let coordinator = RunCoordinator::new(config(dir.path(), ErrorRateBasis::DistinctKinds), launcher);

    let err = coordinator
        .run("google-images", &QuerySpec::new("dog", 10), Map::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ScrapeError::NoDocumentsReturned(name) if name == "google-images"));
    assert_eq!(probe.closed(), 1);
}

#[tokio::test]
async fn markup_drift_aborts_and_closes_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = SimulatedLauncher::new(SimSpec::new((0..15).map(|_| SimResult::empty()).collect()));
    let probe = launcher.probe.clone();
    let coordinator = RunCoordinator::new(config(dir.path(), ErrorRateBasis::DistinctKinds), launcher);

    let err = coordinator
        .run("google-images", &QuerySpec::new("dog", 10), Map::new())
        .await
        .unwrap_err();

    assert!(err.is_markup_drift());
    assert_eq!(probe.closed(), 1);
    assert!(dir.path().join("page_dump.html").is_file());
}

#[tokio::test]
async fn manifest_can_be_disabled() {
    let mut server = Server::new_async().await;
    let _mocks = serve_images(&mut server).await;
    let dir = tempfile::tempdir().unwrap();

    let config = ScrapeConfig::builder()
        .output_dir(dir.path())
        .interaction_delay(Duration::ZERO)
        .write_manifest(false)
        .build()
        .unwrap();
    let coordinator = RunCoordinator::new(
        config,
        SimulatedLauncher::new(SimSpec::new(served_results(&server, 3, "fox"))),
    );

    let outcome = coordinator
        .run("google-images", &QuerySpec::new("fox", 3), Map::new())
        .await
        .unwrap();

    assert_eq!(outcome.documents.len(), 3);
    assert!(!dir.path().join("manifest.json").exists());
}
