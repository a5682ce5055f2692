//! End-to-end recommendation tests over the in-memory store with scripted providers.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::*;
use jobmatch::completion::CompletionError;
use jobmatch::config::MatchMode;
use jobmatch::embedding::store::EmbeddingStore;
use jobmatch::errors::{MatchError, Warning};
use jobmatch::recommend::Recommender;
use jobmatch::search::PreferenceAdjuster;
use jobmatch::service::{MatchOutcome, MatchService};
use jobmatch::store::memory::MemoryStore;
use jobmatch::store::RecommendationStore;
use jobmatch::vector::{l2_distance, norm};

fn result_ids(recs: &jobmatch::recommend::Recommendations) -> Vec<String> {
    recs.results.iter().map(|r| r.job.id.clone()).collect()
}

fn ids(range: std::ops::RangeInclusive<usize>) -> Vec<String> {
    range.map(|i| format!("j{:02}", i)).collect()
}

#[tokio::test]
async fn test_retrieval_only_considers_embedded_jobs_in_distance_order() {
    let store = seeded_store().await;
    let recommender = Recommender::new(store, DIM, config(10), None);

    let recs = recommender
        .recommend_with_mode("u1", MatchMode::Hybrid, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(recs.mode, MatchMode::Hybrid);
    assert_eq!(result_ids(&recs), ids(1..=8));
    assert!(recs.warnings.is_empty());
    assert!((recs.results[0].score - 70.0).abs() < 1e-9);
    assert!(recs.results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn test_reranker_sees_shortlist_and_results_respect_max() {
    let store = seeded_store().await;
    let llm = Arc::new(ScriptedCompletion::rank_all());
    let mut cfg = config(3);
    cfg.llm_input_limit = 5;
    let recommender = Recommender::new(store, DIM, cfg, Some(reranker(llm.clone())));

    let recs = recommender.recommend("u1", &CancellationToken::new()).await.unwrap();

    assert_eq!(llm.prompt_count(), 1);
    assert_eq!(candidate_ids(&llm.last_prompt()), ids(1..=5));
    assert!(llm.last_prompt().contains("at most 3 jobs"));
    assert_eq!(recs.mode, MatchMode::VectorLlm);
    assert_eq!(result_ids(&recs), ids(1..=3));
    assert_eq!(recs.results[0].reason.as_deref(), Some("fits"));
    assert_eq!(recs.results[0].score, 100.0);
}

#[tokio::test]
async fn test_reranked_results_are_a_subset_of_candidates() {
    let store = seeded_store().await;
    let llm = Arc::new(ScriptedCompletion::fixed(
        &json!({
            "matches": [
                { "id": "j04", "score": 91, "reason": "storage work" },
                { "id": "j99", "score": 99, "reason": "invented" },
                { "id": "j10", "score": 95, "reason": "not embedded" },
                { "id": "j02", "score": 80, "reason": "close enough" },
                { "id": "j04", "score": 10, "reason": "duplicate" }
            ]
        })
        .to_string(),
    ));
    let recommender = Recommender::new(store, DIM, config(7), Some(reranker(llm)));

    let recs = recommender.recommend("u1", &CancellationToken::new()).await.unwrap();

    assert_eq!(result_ids(&recs), vec!["j04", "j02"]);
    assert_eq!(recs.results[0].score, 91.0);
    let unknown: HashSet<&str> = recs
        .warnings
        .iter()
        .filter_map(|w| match w {
            Warning::UnknownRerankId { id } => Some(id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(unknown, HashSet::from(["j99", "j10"]));
}

#[tokio::test]
async fn test_empty_rerank_is_an_empty_success() {
    let store = seeded_store().await;
    let llm = Arc::new(ScriptedCompletion::fixed(r#"{"matches": []}"#));
    let recommender = Recommender::new(store, DIM, config(7), Some(reranker(llm)));

    let recs = recommender.recommend("u1", &CancellationToken::new()).await.unwrap();
    assert!(recs.results.is_empty());
}

#[tokio::test]
async fn test_liked_job_pulls_query_toward_it() {
    let store = seeded_store().await;
    store.upsert_feedback("u1", "j08", true).await.unwrap();

    let embeddings = EmbeddingStore::new(store.clone(), DIM);
    let base = embeddings.profile_embeddings("u1").await.unwrap();
    let adjuster = PreferenceAdjuster::new(embeddings, &config(7));
    let adjusted = adjuster.adjust(&base, &["j08".to_string()]).await.unwrap();

    assert_ne!(adjusted.skill, base.skill);
    assert!((norm(&adjusted.skill) - 1.0).abs() < 1e-9);
    assert!((norm(&adjusted.summary) - 1.0).abs() < 1e-9);
    let liked = drifted(8);
    assert!(l2_distance(&adjusted.skill, &liked).unwrap() < l2_distance(&base.skill, &liked).unwrap());

    // The nudged query now sits closest to j02, and the rated job never comes back
    let recommender = Recommender::new(store, DIM, config(10), None);
    let recs = recommender.recommend("u1", &CancellationToken::new()).await.unwrap();
    let mut returned = result_ids(&recs);
    assert_eq!(returned[0], "j02");
    returned.sort();
    assert_eq!(returned, ids(1..=7));
}

#[tokio::test]
async fn test_disliked_jobs_are_excluded_without_moving_query() {
    let store = seeded_store().await;
    store.upsert_feedback("u1", "j01", false).await.unwrap();
    store.upsert_feedback("u1", "j03", false).await.unwrap();

    let recommender = Recommender::new(store, DIM, config(10), None);
    let recs = recommender.recommend("u1", &CancellationToken::new()).await.unwrap();
    assert_eq!(result_ids(&recs), vec!["j02", "j04", "j05", "j06", "j07", "j08"]);
}

#[tokio::test]
async fn test_everything_rated_reports_no_candidates() {
    let store = seeded_store().await;
    for id in ids(1..=8) {
        store.upsert_feedback("u1", &id, true).await.unwrap();
    }
    let llm = Arc::new(ScriptedCompletion::rank_all());
    let service = MatchService::new(Recommender::new(store, DIM, config(7), Some(reranker(llm.clone()))));

    match service.get_recommendations("u1").await {
        MatchOutcome::Unavailable { reason, hint, .. } => {
            assert_eq!(reason, "no_candidates");
            assert!(hint.is_some());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(llm.prompt_count(), 0);
}

#[tokio::test]
async fn test_invalid_llm_payload_is_a_parse_failure() {
    let store = seeded_store().await;
    let llm = Arc::new(ScriptedCompletion::fixed("Here are your jobs: j01, j02"));
    let recommender = Recommender::new(store.clone(), DIM, config(7), Some(reranker(llm.clone())));

    let err = recommender.recommend("u1", &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, MatchError::LlmParseFailure(_)));

    let service = MatchService::new(Recommender::new(store, DIM, config(7), Some(reranker(llm))));
    match service.get_recommendations("u1").await {
        MatchOutcome::Unavailable { reason, .. } => assert_eq!(reason, "llm_parse_failure"),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_upstream_failure_surfaces_as_unavailable() {
    let store = seeded_store().await;
    let llm = Arc::new(ScriptedCompletion::new(|_| {
        Err(CompletionError::Api { status: 400, message: "bad request".into() })
    }));
    let service = MatchService::new(Recommender::new(store, DIM, config(7), Some(reranker(llm))));

    match service.get_recommendations("u1").await {
        MatchOutcome::Unavailable { reason, .. } => assert_eq!(reason, "upstream_provider_error"),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_profile_and_pending_embeddings() {
    let store = seeded_store().await;
    store.insert_profile_raw(profile("u2"), None, None).await;
    let recommender = Recommender::new(store, DIM, config(7), None);
    let token = CancellationToken::new();

    let missing = recommender.recommend("nobody", &token).await.unwrap_err();
    assert!(matches!(missing, MatchError::ProfileNotFound { .. }));

    let pending = recommender.recommend("u2", &token).await.unwrap_err();
    assert!(matches!(pending, MatchError::EmbeddingsNotReady { .. }));

    let blank = recommender.recommend("  ", &token).await.unwrap_err();
    assert!(matches!(blank, MatchError::Validation { .. }));
}

#[tokio::test]
async fn test_profile_dimension_mismatch_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    store.insert_job(job("j01"), "text", Some(&pair(drifted(1)))).await;
    store
        .insert_profile_raw(profile("u1"), Some(json!([1.0, 0.0])), Some(json!([1.0, 0.0])))
        .await;
    let recommender = Recommender::new(store, DIM, config(7), None);

    let err = recommender.recommend("u1", &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, MatchError::DimensionMismatch { expected: 3, actual: 2 }));
}

#[tokio::test]
async fn test_unreadable_liked_embedding_degrades_with_warning() {
    let store = seeded_store().await;
    store
        .insert_job_raw(job("j20"), "text", Some(json!("not a vector")), Some(json!("[1,0,0]")))
        .await;
    store.upsert_feedback("u1", "j20", true).await.unwrap();
    store.upsert_feedback("u1", "j02", true).await.unwrap();

    let recommender = Recommender::new(store, DIM, config(10), None);
    let recs = recommender.recommend("u1", &CancellationToken::new()).await.unwrap();

    assert_eq!(recs.results.len(), 7);
    assert!(recs
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::UnparsableEmbedding { job_id, .. } if job_id == "j20")));
}

#[tokio::test]
async fn test_liked_vector_of_wrong_length_is_skipped() {
    let store = seeded_store().await;
    store
        .insert_job_raw(job("j00"), "text", Some(json!([1.0, 0.0, 0.0])), Some(json!([1.0, 0.0, 0.0])))
        .await;
    store
        .insert_job_raw(job("j0x"), "text", Some(json!([1.0, 0.0])), Some(json!([1.0, 0.0])))
        .await;
    store.upsert_feedback("u1", "j00", true).await.unwrap();
    store.upsert_feedback("u1", "j0x", true).await.unwrap();

    let recommender = Recommender::new(store, DIM, config(10), None);
    let recs = recommender.recommend("u1", &CancellationToken::new()).await.unwrap();

    assert_eq!(result_ids(&recs), ids(1..=8));
    assert!(recs
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::MismatchedLength { expected: 3, actual: 2, .. })));
}

#[tokio::test]
async fn test_llm_only_uses_unrated_jobs_without_embeddings() {
    let store = seeded_store().await;
    for id in ids(1..=8) {
        store.upsert_feedback("u1", &id, false).await.unwrap();
    }
    let llm = Arc::new(ScriptedCompletion::rank_all());
    let recommender = Recommender::new(store, DIM, config(7), Some(reranker(llm.clone())));

    let recs = recommender
        .recommend_with_mode("u1", MatchMode::LlmOnly, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(recs.mode, MatchMode::LlmOnly);
    assert_eq!(candidate_ids(&llm.last_prompt()), vec!["j09", "j10"]);
    assert_eq!(result_ids(&recs), vec!["j09", "j10"]);
}

#[tokio::test]
async fn test_hybrid_blends_in_popularity() {
    let store = seeded_store().await;
    for user in ["a", "b", "c"] {
        store.upsert_feedback(user, "j08", true).await.unwrap();
    }
    let mut cfg = config(2);
    cfg.hybrid_similarity_weight = 0.5;
    cfg.hybrid_popularity_weight = 0.5;
    let recommender = Recommender::new(store, DIM, cfg, None);

    let recs = recommender
        .recommend_with_mode("u1", MatchMode::Hybrid, &CancellationToken::new())
        .await
        .unwrap();

    // j01: similarity 1, no likes. j08: similarity 0, most likes. Tie broken by id.
    assert_eq!(result_ids(&recs), vec!["j01", "j08"]);
    assert!((recs.results[0].score - 50.0).abs() < 1e-9);
    assert!((recs.results[1].score - 50.0).abs() < 1e-9);
    assert!(recs.results.iter().all(|r| r.reason.is_none()));
}

#[tokio::test]
async fn test_llm_mode_without_reranker_falls_back_to_hybrid() {
    let store = seeded_store().await;
    let service = MatchService::new(Recommender::new(store, DIM, config(3), None));

    match service.get_recommendations_with_mode("u1", MatchMode::VectorLlm).await {
        MatchOutcome::Ranked { mode, results, .. } => {
            assert_eq!(mode, MatchMode::Hybrid);
            assert_eq!(results.len(), 3);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_newer_request_supersedes_older_one() {
    let store = seeded_store().await;
    let llm = Arc::new(ScriptedCompletion::rank_all().with_delay(Duration::from_millis(300)));
    let service = MatchService::new(Recommender::new(store, DIM, config(7), Some(reranker(llm))));

    let (first, second) = tokio::join!(service.get_recommendations("u1"), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        service.get_recommendations("u1").await
    });

    match first {
        MatchOutcome::Unavailable { reason, .. } => assert_eq!(reason, "cancelled"),
        other => panic!("first request should be cancelled: {:?}", other),
    }
    assert!(second.is_ranked());
}

#[tokio::test]
async fn test_requests_for_different_users_do_not_interfere() {
    let store = seeded_store().await;
    store
        .insert_profile_raw(profile("u2"), Some(json!([0.0, 1.0, 0.0])), Some(json!([0.0, 1.0, 0.0])))
        .await;
    let llm = Arc::new(ScriptedCompletion::rank_all().with_delay(Duration::from_millis(100)));
    let service = MatchService::new(Recommender::new(store, DIM, config(7), Some(reranker(llm))));

    let (a, b) = tokio::join!(service.get_recommendations("u1"), service.get_recommendations("u2"));
    assert!(a.is_ranked());
    assert!(b.is_ranked());
}

#[tokio::test]
async fn test_outcome_serializes_with_status_tag() {
    let store = seeded_store().await;
    let service = MatchService::new(Recommender::new(store, DIM, config(1), None));

    let outcome = service.get_recommendations("u1").await;
    let value = serde_json::to_value(&outcome).unwrap();
    assert_eq!(value["status"], "ranked");
    assert_eq!(value["mode"], "hybrid");
    assert_eq!(value["results"][0]["id"], "j01");
    assert_eq!(value["results"][0]["title"], "Engineer j01");
    assert!(value.get("warnings").is_none());
}
