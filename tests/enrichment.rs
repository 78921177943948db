//! Enrichment of fetched score collections against the Beat Savior cache

mod common;

use async_trait::async_trait;
use chrono::Duration;
use common::{record, score_row, t0, Fixture};
use ranktrack::scores::{
    EnhanceContext, EnhanceError, Enhancer, EnhancerKind, EnhancerRegistry, ScoresPayload,
    ScoresProvider, PUBLISH_DEBOUNCE,
};
use ranktrack::{
    AppContext, BeatSaviorRecord, FetchParams, Priority, ScoreRow, ScoresStore, ServiceParams,
    SourceError, StateType,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const PLAYER: &str = "76561198000000042";

/// Scores provider answering per player with a fixed page.
#[derive(Default)]
struct PagedProvider {
    pages: Mutex<HashMap<String, Vec<ScoreRow>>>,
    calls: AtomicUsize,
}

impl PagedProvider {
    fn page(&self, player_id: &str, rows: Vec<ScoreRow>) {
        self.pages
            .lock()
            .unwrap()
            .insert(player_id.to_string(), rows);
    }
}

#[async_trait]
impl ScoresProvider for PagedProvider {
    async fn get_processed(
        &self,
        params: &FetchParams,
    ) -> Result<Option<ScoresPayload>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let player_id = params.player_id.clone().unwrap_or_default();
        let scores = self
            .pages
            .lock()
            .unwrap()
            .get(&player_id)
            .cloned()
            .unwrap_or_default();
        let total = scores.len() as u64;
        Ok(Some(ScoresPayload::Page {
            scores,
            total: Some(total),
        }))
    }
}

/// Marks rows with the player they were enhanced for, after a delay.
struct SlowRanked;

#[async_trait]
impl Enhancer for SlowRanked {
    fn kind(&self) -> EnhancerKind {
        EnhancerKind::Rankeds
    }

    async fn enhance(
        &self,
        mut draft: ScoreRow,
        context: &EnhanceContext,
    ) -> Result<ScoreRow, EnhanceError> {
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        draft.as_value_mut()["rankedFor"] = json!(context.player_id.clone());
        Ok(draft)
    }
}

fn context(fx: &Fixture) -> AppContext {
    AppContext::new(
        fx.source.clone(),
        fx.records.clone(),
        fx.refreshes.clone(),
        fx.directory.clone(),
        fx.clock.clone(),
    )
}

async fn seeded_cache(fx: &Fixture) -> BeatSaviorRecord {
    let played = t0() - Duration::hours(1);
    let cached = record("bs-1", PLAYER, "AB12", 100, played);
    fx.source.respond(PLAYER, Ok(Some(vec![cached.clone()])));
    fx.service
        .refresh(PLAYER, false, Priority::BgNormal, true)
        .await
        .unwrap();
    cached
}

async fn quiet_period() {
    tokio::time::sleep(PUBLISH_DEBOUNCE * 2).await;
}

#[tokio::test(start_paused = true)]
async fn live_scores_get_their_beat_savior_record() {
    let fx = Fixture::new();
    let cached = seeded_cache(&fx).await;
    let app = context(&fx);
    let (enhancers, _lease) = app.enhancers();

    let provider = Arc::new(PagedProvider::default());
    provider.page(
        PLAYER,
        vec![
            score_row("A", "AB12", 100, t0() - Duration::hours(1)),
            score_row("B", "FF00", 300, t0()),
        ],
    );
    let store = ScoresStore::new(
        provider.clone(),
        Arc::new(enhancers),
        FetchParams::new("someone-else", "scoresaber", ServiceParams::default()),
    );

    assert!(store.fetch(None, None, Some(PLAYER), false).await.unwrap());
    store.enrichment_settled().await;
    quiet_period().await;

    let scores = store.state().scores.unwrap();
    assert_eq!(scores.len(), 2);
    let attached: BeatSaviorRecord =
        serde_json::from_value(scores[0].beat_savior().unwrap().clone()).unwrap();
    assert_eq!(attached, cached);
    assert!(scores[1].beat_savior().is_none());
    assert_eq!(store.total_scores(), Some(2));
}

#[tokio::test(start_paused = true)]
async fn switching_player_mid_flight_keeps_only_new_results() {
    let provider = Arc::new(PagedProvider::default());
    provider.page("p1", vec![score_row("A", "AB12", 100, t0())]);
    provider.page("p2", vec![score_row("B", "CD34", 200, t0())]);
    let store = ScoresStore::new(
        provider.clone(),
        Arc::new(EnhancerRegistry::new(vec![Arc::new(SlowRanked)])),
        FetchParams::new("p0", "scoresaber", ServiceParams::default()),
    );

    store.fetch(None, None, Some("p1"), false).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    store.fetch(None, None, Some("p2"), false).await.unwrap();

    store.enrichment_settled().await;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    quiet_period().await;

    let state = store.state();
    assert_eq!(state.query.and_then(|q| q.player_id).as_deref(), Some("p2"));
    let scores = state.scores.unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].leaderboard_id().as_deref(), Some("B"));
    assert_eq!(scores[0].pointer("/rankedFor"), Some(&json!("p2")));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn accsaber_rows_are_matched_even_when_seeded() {
    let fx = Fixture::new();
    seeded_cache(&fx).await;
    let app = context(&fx);
    let (enhancers, _lease) = app.enhancers();

    let store = ScoresStore::new(
        Arc::new(PagedProvider::default()),
        Arc::new(enhancers),
        FetchParams::new(PLAYER, "accsaber", ServiceParams::new(json!({"type": "overall"}))),
    );
    store.seed(
        Some(ScoresPayload::List(vec![score_row(
            "A",
            "AB12",
            100,
            t0() - Duration::hours(1),
        )])),
        StateType::Initial,
    );
    store.enrichment_settled().await;
    quiet_period().await;

    let state = store.state();
    assert_eq!(state.total, None);
    assert!(state.scores.unwrap()[0].beat_savior().is_some());
}

#[tokio::test]
async fn releasing_the_last_lease_tears_down_the_service() {
    let fx = Fixture::new();
    let app = context(&fx);

    let (_, lease) = app.enhancers();
    let extra = app.beat_savior();
    assert_eq!(app.beat_savior_slot().leases(), 2);

    drop(lease);
    assert!(app.beat_savior_slot().is_live());
    drop(extra);
    assert!(!app.beat_savior_slot().is_live());
}
