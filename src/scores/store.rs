//! Scores collection store
//!
//! Holds the current query and the latest collection for it, fetches from a
//! [`ScoresProvider`] when the query changes, and hands every live
//! collection to the enrichment pipeline. Subscribers observe a
//! [`ScoresState`] through a `tokio::sync::watch` channel.

use super::enhancer::{EnhancerRegistry, StateType};
use super::pipeline::{EnhanceRun, EnrichmentPipeline, SnapshotSink};
use super::row::{FetchParams, ScoreRow, ServiceParams};
use crate::network::SourceError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

#[derive(Debug, Error)]
pub enum ScoresError {
    #[error("scores fetch failed: {0}")]
    Fetch(#[from] SourceError),
}

pub type ScoresResult<T> = Result<T, ScoresError>;

/// What a provider returns for one query.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoresPayload {
    /// One page of a larger collection.
    Page {
        scores: Vec<ScoreRow>,
        total: Option<u64>,
    },
    /// A complete collection with no paging information.
    List(Vec<ScoreRow>),
}

/// Remote scores service, already processed into rows.
#[async_trait]
pub trait ScoresProvider: Send + Sync {
    async fn get_processed(
        &self,
        params: &FetchParams,
    ) -> Result<Option<ScoresPayload>, SourceError>;
}

/// What subscribers see.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoresState {
    /// Latest snapshot, enriched as stages complete.
    pub scores: Option<Vec<ScoreRow>>,
    pub total: Option<u64>,
    pub state_type: StateType,
    /// Query of the fetch in progress, if any.
    pub pending: Option<FetchParams>,
    /// Message of the last failed fetch.
    pub error: Option<String>,
    /// Query the current `scores` answer.
    pub query: Option<FetchParams>,
}

/// Publishes pipeline snapshots into the watch channel.
struct WatchSink {
    state: Arc<watch::Sender<ScoresState>>,
}

impl SnapshotSink for WatchSink {
    fn set(&self, rows: Vec<ScoreRow>) {
        self.state.send_modify(|state| state.scores = Some(rows));
    }
}

pub struct ScoresStore {
    provider: Arc<dyn ScoresProvider>,
    pipeline: EnrichmentPipeline,
    query: Mutex<FetchParams>,
    state: Arc<watch::Sender<ScoresState>>,
    /// Incremented per issued fetch; a response only lands if it belongs to
    /// the latest one.
    generation: AtomicU64,
    last_run: Mutex<Option<EnhanceRun>>,
}

impl ScoresStore {
    pub fn new(
        provider: Arc<dyn ScoresProvider>,
        enhancers: Arc<EnhancerRegistry>,
        query: FetchParams,
    ) -> Self {
        let (sender, _) = watch::channel(ScoresState::default());
        let state = Arc::new(sender);
        let sink = Arc::new(WatchSink {
            state: Arc::clone(&state),
        });

        Self {
            provider,
            pipeline: EnrichmentPipeline::new(enhancers, sink),
            query: Mutex::new(query),
            state,
            generation: AtomicU64::new(0),
            last_run: Mutex::new(None),
        }
    }

    fn lock_query(&self) -> MutexGuard<'_, FetchParams> {
        self.query.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn query(&self) -> FetchParams {
        self.lock_query().clone()
    }

    pub fn player_id(&self) -> Option<String> {
        self.lock_query().player_id.clone()
    }

    pub fn service(&self) -> String {
        self.lock_query().service.clone()
    }

    pub fn service_params(&self) -> ServiceParams {
        self.lock_query().service_params.clone()
    }

    /// Size of the whole collection: the page total, `None` when the
    /// provider returned a bare list, `0` when it returned nothing.
    pub fn total_scores(&self) -> Option<u64> {
        self.state.borrow().total
    }

    pub fn state(&self) -> ScoresState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScoresState> {
        self.state.subscribe()
    }

    /// Install a collection obtained elsewhere (e.g. kept from a previous
    /// session) for the current query and start enriching it.
    ///
    /// Must be called inside a tokio runtime.
    pub fn seed(&self, payload: Option<ScoresPayload>, state_type: StateType) {
        let query = self.query();
        self.install(query, payload, state_type);
    }

    /// Fetch the collection for a query. Arguments left `None` keep their
    /// current value.
    ///
    /// Returns `Ok(false)` without a request when the resulting query is
    /// structurally equal to the current one and `force` is false.
    pub async fn fetch(
        &self,
        service_params: Option<ServiceParams>,
        service: Option<&str>,
        player_id: Option<&str>,
        force: bool,
    ) -> ScoresResult<bool> {
        let current = self.query();
        let unchanged = player_id.map_or(true, |p| current.player_id.as_deref() == Some(p))
            && service.map_or(true, |s| s == current.service)
            && service_params
                .as_ref()
                .map_or(true, |p| *p == current.service_params);

        if unchanged && !force {
            debug!(service = %current.service, "Query unchanged, fetch skipped");
            return Ok(false);
        }

        let params = FetchParams {
            player_id: player_id.map(str::to_string).or(current.player_id),
            service: service.map_or(current.service, str::to_string),
            service_params: service_params.unwrap_or(current.service_params),
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|state| {
            state.pending = Some(params.clone());
            state.error = None;
        });
        trace!(player = ?params.player_id, service = %params.service, "Fetching scores");

        let result = self.provider.get_processed(&params).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(player = ?params.player_id, "Superseded scores response dropped");
            return Ok(false);
        }

        match result {
            Ok(payload) => {
                *self.lock_query() = params.clone();
                self.install(params, payload, StateType::Live);
                Ok(true)
            }
            Err(err) => {
                warn!(player = ?params.player_id, service = %params.service, error = %err, "Scores fetch failed");
                self.state.send_modify(|state| {
                    state.pending = None;
                    state.error = Some(err.to_string());
                });
                Err(err.into())
            }
        }
    }

    /// Re-fetch the current query unconditionally.
    pub async fn refresh(&self) -> ScoresResult<bool> {
        let current = self.query();
        self.fetch(
            Some(current.service_params),
            Some(&current.service),
            current.player_id.as_deref(),
            true,
        )
        .await
    }

    /// Wait for the enhancer chains of the latest collection to finish.
    /// Publishing of their results is still subject to the debounce.
    pub async fn enrichment_settled(&self) {
        let run = self
            .last_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(run) = run {
            run.settled().await;
        }
    }

    fn install(&self, query: FetchParams, payload: Option<ScoresPayload>, state_type: StateType) {
        let (rows, total) = match payload {
            Some(ScoresPayload::Page { scores, total }) => (Some(scores), total),
            Some(ScoresPayload::List(scores)) => (Some(scores), None),
            None => (None, Some(0)),
        };

        self.state.send_modify(|state| {
            state.scores = rows.clone();
            state.total = total;
            state.state_type = state_type;
            state.pending = None;
            state.error = None;
            state.query = Some(query.clone());
        });

        let run = match rows {
            Some(rows) => Some(self.pipeline.on_new_data(&query, rows, state_type)),
            None => {
                self.pipeline.invalidate(&query);
                None
            }
        };
        *self.last_run.lock().unwrap_or_else(PoisonError::into_inner) = run;
    }
}
