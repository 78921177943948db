//! Incremental enrichment pipeline
//!
//! Every row of a freshly received collection is pushed through the
//! enhancer chains for the active query. Each stage's effect is recorded as
//! patches against the row identity, applied to the latest snapshot, and
//! the snapshot is republished after a quiet period.
//!
//! Pipeline steps for one stage completion:
//! 1. Drop the result if its task is no longer current
//! 2. Queue the stage's patches under the row identity
//! 3. Apply queued patches to the row with that identity in the snapshot
//! 4. Schedule a debounced publish of the whole snapshot

use super::debounce::Debouncer;
use super::enhancer::{chain_plan, EnhanceContext, EnhancerKind, EnhancerRegistry, StateType};
use super::patch::{apply_patches, diff, Patch};
use super::row::{FetchParams, RowIdentity, ScoreRow};
use super::task::{EnhanceTaskId, TaskGuard};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Quiet period before an updated snapshot is published.
pub const PUBLISH_DEBOUNCE: Duration = Duration::from_millis(200);

/// Receives published snapshots.
pub trait SnapshotSink: Send + Sync {
    fn set(&self, rows: Vec<ScoreRow>);
}

/// Patches recorded for one row identity, and how many of them are already
/// applied to the row in the current snapshot.
#[derive(Debug, Default)]
struct PatchLog {
    patches: Vec<Patch>,
    applied: usize,
}

#[derive(Debug, Default)]
struct PipelineState {
    guard: TaskGuard,
    patches: HashMap<RowIdentity, PatchLog>,
    snapshot: Vec<ScoreRow>,
}

/// Handle on the chains started for one collection.
pub struct EnhanceRun {
    task: EnhanceTaskId,
    chains: Vec<JoinHandle<()>>,
}

impl EnhanceRun {
    pub fn task(&self) -> &EnhanceTaskId {
        &self.task
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    /// Wait until every chain of this run has finished or stopped.
    pub async fn settled(self) {
        join_all(self.chains).await;
    }
}

/// Applies enhancer chains to score collections and republishes the
/// evolving snapshot.
///
/// Must be driven from inside a tokio runtime; chains and publish timers
/// are spawned tasks.
#[derive(Clone)]
pub struct EnrichmentPipeline {
    state: Arc<Mutex<PipelineState>>,
    enhancers: Arc<EnhancerRegistry>,
    sink: Arc<dyn SnapshotSink>,
    debouncer: Arc<Debouncer>,
}

impl EnrichmentPipeline {
    pub fn new(enhancers: Arc<EnhancerRegistry>, sink: Arc<dyn SnapshotSink>) -> Self {
        Self::with_debounce(enhancers, sink, PUBLISH_DEBOUNCE)
    }

    pub fn with_debounce(
        enhancers: Arc<EnhancerRegistry>,
        sink: Arc<dyn SnapshotSink>,
        delay: Duration,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(PipelineState::default())),
            enhancers,
            sink,
            debouncer: Arc::new(Debouncer::new(delay)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The task whose results are currently accepted.
    pub fn current_task(&self) -> Option<EnhanceTaskId> {
        self.lock().guard.current().cloned()
    }

    /// The latest snapshot, with every applied patch.
    pub fn snapshot(&self) -> Vec<ScoreRow> {
        self.lock().snapshot.clone()
    }

    /// Start enriching a new collection for `query`.
    ///
    /// A different query invalidates all earlier work; the same query keeps
    /// its recorded patches, which are re-applied to the fresh rows as
    /// stages complete.
    pub fn on_new_data(
        &self,
        query: &FetchParams,
        rows: Vec<ScoreRow>,
        state_type: StateType,
    ) -> EnhanceRun {
        let task = task_for(query);

        {
            let mut state = self.lock();
            if state.guard.activate(task.clone()) {
                debug!(task = %task, "New enhance task");
                state.patches.clear();
            } else {
                for log in state.patches.values_mut() {
                    log.applied = 0;
                }
            }
            state.snapshot = rows.clone();
        }

        let context = EnhanceContext {
            player_id: query.player_id.clone(),
            service: query.service.clone(),
        };
        let plan = chain_plan(&query.service, state_type);

        let mut chains = Vec::with_capacity(rows.len() * plan.len());
        for row in rows {
            for chain in &plan {
                let pipeline = self.clone();
                let task = task.clone();
                let context = context.clone();
                let row = row.clone();
                let chain = chain.clone();
                chains.push(tokio::spawn(async move {
                    pipeline.run_chain(task, context, row, chain).await;
                }));
            }
        }

        trace!(task = %task, chains = chains.len(), "Enhance chains started");

        EnhanceRun { task, chains }
    }

    /// Move to `query` without any rows to enrich.
    ///
    /// Chains still running for an earlier task are left to finish, but
    /// nothing they produce lands in the snapshot or gets published.
    pub fn invalidate(&self, query: &FetchParams) {
        let task = task_for(query);
        {
            let mut state = self.lock();
            state.guard.activate(task.clone());
            state.patches.clear();
            state.snapshot.clear();
        }
        self.debouncer.cancel();
        debug!(task = %task, "Enhance task invalidated, no rows");
    }

    async fn run_chain(
        &self,
        task: EnhanceTaskId,
        context: EnhanceContext,
        mut row: ScoreRow,
        chain: Vec<EnhancerKind>,
    ) {
        for kind in chain {
            let Some(enhancer) = self.enhancers.get(kind) else {
                continue;
            };

            let identity = row.identity(context.player_id.as_deref());
            let enhanced = match enhancer.enhance(row.clone(), &context).await {
                Ok(enhanced) => enhanced,
                Err(err) => {
                    warn!(row = %identity, stage = %kind, error = %err, "Enhancer failed, chain stopped");
                    return;
                }
            };

            let patches = diff(row.as_value(), enhanced.as_value());
            match self.commit(&task, context.player_id.as_deref(), &identity, patches) {
                Some(current) => row = current,
                None => return,
            }
        }
    }

    /// Record a stage's patches and apply them to the current snapshot.
    ///
    /// Returns the updated row, or `None` when the task is stale or the row
    /// is no longer in the snapshot.
    fn commit(
        &self,
        task: &EnhanceTaskId,
        player_id: Option<&str>,
        identity: &RowIdentity,
        patches: Vec<Patch>,
    ) -> Option<ScoreRow> {
        let row = {
            let mut state = self.lock();
            if !state.guard.is_current(task) {
                trace!(task = %task, row = %identity, "Dropping stale enhance result");
                return None;
            }

            let PipelineState {
                patches: logs,
                snapshot,
                ..
            } = &mut *state;

            let log = logs.entry(identity.clone()).or_default();
            log.patches.extend(patches);

            let position = snapshot
                .iter()
                .position(|r| r.identity(player_id) == *identity)?;

            let pending = &log.patches[log.applied..];
            apply_patches(snapshot[position].as_value_mut(), pending);
            log.applied = log.patches.len();

            snapshot[position].clone()
        };

        self.schedule_publish(task.clone());
        Some(row)
    }

    fn schedule_publish(&self, task: EnhanceTaskId) {
        let state = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);

        self.debouncer.schedule(move || {
            let rows = {
                let state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if !state.guard.is_current(&task) {
                    trace!(task = %task, "Skipping publish for stale task");
                    return;
                }
                state.snapshot.clone()
            };

            sink.set(rows);
        });
    }
}

fn task_for(query: &FetchParams) -> EnhanceTaskId {
    EnhanceTaskId::new(
        query.player_id.as_deref(),
        Some(&query.service),
        Some(&query.service_params),
    )
}
