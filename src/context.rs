//! Shared service instances
//!
//! Long-lived services are created on first use and torn down when the last
//! user lets go, so the next user starts from a fresh instance (empty
//! in-flight pools included).

use crate::beatsavior::{BeatSaviorRecord, BeatSaviorService, PlayerRefreshRecord};
use crate::clock::Clock;
use crate::network::BeatSaviorSource;
use crate::players::PlayerDirectory;
use crate::scores::{BeatSaviorEnhancer, Enhancer, EnhancerRegistry};
use crate::storage::Repository;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

struct SlotState<T> {
    instance: Option<Arc<T>>,
    leases: usize,
}

struct SlotInner<T> {
    name: &'static str,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    state: Mutex<SlotState<T>>,
}

impl<T> SlotInner<T> {
    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Lazily created, reference-counted single instance of a service.
pub struct ServiceSlot<T> {
    inner: Arc<SlotInner<T>>,
}

impl<T: Send + Sync + 'static> ServiceSlot<T> {
    pub fn new(name: &'static str, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(SlotInner {
                name,
                factory: Box::new(factory),
                state: Mutex::new(SlotState {
                    instance: None,
                    leases: 0,
                }),
            }),
        }
    }

    /// Lease the instance, creating it if nobody holds one.
    pub fn acquire(&self) -> ServiceHandle<T> {
        let mut state = self.inner.lock();
        let instance = match &state.instance {
            Some(instance) => Arc::clone(instance),
            None => {
                debug!(service = self.inner.name, "Creating service instance");
                let instance = Arc::new((self.inner.factory)());
                state.instance = Some(Arc::clone(&instance));
                instance
            }
        };
        state.leases += 1;

        ServiceHandle {
            instance,
            slot: Arc::clone(&self.inner),
        }
    }

    /// Number of live handles.
    pub fn leases(&self) -> usize {
        self.inner.lock().leases
    }

    pub fn is_live(&self) -> bool {
        self.inner.lock().instance.is_some()
    }
}

/// A lease on a slot's instance. Dropping the last lease tears the
/// instance down.
pub struct ServiceHandle<T> {
    instance: Arc<T>,
    slot: Arc<SlotInner<T>>,
}

impl<T> ServiceHandle<T> {
    /// The instance itself, for collaborators that keep an `Arc`.
    ///
    /// Holding the `Arc` does not count as a lease.
    pub fn shared(&self) -> Arc<T> {
        Arc::clone(&self.instance)
    }
}

impl<T> Deref for ServiceHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.instance
    }
}

impl<T> Clone for ServiceHandle<T> {
    fn clone(&self) -> Self {
        self.slot.lock().leases += 1;
        Self {
            instance: Arc::clone(&self.instance),
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Drop for ServiceHandle<T> {
    fn drop(&mut self) {
        let mut state = self.slot.lock();
        state.leases = state.leases.saturating_sub(1);
        if state.leases == 0 {
            debug!(service = self.slot.name, "Last lease released, tearing down");
            state.instance = None;
        }
    }
}

impl<T> fmt::Debug for ServiceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("service", &self.slot.name)
            .finish()
    }
}

/// Collaborators and shared services of a running application.
pub struct AppContext {
    beat_savior: ServiceSlot<BeatSaviorService>,
    players: Arc<dyn PlayerDirectory>,
}

impl AppContext {
    pub fn new(
        source: Arc<dyn BeatSaviorSource>,
        records: Arc<dyn Repository<BeatSaviorRecord>>,
        refreshes: Arc<dyn Repository<PlayerRefreshRecord>>,
        players: Arc<dyn PlayerDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let directory = Arc::clone(&players);
        let beat_savior = ServiceSlot::new("beat-savior", move || {
            BeatSaviorService::new(
                Arc::clone(&source),
                Arc::clone(&records),
                Arc::clone(&refreshes),
                Arc::clone(&directory),
                Arc::clone(&clock),
            )
        });

        Self {
            beat_savior,
            players,
        }
    }

    pub fn beat_savior(&self) -> ServiceHandle<BeatSaviorService> {
        self.beat_savior.acquire()
    }

    pub fn beat_savior_slot(&self) -> &ServiceSlot<BeatSaviorService> {
        &self.beat_savior
    }

    pub fn players(&self) -> &Arc<dyn PlayerDirectory> {
        &self.players
    }

    /// Enhancers backed by this context's services.
    ///
    /// The returned handle keeps the Beat Savior service alive for as long
    /// as the registry is in use.
    pub fn enhancers(&self) -> (EnhancerRegistry, ServiceHandle<BeatSaviorService>) {
        let handle = self.beat_savior();
        let enhancers: Vec<Arc<dyn Enhancer>> =
            vec![Arc::new(BeatSaviorEnhancer::new(handle.shared()))];
        (EnhancerRegistry::new(enhancers), handle)
    }
}
