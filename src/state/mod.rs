pub mod automation;
pub mod game;
mod sse;
pub mod state_machine;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, watch};
use uuid::Uuid;

use crate::{config::AppConfig, dao::game_store::BingoStore, error::ServiceError};

pub use self::automation::{ControllerHandle, ControllerSnapshot};
pub use self::sse::SseHub;
pub use self::state_machine::{AbortError, ApplyError, Plan, PlanError, PlanId, Snapshot};

pub type SharedState = Arc<AppState>;

/// Central application state storing the storage handle, SSE hub and live controllers.
pub struct AppState {
    store: RwLock<Option<Arc<dyn BingoStore>>>,
    public_sse: SseHub,
    controllers: DashMap<Uuid, ControllerHandle>,
    start_gate: Mutex<()>,
    config: AppConfig,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            public_sse: SseHub::new(config.sse_capacity()),
            controllers: DashMap::new(),
            start_gate: Mutex::new(()),
            config,
            degraded: degraded_tx,
        })
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn BingoStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store, or [`ServiceError::Degraded`] when running without storage.
    pub async fn require_store(&self) -> Result<Arc<dyn BingoStore>, ServiceError> {
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn set_store(&self, store: Arc<dyn BingoStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        &self.public_sse
    }

    /// Application configuration loaded at boot.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Registry of live automation controllers keyed by game id.
    pub fn controllers(&self) -> &DashMap<Uuid, ControllerHandle> {
        &self.controllers
    }

    /// Serialises controller start and stop so neither can overtake the other.
    pub fn start_gate(&self) -> &Mutex<()> {
        &self.start_gate
    }
}
