//! Session Manager
//!
//! Keeps track of running sessions by port so two sessions can never
//! share one link. A port is claimed when a session starts and released
//! when its task finishes, whatever the outcome.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use uuid::Uuid;

use super::events::EventSink;
use super::{Session, SessionHandle};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::link::{LinkConnector, SerialConnector};

/// Snapshot of a running session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub id: Uuid,
    pub port: String,
    pub program: String,
    pub started_at: DateTime<Utc>,
}

struct ActiveSession {
    info: SessionInfo,
    cancel: Arc<watch::Sender<bool>>,
}

type Registry = Arc<RwLock<HashMap<String, ActiveSession>>>;

/// Port claim held by a session task; dropping it releases the port, even
/// when the task unwinds
struct PortClaim {
    registry: Registry,
    port: String,
    id: Uuid,
}

impl PortClaim {
    fn release(sessions: &mut HashMap<String, ActiveSession>, port: &str, id: Uuid) {
        if sessions.get(port).is_some_and(|active| active.info.id == id) {
            sessions.remove(port);
            debug!("Released port {}", port);
        }
    }
}

impl Drop for PortClaim {
    fn drop(&mut self) {
        if let Ok(mut sessions) = self.registry.try_write() {
            Self::release(&mut sessions, &self.port, self.id);
            return;
        }

        // Registry is busy; release once it frees up
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Could not release port {}: no runtime", self.port);
            return;
        };
        let registry = Arc::clone(&self.registry);
        let port = std::mem::take(&mut self.port);
        let id = self.id;
        runtime.spawn(async move {
            let mut sessions = registry.write().await;
            Self::release(&mut sessions, &port, id);
        });
    }
}

/// Starts sessions and enforces one session per port
pub struct SessionManager {
    connector: Arc<dyn LinkConnector>,
    /// Running sessions keyed by port
    sessions: Registry,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    /// Manager for real serial ports
    pub fn new() -> Self {
        Self::with_connector(Arc::new(SerialConnector))
    }

    pub fn with_connector(connector: Arc<dyn LinkConnector>) -> Self {
        Self {
            connector,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start drawing `program` on the port named in `config`
    ///
    /// # Errors
    /// `PortInUse` if a session already owns the port, or a validation
    /// error for `config`. Load and connection errors arrive through
    /// [`SessionHandle::join`].
    pub async fn start(&self, config: Config, program: &str) -> Result<SessionHandle> {
        let session = Session::with_connector(config, Arc::clone(&self.connector))?;
        let port = session.config().link.port.clone();

        let id = Uuid::new_v4();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel = Arc::new(cancel_tx);

        {
            let mut sessions = self.sessions.write().await;
            if sessions.contains_key(&port) {
                return Err(Error::PortInUse { port });
            }
            sessions.insert(
                port.clone(),
                ActiveSession {
                    info: SessionInfo {
                        id,
                        port: port.clone(),
                        program: program.to_string(),
                        started_at: Utc::now(),
                    },
                    cancel: Arc::clone(&cancel),
                },
            );
        }

        let claim = PortClaim {
            registry: Arc::clone(&self.sessions),
            port,
            id,
        };
        let program = program.to_string();
        let task = tokio::spawn(async move {
            let _claim = claim;
            session
                .run_controlled(id, &program, EventSink::new(events_tx), cancel_rx)
                .await
        });

        Ok(SessionHandle::new(id, events_rx, cancel, task))
    }

    /// Whether a session currently owns `port`
    pub async fn is_busy(&self, port: &str) -> bool {
        let sessions = self.sessions.read().await;
        sessions.contains_key(port)
    }

    /// Get the number of running sessions
    pub async fn active_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    /// Running sessions, oldest first
    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let mut infos: Vec<SessionInfo> = sessions.values().map(|s| s.info.clone()).collect();
        infos.sort_by_key(|info| info.started_at);
        infos
    }

    /// Cancel the session on `port`; `false` if there is none
    pub async fn cancel(&self, port: &str) -> bool {
        let sessions = self.sessions.read().await;
        match sessions.get(port) {
            Some(active) => {
                info!("Cancelling session {} on {}", active.info.id, port);
                let _ = active.cancel.send(true);
                true
            }
            None => false,
        }
    }
}
