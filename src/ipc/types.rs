use std::path::PathBuf;
use std::sync::mpsc::Receiver;

use crate::config::DaemonConfig;
use crate::session::Session;
use crate::store::StoreEvent;
use crate::transport::Transport;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: DaemonConfig,
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub transport: Option<Box<dyn Transport>>,
    pub session: Option<Session>,
    /// Store notifications not yet written to the workspace cache.
    pub store_events: Option<Receiver<StoreEvent>>,
}

impl AppState {
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            workspace: None,
            db: None,
            transport: None,
            session: None,
            store_events: None,
        }
    }

    /// Installs a session and subscribes to its store.
    pub fn install_session(&mut self, mut session: Session) {
        self.store_events = Some(session.store.subscribe_channel());
        self.session = Some(session);
    }

    pub fn clear_session(&mut self) {
        self.session = None;
        self.store_events = None;
    }
}
