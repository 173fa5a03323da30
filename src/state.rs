use std::sync::Arc;

use reqwest::Client;

use crate::config::Config;
use crate::services::ai::AiClient;
use crate::services::hub::{HubClient, WebSocketConnector};
use crate::services::portal::{PortalApi, PortalClient};
use crate::session::{FileTokenStore, Session, TokenStore};

/// Everything a page needs. One per process; cloning shares the session,
/// the REST client and the hub connection.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session: Session,
    pub api: Arc<dyn PortalApi>,
    pub hub: HubClient,
    pub ai: Arc<AiClient>,
}

impl AppState {
    /// Wires the production clients: token file on disk, reqwest for REST
    /// and AI, WebSocket for the hub.
    pub fn from_config(config: Config) -> Self {
        let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(config.token_file.clone()));
        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: Arc<dyn TokenStore>) -> Self {
        let config = Arc::new(config);
        let session = Session::new(store);
        let http = Client::new();
        let hub = HubClient::new(
            config.hub_url(),
            Arc::new(WebSocketConnector),
            config.reconnect,
        );
        Self {
            api: Arc::new(PortalClient::new(http.clone(), config.clone(), session.clone())),
            ai: Arc::new(AiClient::new(http, config.clone(), session.clone())),
            config,
            session,
            hub,
        }
    }
}
