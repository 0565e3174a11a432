use std::sync::Arc;
use std::time::Duration;

use crate::chat::store::MessageStore;
use crate::config::Config;
use crate::db::DbPool;
use crate::delivery::fanout::{LiveFanout, WsFanout};
use crate::delivery::push::PushGateway;
use crate::delivery::DeliveryCoordinator;
use crate::presence::Presence;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Message persistence over the SQLite connection
    pub store: MessageStore,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Sessions, open conversations, pending handshakes, active calls/games
    pub presence: Presence,
    /// Live event channel over the registered sessions
    pub fanout: Arc<dyn LiveFanout>,
    pub coordinator: DeliveryCoordinator,
    /// Prefix for file URLs handed back to clients
    pub public_base_url: String,
    /// How long invitations and answers stay claimable
    pub invitation_ttl: chrono::Duration,
    pub sweep_interval: Duration,
}

impl AppState {
    pub fn new(db: DbPool, jwt_secret: Vec<u8>, push: Arc<dyn PushGateway>, config: &Config) -> Self {
        let store = MessageStore::new(db);
        let presence = Presence::new();
        let fanout: Arc<dyn LiveFanout> = Arc::new(WsFanout::new(presence.sessions.clone()));
        let push_config = config.push_config();
        let handshake = config.handshake_config();

        let coordinator = DeliveryCoordinator::new(
            store.clone(),
            presence.sessions.clone(),
            presence.pairings.clone(),
            fanout.clone(),
            push,
            push_config.chunk_size,
        );

        Self {
            store,
            jwt_secret,
            presence,
            fanout,
            coordinator,
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            invitation_ttl: chrono::Duration::seconds(handshake.invitation_ttl_secs as i64),
            sweep_interval: Duration::from_secs(handshake.sweep_interval_secs.max(1)),
        }
    }
}
