use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::AuditEntry;
use crate::services::gateway::PaymentGateway;
use crate::services::notify::Notifier;
use crate::services::revenue::RevenueCache;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub gateway: Box<dyn PaymentGateway>,
    pub notifier: Box<dyn Notifier>,
    pub revenue: RevenueCache,
    pub audit_tx: broadcast::Sender<AuditEntry>,
}

impl AppState {
    pub fn new(
        conn: Connection,
        config: AppConfig,
        gateway: Box<dyn PaymentGateway>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        let (audit_tx, _) = broadcast::channel(256);
        let revenue = RevenueCache::new(config.revenue_cache_ttl);
        Self {
            db: Arc::new(Mutex::new(conn)),
            config,
            gateway,
            notifier,
            revenue,
            audit_tx,
        }
    }

    /// Locks the shared connection. Every mutation of booking state goes through this lock.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Internal("database lock poisoned".to_string()))
    }
}
