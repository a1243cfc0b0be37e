//! Connection pool keyed by normalized target address

use super::{Connection, Dialect, Timing};
use crate::communication::{normalize_target, ConnectionParams, TransportFactory};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Connections of one dialect, one per target
pub struct ConnectionPool<D: Dialect> {
    connections: Mutex<HashMap<String, Arc<Connection<D>>>>,
}

impl<D: Dialect> ConnectionPool<D> {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Connection for `key`, created by `create` if missing
    pub fn get_or_create<F>(&self, key: &str, create: F) -> Arc<Connection<D>>
    where
        F: FnOnce() -> Connection<D>,
    {
        let mut connections = self.connections.lock();
        connections
            .entry(key.to_string())
            .or_insert_with(|| {
                tracing::debug!("Connection pool: new connection for {}", key);
                Arc::new(create())
            })
            .clone()
    }

    /// Connection for real transport parameters
    pub fn connect<F>(&self, params: &ConnectionParams, timing: Timing, dialect: F) -> Arc<Connection<D>>
    where
        F: FnOnce() -> D,
    {
        let key = normalize_target(params.kind, &params.target);
        let factory: Arc<dyn TransportFactory> = Arc::new(params.clone());
        self.get_or_create(&key, || Connection::new(dialect(), factory, timing))
    }

    /// Existing connection for `key`
    pub fn get(&self, key: &str) -> Option<Arc<Connection<D>>> {
        self.connections.lock().get(key).cloned()
    }

    /// Drop connections nobody holds and nobody has open.
    ///
    /// Returns the number of removed connections.
    pub fn remove_idle(&self) -> usize {
        let mut connections = self.connections.lock();
        let before = connections.len();
        connections.retain(|_, connection| {
            connection.open_count() > 0 || Arc::strong_count(connection) > 1
        });
        before - connections.len()
    }

    /// Keys of all pooled connections
    pub fn keys(&self) -> Vec<String> {
        self.connections.lock().keys().cloned().collect()
    }

    /// Number of pooled connections
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }
}

impl<D: Dialect> Default for ConnectionPool<D> {
    fn default() -> Self {
        Self::new()
    }
}
