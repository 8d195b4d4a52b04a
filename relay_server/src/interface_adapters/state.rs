use crate::use_cases::RoomRegistry;
use protocol::ServerMessage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::warn;

pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub connections: ConnectionMap,
}

/// Per-connection outbound queues. Broadcasts enqueue here; each
/// connection's socket loop drains its own queue.
#[derive(Default)]
pub struct ConnectionMap {
    inner: RwLock<HashMap<u64, mpsc::Sender<ServerMessage>>>,
}

impl ConnectionMap {
    pub async fn insert(&self, conn_id: u64, tx: mpsc::Sender<ServerMessage>) {
        self.inner.write().await.insert(conn_id, tx);
    }

    pub async fn remove(&self, conn_id: u64) {
        self.inner.write().await.remove(&conn_id);
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Queues a message for specific connections. A full queue drops the
    /// message for that connection only (slow consumer).
    pub async fn send_many(&self, targets: &[u64], msg: &ServerMessage) {
        let map = self.inner.read().await;
        for id in targets {
            if let Some(tx) = map.get(id)
                && tx.try_send(msg.clone()).is_err()
            {
                warn!(conn_id = id, "outbound queue full or closed; dropping message");
            }
        }
    }

    /// Queues a message for every live connection.
    pub async fn broadcast_all(&self, msg: &ServerMessage) {
        let map = self.inner.read().await;
        for (id, tx) in map.iter() {
            if tx.try_send(msg.clone()).is_err() {
                warn!(conn_id = id, "outbound queue full or closed; dropping broadcast");
            }
        }
    }
}
