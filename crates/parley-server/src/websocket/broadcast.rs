//! Live connection registry and chat fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use crate::metrics::{CHAT_BROADCASTS_TOTAL, WS_BROADCAST_DROPS_TOTAL};

/// Outcome of one broadcast call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections the message was queued for.
    pub delivered: usize,
    /// Connections whose send failed (closed or full queue).
    pub failed: Vec<String>,
}

impl BroadcastReport {
    /// Number of recipients attempted.
    pub fn recipients(&self) -> usize {
        self.delivered + self.failed.len()
    }
}

/// Tracks live connections and their identity bindings.
pub struct SessionRegistry {
    /// Connected clients indexed by connection ID.
    connections: RwLock<HashMap<String, Arc<ClientConnection>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection with no bound identity.
    ///
    /// Returns `false` and leaves the registry untouched if the ID is
    /// already present.
    pub async fn add(&self, connection: Arc<ClientConnection>) -> bool {
        let mut conns = self.connections.write().await;
        if conns.contains_key(&connection.id) {
            warn!(conn_id = %connection.id, "duplicate connection id rejected");
            return false;
        }
        let _ = conns.insert(connection.id.clone(), connection);
        true
    }

    /// Remove a connection by ID. No-op if absent.
    pub async fn remove(&self, connection_id: &str) -> Option<Arc<ClientConnection>> {
        self.connections.write().await.remove(connection_id)
    }

    /// Look up a connection by ID.
    pub async fn get(&self, connection_id: &str) -> Option<Arc<ClientConnection>> {
        self.connections.read().await.get(connection_id).cloned()
    }

    /// Bind a registered connection to an identity.
    ///
    /// Returns `false` if no connection with that ID is registered.
    pub async fn bind_identity(&self, connection_id: &str, identity: &str) -> bool {
        let conns = self.connections.read().await;
        match conns.get(connection_id) {
            Some(conn) => {
                conn.bind_identity(identity.to_string());
                true
            }
            None => false,
        }
    }

    /// Send `text` to every registered connection.
    pub async fn broadcast(&self, text: &str) -> BroadcastReport {
        self.broadcast_except(text, None).await
    }

    /// Send `text` to every registered connection except `exclude`.
    ///
    /// The recipient list is snapshotted under the read lock and sent to
    /// outside it. A failed send is logged and counted and never stops
    /// delivery to the remaining recipients.
    pub async fn broadcast_except(&self, text: &str, exclude: Option<&str>) -> BroadcastReport {
        let recipients: Vec<Arc<ClientConnection>> = {
            let conns = self.connections.read().await;
            conns
                .values()
                .filter(|c| Some(c.id.as_str()) != exclude)
                .cloned()
                .collect()
        };

        let payload = Arc::new(text.to_owned());
        let mut report = BroadcastReport::default();
        for conn in &recipients {
            if conn.send(Arc::clone(&payload)) {
                report.delivered += 1;
            } else {
                counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                warn!(
                    conn_id = %conn.id,
                    total_drops = conn.drop_count(),
                    "failed to deliver broadcast to client"
                );
                report.failed.push(conn.id.clone());
            }
        }

        counter!(CHAT_BROADCASTS_TOTAL).increment(1);
        debug!(
            recipients = report.recipients(),
            failed = report.failed.len(),
            "broadcast message"
        );
        report
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Number of live connections bound to an identity.
    pub async fn authenticated_count(&self) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.identity().is_some())
            .count()
    }

}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_connection_with_rx(
        id: &str,
        identity: Option<&str>,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = ClientConnection::new(id.into(), tx);
        if let Some(name) = identity {
            conn.bind_identity(name.into());
        }
        (Arc::new(conn), rx)
    }

    #[tokio::test]
    async fn add_connection() {
        let reg = SessionRegistry::new();
        let (conn, _rx) = make_connection_with_rx("c1", None);
        assert!(reg.add(conn).await);
        assert_eq!(reg.connection_count().await, 1);
        assert_eq!(reg.authenticated_count().await, 0);
    }

    #[tokio::test]
    async fn add_duplicate_id_is_rejected() {
        let reg = SessionRegistry::new();
        let (first, _rx1) = make_connection_with_rx("c1", Some("alice"));
        let (second, _rx2) = make_connection_with_rx("c1", None);
        assert!(reg.add(first).await);
        assert!(!reg.add(second).await);
        assert_eq!(reg.connection_count().await, 1);
        let kept = reg.get("c1").await.unwrap();
        assert_eq!(kept.identity().as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn remove_connection() {
        let reg = SessionRegistry::new();
        let (conn, _rx) = make_connection_with_rx("c1", None);
        let _ = reg.add(conn).await;
        assert!(reg.remove("c1").await.is_some());
        assert_eq!(reg.connection_count().await, 0);
    }

    #[tokio::test]
    async fn remove_nonexistent_connection() {
        let reg = SessionRegistry::new();
        assert!(reg.remove("no_such").await.is_none());
        assert_eq!(reg.connection_count().await, 0);
    }

    #[tokio::test]
    async fn bind_identity_on_registered_connection() {
        let reg = SessionRegistry::new();
        let (conn, _rx) = make_connection_with_rx("c1", None);
        let _ = reg.add(conn.clone()).await;
        assert!(reg.bind_identity("c1", "alice").await);
        assert_eq!(conn.identity().as_deref(), Some("alice"));
        assert_eq!(reg.authenticated_count().await, 1);
    }

    #[tokio::test]
    async fn bind_identity_unknown_connection() {
        let reg = SessionRegistry::new();
        assert!(!reg.bind_identity("ghost", "alice").await);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connection() {
        let reg = SessionRegistry::new();
        let (c1, mut rx1) = make_connection_with_rx("c1", Some("alice"));
        let (c2, mut rx2) = make_connection_with_rx("c2", None);
        let (c3, mut rx3) = make_connection_with_rx("c3", Some("bob"));
        let _ = reg.add(c1).await;
        let _ = reg.add(c2).await;
        let _ = reg.add(c3).await;

        let report = reg.broadcast("alice: hi").await;
        assert_eq!(report.delivered, 3);
        assert!(report.failed.is_empty());

        assert_eq!(*rx1.try_recv().unwrap(), "alice: hi");
        assert_eq!(*rx2.try_recv().unwrap(), "alice: hi");
        assert_eq!(*rx3.try_recv().unwrap(), "alice: hi");
    }

    #[tokio::test]
    async fn broadcast_except_skips_excluded() {
        let reg = SessionRegistry::new();
        let (c1, mut rx1) = make_connection_with_rx("c1", None);
        let (c2, mut rx2) = make_connection_with_rx("c2", None);
        let _ = reg.add(c1).await;
        let _ = reg.add(c2).await;

        let report = reg.broadcast_except("x", Some("c1")).await;
        assert_eq!(report.recipients(), 1);
        assert!(rx1.try_recv().is_err());
        assert_eq!(*rx2.try_recv().unwrap(), "x");
    }

    #[tokio::test]
    async fn failed_recipient_does_not_block_others() {
        let reg = SessionRegistry::new();
        let (c1, mut rx1) = make_connection_with_rx("c1", None);
        let (c2, rx2) = make_connection_with_rx("c2", None);
        let (c3, mut rx3) = make_connection_with_rx("c3", None);
        let _ = reg.add(c1).await;
        let _ = reg.add(c2).await;
        let _ = reg.add(c3).await;
        drop(rx2);

        let report = reg.broadcast("hello").await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, vec!["c2".to_string()]);
        assert_eq!(*rx1.try_recv().unwrap(), "hello");
        assert_eq!(*rx3.try_recv().unwrap(), "hello");
    }

    #[tokio::test]
    async fn broadcast_to_empty_registry() {
        let reg = SessionRegistry::new();
        let report = reg.broadcast("nobody").await;
        assert_eq!(report.recipients(), 0);
    }

    #[tokio::test]
    async fn removed_connection_receives_nothing() {
        let reg = SessionRegistry::new();
        let (c1, mut rx1) = make_connection_with_rx("c1", None);
        let (c2, mut rx2) = make_connection_with_rx("c2", None);
        let _ = reg.add(c1).await;
        let _ = reg.add(c2).await;
        let _ = reg.remove("c1").await;

        let report = reg.broadcast("after").await;
        assert_eq!(report.recipients(), 1);
        assert!(rx1.try_recv().is_err());
        assert_eq!(*rx2.try_recv().unwrap(), "after");
    }

    #[tokio::test]
    async fn successive_broadcasts_keep_order() {
        let reg = SessionRegistry::new();
        let (c1, mut rx1) = make_connection_with_rx("c1", None);
        let _ = reg.add(c1).await;
        for i in 0..10 {
            let _ = reg.broadcast(&format!("m{i}")).await;
        }
        for i in 0..10 {
            assert_eq!(*rx1.try_recv().unwrap(), format!("m{i}"));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn broadcast_during_churn_reaches_stable_connections() {
        const LINES: usize = 200;
        let reg = Arc::new(SessionRegistry::new());
        let mut stable = Vec::new();
        for i in 0..3 {
            let (tx, rx) = mpsc::channel(LINES);
            let conn = Arc::new(ClientConnection::new(format!("stable-{i}"), tx));
            assert!(reg.add(conn).await);
            stable.push(rx);
        }

        let churners: Vec<_> = (0..4)
            .map(|t| {
                let reg = Arc::clone(&reg);
                tokio::spawn(async move {
                    for i in 0..100 {
                        let (conn, rx) = make_connection_with_rx(&format!("churn-{t}-{i}"), None);
                        assert!(reg.add(conn).await);
                        tokio::task::yield_now().await;
                        drop(rx);
                        assert!(reg.remove(&format!("churn-{t}-{i}")).await.is_some());
                    }
                })
            })
            .collect();

        let broadcaster = {
            let reg = Arc::clone(&reg);
            tokio::spawn(async move {
                for i in 0..LINES {
                    let report = reg.broadcast(&format!("m{i}")).await;
                    assert!(report.delivered >= 3);
                    tokio::task::yield_now().await;
                }
            })
        };

        for handle in churners {
            handle.await.unwrap();
        }
        broadcaster.await.unwrap();

        assert_eq!(reg.connection_count().await, 3);
        for rx in &mut stable {
            for i in 0..LINES {
                assert_eq!(*rx.try_recv().unwrap(), format!("m{i}"));
            }
            assert!(rx.try_recv().is_err());
        }
    }
}
