//! Periodic enforcement of elapsed kicks and pruning of dead connections.

use crate::connection::{Connection, ConnectionId, ConnectionState};
use crate::utils::current_timestamp;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Live connections keyed by id.
pub type ConnectionTable = DashMap<ConnectionId, Arc<Connection>>;

/// One sweep at `now`. Finalizes kicks whose grace period has elapsed and
/// drops disposed connections from the table. Returns the number of kicks
/// enforced.
pub async fn sweep_once(connections: &ConnectionTable, now: u64) -> usize {
    // Snapshot first; no map guard is held across an await.
    let candidates: Vec<Arc<Connection>> = connections
        .iter()
        .filter(|entry| {
            let connection = entry.value();
            connection.state() == ConnectionState::Disposing || connection.kick_elapsed(now)
        })
        .map(|entry| entry.value().clone())
        .collect();

    // One slow teardown must not hold up the others.
    let finalized = join_all(candidates.iter().map(|connection| connection.finalize_kick())).await;
    for connection in &candidates {
        connections.remove(&connection.id());
    }
    finalized.into_iter().filter(|enforced| *enforced).count()
}

pub(crate) fn spawn(connections: Arc<ConnectionTable>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let enforced = sweep_once(&connections, current_timestamp()).await;
            if enforced > 0 {
                debug!("Enforced {} elapsed kick(s)", enforced);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_support::{connected, connected_in, flood_from_backend, Harness};
    use crate::connection::KICK_GRACE_SECS;

    #[tokio::test]
    async fn test_kick_enforced_only_after_grace() {
        let h = connected().await;
        let other = connected_in(&h.fixtures, 2).await;
        let table = ConnectionTable::new();
        table.insert(1, h.connection.clone());
        table.insert(2, other.connection.clone());

        assert!(h.connection.schedule_kick(Some("testing")).await);
        let target = h.connection.kick_target();

        assert_eq!(sweep_once(&table, target - 1).await, 0);
        assert_eq!(h.connection.state(), ConnectionState::Connected);
        assert_eq!(table.len(), 2);

        assert_eq!(sweep_once(&table, target).await, 1);
        assert_eq!(h.connection.state(), ConnectionState::Disposing);
        assert_eq!(other.connection.state(), ConnectionState::Connected);
        assert_eq!(table.len(), 1);
        assert!(target >= KICK_GRACE_SECS);
    }

    #[tokio::test]
    async fn test_disposed_connections_are_pruned() {
        let h = connected().await;
        let table = ConnectionTable::new();
        table.insert(1, h.connection.clone());

        h.connection.close_connection().await;
        assert_eq!(sweep_once(&table, current_timestamp()).await, 0);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_stalled_client_does_not_hold_up_sweep() {
        let healthy = connected().await;
        let Harness {
            connection: stalled,
            client_peer: _client_peer,
            backend_peer,
            ..
        } = connected_in(&healthy.fixtures, 2).await;
        let flood = flood_from_backend(backend_peer);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let table = ConnectionTable::new();
        table.insert(1, healthy.connection.clone());
        table.insert(2, stalled.clone());
        assert!(healthy.connection.schedule_kick(None).await);
        assert!(stalled.schedule_kick(None).await);
        let due = healthy.connection.kick_target().max(stalled.kick_target());

        let enforced = tokio::time::timeout(Duration::from_secs(3), sweep_once(&table, due)).await;
        assert_eq!(enforced.ok(), Some(2));
        assert!(table.is_empty());
        flood.abort();
    }
}
