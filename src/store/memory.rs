use crate::errors::{Result, StockWatchError};
use crate::store::{
    covers, node_name, parent_path, ChangeEvent, Mutation, Properties, RecordStore,
    Subscription, Transaction,
};
use log::debug;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

struct Subscriber {
    prefix: String,
    sender: mpsc::UnboundedSender<Vec<ChangeEvent>>,
}

/// In-process [`RecordStore`]. Nodes live in a sorted map keyed by path,
/// the root `/` always exists.
pub struct MemoryStore {
    nodes: Mutex<BTreeMap<String, Properties>>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Properties::new());
        Self {
            nodes: Mutex::new(nodes),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Copy of every node and its properties.
    pub fn snapshot(&self) -> BTreeMap<String, Properties> {
        self.nodes.lock().map(|n| n.clone()).unwrap_or_default()
    }

    fn validate_path(path: &str) -> Result<()> {
        if path == "/" {
            return Ok(());
        }
        if !path.starts_with('/') || path.ends_with('/') || path.split('/').skip(1).any(str::is_empty)
        {
            return Err(StockWatchError::WriteError(format!("Invalid path '{}'", path)));
        }
        Ok(())
    }

    fn apply(
        nodes: &mut BTreeMap<String, Properties>,
        mutation: &Mutation,
        events: &mut Vec<ChangeEvent>,
    ) -> Result<()> {
        match mutation {
            Mutation::CreateIfAbsent(path) => {
                Self::validate_path(path)?;
                let mut missing = Vec::new();
                let mut current = Some(path.as_str());
                while let Some(p) = current {
                    if nodes.contains_key(p) {
                        break;
                    }
                    missing.push(p.to_string());
                    current = parent_path(p);
                }
                for p in missing.into_iter().rev() {
                    nodes.insert(p.clone(), Properties::new());
                    events.push(ChangeEvent::added(p));
                }
            }
            Mutation::Delete(path) => {
                Self::validate_path(path)?;
                if path == "/" {
                    return Err(StockWatchError::WriteError("Cannot delete the root node".to_string()));
                }
                if !nodes.contains_key(path) {
                    return Err(StockWatchError::WriteError(format!("No node at '{}'", path)));
                }
                let mut doomed: Vec<String> = nodes
                    .keys()
                    .filter(|k| covers(path, k))
                    .cloned()
                    .collect();
                // Deepest first
                doomed.sort_by(|a, b| b.matches('/').count().cmp(&a.matches('/').count()).then(b.cmp(a)));
                for p in doomed {
                    nodes.remove(&p);
                    events.push(ChangeEvent::removed(p));
                }
            }
            Mutation::SetProperties { path, properties } => {
                let node = nodes
                    .get_mut(path)
                    .ok_or_else(|| StockWatchError::WriteError(format!("No node at '{}'", path)))?;
                for (key, value) in properties {
                    node.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    fn publish(&self, events: Vec<ChangeEvent>) {
        if events.is_empty() {
            return;
        }
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.retain(|sub| {
            let batch: Vec<ChangeEvent> = events
                .iter()
                .filter(|e| covers(&sub.prefix, &e.path))
                .cloned()
                .collect();
            if batch.is_empty() {
                return !sub.sender.is_closed();
            }
            sub.sender.send(batch).is_ok()
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryStore {
    fn exists(&self, path: &str) -> bool {
        self.nodes.lock().map(|n| n.contains_key(path)).unwrap_or(false)
    }

    fn properties(&self, path: &str) -> Option<Properties> {
        self.nodes.lock().ok()?.get(path).cloned()
    }

    fn children(&self, path: &str) -> Vec<String> {
        let nodes = match self.nodes.lock() {
            Ok(guard) => guard,
            Err(_) => return Vec::new(),
        };
        nodes
            .keys()
            .filter(|k| k.as_str() != path && parent_path(k) == Some(path))
            .map(|k| node_name(k).to_string())
            .collect()
    }

    fn commit(&self, tx: Transaction) -> Result<()> {
        let mut nodes = self
            .nodes
            .lock()
            .map_err(|_| StockWatchError::WriteError("Store lock poisoned".to_string()))?;

        // Stage on a copy so a failing mutation leaves the store untouched
        let mut staged = nodes.clone();
        let mut events = Vec::new();
        for mutation in tx.mutations() {
            Self::apply(&mut staged, mutation, &mut events)?;
        }
        *nodes = staged;

        // Published under the node lock: batches arrive in commit order
        debug!("Committed transaction with {} change events", events.len());
        self.publish(events);
        Ok(())
    }

    fn subscribe(&self, prefix: &str) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let prefix = prefix.trim_end_matches('/').to_string();
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.push(Subscriber {
            prefix: prefix.clone(),
            sender,
        });
        Subscription::new(prefix, receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChangeType, PropertyValue};

    fn props(key: &str, value: PropertyValue) -> Properties {
        let mut p = Properties::new();
        p.insert(key.to_string(), value);
        p
    }

    #[test]
    fn create_if_absent_builds_ancestors_and_reports_them() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe("/content/stocks");

        let mut tx = Transaction::new();
        tx.create_if_absent("/content/stocks/ADBE/trade");
        store.commit(tx).unwrap();

        assert!(store.exists("/content"));
        assert!(store.exists("/content/stocks/ADBE/trade"));
        let batch = sub.try_recv().unwrap();
        let paths: Vec<&str> = batch.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/content/stocks", "/content/stocks/ADBE", "/content/stocks/ADBE/trade"]
        );
        assert!(batch.iter().all(|e| e.change_type == ChangeType::Added));
    }

    #[test]
    fn create_is_idempotent_and_silent_for_existing_nodes() {
        let store = MemoryStore::new();
        let mut tx = Transaction::new();
        tx.create_if_absent("/content/stocks/ADBE");
        store.commit(tx.clone()).unwrap();

        let mut sub = store.subscribe("/content/stocks");
        store.commit(tx).unwrap();
        assert!(sub.try_recv().is_none());
        assert_eq!(store.children("/content/stocks"), vec!["ADBE".to_string()]);
    }

    #[test]
    fn delete_removes_subtree_deepest_first() {
        let store = MemoryStore::new();
        let mut tx = Transaction::new();
        tx.create_if_absent("/content/stocks/ADBE/trade");
        store.commit(tx).unwrap();

        let mut sub = store.subscribe("/content/stocks");
        let mut tx = Transaction::new();
        tx.delete("/content/stocks/ADBE");
        store.commit(tx).unwrap();

        let batch = sub.try_recv().unwrap();
        assert_eq!(
            batch,
            vec![
                ChangeEvent::removed("/content/stocks/ADBE/trade"),
                ChangeEvent::removed("/content/stocks/ADBE"),
            ]
        );
        assert!(!store.exists("/content/stocks/ADBE"));
        assert!(store.exists("/content/stocks"));
    }

    #[test]
    fn failed_commit_leaves_store_untouched() {
        let store = MemoryStore::new();
        let mut tx = Transaction::new();
        tx.create_if_absent("/content/stocks/ADBE/trade");
        tx.set_properties("/content/stocks/ADBE/trade", props("lastTrade", PropertyValue::Double(1.0)));
        store.commit(tx).unwrap();
        let before = store.snapshot();

        let mut sub = store.subscribe("/content");
        let mut tx = Transaction::new();
        tx.create_if_absent("/content/stocks/MSFT");
        tx.set_properties("/content/stocks/ADBE/trade", props("lastTrade", PropertyValue::Double(2.0)));
        tx.set_properties("/content/stocks/GOOG/trade", props("lastTrade", PropertyValue::Double(3.0)));
        assert!(store.commit(tx).is_err());

        assert_eq!(store.snapshot(), before);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn set_properties_merges_keys() {
        let store = MemoryStore::new();
        let mut tx = Transaction::new();
        tx.create_if_absent("/a");
        tx.set_properties("/a", props("x", PropertyValue::Long(1)));
        tx.set_properties("/a", props("y", PropertyValue::Long(2)));
        tx.set_properties("/a", props("x", PropertyValue::Long(3)));
        store.commit(tx).unwrap();

        let p = store.properties("/a").unwrap();
        assert_eq!(p.get("x"), Some(&PropertyValue::Long(3)));
        assert_eq!(p.get("y"), Some(&PropertyValue::Long(2)));
    }

    #[test]
    fn rejects_malformed_paths() {
        let store = MemoryStore::new();
        for path in ["content", "/content/", "/content//stocks"] {
            let mut tx = Transaction::new();
            tx.create_if_absent(path);
            assert!(store.commit(tx).is_err(), "{} should be rejected", path);
        }
    }

    #[test]
    fn subscribers_only_see_their_prefix_and_cancel_stops_delivery() {
        let store = MemoryStore::new();
        let mut stocks = store.subscribe("/content/stocks");
        let mut other = store.subscribe("/content/funds");

        let mut tx = Transaction::new();
        tx.create_if_absent("/content/stocks/ADBE");
        store.commit(tx).unwrap();
        assert!(stocks.try_recv().is_some());
        assert!(other.try_recv().is_none());

        stocks.cancel();
        let mut tx = Transaction::new();
        tx.create_if_absent("/content/stocks/MSFT");
        store.commit(tx).unwrap();
        assert!(stocks.try_recv().is_none());
    }

    #[test]
    fn racing_commits_are_published_in_commit_order() {
        for _ in 0..200 {
            let store = MemoryStore::new();
            let mut tx = Transaction::new();
            tx.create_if_absent("/content/stocks");
            store.commit(tx).unwrap();
            let mut sub = store.subscribe("/content/stocks");

            std::thread::scope(|s| {
                s.spawn(|| {
                    for _ in 0..50 {
                        let mut tx = Transaction::new();
                        tx.create_if_absent("/content/stocks/ADBE");
                        store.commit(tx).unwrap();
                    }
                });
                s.spawn(|| {
                    for _ in 0..50 {
                        let mut tx = Transaction::new();
                        tx.delete("/content/stocks/ADBE");
                        // Fails whenever the node is already gone
                        let _ = store.commit(tx);
                    }
                });
            });

            let mut present = false;
            while let Some(batch) = sub.try_recv() {
                for event in batch {
                    // The feed alternates, so it can be replayed to the final state
                    match event.change_type {
                        ChangeType::Added => assert!(!present, "ADDED twice in a row"),
                        ChangeType::Removed => assert!(present, "REMOVED without ADDED"),
                    }
                    present = event.change_type == ChangeType::Added;
                }
            }
            assert_eq!(present, store.exists("/content/stocks/ADBE"));
        }
    }
}
