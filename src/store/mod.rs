//! Hierarchical record store capability.
//!
//! Nodes are addressed by absolute slash separated paths and carry a map of
//! typed properties. Writers stage mutations in a [`Transaction`] and commit
//! them all-or-nothing; every successful commit is announced to matching
//! subscriptions as one ordered batch of [`ChangeEvent`]s.

pub mod memory;

use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

pub use memory::MemoryStore;

pub type Properties = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PropertyValue {
    String(String),
    Double(f64),
    Long(i64),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Double(v) => Some(*v),
            PropertyValue::Long(v) => Some(*v as f64),
            PropertyValue::String(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Long(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: String,
    pub change_type: ChangeType,
}

impl ChangeEvent {
    pub fn added(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            change_type: ChangeType::Added,
        }
    }

    pub fn removed(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            change_type: ChangeType::Removed,
        }
    }

    /// Last path segment, e.g. `/content/stocks/adbe` -> `adbe`.
    pub fn name(&self) -> &str {
        node_name(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Create the node and any missing ancestors; existing nodes are kept.
    CreateIfAbsent(String),
    /// Remove the node and its whole subtree.
    Delete(String),
    /// Overwrite the given keys, leaving other properties untouched.
    SetProperties { path: String, properties: Properties },
}

/// Ordered list of staged mutations applied by [`RecordStore::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    mutations: Vec<Mutation>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_if_absent(&mut self, path: impl Into<String>) -> &mut Self {
        self.mutations.push(Mutation::CreateIfAbsent(path.into()));
        self
    }

    pub fn delete(&mut self, path: impl Into<String>) -> &mut Self {
        self.mutations.push(Mutation::Delete(path.into()));
        self
    }

    pub fn set_properties(&mut self, path: impl Into<String>, properties: Properties) -> &mut Self {
        self.mutations.push(Mutation::SetProperties {
            path: path.into(),
            properties,
        });
        self
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Cancellable handle on a change feed. Dropping it also cancels delivery.
pub struct Subscription {
    prefix: String,
    receiver: mpsc::UnboundedReceiver<Vec<ChangeEvent>>,
}

impl Subscription {
    pub fn new(prefix: impl Into<String>, receiver: mpsc::UnboundedReceiver<Vec<ChangeEvent>>) -> Self {
        Self {
            prefix: prefix.into(),
            receiver,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Next batch of changes, or `None` once the feed is closed.
    pub async fn recv(&mut self) -> Option<Vec<ChangeEvent>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Vec<ChangeEvent>> {
        self.receiver.try_recv().ok()
    }

    /// Stop delivery; batches already queued can still be drained.
    pub fn cancel(&mut self) {
        self.receiver.close();
    }
}

pub trait RecordStore: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    fn properties(&self, path: &str) -> Option<Properties>;

    /// Names of the direct children of `path`.
    fn children(&self, path: &str) -> Vec<String>;

    fn commit(&self, tx: Transaction) -> Result<()>;

    /// Subscribe to ADDED/REMOVED events for `prefix` and everything below it.
    fn subscribe(&self, prefix: &str) -> Subscription;
}

pub fn node_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub fn parent_path(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) if path.len() > 1 => Some("/"),
        Some(0) | None => None,
        Some(idx) => Some(&path[..idx]),
    }
}

pub fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}

/// True when `path` is `prefix` itself or lies below it.
pub fn covers(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    prefix.is_empty()
        || path == prefix
        || (path.starts_with(prefix) && path[prefix.len()..].starts_with('/'))
}
