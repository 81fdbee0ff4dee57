//! Demo components: an in-memory store, a catalog over it and a per-request audit trail.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use compkit::{component_fn, AppBuilder, Component, ComponentDescriptor, StartArgs};
use parking_lot::Mutex;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoreConfig {
    #[serde(default = "default_capacity")]
    capacity: usize,
}

fn default_capacity() -> usize {
    1024
}

/// Bounded key/value map standing in for an external database.
#[derive(Debug)]
pub struct Store {
    capacity: usize,
    entries: Mutex<BTreeMap<String, String>>,
    open: AtomicBool,
}

impl Store {
    pub fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if !self.open.load(Ordering::Acquire) {
            anyhow::bail!("store is closed");
        }
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity && !entries.contains_key(key) {
            anyhow::bail!("store is full ({} entries)", self.capacity);
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().len()
    }
}

pub struct StoreComponent;

#[async_trait]
impl Component for StoreComponent {
    type Output = Store;

    async fn start(&self, args: StartArgs) -> anyhow::Result<Store> {
        let cfg: StoreConfig = args.bind()?;
        tracing::info!(capacity = cfg.capacity, "store opened");
        Ok(Store {
            capacity: cfg.capacity,
            entries: Mutex::new(BTreeMap::new()),
            open: AtomicBool::new(true),
        })
    }

    async fn stop(&self, store: Arc<Store>) -> anyhow::Result<()> {
        store.open.store(false, Ordering::Release);
        tracing::info!(entries = store.entry_count(), "store closed");
        Ok(())
    }

    async fn is_alive(&self, store: Arc<Store>) -> anyhow::Result<bool> {
        Ok(store.open.load(Ordering::Acquire))
    }
}

/// Namespaced view over the [`Store`].
#[derive(Debug)]
pub struct Catalog {
    prefix: String,
    store: Arc<Store>,
}

impl Catalog {
    pub fn add(&self, item: &str, title: &str) -> anyhow::Result<()> {
        self.store.put(&format!("{}/{item}", self.prefix), title)
    }

    pub fn title(&self, item: &str) -> Option<String> {
        self.store.get(&format!("{}/{item}", self.prefix))
    }
}

/// Records the operations of a single request; flushed when the scope ends.
#[derive(Debug, Default)]
pub struct AuditTrail {
    entries: Mutex<Vec<String>>,
}

impl AuditTrail {
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }
}

/// Declares `store` (singleton) ← `catalog` (singleton) ← `audit` (request).
pub fn declare(builder: AppBuilder) -> AppBuilder {
    let catalog = component_fn(|args: StartArgs| async move {
        let store = args.dependency::<Store>("store")?;
        let prefix = args
            .config("prefix")
            .and_then(|v| v.as_str())
            .unwrap_or("items")
            .to_string();
        anyhow::Ok(Catalog { prefix, store })
    });

    let audit = component_fn(|_args: StartArgs| async move { anyhow::Ok(AuditTrail::default()) })
        .on_stop(|trail: Arc<AuditTrail>| async move {
            let entries = std::mem::take(&mut *trail.entries.lock());
            tracing::info!(entries = ?entries, "audit trail flushed");
            anyhow::Ok(())
        });

    builder
        .component("store", ComponentDescriptor::singleton(StoreComponent, "store"))
        .component(
            "catalog",
            ComponentDescriptor::singleton(catalog, "catalog").depends_on("store", "store"),
        )
        .component(
            "audit",
            ComponentDescriptor::request(audit, "audit").depends_on("catalog", "catalog"),
        )
}
