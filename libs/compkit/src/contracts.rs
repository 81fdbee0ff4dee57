use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Resolved configuration of a single component: key → arbitrary value.
pub type ConfigMap = serde_json::Map<String, Value>;

/// Type-erased, shareable handle to the object a started component wraps.
pub type Handle = Arc<dyn Any + Send + Sync>;

/// Lifecycle contract every managed unit implements.
///
/// A component value is a stateless *kind*: the registry keeps one per declared
/// name and invokes it to produce instances. Per-instance state (the wrapped
/// object, whether it started) lives in [`crate::Instance`].
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// The object produced by `start` (connection pool, client, DAO, ...).
    type Output: Send + Sync + 'static;

    /// Build the wrapped object from merged configuration and dependency values.
    async fn start(&self, args: StartArgs) -> anyhow::Result<Self::Output>;

    /// Release the wrapped object. Never called for an instance that did not start.
    async fn stop(&self, _obj: Arc<Self::Output>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Cheap liveness probe.
    async fn is_alive(&self, _obj: Arc<Self::Output>) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Object-safe view of a [`Component`] used by the registry.
#[async_trait]
pub(crate) trait DynComponent: Send + Sync + 'static {
    fn kind_name(&self) -> &'static str;
    async fn start_dyn(&self, args: StartArgs) -> anyhow::Result<Handle>;
    async fn stop_dyn(&self, obj: Handle) -> anyhow::Result<()>;
    async fn probe_dyn(&self, obj: Handle) -> anyhow::Result<bool>;
}

#[async_trait]
impl<C: Component> DynComponent for C {
    fn kind_name(&self) -> &'static str {
        type_name::<C>()
    }

    async fn start_dyn(&self, args: StartArgs) -> anyhow::Result<Handle> {
        let obj = self.start(args).await?;
        Ok(Arc::new(obj))
    }

    async fn stop_dyn(&self, obj: Handle) -> anyhow::Result<()> {
        self.stop(downcast_handle::<C::Output>(obj)?).await
    }

    async fn probe_dyn(&self, obj: Handle) -> anyhow::Result<bool> {
        self.is_alive(downcast_handle::<C::Output>(obj)?).await
    }
}

pub(crate) fn downcast_handle<T: Any + Send + Sync>(handle: Handle) -> anyhow::Result<Arc<T>> {
    handle
        .downcast::<T>()
        .map_err(|_| anyhow!("handle does not hold a value of type {}", type_name::<T>()))
}

#[derive(Clone)]
enum Arg {
    Config(Value),
    Dependency(Handle),
}

/// Merged configuration + dependency mapping handed to [`Component::start`].
///
/// Dependency values shadow a configuration key of the same name.
#[derive(Clone, Default)]
pub struct StartArgs {
    values: HashMap<String, Arg>,
}

impl StartArgs {
    pub fn new(config: ConfigMap, dependencies: Vec<(String, Handle)>) -> Self {
        let mut values: HashMap<String, Arg> = config
            .into_iter()
            .map(|(k, v)| (k, Arg::Config(v)))
            .collect();
        for (param, handle) in dependencies {
            values.insert(param, Arg::Dependency(handle));
        }
        Self { values }
    }

    /// Raw configuration value for `key`, if present and not shadowed by a dependency.
    pub fn config(&self, key: &str) -> Option<&Value> {
        match self.values.get(key) {
            Some(Arg::Config(v)) => Some(v),
            _ => None,
        }
    }

    /// The configuration part of the mapping.
    pub fn config_map(&self) -> ConfigMap {
        self.values
            .iter()
            .filter_map(|(k, v)| match v {
                Arg::Config(value) => Some((k.clone(), value.clone())),
                Arg::Dependency(_) => None,
            })
            .collect()
    }

    /// Deserialize the configuration part into a typed struct.
    pub fn bind<C: DeserializeOwned>(&self) -> anyhow::Result<C> {
        serde_json::from_value(Value::Object(self.config_map()))
            .with_context(|| format!("failed to bind config into {}", type_name::<C>()))
    }

    /// The started dependency injected under `param`.
    pub fn dependency<T: Any + Send + Sync>(&self, param: &str) -> anyhow::Result<Arc<T>> {
        match self.values.get(param) {
            Some(Arg::Dependency(handle)) => downcast_handle::<T>(handle.clone())
                .with_context(|| format!("dependency parameter '{param}'")),
            Some(Arg::Config(_)) => Err(anyhow!("'{param}' is a config value, not a dependency")),
            None => Err(anyhow!("no dependency injected under '{param}'")),
        }
    }

    pub fn has_dependency(&self, param: &str) -> bool {
        matches!(self.values.get(param), Some(Arg::Dependency(_)))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for StartArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut config: Vec<(&String, &Value)> = Vec::new();
        let mut deps: Vec<&String> = Vec::new();
        for (k, v) in &self.values {
            match v {
                Arg::Config(value) => config.push((k, value)),
                Arg::Dependency(_) => deps.push(k),
            }
        }
        config.sort_by(|a, b| a.0.cmp(b.0));
        deps.sort();
        f.debug_struct("StartArgs")
            .field("config", &config)
            .field("dependencies", &deps)
            .finish()
    }
}
