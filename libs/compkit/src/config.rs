use std::collections::HashMap;

use serde_json::Value;

use crate::contracts::ConfigMap;
use crate::error::{LifecycleError, Result};

/// Source of per-component configuration, looked up by a component's config key.
pub trait ConfigProvider: Send + Sync {
    /// Raw configuration for `config_key`, or `None` if the key is absent.
    fn component_config(&self, config_key: &str) -> Option<Value>;
}

impl ConfigProvider for HashMap<String, Value> {
    fn component_config(&self, config_key: &str) -> Option<Value> {
        self.get(config_key).cloned()
    }
}

impl ConfigProvider for ConfigMap {
    fn component_config(&self, config_key: &str) -> Option<Value> {
        self.get(config_key).cloned()
    }
}

impl ConfigProvider for Value {
    fn component_config(&self, config_key: &str) -> Option<Value> {
        self.as_object().and_then(|m| m.get(config_key)).cloned()
    }
}

/// Normalize a raw config value: an object is used as-is, `null` means "no settings".
pub(crate) fn config_map_from_value(component: &str, value: Value) -> Result<ConfigMap> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(ConfigMap::new()),
        other => Err(LifecycleError::InvalidConfig {
            component: component.to_string(),
            reason: format!("expected a mapping, got {}", value_kind(&other)),
        }),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
