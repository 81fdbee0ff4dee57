use crate::config::AppConfig;
use std::sync::Arc;

/// Implementation of [`compkit::ConfigProvider`] over the `components` bag of an [`AppConfig`].
#[derive(Debug, Clone)]
pub struct AppConfigProvider(Arc<AppConfig>);

impl AppConfigProvider {
    pub fn new(config: AppConfig) -> Self {
        Self(Arc::new(config))
    }

    pub fn from_arc(config: Arc<AppConfig>) -> Self {
        Self(config)
    }

    pub fn inner(&self) -> &AppConfig {
        &self.0
    }
}

impl compkit::ConfigProvider for AppConfigProvider {
    fn component_config(&self, config_key: &str) -> Option<serde_json::Value> {
        self.0.components.get(config_key).cloned()
    }
}
