use crate::config::{config_map_from_value, ConfigProvider};
use crate::error::{LifecycleError, Result};
use crate::registry::{ComponentDescriptor, Registry};
use crate::runtime::{App, AppOptions};

/// Explicit registration step that produces an [`App`].
///
/// Declaration order is preserved and used to break ties during startup.
#[derive(Debug, Default)]
pub struct AppBuilder {
    components: Vec<(String, ComponentDescriptor)>,
    options: AppOptions,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn component(mut self, name: impl Into<String>, descriptor: ComponentDescriptor) -> Self {
        self.components.push((name.into(), descriptor));
        self
    }

    pub fn options(mut self, options: AppOptions) -> Self {
        self.options = options;
        self
    }

    /// Register, configure and validate every declared component.
    pub fn build(self, config: &dyn ConfigProvider) -> Result<App> {
        let mut registry = Registry::new();
        for (name, descriptor) in self.components {
            registry.register(name, descriptor)?;
        }

        let names = registry.names().to_vec();
        for name in &names {
            let config_key = registry.info(name)?.descriptor().config_key().to_string();
            let raw = config
                .component_config(&config_key)
                .ok_or_else(|| LifecycleError::MissingConfig {
                    component: name.clone(),
                    config_key: config_key.clone(),
                })?;
            let map = config_map_from_value(name, raw)?;
            registry.configure(name, map)?;
        }

        registry.validate()?;
        tracing::info!(components = ?names, "component registry built");
        Ok(App::new(registry, self.options))
    }
}
