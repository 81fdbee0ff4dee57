//! Request-strategy resolution: dependencies first, depth-first, cached per scope.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::contracts::{Handle, StartArgs};
use crate::error::{LifecycleError, Result};
use crate::instance::Instance;
use crate::registry::Strategy;
use crate::runtime::App;
use crate::scope::RequestScope;

impl App {
    /// Boxed because request components may depend on other request components.
    pub(crate) fn resolve_request<'a>(
        &'a self,
        name: &'a str,
        scope: Option<&'a RequestScope>,
        stack: &'a mut Vec<String>,
    ) -> BoxFuture<'a, Result<Arc<Instance>>> {
        Box::pin(async move {
            if let Some(existing) = scope.and_then(|s| s.get(name)) {
                return Ok(existing);
            }
            if let Some(pos) = stack.iter().position(|n| n == name) {
                let mut path = stack[pos..].to_vec();
                path.push(name.to_string());
                return Err(LifecycleError::CircularDependency { path });
            }

            let (kind, config, deps) = {
                let reg = self.registry.read();
                let info = reg.info(name)?;
                let config = info
                    .config()
                    .cloned()
                    .ok_or_else(|| LifecycleError::MissingConfig {
                        component: name.to_string(),
                        config_key: info.descriptor().config_key().to_string(),
                    })?;
                (
                    info.descriptor().kind(),
                    config,
                    info.descriptor().dependencies().to_vec(),
                )
            };

            stack.push(name.to_string());
            let handles = self.request_dependencies(name, &deps, scope, stack).await;
            stack.pop();
            let handles = handles?;

            let instance = Arc::new(Instance::new(name, kind, StartArgs::new(config, handles)));
            instance
                .start()
                .await
                .map_err(|source| LifecycleError::ComponentStart {
                    component: name.to_string(),
                    source,
                })?;

            let Some(scope) = scope else {
                tracing::warn!(
                    component = %name,
                    "request component resolved outside a request scope; caller owns its teardown"
                );
                return Ok(instance);
            };

            match scope.insert(name, instance.clone()) {
                None => {
                    tracing::debug!(scope = %scope.id(), component = %name, "request instance cached");
                    Ok(instance)
                }
                Some(existing) => {
                    // another task in the same scope won the race
                    if let Err(error) = instance.stop().await {
                        tracing::warn!(component = %name, error = %error, "failed to stop duplicate request instance");
                    }
                    Ok(existing)
                }
            }
        })
    }

    async fn request_dependencies(
        &self,
        name: &str,
        deps: &[(String, String)],
        scope: Option<&RequestScope>,
        stack: &mut Vec<String>,
    ) -> Result<Vec<(String, Handle)>> {
        let mut handles = Vec::with_capacity(deps.len());
        for (param, dep_name) in deps {
            let strategy = self.registry.read().get(dep_name).map(|i| i.strategy());
            let dep = match strategy {
                None => {
                    return Err(LifecycleError::UnknownDependency {
                        component: name.to_string(),
                        param: param.clone(),
                        depends_on: dep_name.clone(),
                    })
                }
                Some(Strategy::Singleton) => self.started_singleton(name, dep_name)?,
                Some(Strategy::Request) => self.resolve_request(dep_name, scope, stack).await?,
            };
            handles.push((param.clone(), dep.handle()?));
        }
        Ok(handles)
    }

    fn started_singleton(&self, component: &str, dep_name: &str) -> Result<Arc<Instance>> {
        self.registry
            .read()
            .get(dep_name)
            .and_then(|info| info.instance().cloned())
            .filter(|instance| instance.is_started())
            .ok_or_else(|| LifecycleError::DependencyNotReady {
                component: component.to_string(),
                depends_on: dep_name.to_string(),
            })
    }
}
