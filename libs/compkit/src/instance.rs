use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::contracts::{downcast_handle, DynComponent, Handle, StartArgs};
use crate::error::{LifecycleError, Result};

/// One constructed unit of a component: the kind, the arguments it was built
/// with, and the wrapped object once `start` has succeeded.
///
/// `start` and `stop` are idempotent; the stop hook runs at most once per
/// successful start and never for an instance that did not start.
pub struct Instance {
    name: String,
    kind: Arc<dyn DynComponent>,
    args: StartArgs,
    obj: RwLock<Option<Handle>>,
    hooks: tokio::sync::Mutex<()>,
}

impl Instance {
    pub(crate) fn new(name: impl Into<String>, kind: Arc<dyn DynComponent>, args: StartArgs) -> Self {
        Self {
            name: name.into(),
            kind,
            args,
            obj: RwLock::new(None),
            hooks: tokio::sync::Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.kind_name()
    }

    pub fn args(&self) -> &StartArgs {
        &self.args
    }

    pub fn is_started(&self) -> bool {
        self.obj.read().is_some()
    }

    /// Type-erased wrapped object.
    pub fn handle(&self) -> Result<Handle> {
        self.obj
            .read()
            .clone()
            .ok_or_else(|| LifecycleError::NotStarted(self.name.clone()))
    }

    /// Typed wrapped object.
    pub fn obj<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        let handle = self.handle()?;
        downcast_handle::<T>(handle).map_err(|_| LifecycleError::TypeMismatch {
            component: self.name.clone(),
            expected: type_name::<T>(),
        })
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let _hooks = self.hooks.lock().await;
        if self.is_started() {
            return Ok(());
        }
        let obj = self.kind.start_dyn(self.args.clone()).await?;
        *self.obj.write() = Some(obj);
        tracing::debug!(component = %self.name, kind = self.kind_name(), "instance started");
        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        let _hooks = self.hooks.lock().await;
        let taken = self.obj.write().take();
        let Some(obj) = taken else {
            return Ok(());
        };
        self.kind.stop_dyn(obj).await?;
        tracing::debug!(component = %self.name, "instance stopped");
        Ok(())
    }

    pub async fn is_alive(&self) -> anyhow::Result<bool> {
        let obj = self.handle()?;
        self.kind.probe_dyn(obj).await
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.name)
            .field("kind", &self.kind_name())
            .field("started", &self.is_started())
            .finish()
    }
}
