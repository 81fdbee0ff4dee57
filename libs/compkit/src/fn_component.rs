//! Closure-backed components, for wrapping plain objects without a dedicated type.
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::contracts::{Component, StartArgs};

type StartFn<T> = Box<dyn Fn(StartArgs) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;
type HookFn<T, R> = Box<dyn Fn(Arc<T>) -> BoxFuture<'static, anyhow::Result<R>> + Send + Sync>;

/// A [`Component`] whose hooks are closures.
///
/// ```ignore
/// let kind = component_fn(|args: StartArgs| async move {
///     let cfg: PoolConfig = args.bind()?;
///     Pool::connect(cfg).await
/// })
/// .on_stop(|pool: Arc<Pool>| async move { pool.close().await });
/// ```
pub struct FnComponent<T> {
    start: StartFn<T>,
    stop: Option<HookFn<T, ()>>,
    probe: Option<HookFn<T, bool>>,
}

/// Wrap an async constructor as a component with no-op stop and an always-alive probe.
pub fn component_fn<T, F, Fut>(start: F) -> FnComponent<T>
where
    T: Send + Sync + 'static,
    F: Fn(StartArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    FnComponent {
        start: Box::new(move |args| Box::pin(start(args))),
        stop: None,
        probe: None,
    }
}

impl<T: Send + Sync + 'static> FnComponent<T> {
    pub fn on_stop<F, Fut>(mut self, stop: F) -> Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.stop = Some(Box::new(move |obj| Box::pin(stop(obj))));
        self
    }

    pub fn on_probe<F, Fut>(mut self, probe: F) -> Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        self.probe = Some(Box::new(move |obj| Box::pin(probe(obj))));
        self
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Component for FnComponent<T> {
    type Output = T;

    async fn start(&self, args: StartArgs) -> anyhow::Result<T> {
        (self.start)(args).await
    }

    async fn stop(&self, obj: Arc<T>) -> anyhow::Result<()> {
        match &self.stop {
            Some(stop) => stop(obj).await,
            None => Ok(()),
        }
    }

    async fn is_alive(&self, obj: Arc<T>) -> anyhow::Result<bool> {
        match &self.probe {
            Some(probe) => probe(obj).await,
            None => Ok(true),
        }
    }
}
