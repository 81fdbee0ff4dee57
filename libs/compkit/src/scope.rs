//! Per-request instance cache with ambient, task-local activation.
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::HookFailure;
use crate::instance::Instance;

tokio::task_local! {
    static CURRENT_SCOPE: Arc<RequestScope>;
}

/// Cache of request-strategy instances owned by one unit of work.
///
/// Entries are kept in creation order; release stops them in reverse.
#[derive(Debug)]
pub struct RequestScope {
    id: Uuid,
    instances: Mutex<Vec<(String, Arc<Instance>)>>,
}

impl RequestScope {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            instances: Mutex::new(Vec::new()),
        }
    }

    /// The scope active for the current task, if any.
    pub fn current() -> Option<Arc<RequestScope>> {
        CURRENT_SCOPE.try_with(Arc::clone).ok()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn get(&self, name: &str) -> Option<Arc<Instance>> {
        self.instances
            .lock()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, i)| i.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names cached so far, in creation order.
    pub fn names(&self) -> Vec<String> {
        self.instances.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.lock().is_empty()
    }

    /// Store `instance` under `name` unless another one got there first,
    /// in which case the existing entry is returned and nothing is stored.
    pub(crate) fn insert(&self, name: &str, instance: Arc<Instance>) -> Option<Arc<Instance>> {
        let mut instances = self.instances.lock();
        if let Some((_, existing)) = instances.iter().find(|(n, _)| n == name) {
            return Some(existing.clone());
        }
        instances.push((name.to_string(), instance));
        None
    }

    /// Stop every cached instance, newest first, and empty the cache.
    ///
    /// Entries are popped one by one so an interrupted release can be resumed.
    pub(crate) async fn release(&self) -> Vec<HookFailure> {
        let mut failures = Vec::new();
        loop {
            let next = self.instances.lock().pop();
            let Some((name, instance)) = next else { break };
            if let Err(error) = instance.stop().await {
                tracing::warn!(scope = %self.id, component = %name, error = %error, "request component stop failed");
                failures.push(HookFailure::new(name, error));
            }
        }
        failures
    }

    /// Run `fut` with `scope` as the ambient scope.
    pub(crate) async fn enter<F: std::future::Future>(scope: Arc<RequestScope>, fut: F) -> F::Output {
        CURRENT_SCOPE.scope(scope, fut).await
    }
}

/// Releases a scope whose owning future never reached its own teardown
/// (cancelled or panicked).
pub(crate) struct TeardownGuard {
    scope: Option<Arc<RequestScope>>,
}

impl TeardownGuard {
    pub(crate) fn new(scope: Arc<RequestScope>) -> Self {
        Self { scope: Some(scope) }
    }

    pub(crate) fn disarm(&mut self) {
        self.scope = None;
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        let Some(scope) = self.scope.take() else {
            return;
        };
        if scope.is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(scope = %scope.id(), "request scope abandoned, releasing in background");
                handle.spawn(async move {
                    let failures = scope.release().await;
                    if !failures.is_empty() {
                        tracing::warn!(
                            scope = %scope.id(),
                            failed = failures.len(),
                            "background request scope release finished with errors"
                        );
                    }
                });
            }
            Err(_) => {
                tracing::error!(
                    scope = %scope.id(),
                    pending = scope.len(),
                    "request scope dropped outside a tokio runtime, instances were not stopped"
                );
            }
        }
    }
}
