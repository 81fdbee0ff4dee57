use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::contracts::{Component, ConfigMap, DynComponent, Handle, StartArgs};
use crate::error::{LifecycleError, Result};
use crate::instance::Instance;

/// Instantiation policy of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// One shared instance, started by the app and stopped on shutdown.
    Singleton,
    /// One instance per request scope, torn down when the scope exits.
    Request,
}

/// Lifecycle state tracked per registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    Registered,
    Configured,
    Started,
    Stopped,
    Error,
}

impl ComponentState {
    /// States reachable from `self` in one step (a same-state move is always a no-op).
    pub fn allowed_transitions(self) -> &'static [ComponentState] {
        use ComponentState::*;
        match self {
            Registered => &[Configured, Error],
            Configured => &[Started, Error],
            Started => &[Stopped, Error],
            Stopped => &[Configured, Error],
            Error => &[Registered, Configured, Started, Stopped],
        }
    }

    pub fn can_transition_to(self, next: ComponentState) -> bool {
        self == next || self.allowed_transitions().contains(&next)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentState::Registered => "registered",
            ComponentState::Configured => "configured",
            ComponentState::Started => "started",
            ComponentState::Stopped => "stopped",
            ComponentState::Error => "error",
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of a component: its kind, strategy, config key and named dependencies.
#[derive(Clone)]
pub struct ComponentDescriptor {
    kind: Arc<dyn DynComponent>,
    strategy: Strategy,
    config_key: String,
    dependencies: Vec<(String, String)>,
}

impl ComponentDescriptor {
    pub fn new<C: Component>(kind: C, strategy: Strategy, config_key: impl Into<String>) -> Self {
        Self {
            kind: Arc::new(kind),
            strategy,
            config_key: config_key.into(),
            dependencies: Vec::new(),
        }
    }

    pub fn singleton<C: Component>(kind: C, config_key: impl Into<String>) -> Self {
        Self::new(kind, Strategy::Singleton, config_key)
    }

    pub fn request<C: Component>(kind: C, config_key: impl Into<String>) -> Self {
        Self::new(kind, Strategy::Request, config_key)
    }

    /// Inject the started object of `component` under parameter `param`.
    /// Declaring the same parameter twice keeps the last target.
    pub fn depends_on(mut self, param: impl Into<String>, component: impl Into<String>) -> Self {
        let param = param.into();
        let component = component.into();
        match self.dependencies.iter_mut().find(|(p, _)| *p == param) {
            Some(slot) => slot.1 = component,
            None => self.dependencies.push((param, component)),
        }
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn config_key(&self) -> &str {
        &self.config_key
    }

    /// `(parameter, component)` pairs in declaration order.
    pub fn dependencies(&self) -> &[(String, String)] {
        &self.dependencies
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.kind_name()
    }

    pub(crate) fn kind(&self) -> Arc<dyn DynComponent> {
        self.kind.clone()
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("kind", &self.kind_name())
            .field("strategy", &self.strategy)
            .field("config_key", &self.config_key)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Registry record for one declared component.
#[derive(Debug)]
pub struct ComponentInfo {
    descriptor: ComponentDescriptor,
    state: ComponentState,
    config: Option<ConfigMap>,
    // Cached singleton instance; always `None` for request components.
    instance: Option<Arc<Instance>>,
}

impl ComponentInfo {
    fn new(descriptor: ComponentDescriptor) -> Self {
        Self {
            descriptor,
            state: ComponentState::Registered,
            config: None,
            instance: None,
        }
    }

    pub fn descriptor(&self) -> &ComponentDescriptor {
        &self.descriptor
    }

    pub fn strategy(&self) -> Strategy {
        self.descriptor.strategy
    }

    pub fn state(&self) -> ComponentState {
        self.state
    }

    pub fn config(&self) -> Option<&ConfigMap> {
        self.config.as_ref()
    }

    pub fn instance(&self) -> Option<&Arc<Instance>> {
        self.instance.as_ref()
    }

    fn set_state(&mut self, component: &str, next: ComponentState) -> Result<()> {
        if self.state == next {
            return Ok(());
        }
        if !self.state.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition {
                component: component.to_string(),
                from: self.state,
                to: next,
            });
        }
        if next == ComponentState::Started && self.config.is_none() {
            return Err(LifecycleError::MissingConfig {
                component: component.to_string(),
                config_key: self.descriptor.config_key.clone(),
            });
        }
        self.state = next;
        Ok(())
    }
}

/// Name → component record, plus declaration order and the started-order record.
#[derive(Debug, Default)]
pub struct Registry {
    components: HashMap<String, ComponentInfo>,
    order: Vec<String>,
    started: Vec<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, descriptor: ComponentDescriptor) -> Result<()> {
        let name = name.into();
        if self.components.contains_key(&name) {
            return Err(LifecycleError::DuplicateName(name));
        }
        tracing::debug!(
            component = %name,
            strategy = ?descriptor.strategy,
            kind = descriptor.kind_name(),
            "component registered"
        );
        self.components.insert(name.clone(), ComponentInfo::new(descriptor));
        self.order.push(name);
        Ok(())
    }

    /// Attach configuration and move the component to CONFIGURED.
    ///
    /// Configuring a STARTED component, or one whose instance is still running
    /// in any state, is rejected and forces it into ERROR.
    pub fn configure(&mut self, name: &str, config: ConfigMap) -> Result<()> {
        let info = self.info_mut(name)?;
        let from = info.state;
        let running = info.instance.as_ref().is_some_and(|i| i.is_started());
        if running || !from.can_transition_to(ComponentState::Configured) {
            info.state = ComponentState::Error;
            tracing::warn!(component = %name, from = %from, "configure rejected, component moved to error");
            return Err(LifecycleError::InvalidTransition {
                component: name.to_string(),
                from,
                to: ComponentState::Configured,
            });
        }
        info.config = Some(config);
        // an unstarted cached instance was built from the previous config
        if info.instance.as_ref().is_some_and(|i| !i.is_started()) {
            info.instance = None;
        }
        info.set_state(name, ComponentState::Configured)?;
        tracing::debug!(component = %name, "component configured");
        Ok(())
    }

    /// Check that every dependency exists, singletons only depend on singletons,
    /// and the singleton graph is acyclic.
    pub fn validate(&self) -> Result<()> {
        for name in &self.order {
            let info = &self.components[name];
            for (param, dep) in info.descriptor.dependencies() {
                let Some(dep_info) = self.components.get(dep) else {
                    return Err(LifecycleError::UnknownDependency {
                        component: name.clone(),
                        param: param.clone(),
                        depends_on: dep.clone(),
                    });
                };
                if info.strategy() == Strategy::Singleton && dep_info.strategy() == Strategy::Request {
                    return Err(LifecycleError::StrategyMismatch {
                        component: name.clone(),
                        depends_on: dep.clone(),
                    });
                }
            }
        }

        let singletons: Vec<&str> = self
            .order
            .iter()
            .filter(|n| self.components[*n].strategy() == Strategy::Singleton)
            .map(String::as_str)
            .collect();
        let adj = self.adjacency(&singletons);
        if let Some(path) = detect_cycle_with_path(&singletons, &adj) {
            return Err(LifecycleError::CircularDependency { path });
        }
        Ok(())
    }

    /// Topological order over all components (dependencies first), ties broken
    /// by declaration order.
    pub fn dependency_order(&self) -> Result<Vec<String>> {
        let names: Vec<&str> = self.order.iter().map(String::as_str).collect();
        let adj = self.adjacency(&names);

        // adj[u] holds the dependencies of u; count them as in-degree
        let mut indeg: Vec<usize> = adj.iter().map(Vec::len).collect();
        let mut dependents = vec![Vec::<usize>::new(); names.len()];
        for (u, deps) in adj.iter().enumerate() {
            for &v in deps {
                dependents[v].push(u);
            }
        }

        let mut ready: BTreeSet<usize> = (0..names.len()).filter(|&i| indeg[i] == 0).collect();
        let mut order = Vec::with_capacity(names.len());
        while let Some(u) = ready.pop_first() {
            order.push(names[u].to_string());
            for &w in &dependents[u] {
                indeg[w] -= 1;
                if indeg[w] == 0 {
                    ready.insert(w);
                }
            }
        }

        if order.len() != names.len() {
            let path = detect_cycle_with_path(&names, &adj).unwrap_or_else(|| {
                names
                    .iter()
                    .zip(&indeg)
                    .filter(|(_, d)| **d > 0)
                    .map(|(n, _)| n.to_string())
                    .collect()
            });
            return Err(LifecycleError::CircularDependency { path });
        }
        Ok(order)
    }

    /// Edges `u -> v` meaning "u depends on v", restricted to `names`.
    /// Dependencies outside `names` are ignored.
    fn adjacency(&self, names: &[&str]) -> Vec<Vec<usize>> {
        let idx: HashMap<&str, usize> = names.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        names
            .iter()
            .map(|n| {
                self.components[*n]
                    .descriptor
                    .dependencies()
                    .iter()
                    .filter_map(|(_, dep)| idx.get(dep.as_str()).copied())
                    .collect()
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&ComponentInfo> {
        self.components.get(name)
    }

    pub fn info(&self, name: &str) -> Result<&ComponentInfo> {
        self.components
            .get(name)
            .ok_or_else(|| LifecycleError::UnknownComponent(name.to_string()))
    }

    fn info_mut(&mut self, name: &str) -> Result<&mut ComponentInfo> {
        self.components
            .get_mut(name)
            .ok_or_else(|| LifecycleError::UnknownComponent(name.to_string()))
    }

    pub fn state(&self, name: &str) -> Result<ComponentState> {
        Ok(self.info(name)?.state)
    }

    /// Component names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn singleton_names(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|n| self.components[*n].strategy() == Strategy::Singleton)
            .cloned()
            .collect()
    }

    /// Singletons in the order they were started.
    pub fn started(&self) -> &[String] {
        &self.started
    }

    pub fn is_started(&self, name: &str) -> bool {
        self.started.iter().any(|n| n == name)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Construct (or return the cached) instance of a singleton.
    ///
    /// Every dependency must already be started; `stack` holds the names
    /// currently being resolved and turns re-entry into a cycle error.
    pub(crate) fn resolve_singleton(&mut self, name: &str, stack: &mut Vec<String>) -> Result<Arc<Instance>> {
        let info = self.info(name)?;
        debug_assert_eq!(info.strategy(), Strategy::Singleton);
        if let Some(instance) = &info.instance {
            return Ok(instance.clone());
        }
        if let Some(pos) = stack.iter().position(|n| n == name) {
            let mut path = stack[pos..].to_vec();
            path.push(name.to_string());
            return Err(LifecycleError::CircularDependency { path });
        }
        let config = info.config.clone().ok_or_else(|| LifecycleError::MissingConfig {
            component: name.to_string(),
            config_key: info.descriptor.config_key.clone(),
        })?;
        let kind = info.descriptor.kind();
        let deps = info.descriptor.dependencies.clone();

        stack.push(name.to_string());
        let handles = self.singleton_dependencies(name, &deps, stack);
        stack.pop();
        let handles = handles?;

        let instance = Arc::new(Instance::new(name, kind, StartArgs::new(config, handles)));
        self.info_mut(name)?.instance = Some(instance.clone());
        tracing::debug!(component = %name, "singleton instance constructed");
        Ok(instance)
    }

    fn singleton_dependencies(
        &mut self,
        name: &str,
        deps: &[(String, String)],
        stack: &mut Vec<String>,
    ) -> Result<Vec<(String, Handle)>> {
        let mut handles = Vec::with_capacity(deps.len());
        for (param, dep_name) in deps {
            let strategy = match self.components.get(dep_name) {
                Some(dep) => dep.strategy(),
                None => {
                    return Err(LifecycleError::UnknownDependency {
                        component: name.to_string(),
                        param: param.clone(),
                        depends_on: dep_name.clone(),
                    })
                }
            };
            if strategy == Strategy::Request {
                return Err(LifecycleError::StrategyMismatch {
                    component: name.to_string(),
                    depends_on: dep_name.clone(),
                });
            }
            let dep = self.resolve_singleton(dep_name, stack)?;
            if !dep.is_started() {
                return Err(LifecycleError::DependencyNotReady {
                    component: name.to_string(),
                    depends_on: dep_name.clone(),
                });
            }
            handles.push((param.clone(), dep.handle()?));
        }
        Ok(handles)
    }

    /// True when every singleton dependency of `name` has been started.
    pub(crate) fn dependencies_started(&self, name: &str) -> Result<bool> {
        let info = self.info(name)?;
        Ok(info
            .descriptor
            .dependencies()
            .iter()
            .all(|(_, dep)| self.is_started(dep)))
    }

    /// Move STOPPED components that still hold a config back to CONFIGURED.
    pub(crate) fn rearm_stopped(&mut self) -> Result<()> {
        for name in &self.order {
            let Some(info) = self.components.get_mut(name) else { continue };
            if info.state == ComponentState::Stopped && info.config.is_some() {
                info.set_state(name, ComponentState::Configured)?;
            }
        }
        Ok(())
    }

    /// Ensure `name` may start now and return its (cached) instance.
    pub(crate) fn prepare_start(&mut self, name: &str) -> Result<Arc<Instance>> {
        let info = self.info(name)?;
        if !info.state.can_transition_to(ComponentState::Started) {
            return Err(LifecycleError::InvalidTransition {
                component: name.to_string(),
                from: info.state,
                to: ComponentState::Started,
            });
        }
        if info.config.is_none() {
            return Err(LifecycleError::MissingConfig {
                component: name.to_string(),
                config_key: info.descriptor.config_key.clone(),
            });
        }
        let mut stack = Vec::new();
        self.resolve_singleton(name, &mut stack)
    }

    pub(crate) fn mark_started(&mut self, name: &str) -> Result<()> {
        self.info_mut(name)?.set_state(name, ComponentState::Started)?;
        if !self.is_started(name) {
            self.started.push(name.to_string());
        }
        Ok(())
    }

    /// Force ERROR and drop the cached instance.
    pub(crate) fn mark_failed(&mut self, name: &str) {
        if let Some(info) = self.components.get_mut(name) {
            info.state = ComponentState::Error;
            info.instance = None;
        }
    }

    /// Clear the started record; returns started singletons in reverse start order.
    pub(crate) fn drain_started(&mut self) -> Vec<(String, Option<Arc<Instance>>)> {
        let started = std::mem::take(&mut self.started);
        started
            .into_iter()
            .rev()
            .map(|name| {
                let instance = self.components.get(&name).and_then(|i| i.instance.clone());
                (name, instance)
            })
            .collect()
    }

    /// Move a stopped singleton to STOPPED and discard its instance.
    ///
    /// A state with no direct edge to STOPPED is routed through ERROR.
    pub(crate) fn mark_stopped(&mut self, name: &str) -> Result<()> {
        let info = self.info_mut(name)?;
        info.instance = None;
        if !info.state.can_transition_to(ComponentState::Stopped) {
            tracing::warn!(component = %name, from = %info.state, "stopped from an unexpected state, routing through error");
            info.state = ComponentState::Error;
        }
        info.set_state(name, ComponentState::Stopped)
    }

    /// Drop cached singleton instances that never started.
    pub(crate) fn discard_unstarted(&mut self) {
        for info in self.components.values_mut() {
            if info.instance.as_ref().is_some_and(|i| !i.is_started()) {
                info.instance = None;
            }
        }
    }

    pub(crate) fn started_instances(&self) -> Vec<(String, Option<Arc<Instance>>)> {
        self.started
            .iter()
            .map(|name| {
                let instance = self.components.get(name).and_then(|i| i.instance.clone());
                (name.clone(), instance)
            })
            .collect()
    }
}

/// Detect cycles in the dependency graph using DFS with path tracking.
/// Returns the cycle path (first node repeated at the end) if found.
fn detect_cycle_with_path(names: &[&str], adj: &[Vec<usize>]) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White, // unvisited
        Gray,  // on current path
        Black, // finished
    }

    fn dfs(
        node: usize,
        names: &[&str],
        adj: &[Vec<usize>],
        colors: &mut [Color],
        path: &mut Vec<usize>,
    ) -> Option<Vec<String>> {
        colors[node] = Color::Gray;
        path.push(node);

        for &next in &adj[node] {
            match colors[next] {
                Color::Gray => {
                    // back edge
                    if let Some(start) = path.iter().position(|&n| n == next) {
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|&i| names[i].to_string()).collect();
                        cycle.push(names[next].to_string());
                        return Some(cycle);
                    }
                }
                Color::White => {
                    if let Some(cycle) = dfs(next, names, adj, colors, path) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }

        path.pop();
        colors[node] = Color::Black;
        None
    }

    let mut colors = vec![Color::White; names.len()];
    let mut path = Vec::new();
    for i in 0..names.len() {
        if colors[i] == Color::White {
            if let Some(cycle) = dfs(i, names, adj, &mut colors, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}
