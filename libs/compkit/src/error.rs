use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::registry::ComponentState;

/// A stop or teardown hook that failed while releasing a component.
#[derive(Debug)]
pub struct HookFailure {
    pub component: String,
    pub error: anyhow::Error,
}

impl HookFailure {
    pub fn new(component: impl Into<String>, error: anyhow::Error) -> Self {
        Self {
            component: component.into(),
            error,
        }
    }
}

impl fmt::Display for HookFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}': {:#}", self.component, self.error)
    }
}

fn join_failures(failures: &[HookFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Structured errors for registration, resolution and lifecycle orchestration.
#[derive(Debug, Error)]
pub enum LifecycleError {
    // Registration / graph errors: detected before anything is started
    #[error("component '{0}' is already registered")]
    DuplicateName(String),
    #[error("unknown component '{0}'")]
    UnknownComponent(String),
    #[error("component '{component}' depends on unknown '{depends_on}' (parameter '{param}')")]
    UnknownDependency {
        component: String,
        param: String,
        depends_on: String,
    },
    #[error("singleton '{component}' cannot depend on request-scoped '{depends_on}'")]
    StrategyMismatch {
        component: String,
        depends_on: String,
    },
    #[error("cyclic dependency detected: {}", path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    // Configuration / state machine errors
    #[error("invalid state transition for '{component}': {from} -> {to}")]
    InvalidTransition {
        component: String,
        from: ComponentState,
        to: ComponentState,
    },
    #[error("config key '{config_key}' for component '{component}' not found")]
    MissingConfig {
        component: String,
        config_key: String,
    },
    #[error("invalid config for component '{component}': {reason}")]
    InvalidConfig { component: String, reason: String },

    // Runtime errors
    #[error("component '{component}' depends on '{depends_on}' which is not started")]
    DependencyNotReady {
        component: String,
        depends_on: String,
    },
    #[error("start failed for '{component}': {source:#}")]
    ComponentStart {
        component: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("circular dependency or missing dependency, unable to start: {}", pending.join(", "))]
    CircularDependencyOrMissingDependency { pending: Vec<String> },
    #[error("component '{0}' is not started")]
    NotStarted(String),
    #[error("component '{component}' does not hold a value of type {expected}")]
    TypeMismatch {
        component: String,
        expected: &'static str,
    },
    #[error("stop failed for {} component(s): {}", failures.len(), join_failures(failures))]
    StopFailed { failures: Vec<HookFailure> },
    #[error("request scope {scope} teardown failed for {} component(s): {}", failures.len(), join_failures(failures))]
    ScopeTeardown {
        scope: Uuid,
        failures: Vec<HookFailure>,
    },
}

impl LifecycleError {
    /// True for errors that describe a broken component graph rather than a runtime failure.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::DuplicateName(_)
                | Self::UnknownComponent(_)
                | Self::UnknownDependency { .. }
                | Self::StrategyMismatch { .. }
                | Self::CircularDependency { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
