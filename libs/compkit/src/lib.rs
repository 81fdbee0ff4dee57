//! # compkit - Declarative Component Lifecycle
//!
//! Registers named components with a lifecycle strategy, validates their
//! dependency graph, starts and stops singletons in dependency order and keeps
//! a per-request instance cache for request-scoped components.
//!
//! ## Features
//!
//! - **Explicit registration**: components are declared on an [`AppBuilder`]
//! - **Validated graph**: unknown dependencies, strategy mismatches and cycles fail before start
//! - **Ordered lifecycle**: singletons start after their dependencies and stop in reverse
//! - **Rollback**: a failed start unwinds everything started so far
//! - **Request scopes**: task-local instance caches released on every exit path
//!
//! ## Basic Example
//!
//! ```rust,ignore
//! use compkit::{component_fn, AppBuilder, ComponentDescriptor, StartArgs};
//! use serde_json::json;
//!
//! let pool = component_fn(|args: StartArgs| async move {
//!     let cfg: PoolConfig = args.bind()?;
//!     Pool::connect(&cfg.dsn).await
//! })
//! .on_stop(|pool: std::sync::Arc<Pool>| async move { pool.close().await });
//!
//! let repo = component_fn(|args: StartArgs| async move {
//!     Ok(UserRepo::new(args.dependency::<Pool>("pool")?))
//! });
//!
//! let app = AppBuilder::new()
//!     .component("pool", ComponentDescriptor::singleton(pool, "database"))
//!     .component("users", ComponentDescriptor::request(repo, "users").depends_on("pool", "pool"))
//!     .build(&json!({ "database": { "dsn": "postgres://..." }, "users": null }))?;
//!
//! app.start().await?;
//! let name = app
//!     .request_scope(async {
//!         let users = app.get::<UserRepo>("users").await?;
//!         users.find_name(42).await
//!     })
//!     .await??;
//! app.stop().await?;
//! ```

pub mod config;
pub mod contracts;
pub mod error;
pub mod fn_component;
pub mod instance;
pub mod registry;
pub mod runtime;
pub mod scope;

pub use config::ConfigProvider;
pub use contracts::{Component, ConfigMap, Handle, StartArgs};
pub use error::{HookFailure, LifecycleError, Result};
pub use fn_component::{component_fn, FnComponent};
pub use instance::Instance;
pub use registry::{ComponentDescriptor, ComponentInfo, ComponentState, Registry, Strategy};
pub use runtime::{run, App, AppBuilder, AppOptions, ShutdownOptions};
pub use scope::RequestScope;
