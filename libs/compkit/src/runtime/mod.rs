mod app;
mod builder;
mod resolver;
mod runner;
mod shutdown;

pub use app::{App, AppOptions};
pub use builder::AppBuilder;
pub use runner::{run, ShutdownOptions};
pub use shutdown::wait_for_shutdown;
