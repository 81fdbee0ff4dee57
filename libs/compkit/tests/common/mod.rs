#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use compkit::{Component, StartArgs};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Shared, ordered record of hook invocations ("start:a", "stop:a", ...).
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Names recorded for hook `kind` ("start", "stop", "probe"), in call order.
pub fn events(log: &EventLog, kind: &str) -> Vec<String> {
    let prefix = format!("{kind}:");
    log.lock()
        .iter()
        .filter_map(|e| e.strip_prefix(&prefix).map(str::to_string))
        .collect()
}

/// Poll until `entry` shows up in the log or `limit` elapses.
pub async fn wait_for(log: &EventLog, entry: &str, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if log.lock().iter().any(|e| e == entry) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// An empty config mapping for each key.
pub fn empty_configs(keys: &[&str]) -> HashMap<String, Value> {
    keys.iter().map(|k| (k.to_string(), json!({}))).collect()
}

/// The object a [`Recorder`] produces.
#[derive(Debug)]
pub struct Resource {
    pub name: String,
    pub args: StartArgs,
}

/// Mock component that records every hook call into an [`EventLog`].
#[derive(Clone)]
pub struct Recorder {
    name: String,
    log: EventLog,
    fail_start: Arc<AtomicBool>,
    fail_stop: bool,
    alive: bool,
}

impl Recorder {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            fail_start: Arc::new(AtomicBool::new(false)),
            fail_stop: false,
            alive: true,
        }
    }

    pub fn failing_start(self) -> Self {
        self.fail_start.store(true, Ordering::SeqCst);
        self
    }

    /// Toggle for start failures after the recorder was handed to a builder.
    pub fn start_switch(&self) -> Arc<AtomicBool> {
        self.fail_start.clone()
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn dead(mut self) -> Self {
        self.alive = false;
        self
    }

    fn record(&self, kind: &str) {
        self.log.lock().push(format!("{kind}:{}", self.name));
    }
}

#[async_trait]
impl Component for Recorder {
    type Output = Resource;

    async fn start(&self, args: StartArgs) -> anyhow::Result<Resource> {
        if self.fail_start.load(Ordering::SeqCst) {
            self.record("start-failed");
            anyhow::bail!("{} refused to start", self.name);
        }
        self.record("start");
        Ok(Resource {
            name: self.name.clone(),
            args,
        })
    }

    async fn stop(&self, _obj: Arc<Resource>) -> anyhow::Result<()> {
        self.record("stop");
        if self.fail_stop {
            anyhow::bail!("{} refused to stop", self.name);
        }
        Ok(())
    }

    async fn is_alive(&self, _obj: Arc<Resource>) -> anyhow::Result<bool> {
        self.record("probe");
        Ok(self.alive)
    }
}
