// src/invoke/registry.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::model::ConfigFile;

use super::shell::ShellTask;
use super::{Task, TaskIo};

/// Name → task lookup used in [`RunMode::Task`](crate::types::RunMode::Task).
pub trait TaskRegistry: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Arc<dyn Task>>;
}

/// Default registry: an ordered map of named tasks.
#[derive(Clone, Default)]
pub struct Registry {
    tasks: BTreeMap<String, Arc<dyn Task>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`ShellTask`] per `[task.<name>]` section.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let mut registry = Self::new();
        for (name, task) in cfg.task.iter() {
            registry.register(name.clone(), ShellTask::new(task.cmd.clone()));
        }
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, task: impl Task + 'static) -> &mut Self {
        self.tasks.insert(name.into(), Arc::new(task));
        self
    }

    /// Register a closure. Separate from [`register`](Self::register) so the
    /// closure's argument type can be inferred.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut TaskIo<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(name, f)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl TaskRegistry for Registry {
    fn lookup(&self, name: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(name).cloned()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("tasks", &self.tasks.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_registered_tasks_only() {
        let mut registry = Registry::new();
        registry
            .register_fn("a", |_io| Ok(()))
            .register_fn("b", |_io| Ok(()));

        assert!(registry.lookup("a").is_some());
        assert!(registry.lookup("c").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
    }
}
