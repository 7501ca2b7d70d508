//! # Systems
//!
//! Named per-tick callbacks run by [`Engine::update`](super::Engine::update)
//! in ascending priority order. Systems with the same priority run in the
//! order they were added.

use super::Engine;

/// A system callback. Receives the engine and the tick's delta time in seconds.
pub type SystemFn = Box<dyn FnMut(&mut Engine, f32) + Send>;

struct SystemEntry {
    name: String,
    priority: i32,
    insertion: u64,
    run: SystemFn,
}

/// Ordered set of systems.
#[derive(Default)]
pub struct SystemSet {
    entries: Vec<SystemEntry>,
    next_insertion: u64,
    /// Names removed while the set was detached for a run.
    pending_removals: Vec<String>,
}

impl SystemSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a system. Returns false if the name is taken.
    pub fn add(&mut self, name: &str, priority: i32, run: SystemFn) -> bool {
        if self.contains(name) {
            return false;
        }
        let insertion = self.next_insertion;
        self.next_insertion += 1;
        let entry = SystemEntry {
            name: name.to_string(),
            priority,
            insertion,
            run,
        };
        let position = self
            .entries
            .partition_point(|e| (e.priority, e.insertion) <= (priority, insertion));
        self.entries.insert(position, entry);
        true
    }

    /// Removes a system. Returns false if no system has that name.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.name != name);
        before != self.entries.len()
    }

    /// True if a system with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    /// Number of systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no systems.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// System names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    /// Records a removal requested while this set was detached.
    pub(crate) fn defer_removal(&mut self, name: &str) {
        self.pending_removals.push(name.to_string());
    }

    /// Runs every system once.
    pub(crate) fn run(&mut self, engine: &mut Engine, dt: f32) {
        for entry in &mut self.entries {
            (entry.run)(engine, dt);
        }
    }

    /// Folds systems added and removals requested during a run into `self`.
    pub(crate) fn merge(&mut self, mut added: Self) {
        for name in added.pending_removals.drain(..) {
            self.remove(&name);
        }
        for entry in added.entries {
            self.add(&entry.name, entry.priority, entry.run);
        }
    }
}

impl std::fmt::Debug for SystemSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
