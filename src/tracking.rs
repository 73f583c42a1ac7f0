//! Instance tracking for cascade disposal
//!
//! Every non-singleton instance the resolver constructs gets a node in a
//! tree rooted at the call that produced it (singletons root at their
//! registering container). Disposing a node releases its children first, in
//! reverse insertion order, so transitive transients never outlive their
//! consumer.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::container::DisposeHook;
use crate::registry::Instance;

pub(crate) type TrackedRef = Arc<Tracked>;

/// One node in the disposal tree.
///
/// Nodes are created *before* their constructor runs and filled afterwards;
/// a node that never fills marks a failed construction whose completed
/// children still need disposal.
pub(crate) struct Tracked {
    service: String,
    instance: OnceCell<Instance>,
    children: Mutex<Vec<TrackedRef>>,
    disposed: AtomicBool,
}

impl Tracked {
    pub fn new(service: &str) -> TrackedRef {
        Arc::new(Self {
            service: service.to_string(),
            instance: OnceCell::new(),
            children: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Record the constructed instance. Only the first fill sticks.
    pub fn fill(&self, instance: Instance) {
        let _ = self.instance.set(instance);
    }

    /// Append a child. Tracking is append-only during construction; nodes
    /// only leave the tree through [`Tracked::detach`].
    pub fn adopt(&self, child: TrackedRef) {
        self.children.lock().push(child);
    }

    pub fn adopt_all(&self, nodes: Vec<TrackedRef>) {
        if !nodes.is_empty() {
            self.children.lock().extend(nodes);
        }
    }

    fn holds(&self, instance: &Instance) -> bool {
        self.instance
            .get()
            .map(|own| Arc::ptr_eq(own, instance))
            .unwrap_or(false)
    }

    /// Depth-first search of this subtree for the node holding `instance`.
    pub fn find(&self, instance: &Instance) -> Option<TrackedRef> {
        for child in self.children.lock().iter() {
            if child.holds(instance) {
                return Some(child.clone());
            }
            if let Some(found) = child.find(instance) {
                return Some(found);
            }
        }
        None
    }

    /// Remove and return the node holding `instance` from this subtree.
    pub fn detach(&self, instance: &Instance) -> Option<TrackedRef> {
        let mut children = self.children.lock();
        if let Some(position) = children.iter().position(|child| child.holds(instance)) {
            return Some(children.remove(position));
        }
        for child in children.iter() {
            if let Some(found) = child.detach(instance) {
                return Some(found);
            }
        }
        None
    }

    /// Dispose this subtree: children in reverse insertion order, then the
    /// node's own instance. Idempotent. Hook failures are collected into
    /// `errors` so the traversal always completes.
    pub fn dispose(&self, hook: Option<&DisposeHook>, errors: &mut Vec<String>) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let children: Vec<TrackedRef> = {
            let mut guard = self.children.lock();
            guard.drain(..).collect()
        };
        for child in children.iter().rev() {
            child.dispose(hook, errors);
        }
        if let (Some(instance), Some(hook)) = (self.instance.get(), hook) {
            if let Err(err) = hook(instance, &self.service) {
                errors.push(format!("{}: {}", self.service, err));
            }
        }
    }
}
