//! GC root tracking
//!
//! Roots are the starting points of marking:
//! - Handle-scope values (the stack part, truncated when a scope closes)
//! - Global roots (well-known objects that live as long as the runtime)

use crate::value::Value;

/// Root set for garbage collection
///
/// Stack roots behave like a handle-scope stack: a scope remembers the depth
/// when it opens and truncates back to it when it closes.
pub struct RootSet {
    /// Values rooted by open handle scopes
    stack_roots: Vec<Value>,

    /// Values rooted for the runtime's whole lifetime
    global_roots: Vec<Value>,
}

impl RootSet {
    /// Create a new root set
    pub fn new() -> Self {
        Self {
            stack_roots: Vec::new(),
            global_roots: Vec::new(),
        }
    }

    /// Root a value in the innermost scope. Non-heap values are ignored.
    pub fn add_stack_root(&mut self, value: Value) {
        if value.is_heap_allocated() {
            self.stack_roots.push(value);
        }
    }

    /// Root a value for the runtime's lifetime
    pub fn add_global_root(&mut self, value: Value) {
        if value.is_heap_allocated() {
            self.global_roots.push(value);
        }
    }

    /// Current height of the scope stack
    pub fn stack_depth(&self) -> usize {
        self.stack_roots.len()
    }

    /// Drop every stack root above `depth`
    pub fn truncate_stack(&mut self, depth: usize) {
        self.stack_roots.truncate(depth);
    }

    /// Iterate over all roots
    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        self.stack_roots
            .iter()
            .chain(self.global_roots.iter())
            .copied()
    }

    /// Get total number of roots
    pub fn len(&self) -> usize {
        self.stack_roots.len() + self.global_roots.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RootSet {
    fn default() -> Self {
        Self::new()
    }
}
