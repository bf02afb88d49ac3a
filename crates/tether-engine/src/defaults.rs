//! Default constants for runtime configuration.

/// Allocations between automatic collections.
pub const DEFAULT_GC_THRESHOLD: usize = 8192;

/// Whether finalizers wait for the next turn instead of running at the end
/// of the collection pass that reclaimed their object.
pub const DEFAULT_DEFER_FINALIZERS: bool = true;
