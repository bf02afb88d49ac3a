//! Waiting for the collector
//!
//! Losing the last reference to a value does not finalize it on the spot.
//! Code that depends on collection polls: end the turn, run a pass, check,
//! and give up after a fixed number of attempts.

use tether_engine::Runtime;

use crate::error::{BridgeError, BridgeResult};
use crate::instance_data::InstanceData;
use crate::options::DEFAULT_GC_POLL_ATTEMPTS;

/// Bounded collection poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcPoller {
    max_attempts: usize,
}

impl Default for GcPoller {
    fn default() -> Self {
        Self::new(DEFAULT_GC_POLL_ATTEMPTS)
    }
}

impl GcPoller {
    /// A poller making at most `max_attempts` passes
    pub fn new(max_attempts: usize) -> Self {
        Self { max_attempts }
    }

    /// A poller using the attempt budget the bridge was initialized with
    pub fn for_runtime(rt: &Runtime) -> Self {
        match InstanceData::get(rt) {
            Ok(data) => Self::new(data.options().gc_poll_attempts),
            Err(_) => Self::default(),
        }
    }

    /// Maximum number of passes
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Yield, collect and check `condition` until it holds. Returns the
    /// attempt on which it held; finalizers from the last pass have run by
    /// the time `condition` is checked.
    pub fn poll<F>(&self, rt: &mut Runtime, mut condition: F) -> BridgeResult<usize>
    where
        F: FnMut(&mut Runtime) -> bool,
    {
        for attempt in 1..=self.max_attempts {
            rt.yield_turn();
            rt.collect_garbage();
            rt.yield_turn();
            if rt.scope(|rt| condition(rt)) {
                log::debug!("gc poll satisfied after {} attempt(s)", attempt);
                return Ok(attempt);
            }
        }
        log::debug!("gc poll gave up after {} attempts", self.max_attempts);
        Err(BridgeError::PollTimeout {
            attempts: self.max_attempts,
        })
    }
}

/// Poll with the runtime's configured budget until `condition` holds
pub fn gc_until<F>(rt: &mut Runtime, condition: F) -> BridgeResult<usize>
where
    F: FnMut(&mut Runtime) -> bool,
{
    GcPoller::for_runtime(rt).poll(rt, condition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use tether_engine::RuntimeOptions;

    #[test]
    fn test_observes_deferred_finalizer() {
        let mut rt = Runtime::with_options(RuntimeOptions::manual_gc());
        let collected = Rc::new(Cell::new(false));
        rt.scope(|rt| {
            let obj = rt.create_object();
            let flag = Rc::clone(&collected);
            rt.add_finalizer(obj, move |_| flag.set(true)).unwrap();
        });

        let attempt = gc_until(&mut rt, |_| collected.get()).unwrap();
        assert_eq!(attempt, 1);
    }

    #[test]
    fn test_gives_up() {
        let mut rt = Runtime::with_options(RuntimeOptions::manual_gc());
        let err = GcPoller::new(3).poll(&mut rt, |_| false).unwrap_err();
        assert_eq!(err, BridgeError::PollTimeout { attempts: 3 });
        assert_eq!(err.to_string(), "GC failure");
        assert!(rt.gc_stats().collections >= 3);
    }
}
