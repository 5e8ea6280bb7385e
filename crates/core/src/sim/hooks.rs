//! Lifecycle hook registry, grounded on `hooks_manager.cc`'s
//! `HooksManager::registerHook`/`callHooks`: named points a driver calls at
//! fixed moments in a run, with any number of callbacks registered against
//! each. Trimmed to the points this engine's scope actually reaches —
//! instrumentation-mode transitions and magic-marker hooks belong to the
//! out-of-scope instrumentation front-end (spec §1 non-goals).

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;

use crate::common::CoreId;

/// One of the lifecycle points [`super::Simulator`] fires hooks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookType {
    /// Fired once before any core thread starts.
    SimStart,
    /// Fired once after every core thread and the MCP have finished.
    SimEnd,
    /// Fired when a core's magic interface marks the region-of-interest start.
    RoiBegin,
    /// Fired when a core's magic interface marks the region-of-interest end.
    RoiEnd,
    /// Fired when a core's clock frequency changes via the magic interface.
    CpufreqChange,
}

/// The argument passed to a hook callback.
#[derive(Debug, Clone, Copy)]
pub enum HookArg {
    /// No argument.
    None,
    /// The core that triggered the hook.
    Core(CoreId),
    /// A `CpufreqChange` hook's new frequency.
    Mhz {
        /// The core whose clock changed.
        core: CoreId,
        /// The new frequency, in MHz.
        mhz: u32,
    },
}

type Callback = Box<dyn Fn(HookArg) + Send + Sync>;

/// A registry of callbacks per [`HookType`].
#[derive(Default)]
pub struct HooksManager {
    callbacks: Mutex<HashMap<HookType, Vec<Callback>>>,
}

impl fmt::Debug for HooksManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HooksManager").finish_non_exhaustive()
    }
}

impl HooksManager {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` to run every time `hook` fires, in addition to
    /// any callback already registered for it.
    pub fn register(&self, hook: HookType, callback: impl Fn(HookArg) + Send + Sync + 'static) {
        self.callbacks.lock().entry(hook).or_default().push(Box::new(callback));
    }

    /// Invokes every callback registered for `hook`, in registration order.
    /// A hook with no registered callback is a silent no-op, matching
    /// `callHooks` on an empty list.
    pub fn call(&self, hook: HookType, arg: HookArg) {
        if let Some(callbacks) = self.callbacks.lock().get(&hook) {
            for callback in callbacks {
                callback(arg);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn registered_callback_fires_once_per_call() {
        let hooks = HooksManager::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&count);
        hooks.register(HookType::SimStart, move |_| {
            counted.fetch_add(1, Ordering::Relaxed);
        });
        hooks.call(HookType::SimStart, HookArg::None);
        hooks.call(HookType::SimStart, HookArg::None);
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn unregistered_hook_is_a_silent_no_op() {
        let hooks = HooksManager::new();
        hooks.call(HookType::RoiBegin, HookArg::Core(CoreId::new(0)));
    }

    #[test]
    fn two_callbacks_on_the_same_hook_both_fire() {
        let hooks = HooksManager::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let counted = Arc::clone(&count);
            hooks.register(HookType::RoiEnd, move |_| {
                counted.fetch_add(1, Ordering::Relaxed);
            });
        }
        hooks.call(HookType::RoiEnd, HookArg::None);
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }
}
