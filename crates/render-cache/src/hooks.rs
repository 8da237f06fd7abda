//! Mutation hooks
//!
//! Observers registered against the cache's mutating operations. Before a
//! mutation runs every hook is asked; any Abort vetoes the operation and
//! the caller sees an ordinary no-op result. After a mutation runs, hooks
//! are notified again.

use crate::matcher::MatchMode;
use std::fmt;

/// A mutating cache operation, as seen by hooks
#[derive(Debug, Clone)]
pub enum CacheEvent<'a> {
    Put {
        group: &'a str,
        name: &'a str,
        ttl_secs: u64,
        keep: bool,
    },
    Extend {
        group: &'a str,
        name: &'a str,
        extra_secs: u64,
    },
    Expire {
        group: &'a str,
        pattern: &'a str,
        mode: MatchMode,
    },
    Purge,
    ClearExpired {
        group: &'a str,
    },
}

/// Whether a before-hook allows the operation to proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDecision {
    Continue,
    Abort,
}

/// Observer of mutating cache operations
pub trait CacheHook: Send + Sync {
    /// Called before the mutation; returning Abort vetoes it
    fn before(&self, event: &CacheEvent<'_>) -> HookDecision {
        let _ = event;
        HookDecision::Continue
    }

    /// Called after the mutation has run (not called when vetoed)
    fn after(&self, event: &CacheEvent<'_>) {
        let _ = event;
    }
}

/// Ordered collection of registered hooks
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Box<dyn CacheHook>>,
}

impl HookRegistry {
    pub fn register(&mut self, hook: Box<dyn CacheHook>) {
        self.hooks.push(hook);
    }

    /// True iff every hook allows the operation
    pub fn allow(&self, event: &CacheEvent<'_>) -> bool {
        self.hooks
            .iter()
            .all(|hook| hook.before(event) == HookDecision::Continue)
    }

    pub fn notify_after(&self, event: &CacheEvent<'_>) {
        for hook in &self.hooks {
            hook.after(event);
        }
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
