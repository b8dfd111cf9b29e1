// src/sched/priority.rs

//! Scheduling priority control for worker processes.
//!
//! Workers call [`PriorityControl::lower_priority`] on themselves right after
//! the fork, with a weight proportional to their index. Higher weight means
//! lower priority, so worker 0 keeps the highest priority of its round.

use anyhow::{Context, Result};
use nix::errno::Errno;

/// Capability to lower the calling process's scheduling priority.
pub trait PriorityControl {
    /// Lowers the calling process's priority by `weight` steps. A weight of 0
    /// leaves the priority unchanged.
    fn lower_priority(&self, weight: usize) -> Result<()>;
}

/// Uses `nice(2)`: worker `n` ends up `n * step` nice levels below the parent.
#[derive(Debug, Clone, Copy)]
pub struct NicePriority {
    step: i32,
}

impl NicePriority {
    pub fn new(step: i32) -> Self {
        Self { step: step.max(0) }
    }

    pub fn increment_for(&self, weight: usize) -> i32 {
        (weight as i32).saturating_mul(self.step)
    }
}

impl Default for NicePriority {
    fn default() -> Self {
        Self::new(1)
    }
}

impl PriorityControl for NicePriority {
    fn lower_priority(&self, weight: usize) -> Result<()> {
        let increment = self.increment_for(weight);
        if increment == 0 {
            return Ok(());
        }
        // nice() can legitimately return -1, so errno is the only failure signal.
        Errno::clear();
        let niceness = unsafe { libc::nice(increment) };
        if niceness == -1 && Errno::last_raw() != 0 {
            return Err(Errno::last()).with_context(|| format!("nice({}) failed", increment));
        }
        log::debug!(
            "NicePriority: pid {} now at nice {}",
            std::process::id(),
            niceness
        );
        Ok(())
    }
}

/// Leaves the inherited priority alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct InheritPriority;

impl PriorityControl for InheritPriority {
    fn lower_priority(&self, _weight: usize) -> Result<()> {
        Ok(())
    }
}
