// src/sched/work.rs

//! CPU-bound work units burned between pixel writes.

use std::hint::black_box;

/// An opaque piece of CPU work.
pub trait WorkUnit {
    fn run(&self);
}

impl<F: Fn()> WorkUnit for F {
    fn run(&self) {
        self()
    }
}

/// Sums `0..iterations`, hidden from the optimiser so the loop really runs.
#[derive(Debug, Clone, Copy)]
pub struct BusyLoop {
    pub iterations: u64,
}

impl BusyLoop {
    pub fn new(iterations: u64) -> Self {
        Self { iterations }
    }

    fn burn(&self) -> u64 {
        let mut acc: u64 = 0;
        for i in 0..black_box(self.iterations) {
            acc = black_box(acc.wrapping_add(i));
        }
        acc
    }
}

impl WorkUnit for BusyLoop {
    fn run(&self) {
        black_box(self.burn());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test_log::test]
    fn busy_loop_sums_its_range() {
        assert_eq!(BusyLoop::new(0).burn(), 0);
        assert_eq!(BusyLoop::new(5).burn(), 10);
        assert_eq!(BusyLoop::new(1000).burn(), 499_500);
    }

    #[test_log::test]
    fn closures_are_work_units() {
        let calls = Cell::new(0);
        let unit = || calls.set(calls.get() + 1);
        unit.run();
        unit.run();
        assert_eq!(calls.get(), 2);
    }
}
