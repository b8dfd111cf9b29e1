// src/sched/mod.rs
//
// Forks prioritised worker processes that light one matrix row each.
//
// Every worker inherits the parent's LedMatrix and, with it, the MAP_SHARED
// mapping: all processes write into the same device memory with no locking.
// Each worker owns exactly one row, so stores never collide, but nothing
// orders rows against each other. The join at the end of a round is the only
// synchronisation point.

pub mod priority;
pub mod work;


use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use log::{debug, error, info, trace, warn};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{wait, waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use serde::Serialize;
use thiserror::Error;

use crate::color::Rgb565;
use crate::config::ExperimentConfig;
use crate::device::LedMatrix;
use crate::grid::{GridError, COL_COUNT, ROW_COUNT};
use priority::PriorityControl;
use work::WorkUnit;

/// Exit status of a worker that lit its whole row.
const WORKER_OK: i32 = 0;
/// Exit status of a worker whose body panicked.
const WORKER_PANICKED: i32 = 101;

#[derive(Error, Debug)]
pub enum RoundError {
    #[error("failed to fork worker {worker} of {num_children}: {source}")]
    Spawn {
        worker: usize,
        num_children: usize,
        source: nix::Error,
    },
    #[error("matrix unavailable: {0}")]
    Device(#[from] GridError),
}

/// Outcome of one fork/work/wait/clear cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    pub num_children: usize,
    pub spawned: usize,
    pub joined: usize,
    /// Workers that exited with status 0.
    pub clean_exits: usize,
    /// Worker indices (== rows) in the order they were reaped.
    pub finish_order: Vec<usize>,
}

/// Per-child state owned by the spawning process.
#[derive(Debug, Clone, Copy)]
struct Worker {
    index: usize,
    pid: Pid,
}

/// Creates worker processes.
pub trait Spawner {
    /// Forks the calling process.
    ///
    /// # Safety
    /// Same contract as `nix::unistd::fork`: the child may only run
    /// async-signal-safe code if the parent is multithreaded.
    unsafe fn fork(&self) -> nix::Result<ForkResult>;
}

/// Plain `fork(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFork;

impl Spawner for SystemFork {
    unsafe fn fork(&self) -> nix::Result<ForkResult> {
        unsafe { fork() }
    }
}

/// Drives the rounds of the experiment over a shared [`LedMatrix`].
pub struct Demonstrator<'m, W, P, S = SystemFork> {
    matrix: &'m LedMatrix,
    work: W,
    priority: P,
    color: Rgb565,
    spawner: S,
}

/// Workers of a round that have been forked and not yet reaped.
#[must_use = "a spawned round has to be joined"]
#[derive(Debug)]
pub struct Round {
    num_children: usize,
    workers: HashMap<Pid, Worker>,
}

impl<'m, W: WorkUnit, P: PriorityControl> Demonstrator<'m, W, P> {
    pub fn new(matrix: &'m LedMatrix, work: W, priority: P, color: Rgb565) -> Self {
        Self {
            matrix,
            work,
            priority,
            color,
            spawner: SystemFork,
        }
    }
}

impl<'m, W: WorkUnit, P: PriorityControl, S: Spawner> Demonstrator<'m, W, P, S> {
    /// Replaces the process spawner.
    pub fn with_spawner<T: Spawner>(self, spawner: T) -> Demonstrator<'m, W, P, T> {
        Demonstrator {
            matrix: self.matrix,
            work: self.work,
            priority: self.priority,
            color: self.color,
            spawner,
        }
    }

    /// Runs rounds for 1..=`config.rounds()` workers, in increasing order.
    pub fn run_all(&self, config: &ExperimentConfig) -> Result<Vec<RoundReport>, RoundError> {
        let mut reports = Vec::with_capacity(config.rounds());
        for num_children in 1..=config.rounds() {
            let report = self.run_round(num_children)?;
            info!(
                "Round {}: joined {}/{} workers, finish order {:?}",
                num_children, report.joined, report.spawned, report.finish_order
            );
            if let Ok(json) = serde_json::to_string(&report) {
                debug!("Round report: {}", json);
            }
            reports.push(report);
        }
        Ok(reports)
    }

    /// One full cycle: clear, spawn, join, settle.
    pub fn run_round(&self, num_children: usize) -> Result<RoundReport, RoundError> {
        let round = self.spawn_round(num_children)?;
        let report = round.join();
        self.settle()?;
        Ok(report)
    }

    /// Clears the matrix and forks `num_children` workers, worker `n` owning
    /// row `n`. If a fork fails, siblings already running are killed and
    /// reaped, the matrix is cleared, and the round is abandoned.
    pub fn spawn_round(&self, num_children: usize) -> Result<Round, RoundError> {
        let num_children = num_children.min(ROW_COUNT);
        self.matrix.clear()?;

        let mut round = Round {
            num_children,
            workers: HashMap::with_capacity(num_children),
        };
        for index in 0..num_children {
            match unsafe { self.spawner.fork() } {
                Ok(ForkResult::Parent { child }) => {
                    trace!("Forked worker {} as pid {}", index, child);
                    round.workers.insert(child, Worker { index, pid: child });
                }
                Ok(ForkResult::Child) => self.worker_main(index),
                Err(source) => {
                    error!(
                        "Failed to fork worker {} of {}: {}",
                        index, num_children, source
                    );
                    round.abort();
                    if let Err(e) = self.matrix.clear() {
                        warn!("Could not clear matrix after failed spawn: {}", e);
                    }
                    return Err(RoundError::Spawn {
                        worker: index,
                        num_children,
                        source,
                    });
                }
            }
        }
        debug!("Round {}: all workers spawned", num_children);
        Ok(round)
    }

    /// One work unit in the spawning process, then a clear.
    pub fn settle(&self) -> Result<(), RoundError> {
        self.work.run();
        self.matrix.clear()?;
        Ok(())
    }

    /// Body of a forked worker. Never returns into the caller's code.
    fn worker_main(&self, index: usize) -> ! {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.light_row(index)));
        let status = match outcome {
            Ok(()) => WORKER_OK,
            Err(_) => WORKER_PANICKED,
        };
        // Skip destructors and stdio flushes inherited from the parent.
        unsafe { libc::_exit(status) }
    }

    fn light_row(&self, row: usize) {
        if let Err(e) = self.priority.lower_priority(row) {
            warn!("Worker {}: keeping inherited priority: {:#}", row, e);
        }
        for col in 0..COL_COUNT {
            self.work.run();
            // Bounds violations are reported by set_pixel itself.
            let _ = self.matrix.set_pixel(row, col, self.color);
            trace!("Worker {}: lit column {}", row, col);
        }
    }
}

impl Round {
    pub fn num_children(&self) -> usize {
        self.num_children
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.workers.keys().copied().collect()
    }

    /// Blocks until every worker of the round has exited. Waits for any
    /// child each time; interrupted waits are retried and `ECHILD` ends the
    /// join early.
    pub fn join(mut self) -> RoundReport {
        let spawned = self.workers.len();
        let mut report = RoundReport {
            num_children: self.num_children,
            spawned,
            joined: 0,
            clean_exits: 0,
            finish_order: Vec::with_capacity(spawned),
        };

        while !self.workers.is_empty() {
            let status = match wait() {
                Ok(status) => status,
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => {
                    warn!(
                        "Round {}: no children left to wait for, {} unaccounted",
                        self.num_children,
                        self.workers.len()
                    );
                    self.workers.clear();
                    break;
                }
                Err(e) => {
                    error!("Round {}: wait failed: {}", self.num_children, e);
                    break;
                }
            };

            let (pid, clean) = match status {
                WaitStatus::Exited(pid, code) => (pid, code == WORKER_OK),
                WaitStatus::Signaled(pid, signal, _) => {
                    warn!("Worker pid {} killed by {:?}", pid, signal);
                    (pid, false)
                }
                other => {
                    trace!("Ignoring wait status {:?}", other);
                    continue;
                }
            };

            match self.workers.remove(&pid) {
                Some(worker) => {
                    debug!("Worker {} (pid {}) finished", worker.index, worker.pid);
                    report.joined += 1;
                    if clean {
                        report.clean_exits += 1;
                    }
                    report.finish_order.push(worker.index);
                }
                None => warn!("Reaped pid {} which is not a worker of this round", pid),
            }
        }
        report
    }

    /// Kills and reaps every worker still running.
    pub(crate) fn abort(&mut self) {
        for (pid, worker) in self.workers.drain() {
            if let Err(e) = kill(pid, Some(Signal::SIGKILL)) {
                warn!("Failed to kill worker {} (pid {}): {}", worker.index, pid, e);
            }
            loop {
                match waitpid(pid, None) {
                    Err(Errno::EINTR) => continue,
                    Err(e) => {
                        warn!("Failed to reap worker {} (pid {}): {}", worker.index, pid, e);
                        break;
                    }
                    Ok(_) => break,
                }
            }
        }
    }
}

impl Drop for Round {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            warn!(
                "Round {} dropped with {} workers outstanding, killing them",
                self.num_children,
                self.workers.len()
            );
            self.abort();
        }
    }
}
