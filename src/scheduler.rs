//! Scheduler: bounded worker pool, dispatch, deadline sweep, reaping.
//!
//! The parent is single-threaded and cooperative with respect to children
//! via kernel IPC; the only reason job slots sit behind `RefCell` here
//! rather than being owned outright is that the signal handler installed by
//! [`crate::signal`] needs to reach `terminate_all` through a shared
//! reference it stashes as a raw pointer.

use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant};

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::binder::BoundTest;
use crate::job::ForkingJob;
use crate::options::Options;
use crate::result::TestResult;
use crate::results::Results;
use crate::signal;

/// Owns the pool of `ForkingJob` slots and drives tests from the bound-test
/// list into them until every test is accounted for.
pub struct Scheduler<'a> {
    options: &'a Options,
    tests: &'a [BoundTest],
    next_index: Cell<usize>,
    jobs: Vec<RefCell<ForkingJob>>,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        options: &'a Options,
        tests: &'a [BoundTest],
    ) -> Result<Self, crate::error::PartestError> {
        let mut jobs = Vec::with_capacity(options.jobs);
        for slot in 0..options.jobs {
            let job = ForkingJob::new(slot as u32)
                .map_err(crate::error::PartestError::SharedCellExhausted)?;
            jobs.push(RefCell::new(job));
        }
        Ok(Scheduler {
            options,
            tests,
            next_index: Cell::new(0),
            jobs,
        })
    }

    /// Advances past disabled-and-recorded tests until it hands `slot` a
    /// real test to run, or the list is exhausted (`None`).
    fn next_test(&self, slot: usize, results: &mut Results) -> Option<&'a BoundTest> {
        loop {
            let i = self.next_index.get();
            self.next_index.set(i + 1);
            let bound = self.tests.get(i)?;
            results.inc(bound.enabled);
            if !bound.enabled {
                results.record(TestResult::disabled(bound));
                continue;
            }
            self.jobs[slot].borrow_mut().run(bound, self.options);
            return Some(bound);
        }
    }

    /// Sends `TERM`/`KILL` to every in-flight child. Called by the signal
    /// arbiter when an interactive termination signal arrives.
    pub fn terminate_all(&self) {
        for job in &self.jobs {
            job.borrow_mut().terminate();
        }
    }

    /// Runs every bound test to completion and records each into `results`.
    pub fn run(&self, results: &mut Results) -> Result<(), crate::error::PartestError> {
        signal::takeover(self)?;

        let mut current: Vec<Option<&'a BoundTest>> =
            (0..self.jobs.len()).map(|slot| self.next_test(slot, results)).collect();

        while !results.done() {
            signal::child_wait(Duration::from_millis(10));

            for job in &self.jobs {
                job.borrow_mut().flush_pipes();
            }

            loop {
                match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                    Ok(WaitStatus::StillAlive) | Err(_) => break,
                    Ok(status) => {
                        let pid = match status.pid() {
                            Some(pid) => pid,
                            None => continue,
                        };
                        let slot = self
                            .jobs
                            .iter()
                            .position(|j| j.borrow().pid() == Some(pid.as_raw()));
                        match slot {
                            Some(slot) => {
                                if let Some(bound) = current[slot] {
                                    let result = self.jobs[slot].borrow_mut().cleanup_status(
                                        bound,
                                        self.options,
                                        status,
                                    );
                                    results.record(result);
                                    current[slot] = self.next_test(slot, results);
                                }
                            }
                            None => {
                                return Err(crate::error::PartestError::ChildNotFound(
                                    pid.as_raw(),
                                ));
                            }
                        }
                    }
                }
            }

            let now = Instant::now();
            for (slot, bound) in current.clone().into_iter().enumerate() {
                let Some(bound) = bound else { continue };
                let timed_out = self.jobs[slot].borrow_mut().check_timeout(now);
                if timed_out {
                    let result = self.jobs[slot].borrow_mut().timed_out_result(bound);
                    results.record(result);
                    current[slot] = self.next_test(slot, results);
                }
            }
        }

        signal::reset();
        Ok(())
    }
}
