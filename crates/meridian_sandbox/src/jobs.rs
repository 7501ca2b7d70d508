//! # Pending Jobs
//!
//! Continuations a scene schedules during a call. Ready jobs run in the drain
//! step right after the call returns; delayed jobs become ready once the
//! scene clock reaches their tick. Disposing the sandbox drops the queue.

use std::collections::VecDeque;

/// FIFO queue of ready jobs plus tick-delayed jobs.
#[derive(Debug)]
pub struct JobQueue<J> {
    ready: VecDeque<J>,
    /// (due tick, insertion order, job), unsorted.
    delayed: Vec<(u64, u64, J)>,
    next_seq: u64,
}

impl<J> Default for JobQueue<J> {
    fn default() -> Self {
        Self::new()
    }
}

impl<J> JobQueue<J> {
    /// Creates an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            delayed: Vec::new(),
            next_seq: 0,
        }
    }

    /// Schedules `job` for the next drain.
    pub fn push_ready(&mut self, job: J) {
        self.ready.push_back(job);
    }

    /// Schedules `job` for the first drain at or after `due_tick`.
    pub fn push_after(&mut self, due_tick: u64, job: J) {
        self.delayed.push((due_tick, self.next_seq, job));
        self.next_seq += 1;
    }

    /// True if a drain at `now` would run something.
    #[must_use]
    pub fn has_ready(&self, now: u64) -> bool {
        !self.ready.is_empty() || self.delayed.iter().any(|(due, _, _)| *due <= now)
    }

    /// Removes and returns every job runnable at `now`: due delayed jobs
    /// first (by due tick, then scheduling order), then ready jobs in FIFO order.
    pub fn take_ready(&mut self, now: u64) -> Vec<J> {
        let mut due = Vec::new();
        let mut i = 0;
        while i < self.delayed.len() {
            if self.delayed[i].0 <= now {
                due.push(self.delayed.swap_remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by_key(|(tick, seq, _)| (*tick, *seq));

        let mut jobs: Vec<J> = due.into_iter().map(|(_, _, job)| job).collect();
        jobs.extend(self.ready.drain(..));
        jobs
    }

    /// Puts jobs taken by [`JobQueue::take_ready`] but not run back at the
    /// front of the ready queue, keeping their order.
    pub fn requeue(&mut self, jobs: impl IntoIterator<Item = J>) {
        let mut jobs: Vec<J> = jobs.into_iter().collect();
        while let Some(job) = jobs.pop() {
            self.ready.push_front(job);
        }
    }

    /// Ready plus delayed jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ready.len() + self.delayed.len()
    }

    /// True if nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every job, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.len();
        self.ready.clear();
        self.delayed.clear();
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_jobs_fifo() {
        let mut queue = JobQueue::new();
        queue.push_ready(1);
        queue.push_ready(2);
        assert!(queue.has_ready(0));
        assert_eq!(queue.take_ready(0), vec![1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_delayed_jobs_wait_for_their_tick() {
        let mut queue = JobQueue::new();
        queue.push_after(5, "late");
        queue.push_after(3, "early");
        queue.push_after(3, "early-second");
        queue.push_ready("now");

        assert_eq!(queue.take_ready(2), vec!["now"]);
        assert!(!queue.has_ready(2));
        assert_eq!(queue.take_ready(4), vec!["early", "early-second"]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.take_ready(9), vec!["late"]);
    }

    #[test]
    fn test_requeue_runs_before_newer_jobs() {
        let mut queue = JobQueue::new();
        queue.push_ready(1);
        queue.push_ready(2);
        queue.push_ready(3);
        let mut taken = queue.take_ready(0).into_iter();
        assert_eq!(taken.next(), Some(1));

        queue.push_ready(4);
        queue.requeue(taken);
        assert_eq!(queue.take_ready(0), vec![2, 3, 4]);
    }

    #[test]
    fn test_clear_reports_discarded() {
        let mut queue = JobQueue::new();
        queue.push_ready(());
        queue.push_after(10, ());
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }
}
