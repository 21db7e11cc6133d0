// Path request queue and the worker that drains it.
//
// Requests go into a FIFO queue shared with a single worker. At most one
// queued job exists per requester: submitting again for a requester whose
// job has not been picked up yet replaces that job in place (it keeps its
// queue position). A job the worker has already taken runs to completion;
// deciding whether its result is still wanted happens at delivery, in
// `navigator.rs`, by comparing ticket numbers.
//
// Two modes (`WorkerMode`):
// - Background: one `std::thread` blocks on a `Condvar` until the queue
//   has work, runs the search under a read lock on the shared `NavWorld`,
//   and sends the result down an `mpsc` channel. Searches are serial
//   because there is only one worker; tile edits take the write lock, so
//   an edit never overlaps a search.
// - Inline: nothing runs until `run_pending_inline()`, which drains the
//   queue on the caller's thread. Results go through the same channel.
//
// Shutdown: dropping the `PathWorker` sets the queue's shutdown flag, wakes
// the thread, and joins it.
//
// See also: `navigator.rs` which owns the worker and delivers results,
// `planner.rs` for the search itself.

use crate::config::WorkerMode;
use crate::navigator::NavWorld;
use crate::planner::{PathError, PlanQuery, plan_path};
use crate::types::{RequesterId, Waypoint};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

/// One queued search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Job {
    pub ticket: u64,
    pub requester: RequesterId,
    pub query: PlanQuery,
}

/// A completed search, waiting for delivery.
#[derive(Clone, Debug, PartialEq)]
pub struct Finished {
    pub ticket: u64,
    pub requester: RequesterId,
    pub result: Result<Vec<Waypoint>, PathError>,
}

/// What `PathWorker::submit` did with a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submitted {
    Queued,
    /// Replaced the requester's earlier job, which never ran.
    Replaced { ticket: u64 },
}

#[derive(Default)]
struct Queue {
    jobs: VecDeque<Job>,
    shutdown: bool,
}

type Shared = Arc<(Mutex<Queue>, Condvar)>;

pub struct PathWorker {
    mode: WorkerMode,
    shared: Shared,
    world: Arc<RwLock<NavWorld>>,
    results_tx: Sender<Finished>,
    results_rx: Receiver<Finished>,
    thread: Option<JoinHandle<()>>,
}

impl PathWorker {
    pub fn new(world: Arc<RwLock<NavWorld>>, mode: WorkerMode) -> Self {
        let shared: Shared = Arc::new((Mutex::new(Queue::default()), Condvar::new()));
        let (results_tx, results_rx) = mpsc::channel();

        let thread = match mode {
            WorkerMode::Background => {
                let shared = Arc::clone(&shared);
                let world = Arc::clone(&world);
                let tx = results_tx.clone();
                Some(thread::spawn(move || worker_loop(shared, world, tx)))
            }
            WorkerMode::Inline => None,
        };

        Self {
            mode,
            shared,
            world,
            results_tx,
            results_rx,
            thread,
        }
    }

    pub fn mode(&self) -> WorkerMode {
        self.mode
    }

    /// Queue `job`, replacing any job for the same requester that has not
    /// started yet. Never blocks on a running search.
    pub fn submit(&self, job: Job) -> Submitted {
        let (_, cvar) = &*self.shared;
        let outcome = {
            let mut queue = self.lock_queue();
            match queue.jobs.iter_mut().find(|j| j.requester == job.requester) {
                Some(slot) => {
                    let ticket = slot.ticket;
                    *slot = job;
                    Submitted::Replaced { ticket }
                }
                None => {
                    queue.jobs.push_back(job);
                    Submitted::Queued
                }
            }
        };
        cvar.notify_one();
        outcome
    }

    /// Drop the requester's queued job. Returns false if none was queued
    /// (it may already be running).
    pub fn cancel(&self, requester: RequesterId) -> bool {
        let mut queue = self.lock_queue();
        let before = queue.jobs.len();
        queue.jobs.retain(|j| j.requester != requester);
        queue.jobs.len() != before
    }

    /// Jobs waiting to be picked up.
    pub fn queued(&self) -> usize {
        self.lock_queue().jobs.len()
    }

    /// Run every queued job on the calling thread. Does nothing in
    /// background mode unless the worker thread has died, in which case the
    /// queue is drained here so no request goes unanswered.
    pub fn run_pending_inline(&mut self) -> usize {
        if self.mode == WorkerMode::Background {
            if !self.thread.as_ref().is_some_and(JoinHandle::is_finished) {
                return 0;
            }
            if let Some(handle) = self.thread.take()
                && handle.join().is_err()
            {
                log::warn!("path worker thread panicked; running queued searches inline");
            }
            self.mode = WorkerMode::Inline;
        }

        let jobs: Vec<Job> = self.lock_queue().jobs.drain(..).collect();
        for job in &jobs {
            let finished = run_job(&self.world, job);
            // The receiver lives in `self`, so this cannot fail.
            let _ = self.results_tx.send(finished);
        }
        jobs.len()
    }

    /// Results completed since the last call, in completion order.
    pub fn drain_finished(&self) -> Vec<Finished> {
        self.results_rx.try_iter().collect()
    }

    fn lock_queue(&self) -> MutexGuard<'_, Queue> {
        self.shared.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PathWorker {
    fn drop(&mut self) {
        {
            let (lock, cvar) = &*self.shared;
            lock.lock().unwrap_or_else(PoisonError::into_inner).shutdown = true;
            cvar.notify_all();
        }
        if let Some(handle) = self.thread.take()
            && handle.join().is_err()
        {
            log::warn!("path worker thread panicked");
        }
    }
}

fn worker_loop(shared: Shared, world: Arc<RwLock<NavWorld>>, tx: Sender<Finished>) {
    let (lock, cvar) = &*shared;
    loop {
        let job = {
            let mut queue = lock.lock().unwrap_or_else(PoisonError::into_inner);
            loop {
                if queue.shutdown {
                    return;
                }
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                queue = cvar.wait(queue).unwrap_or_else(PoisonError::into_inner);
            }
        };
        let finished = run_job(&world, &job);
        if tx.send(finished).is_err() {
            return;
        }
    }
}

fn run_job(world: &RwLock<NavWorld>, job: &Job) -> Finished {
    let world = world.read().unwrap_or_else(PoisonError::into_inner);
    let result = plan_path(&world.graph, &world.config, &job.query);
    if let Err(e) = &result {
        log::debug!("path for {} (ticket {}) failed: {e}", job.requester, job.ticket);
    }
    Finished {
        ticket: job.ticket,
        requester: job.requester,
        result,
    }
}
