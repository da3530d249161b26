#![forbid(unsafe_code)]

//! Deferral primitives: how a flush gets scheduled "after the current
//! synchronous work, before the next observable tick".
//!
//! [`Deferral`] is the seam the scheduler depends on. [`HostLoop`] is a
//! single-threaded cooperative loop with the two queues a browser exposes:
//! a microtask queue and a zero-delay timer queue. A microtask checkpoint
//! drains the microtask queue completely (including tasks queued while
//! draining) before the next timer task runs.
//!
//! # Invariants
//!
//! 1. Tasks run in FIFO order within their queue.
//! 2. No queue borrow is held while a task runs, so tasks may enqueue more
//!    tasks.
//! 3. [`HostLoop::preferred_deferral`] returns the microtask queue when the
//!    loop supports it and the timer queue otherwise.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce() + 'static>;

/// Which host primitive a deferral maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferralKind {
    /// Runs at the next microtask checkpoint.
    Microtask,
    /// Runs as a zero-delay timer task.
    Timer,
}

/// Schedules a task to run later on the same thread.
pub trait Deferral {
    /// The host primitive backing this deferral.
    fn kind(&self) -> DeferralKind;

    /// Queue `task`. Must never run it inline.
    fn defer(&self, task: Task);
}

/// Pick the microtask primitive when present, else the timer fallback.
pub fn select_deferral(
    microtask: Option<Rc<dyn Deferral>>,
    fallback: Rc<dyn Deferral>,
) -> Rc<dyn Deferral> {
    microtask.unwrap_or(fallback)
}

struct Queues {
    microtasks: RefCell<VecDeque<Task>>,
    timers: RefCell<VecDeque<Task>>,
    microtasks_supported: bool,
}

impl Queues {
    fn queue(&self, kind: DeferralKind) -> &RefCell<VecDeque<Task>> {
        match kind {
            DeferralKind::Microtask => &self.microtasks,
            DeferralKind::Timer => &self.timers,
        }
    }

    fn pop(&self, kind: DeferralKind) -> Option<Task> {
        self.queue(kind).borrow_mut().pop_front()
    }
}

/// Cooperative single-threaded event loop with microtask and timer queues.
#[derive(Clone)]
pub struct HostLoop {
    queues: Rc<Queues>,
}

impl HostLoop {
    /// A loop with both microtasks and timers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_support(true)
    }

    /// A loop whose host lacks a microtask primitive (timers only).
    #[must_use]
    pub fn without_microtasks() -> Self {
        Self::with_support(false)
    }

    fn with_support(microtasks_supported: bool) -> Self {
        Self {
            queues: Rc::new(Queues {
                microtasks: RefCell::new(VecDeque::new()),
                timers: RefCell::new(VecDeque::new()),
                microtasks_supported,
            }),
        }
    }

    /// The microtask deferral, if this host has one.
    #[must_use]
    pub fn microtask_deferral(&self) -> Option<Rc<dyn Deferral>> {
        self.queues.microtasks_supported.then(|| {
            Rc::new(HostDeferral {
                queues: Rc::clone(&self.queues),
                kind: DeferralKind::Microtask,
            }) as Rc<dyn Deferral>
        })
    }

    /// The zero-delay timer deferral.
    #[must_use]
    pub fn timer_deferral(&self) -> Rc<dyn Deferral> {
        Rc::new(HostDeferral {
            queues: Rc::clone(&self.queues),
            kind: DeferralKind::Timer,
        })
    }

    /// Earliest available primitive: microtasks, falling back to timers.
    #[must_use]
    pub fn preferred_deferral(&self) -> Rc<dyn Deferral> {
        select_deferral(self.microtask_deferral(), self.timer_deferral())
    }

    /// Tasks waiting in the microtask queue.
    #[must_use]
    pub fn pending_microtasks(&self) -> usize {
        self.queues.microtasks.borrow().len()
    }

    /// Tasks waiting in the timer queue.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.queues.timers.borrow().len()
    }

    /// Whether both queues are empty.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending_microtasks() == 0 && self.pending_timers() == 0
    }

    /// Drain the microtask queue, including tasks queued while draining.
    ///
    /// Returns the number of tasks run.
    pub fn run_microtask_checkpoint(&self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.queues.pop(DeferralKind::Microtask) {
            task();
            ran += 1;
        }
        ran
    }

    /// Run the microtasks and timer tasks queued at the time of the call.
    ///
    /// Microtasks queued by those microtasks wait for the next step. Each timer
    /// task is followed by a full microtask checkpoint, so microtasks it queues
    /// run before the next timer task. Timer tasks queued during the step wait
    /// for the next step.
    pub fn step(&self) -> usize {
        let micro = self.pending_microtasks();
        let timers = self.pending_timers();
        let mut ran = 0;
        for _ in 0..micro {
            let Some(task) = self.queues.pop(DeferralKind::Microtask) else {
                break;
            };
            task();
            ran += 1;
        }
        for _ in 0..timers {
            let Some(task) = self.queues.pop(DeferralKind::Timer) else {
                break;
            };
            task();
            ran += 1 + self.run_microtask_checkpoint();
        }
        ran
    }

    /// Run one timer task followed by a microtask checkpoint.
    ///
    /// Returns `false` when no timer task was pending.
    pub fn run_next_timer(&self) -> bool {
        let Some(task) = self.queues.pop(DeferralKind::Timer) else {
            return false;
        };
        task();
        self.run_microtask_checkpoint();
        true
    }

    /// Run until both queues are empty. Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = self.run_microtask_checkpoint();
        while let Some(task) = self.queues.pop(DeferralKind::Timer) {
            task();
            ran += 1 + self.run_microtask_checkpoint();
        }
        ran
    }
}

impl Default for HostLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HostLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostLoop")
            .field("microtasks_supported", &self.queues.microtasks_supported)
            .field("pending_microtasks", &self.pending_microtasks())
            .field("pending_timers", &self.pending_timers())
            .finish()
    }
}

struct HostDeferral {
    queues: Rc<Queues>,
    kind: DeferralKind,
}

impl Deferral for HostDeferral {
    fn kind(&self) -> DeferralKind {
        self.kind
    }

    fn defer(&self, task: Task) {
        self.queues.queue(self.kind).borrow_mut().push_back(task);
    }
}
