#![forbid(unsafe_code)]

//! Deterministic test harness for the debtbook render scheduler.
//!
//! [`Harness`] wires a [`RenderScheduler`] to a [`HostLoop`], a
//! [`RecordingSink`] and a [`Journal`], so a test can drive invalidations,
//! turn the loop, and then assert on exactly what ran and what was reported.
//!
//! # Usage
//!
//! ```
//! use debtbook_harness::{Event, Harness};
//! use debtbook_runtime::ViewKey;
//!
//! let h = Harness::builder().enabled(true).build();
//! h.register_recording([ViewKey::DebtorList, ViewKey::Calendar]);
//!
//! h.scheduler.invalidate([ViewKey::Calendar, ViewKey::DebtorList]);
//! h.run();
//!
//! assert_eq!(
//!     h.journal.events(),
//!     vec![Event::Render(ViewKey::DebtorList), Event::Render(ViewKey::Calendar)]
//! );
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use debtbook_runtime::{
    Diagnostic, DiagnosticSink, HostInfo, HostLoop, RenderError, RenderScheduler, Renderer,
    SchedulerConfig, Severity, StaticProbe, ViewKey, renderer,
};

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// A [`DiagnosticSink`] that keeps every diagnostic for later inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: RefCell<Vec<Diagnostic>>,
}

impl RecordingSink {
    /// A fresh, shareable sink.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Everything recorded so far, in emission order.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.entries.borrow().clone()
    }

    /// Diagnostics at exactly `severity`.
    #[must_use]
    pub fn at(&self, severity: Severity) -> Vec<Diagnostic> {
        self.entries
            .borrow()
            .iter()
            .filter(|d| d.severity() == severity)
            .cloned()
            .collect()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, diagnostic: &Diagnostic) {
        self.entries.borrow_mut().push(diagnostic.clone());
    }
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// One observable step of a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The derived-state hook ran.
    Derived,
    /// The renderer for a key ran.
    Render(ViewKey),
}

/// Shared log of hook and renderer invocations.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Rc<RefCell<Vec<Event>>>,
}

impl Journal {
    /// An empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `event`.
    pub fn push(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    /// Render events only, as keys.
    #[must_use]
    pub fn rendered(&self) -> Vec<ViewKey> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Render(key) => Some(*key),
                Event::Derived => None,
            })
            .collect()
    }

    /// How many times `key` rendered.
    #[must_use]
    pub fn renders_of(&self, key: ViewKey) -> usize {
        self.rendered().into_iter().filter(|k| *k == key).count()
    }

    /// How many times the derived hook ran.
    #[must_use]
    pub fn derived_runs(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| **e == Event::Derived)
            .count()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    /// A renderer that records [`Event::Render`] for `key`.
    #[must_use]
    pub fn recorder(&self, key: ViewKey) -> Renderer {
        let journal = self.clone();
        renderer(move || {
            journal.push(Event::Render(key));
            Ok(())
        })
    }

    /// A renderer that records its call and then fails with `message`.
    #[must_use]
    pub fn failing(&self, key: ViewKey, message: &'static str) -> Renderer {
        let journal = self.clone();
        renderer(move || {
            journal.push(Event::Render(key));
            Err(RenderError::new(message))
        })
    }

    /// A renderer that records its call and then panics with `message`.
    #[must_use]
    pub fn panicking(&self, key: ViewKey, message: &'static str) -> Renderer {
        let journal = self.clone();
        renderer(move || {
            journal.push(Event::Render(key));
            panic!("{message}");
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// How the harness' derived hook behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DerivedBehavior {
    /// Record [`Event::Derived`] and succeed.
    #[default]
    Succeed,
    /// Record [`Event::Derived`] and return an error.
    Fail,
    /// Record [`Event::Derived`] and panic.
    Panic,
}

/// Builder for [`Harness`].
#[derive(Debug, Clone, Default)]
pub struct HarnessBuilder {
    config: SchedulerConfig,
    development: bool,
    timers_only: bool,
    derived: DerivedBehavior,
}

impl HarnessBuilder {
    /// Start with rendering enabled or in registration-only mode.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.start_enabled = enabled;
        self
    }

    /// Replace the scheduler config wholesale.
    #[must_use]
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Pin the development probe.
    #[must_use]
    pub fn development(mut self, development: bool) -> Self {
        self.development = development;
        self
    }

    /// Simulate a host without a microtask primitive.
    #[must_use]
    pub fn timers_only(mut self) -> Self {
        self.timers_only = true;
        self
    }

    /// Choose how the derived hook behaves.
    #[must_use]
    pub fn derived(mut self, behavior: DerivedBehavior) -> Self {
        self.derived = behavior;
        self
    }

    /// Assemble the harness.
    #[must_use]
    pub fn build(self) -> Harness {
        let host = if self.timers_only {
            HostLoop::without_microtasks()
        } else {
            HostLoop::new()
        };
        let sink = RecordingSink::new();
        let journal = Journal::new();
        let hook_journal = journal.clone();
        let behavior = self.derived;
        let scheduler = RenderScheduler::builder(host.preferred_deferral())
            .config(self.config)
            .host(HostInfo::new("debtbook.test", "https:"))
            .probe(StaticProbe(self.development))
            .sink(Rc::clone(&sink) as Rc<dyn DiagnosticSink>)
            .derived_hook(move || {
                hook_journal.push(Event::Derived);
                match behavior {
                    DerivedBehavior::Succeed => Ok(()),
                    DerivedBehavior::Fail => Err(RenderError::new("derived totals unavailable")),
                    DerivedBehavior::Panic => panic!("derived totals exploded"),
                }
            })
            .build();
        Harness {
            host,
            scheduler,
            sink,
            journal,
        }
    }
}

/// A scheduler wired to a deterministic host loop and recording collaborators.
#[derive(Debug)]
pub struct Harness {
    /// The cooperative loop flushes are deferred onto.
    pub host: HostLoop,
    /// The scheduler under test.
    pub scheduler: RenderScheduler,
    /// Every diagnostic the scheduler emitted.
    pub sink: Rc<RecordingSink>,
    /// Every hook and renderer invocation.
    pub journal: Journal,
}

impl Harness {
    /// Start building a harness.
    #[must_use]
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Register a journal recorder for each of `keys`.
    ///
    /// # Panics
    ///
    /// If any key refuses the renderer (e.g. [`ViewKey::Derived`]).
    pub fn register_recording(&self, keys: impl IntoIterator<Item = ViewKey>) {
        for key in keys {
            if let Err(err) = self.scheduler.register(key, self.journal.recorder(key)) {
                panic!("registering {key} failed: {err}");
            }
        }
    }

    /// Register recorders for every renderable key.
    pub fn register_all(&self) {
        self.register_recording(ViewKey::renderable());
    }

    /// Drive the host loop until idle. Returns the number of tasks run.
    pub fn run(&self) -> usize {
        self.host.run_until_idle()
    }

    /// Run only the tasks queued right now.
    pub fn step(&self) -> usize {
        self.host.step()
    }

    /// Deferred flushes currently queued on either host queue.
    #[must_use]
    pub fn pending_flushes(&self) -> usize {
        self.host.pending_microtasks() + self.host.pending_timers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_counts() {
        let j = Journal::new();
        j.push(Event::Derived);
        j.push(Event::Render(ViewKey::Report));
        j.push(Event::Render(ViewKey::Report));
        assert_eq!(j.derived_runs(), 1);
        assert_eq!(j.renders_of(ViewKey::Report), 2);
        assert_eq!(j.rendered(), vec![ViewKey::Report, ViewKey::Report]);
        j.clear();
        assert!(j.events().is_empty());
    }

    #[test]
    fn recording_sink_filters_by_severity() {
        let sink = RecordingSink::new();
        sink.emit(&Diagnostic::UnknownKey { name: "x".into() });
        sink.emit(&Diagnostic::Marked {
            keys: vec![ViewKey::Calendar],
        });
        assert_eq!(sink.at(Severity::Warn).len(), 1);
        assert_eq!(sink.at(Severity::Info).len(), 1);
        assert!(sink.at(Severity::Error).is_empty());
        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn builder_defaults_are_passive() {
        let h = Harness::builder().build();
        assert!(!h.scheduler.is_enabled());
        assert!(!h.scheduler.is_development());
    }
}
