#![forbid(unsafe_code)]

//! Invalidation-driven render scheduler.
//!
//! [`RenderScheduler`] sits between "state changed" and "screen updated".
//! Callers [`invalidate`](RenderScheduler::invalidate) view keys; the
//! scheduler records them in a dirty set and arms exactly one deferred flush.
//! When the flush runs it rebuilds derived state (if `derived` was dirty) and
//! then runs the renderers of the dirty keys in canonical order.
//!
//! # State Machine
//!
//! ```text
//!  Idle ──invalidate──▶ Armed ──deferred task──▶ Flushing ──▶ Idle
//!                         ▲                         │
//!                         └──invalidate during flush┘
//! ```
//!
//! # Invariants
//!
//! 1. `invalidate` is synchronous and never runs a renderer.
//! 2. At most one flush is pending at a time; invalidations issued before it
//!    runs are coalesced into it.
//! 3. A flush clears the arm flag and takes the dirty set *before* any
//!    collaborator runs. A renderer that re-invalidates its own key therefore
//!    arms a new flush instead of being absorbed by (or recursing into) the
//!    current one.
//! 4. Renderers run in canonical order, independent of invalidation order.
//! 5. The derived hook runs at most once per flush and before every renderer.
//! 6. A key with no renderer (other than `derived`) never enters the dirty set.
//! 7. No `RefCell` borrow is held while a renderer, hook or sink runs.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | Unknown key name | diagnostic, key dropped |
//! | Key without renderer | diagnostic (severity by environment), key dropped |
//! | Derived hook error/panic | diagnostic, render phase proceeds |
//! | Renderer error/panic | diagnostic with the key, next key proceeds |
//! | Sink panic | swallowed |

use std::cell::RefCell;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};
use std::time::Duration;

use web_time::Instant;

use crate::config::{ConflictPolicy, SchedulerConfig};
use crate::defer::{Deferral, DeferralKind};
use crate::diagnostics::{self, Diagnostic, DiagnosticSink, Severity, TracingSink};
use crate::environment::{DevProbe, HostInfo, LoopbackProbe};
use crate::error::{RegisterError, RenderError};
use crate::registry::{RegisterOutcome, RenderResult, Renderer, RendererRegistry};
use crate::view_key::{ViewKey, ViewKeySet};

/// Rebuilds derived state before views render. Must tolerate redundant calls.
pub type DerivedHook = Rc<dyn Fn() -> RenderResult>;

/// Counters describing what the scheduler has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Deferred flushes queued on the host.
    pub scheduled: u64,
    /// Flushes that ran while enabled.
    pub flushes: u64,
    /// Flushes that drained the dirty set while disabled.
    pub passive_flushes: u64,
    /// Renderer invocations that succeeded.
    pub renders: u64,
    /// Renderer invocations that failed.
    pub render_failures: u64,
    /// Derived-hook invocations that succeeded.
    pub derived_rebuilds: u64,
    /// Derived-hook invocations that failed.
    pub derived_failures: u64,
    /// Wall time of the most recent enabled flush.
    pub last_flush: Option<Duration>,
}

struct State {
    registry: RendererRegistry,
    dirty: ViewKeySet,
    armed: bool,
    enabled: bool,
    trace: bool,
    stats: FlushStats,
}

struct Inner {
    state: RefCell<State>,
    conflict_policy: ConflictPolicy,
    development: bool,
    sink: Rc<dyn DiagnosticSink>,
    deferral: Rc<dyn Deferral>,
    derived: Option<DerivedHook>,
}

/// Handle to a render scheduler. Cloning shares the same scheduler.
#[derive(Clone)]
pub struct RenderScheduler {
    inner: Rc<Inner>,
}

/// Non-owning handle, for renderers that need to re-invalidate without
/// keeping the scheduler alive.
#[derive(Clone)]
pub struct WeakRenderScheduler {
    inner: Weak<Inner>,
}

impl WeakRenderScheduler {
    /// Upgrade to a strong handle if the scheduler still exists.
    #[must_use]
    pub fn upgrade(&self) -> Option<RenderScheduler> {
        self.inner.upgrade().map(|inner| RenderScheduler { inner })
    }
}

impl fmt::Debug for WeakRenderScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRenderScheduler")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// Assembles a [`RenderScheduler`] from its collaborators.
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    deferral: Rc<dyn Deferral>,
    host: HostInfo,
    probe: Box<dyn DevProbe>,
    sink: Rc<dyn DiagnosticSink>,
    derived: Option<DerivedHook>,
}

impl SchedulerBuilder {
    fn new(deferral: Rc<dyn Deferral>) -> Self {
        Self {
            config: SchedulerConfig::default(),
            deferral,
            host: HostInfo::default(),
            probe: Box::new(LoopbackProbe),
            sink: Rc::new(TracingSink),
            derived: None,
        }
    }

    /// Use `config` instead of the defaults.
    #[must_use]
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Host the application is served from (feeds the development probe).
    #[must_use]
    pub fn host(mut self, host: HostInfo) -> Self {
        self.host = host;
        self
    }

    /// Replace the default [`LoopbackProbe`].
    #[must_use]
    pub fn probe(mut self, probe: impl DevProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Replace the default [`TracingSink`].
    #[must_use]
    pub fn sink(mut self, sink: Rc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Hook invoked when [`ViewKey::Derived`] is dirty at flush time.
    #[must_use]
    pub fn derived_hook(mut self, hook: impl Fn() -> RenderResult + 'static) -> Self {
        self.derived = Some(Rc::new(hook));
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> RenderScheduler {
        let development = self.probe.is_development(&self.host);
        tracing::debug!(
            target: "debtbook::render",
            development,
            deferral = ?self.deferral.kind(),
            enabled = self.config.start_enabled,
            "render scheduler created"
        );
        RenderScheduler {
            inner: Rc::new(Inner {
                state: RefCell::new(State {
                    registry: RendererRegistry::new(),
                    dirty: ViewKeySet::empty(),
                    armed: false,
                    enabled: self.config.start_enabled,
                    trace: self.config.trace,
                    stats: FlushStats::default(),
                }),
                conflict_policy: self.config.conflict_policy,
                development,
                sink: self.sink,
                deferral: self.deferral,
                derived: self.derived,
            }),
        }
    }
}

impl fmt::Debug for SchedulerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerBuilder")
            .field("config", &self.config)
            .field("host", &self.host)
            .field("derived_hook", &self.derived.is_some())
            .finish()
    }
}

impl RenderScheduler {
    /// Start building a scheduler that defers flushes through `deferral`.
    #[must_use]
    pub fn builder(deferral: Rc<dyn Deferral>) -> SchedulerBuilder {
        SchedulerBuilder::new(deferral)
    }

    /// A scheduler with default collaborators.
    #[must_use]
    pub fn new(deferral: Rc<dyn Deferral>) -> Self {
        Self::builder(deferral).build()
    }

    /// A non-owning handle to this scheduler.
    #[must_use]
    pub fn downgrade(&self) -> WeakRenderScheduler {
        WeakRenderScheduler {
            inner: Rc::downgrade(&self.inner),
        }
    }

    // ---------------------------------------------------------------------
    // Registration
    // ---------------------------------------------------------------------

    /// Bind `renderer` as the sole renderer for `key`.
    ///
    /// Registering the same [`Renderer`] again is a no-op. A different
    /// renderer replaces the old one with a warning, or is refused under
    /// [`ConflictPolicy::Reject`].
    ///
    /// # Errors
    ///
    /// - [`RegisterError::ReservedKey`] for [`ViewKey::Derived`].
    /// - [`RegisterError::Conflict`] under [`ConflictPolicy::Reject`].
    pub fn register(
        &self,
        key: ViewKey,
        renderer: Renderer,
    ) -> Result<RegisterOutcome, RegisterError> {
        let result = {
            let mut state = self.inner.state.borrow_mut();
            state
                .registry
                .bind(key, renderer, self.inner.conflict_policy)
        };
        match result {
            Ok(RegisterOutcome::Replaced) => self.diagnose(Diagnostic::DuplicateRegistration {
                key,
                replaced: true,
            }),
            Err(RegisterError::Conflict(key)) => {
                self.diagnose(Diagnostic::DuplicateRegistration {
                    key,
                    replaced: false,
                });
            }
            Err(RegisterError::ReservedKey) => self.diagnose(Diagnostic::ReservedKeyRegistration),
            Ok(RegisterOutcome::Bound | RegisterOutcome::Unchanged) => {}
        }
        result
    }

    /// Wrap `f` as a [`Renderer`] and register it.
    ///
    /// Each call creates a new renderer, so calling this twice for one key
    /// counts as a conflicting registration.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_fn(
        &self,
        key: ViewKey,
        f: impl Fn() -> RenderResult + 'static,
    ) -> Result<RegisterOutcome, RegisterError> {
        self.register(key, Rc::new(f))
    }

    /// Remove the renderer for `key`. Returns whether one was bound.
    ///
    /// A dirty key whose renderer is removed before the flush is skipped.
    pub fn unregister(&self, key: ViewKey) -> bool {
        let removed = self.inner.state.borrow_mut().registry.unbind(key);
        removed.is_some()
    }

    // ---------------------------------------------------------------------
    // Invalidation
    // ---------------------------------------------------------------------

    /// Mark `keys` dirty and arm a deferred flush.
    ///
    /// Keys without a renderer (other than [`ViewKey::Derived`]) are dropped
    /// with a diagnostic. Returns the keys that were accepted. Never renders.
    pub fn invalidate(&self, keys: impl IntoIterator<Item = ViewKey>) -> ViewKeySet {
        let keys: Vec<ViewKey> = keys.into_iter().collect();
        let mut accepted = ViewKeySet::empty();
        let mut unregistered = Vec::new();
        let mut newly_marked = Vec::new();

        let (arm, trace) = {
            let mut state = self.inner.state.borrow_mut();
            for key in keys {
                if !key.is_derived() && !state.registry.contains(key) {
                    if !unregistered.contains(&key) {
                        unregistered.push(key);
                    }
                    continue;
                }
                accepted.mark(key);
                if state.dirty.mark(key) {
                    newly_marked.push(key);
                }
            }
            let arm = !accepted.is_empty() && !state.armed;
            if arm {
                state.armed = true;
                state.stats.scheduled += 1;
            }
            (arm, state.trace)
        };

        let severity = if self.inner.development {
            Severity::Error
        } else {
            Severity::Warn
        };
        for key in unregistered {
            self.diagnose(Diagnostic::UnregisteredKey { key, severity });
        }
        if trace && !newly_marked.is_empty() {
            self.diagnose(Diagnostic::Marked { keys: newly_marked });
        }
        if arm {
            self.schedule_flush();
        }
        accepted
    }

    /// String-keyed [`invalidate`](Self::invalidate). Unknown names are
    /// dropped with a diagnostic.
    pub fn invalidate_named<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> ViewKeySet {
        let mut keys = Vec::new();
        for name in names {
            match ViewKey::from_name(name) {
                Some(key) => keys.push(key),
                None => self.diagnose(Diagnostic::UnknownKey {
                    name: name.to_owned(),
                }),
            }
        }
        if keys.is_empty() {
            return ViewKeySet::empty();
        }
        self.invalidate(keys)
    }

    /// Invalidate derived state and every view with a renderer.
    pub fn invalidate_all(&self) -> ViewKeySet {
        let keys = self.registered() | ViewKeySet::DERIVED;
        self.invalidate(keys.iter_keys())
    }

    // ---------------------------------------------------------------------
    // Enable / disable
    // ---------------------------------------------------------------------

    /// Allow flushes to run the derived hook and renderers.
    pub fn enable(&self) {
        self.inner.state.borrow_mut().enabled = true;
    }

    /// Registration-only mode: flushes drain the dirty set but run nothing.
    pub fn disable(&self) {
        self.inner.state.borrow_mut().enabled = false;
    }

    /// Toggle trace diagnostics at runtime.
    pub fn set_trace(&self, trace: bool) {
        self.inner.state.borrow_mut().trace = trace;
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    /// Whether flushes currently render.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.state.borrow().enabled
    }

    /// Whether a flush is pending.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.inner.state.borrow().armed
    }

    /// Keys awaiting the next flush.
    #[must_use]
    pub fn dirty(&self) -> ViewKeySet {
        self.inner.state.borrow().dirty
    }

    /// Keys with a bound renderer.
    #[must_use]
    pub fn registered(&self) -> ViewKeySet {
        self.inner.state.borrow().registry.keys()
    }

    /// Whether `key` has a bound renderer.
    #[must_use]
    pub fn has_renderer(&self, key: ViewKey) -> bool {
        self.inner.state.borrow().registry.contains(key)
    }

    /// Whether the development probe matched at construction.
    #[must_use]
    pub fn is_development(&self) -> bool {
        self.inner.development
    }

    /// The host primitive flushes are deferred through.
    #[must_use]
    pub fn deferral_kind(&self) -> DeferralKind {
        self.inner.deferral.kind()
    }

    /// Snapshot of the scheduler counters.
    #[must_use]
    pub fn stats(&self) -> FlushStats {
        self.inner.state.borrow().stats
    }

    // ---------------------------------------------------------------------
    // Flush
    // ---------------------------------------------------------------------

    fn schedule_flush(&self) {
        let weak = Rc::downgrade(&self.inner);
        self.inner.deferral.defer(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                RenderScheduler { inner }.flush();
            }
        }));
    }

    fn flush(&self) {
        let started = Instant::now();
        let (snapshot, enabled) = {
            let mut state = self.inner.state.borrow_mut();
            state.armed = false;
            let snapshot = state.dirty.take();
            if !state.enabled {
                state.stats.passive_flushes += 1;
            }
            (snapshot, state.enabled)
        };

        let _span = tracing::debug_span!(
            target: "debtbook::render",
            "render_flush",
            keys = snapshot.bits(),
            enabled
        )
        .entered();

        if !enabled {
            return;
        }

        if snapshot.has(ViewKey::Derived) {
            self.rebuild_derived();
        }

        for key in snapshot.iter_keys().filter(|key| !key.is_derived()) {
            let renderer = self.inner.state.borrow().registry.get(key);
            let Some(renderer) = renderer else {
                continue;
            };
            let result = run_isolated(|| (*renderer)());
            let mut state = self.inner.state.borrow_mut();
            match result {
                Ok(()) => state.stats.renders += 1,
                Err(error) => {
                    state.stats.render_failures += 1;
                    drop(state);
                    self.diagnose(Diagnostic::RenderFailed { key, error });
                }
            }
        }

        let mut state = self.inner.state.borrow_mut();
        state.stats.flushes += 1;
        state.stats.last_flush = Some(started.elapsed());
    }

    fn rebuild_derived(&self) {
        let Some(hook) = self.inner.derived.clone() else {
            tracing::trace!(target: "debtbook::render", "derived dirty but no hook installed");
            return;
        };
        match run_isolated(|| (*hook)()) {
            Ok(()) => self.inner.state.borrow_mut().stats.derived_rebuilds += 1,
            Err(error) => {
                self.inner.state.borrow_mut().stats.derived_failures += 1;
                self.diagnose(Diagnostic::DerivedFailed { error });
            }
        }
    }

    fn diagnose(&self, diagnostic: Diagnostic) {
        diagnostics::emit(self.inner.sink.as_ref(), diagnostic);
    }
}

impl fmt::Debug for RenderScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("RenderScheduler")
            .field("registered", &state.registry.keys())
            .field("dirty", &state.dirty)
            .field("armed", &state.armed)
            .field("enabled", &state.enabled)
            .finish()
    }
}

/// Run a collaborator, turning a panic into a [`RenderError`].
fn run_isolated(f: impl FnOnce() -> RenderResult) -> RenderResult {
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(RenderError::from_panic(payload.as_ref())))
}
