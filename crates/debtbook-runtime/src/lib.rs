#![forbid(unsafe_code)]

//! Render scheduling for the debtbook record manager.
//!
//! The application keeps debtors, loans, claims, repayment schedules and cash
//! events in a state store and shows them through a handful of views. After
//! any mutation, the caller only says *which* views are stale; this crate
//! decides when and in what order they re-render:
//!
//! - [`ViewKey`]: the closed set of views, declared in canonical order, with
//!   the reserved [`ViewKey::Derived`] key for derived-state rebuilds.
//! - [`RendererRegistry`]: one render callback per key.
//! - [`RenderScheduler`]: dirty set, microtask-batched flush, derived-first
//!   execution and per-renderer failure isolation.
//! - [`HostLoop`] / [`Deferral`]: the microtask and timer primitives a flush
//!   is deferred through.
//! - [`DiagnosticSink`]: where absorbed faults are reported (default:
//!   `tracing`).
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use debtbook_runtime::{HostLoop, RenderScheduler, SchedulerConfig, ViewKey};
//!
//! let host = HostLoop::new();
//! let order = Rc::new(RefCell::new(Vec::new()));
//!
//! let log = Rc::clone(&order);
//! let scheduler = RenderScheduler::builder(host.preferred_deferral())
//!     .config(SchedulerConfig::default().start_enabled(true))
//!     .derived_hook(move || {
//!         log.borrow_mut().push("totals");
//!         Ok(())
//!     })
//!     .build();
//!
//! for (key, label) in [(ViewKey::DebtorList, "list"), (ViewKey::Report, "report")] {
//!     let log = Rc::clone(&order);
//!     scheduler
//!         .register_fn(key, move || {
//!             log.borrow_mut().push(label);
//!             Ok(())
//!         })
//!         .unwrap();
//! }
//!
//! scheduler.invalidate([ViewKey::Report, ViewKey::Derived]);
//! scheduler.invalidate(ViewKey::DebtorList);
//! assert!(order.borrow().is_empty());
//!
//! host.run_until_idle();
//! assert_eq!(*order.borrow(), ["totals", "list", "report"]);
//! ```

pub mod config;
pub mod defer;
pub mod diagnostics;
pub mod environment;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod view_key;

pub use config::{ConfigError, ConflictPolicy, SchedulerConfig};
pub use defer::{Deferral, DeferralKind, HostLoop, Task, select_deferral};
pub use diagnostics::{Diagnostic, DiagnosticSink, Severity, TracingSink};
pub use environment::{DevProbe, HostInfo, LoopbackProbe, StaticProbe, is_development_host};
pub use error::{RegisterError, RenderError};
pub use registry::{RegisterOutcome, RenderResult, Renderer, RendererRegistry, renderer};
pub use scheduler::{
    DerivedHook, FlushStats, RenderScheduler, SchedulerBuilder, WeakRenderScheduler,
};
pub use view_key::{UnknownViewKey, ViewKey, ViewKeySet, is_known_key};
