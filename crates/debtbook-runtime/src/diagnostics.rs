#![forbid(unsafe_code)]

//! Structured diagnostics emitted by the scheduler.
//!
//! Every non-fatal fault the scheduler absorbs is turned into a
//! [`Diagnostic`] and handed to the injected [`DiagnosticSink`]. The default
//! sink, [`TracingSink`], forwards to `tracing`; tests use a recording sink.
//!
//! # Failure Modes
//!
//! | Condition | Diagnostic | Severity |
//! |-----------|------------|----------|
//! | Unknown key name | [`Diagnostic::UnknownKey`] | warn |
//! | Known key, no renderer | [`Diagnostic::UnregisteredKey`] | error in development, warn otherwise |
//! | Different renderer for a bound key | [`Diagnostic::DuplicateRegistration`] | warn |
//! | Renderer offered for `derived` | [`Diagnostic::ReservedKeyRegistration`] | warn |
//! | Derived hook failed | [`Diagnostic::DerivedFailed`] | error |
//! | Renderer failed | [`Diagnostic::RenderFailed`] | error |
//! | Trace mode, keys marked | [`Diagnostic::Marked`] | info |
//!
//! A sink that panics is contained by [`emit`]; diagnostics never take the
//! scheduler down.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::error::RenderError;
use crate::view_key::ViewKey;

/// Log level attached to a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Routine trace output.
    Info,
    /// Something was dropped or replaced; rendering continues.
    Warn,
    /// A renderer or hook failed, or a key was misused in development.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        })
    }
}

/// One scheduler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A key name outside the view-key universe was submitted.
    UnknownKey { name: String },
    /// A known key with no registered renderer was invalidated and dropped.
    UnregisteredKey { key: ViewKey, severity: Severity },
    /// A different renderer replaced (or was refused for) a bound key.
    DuplicateRegistration { key: ViewKey, replaced: bool },
    /// Someone tried to bind a renderer to the reserved derived key.
    ReservedKeyRegistration,
    /// The derived-state rebuild hook failed.
    DerivedFailed { error: RenderError },
    /// A renderer failed; later keys still ran.
    RenderFailed { key: ViewKey, error: RenderError },
    /// Trace mode: keys newly marked dirty by one `invalidate` call, in
    /// submission order.
    Marked { keys: Vec<ViewKey> },
}

impl Diagnostic {
    /// Severity this diagnostic should be logged at.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::UnknownKey { .. }
            | Self::DuplicateRegistration { .. }
            | Self::ReservedKeyRegistration => Severity::Warn,
            Self::UnregisteredKey { severity, .. } => *severity,
            Self::DerivedFailed { .. } | Self::RenderFailed { .. } => Severity::Error,
            Self::Marked { .. } => Severity::Info,
        }
    }

    /// The view key this diagnostic concerns, if any.
    #[must_use]
    pub fn key(&self) -> Option<ViewKey> {
        match self {
            Self::UnregisteredKey { key, .. }
            | Self::DuplicateRegistration { key, .. }
            | Self::RenderFailed { key, .. } => Some(*key),
            Self::ReservedKeyRegistration | Self::DerivedFailed { .. } => {
                Some(ViewKey::Derived)
            }
            Self::UnknownKey { .. } | Self::Marked { .. } => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKey { name } => write!(f, "ignoring unknown view key {name:?}"),
            Self::UnregisteredKey { key, .. } => {
                write!(f, "view key '{key}' invalidated but no renderer is registered")
            }
            Self::DuplicateRegistration { key, replaced: true } => {
                write!(f, "renderer for '{key}' replaced by a different renderer")
            }
            Self::DuplicateRegistration {
                key,
                replaced: false,
            } => write!(f, "refused a second renderer for '{key}'"),
            Self::ReservedKeyRegistration => write!(
                f,
                "'{}' is rebuilt by the derived hook and takes no renderer",
                ViewKey::Derived
            ),
            Self::DerivedFailed { error } => write!(f, "derived-state rebuild failed: {error}"),
            Self::RenderFailed { key, error } => write!(f, "renderer '{key}' failed: {error}"),
            Self::Marked { keys } => {
                f.write_str("marked dirty:")?;
                for key in keys {
                    write!(f, " {key}")?;
                }
                Ok(())
            }
        }
    }
}

/// Destination for scheduler diagnostics.
pub trait DiagnosticSink {
    /// Record one diagnostic.
    fn emit(&self, diagnostic: &Diagnostic);
}

/// Default sink: forwards every diagnostic to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: &Diagnostic) {
        let key = diagnostic.key().map(ViewKey::name).unwrap_or("-");
        match diagnostic.severity() {
            Severity::Info => tracing::info!(target: "debtbook::render", key, "{diagnostic}"),
            Severity::Warn => tracing::warn!(target: "debtbook::render", key, "{diagnostic}"),
            Severity::Error => tracing::error!(target: "debtbook::render", key, "{diagnostic}"),
        }
    }
}

/// Deliver `diagnostic` to `sink`, swallowing any panic raised by the sink.
pub(crate) fn emit(sink: &dyn DiagnosticSink, diagnostic: Diagnostic) {
    let _ = catch_unwind(AssertUnwindSafe(|| sink.emit(&diagnostic)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    struct PanickingSink;

    impl DiagnosticSink for PanickingSink {
        fn emit(&self, _: &Diagnostic) {
            panic!("sink exploded");
        }
    }

    #[test]
    fn unregistered_severity_is_carried() {
        let dev = Diagnostic::UnregisteredKey {
            key: ViewKey::Calendar,
            severity: Severity::Error,
        };
        let prod = Diagnostic::UnregisteredKey {
            key: ViewKey::Calendar,
            severity: Severity::Warn,
        };
        assert_eq!(dev.severity(), Severity::Error);
        assert_eq!(prod.severity(), Severity::Warn);
        assert_eq!(dev.key(), Some(ViewKey::Calendar));
    }

    #[test]
    fn failures_are_errors() {
        let d = Diagnostic::RenderFailed {
            key: ViewKey::Report,
            error: RenderError::new("x"),
        };
        assert_eq!(d.severity(), Severity::Error);
        assert_eq!(d.to_string(), "renderer 'report' failed: x");
    }

    #[test]
    fn marked_lists_keys_in_order() {
        let d = Diagnostic::Marked {
            keys: vec![ViewKey::Report, ViewKey::DebtorList],
        };
        assert_eq!(d.to_string(), "marked dirty: report debtor-list");
        assert_eq!(d.severity(), Severity::Info);
        assert_eq!(d.key(), None);
    }

    #[test]
    fn panicking_sink_is_contained() {
        emit(
            &PanickingSink,
            Diagnostic::UnknownKey {
                name: "nope".into(),
            },
        );
    }

    #[derive(Clone, Default)]
    struct Captured {
        events: Arc<Mutex<Vec<(tracing::Level, Option<String>)>>>,
    }

    struct KeyVisitor(Option<String>);

    impl tracing::field::Visit for KeyVisitor {
        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            if field.name() == "key" {
                self.0 = Some(value.to_owned());
            }
        }

        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
            if field.name() == "key" {
                self.0 = Some(format!("{value:?}"));
            }
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for Captured {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            let mut visitor = KeyVisitor(None);
            event.record(&mut visitor);
            self.events
                .lock()
                .unwrap()
                .push((*event.metadata().level(), visitor.0));
        }
    }

    #[test]
    fn tracing_sink_logs_at_diagnostic_severity() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry().with(captured.clone());
        tracing::subscriber::with_default(subscriber, || {
            TracingSink.emit(&Diagnostic::DerivedFailed {
                error: RenderError::new("stale totals"),
            });
            TracingSink.emit(&Diagnostic::UnregisteredKey {
                key: ViewKey::Calendar,
                severity: Severity::Warn,
            });
            TracingSink.emit(&Diagnostic::Marked {
                keys: vec![ViewKey::Derived],
            });
        });

        let events = captured.events.lock().unwrap();
        let levels: Vec<_> = events.iter().map(|(level, _)| *level).collect();
        assert_eq!(
            levels,
            vec![tracing::Level::ERROR, tracing::Level::WARN, tracing::Level::INFO]
        );
        assert_eq!(events[1].1.as_deref(), Some("calendar"));
    }
}
