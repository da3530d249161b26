#![forbid(unsafe_code)]

//! Renderer registry: one render callback per view key.
//!
//! # Invariants
//!
//! 1. At most one renderer is bound per key.
//! 2. [`ViewKey::Derived`] never has a renderer.
//! 3. Re-binding the *same* renderer (pointer identity) changes nothing.
//! 4. A *different* renderer is either swapped in or refused, depending on
//!    [`ConflictPolicy`]. Two renderers are never merged.

use std::fmt;
use std::rc::Rc;

use crate::config::ConflictPolicy;
use crate::error::{RegisterError, RenderError};
use crate::view_key::{ViewKey, ViewKeySet};

/// Result of running a renderer or the derived hook.
pub type RenderResult = Result<(), RenderError>;

/// A shared render callback. Identity is the `Rc` allocation, so clone the
/// same `Renderer` to re-register it idempotently.
pub type Renderer = Rc<dyn Fn() -> RenderResult>;

/// Wrap a closure as a [`Renderer`].
pub fn renderer(f: impl Fn() -> RenderResult + 'static) -> Renderer {
    Rc::new(f)
}

/// What a successful registration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The key had no renderer; it now has this one.
    Bound,
    /// This exact renderer was already bound.
    Unchanged,
    /// A different renderer was replaced.
    Replaced,
}

/// Fixed-size map from view key to renderer.
#[derive(Default)]
pub struct RendererRegistry {
    slots: [Option<Renderer>; ViewKey::COUNT],
}

impl RendererRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `renderer` to `key` under `policy`.
    ///
    /// # Errors
    ///
    /// - [`RegisterError::ReservedKey`] for [`ViewKey::Derived`].
    /// - [`RegisterError::Conflict`] when a different renderer is bound and
    ///   `policy` is [`ConflictPolicy::Reject`].
    pub fn bind(
        &mut self,
        key: ViewKey,
        renderer: Renderer,
        policy: ConflictPolicy,
    ) -> Result<RegisterOutcome, RegisterError> {
        if key.is_derived() {
            return Err(RegisterError::ReservedKey);
        }
        let slot = &mut self.slots[key.ordinal()];
        let outcome = match slot.as_ref() {
            None => RegisterOutcome::Bound,
            Some(existing) if Rc::ptr_eq(existing, &renderer) => {
                return Ok(RegisterOutcome::Unchanged);
            }
            Some(_) if policy == ConflictPolicy::Reject => {
                return Err(RegisterError::Conflict(key));
            }
            Some(_) => RegisterOutcome::Replaced,
        };
        *slot = Some(renderer);
        Ok(outcome)
    }

    /// Remove the renderer for `key`, returning it if one was bound.
    pub fn unbind(&mut self, key: ViewKey) -> Option<Renderer> {
        self.slots[key.ordinal()].take()
    }

    /// The renderer bound to `key`, cloned out so it can run without a
    /// borrow of the registry.
    #[must_use]
    pub fn get(&self, key: ViewKey) -> Option<Renderer> {
        self.slots[key.ordinal()].clone()
    }

    /// Whether `key` has a renderer.
    #[must_use]
    pub fn contains(&self, key: ViewKey) -> bool {
        self.slots[key.ordinal()].is_some()
    }

    /// Keys with a bound renderer.
    #[must_use]
    pub fn keys(&self) -> ViewKeySet {
        ViewKey::ALL
            .into_iter()
            .filter(|key| self.contains(*key))
            .collect()
    }

    /// Number of bound renderers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether no renderer is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Renderer {
        renderer(|| Ok(()))
    }

    #[test]
    fn bind_then_get() {
        let mut reg = RendererRegistry::new();
        let r = noop();
        assert_eq!(
            reg.bind(ViewKey::Calendar, Rc::clone(&r), ConflictPolicy::Replace),
            Ok(RegisterOutcome::Bound)
        );
        let got = reg.get(ViewKey::Calendar).unwrap();
        assert!(Rc::ptr_eq(&got, &r));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.keys(), ViewKeySet::CALENDAR);
    }

    #[test]
    fn same_renderer_is_unchanged() {
        let mut reg = RendererRegistry::new();
        let r = noop();
        reg.bind(ViewKey::Report, Rc::clone(&r), ConflictPolicy::Reject)
            .unwrap();
        assert_eq!(
            reg.bind(ViewKey::Report, r, ConflictPolicy::Reject),
            Ok(RegisterOutcome::Unchanged)
        );
    }

    #[test]
    fn different_renderer_replaces_under_replace() {
        let mut reg = RendererRegistry::new();
        let first = noop();
        let second = noop();
        reg.bind(ViewKey::Report, first, ConflictPolicy::Replace)
            .unwrap();
        assert_eq!(
            reg.bind(ViewKey::Report, Rc::clone(&second), ConflictPolicy::Replace),
            Ok(RegisterOutcome::Replaced)
        );
        assert!(Rc::ptr_eq(&reg.get(ViewKey::Report).unwrap(), &second));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn different_renderer_refused_under_reject() {
        let mut reg = RendererRegistry::new();
        let first = noop();
        reg.bind(ViewKey::Monitoring, Rc::clone(&first), ConflictPolicy::Reject)
            .unwrap();
        assert_eq!(
            reg.bind(ViewKey::Monitoring, noop(), ConflictPolicy::Reject),
            Err(RegisterError::Conflict(ViewKey::Monitoring))
        );
        assert!(Rc::ptr_eq(&reg.get(ViewKey::Monitoring).unwrap(), &first));
    }

    #[test]
    fn derived_is_reserved() {
        let mut reg = RendererRegistry::new();
        assert_eq!(
            reg.bind(ViewKey::Derived, noop(), ConflictPolicy::Replace),
            Err(RegisterError::ReservedKey)
        );
        assert!(reg.is_empty());
    }

    #[test]
    fn unbind_removes() {
        let mut reg = RendererRegistry::new();
        reg.bind(ViewKey::DebtorList, noop(), ConflictPolicy::Replace)
            .unwrap();
        assert!(reg.unbind(ViewKey::DebtorList).is_some());
        assert!(reg.unbind(ViewKey::DebtorList).is_none());
        assert!(!reg.contains(ViewKey::DebtorList));
    }
}
