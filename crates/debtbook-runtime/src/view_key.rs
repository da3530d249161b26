#![forbid(unsafe_code)]

//! The fixed universe of view keys and their canonical execution order.
//!
//! A [`ViewKey`] names one independently re-renderable region of the
//! interface. The set is closed: it is declared once here and never grows at
//! runtime. The declaration order of the enum *is* the canonical order, so
//! there is no parallel table that could drift out of sync.
//!
//! # Invariants
//!
//! 1. [`ViewKey::ALL`] lists every variant exactly once, in declaration order.
//! 2. [`ViewKey::Derived`] is first and is the only reserved key.
//! 3. `ViewKey::ALL[k.ordinal()] == k` for every key `k`.
//! 4. [`ViewKeySet::iter_keys`] always yields keys in canonical order,
//!    regardless of the order they were inserted.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

/// Identifier for one logical view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ViewKey {
    /// Reserved: derived state is stale. Has no renderer; triggers the
    /// derived-state rebuild hook instead.
    Derived = 0,
    /// Debtor overview list.
    DebtorList = 1,
    /// Detail panel for the selected debtor.
    DebtorDetail = 2,
    /// Repayment calendar.
    Calendar = 3,
    /// Overdue/claims monitoring board.
    Monitoring = 4,
    /// Aggregated report view.
    Report = 5,
}

impl ViewKey {
    /// Number of keys in the universe.
    pub const COUNT: usize = 6;

    /// Every key, in canonical execution order.
    pub const ALL: [ViewKey; Self::COUNT] = [
        Self::Derived,
        Self::DebtorList,
        Self::DebtorDetail,
        Self::Calendar,
        Self::Monitoring,
        Self::Report,
    ];

    /// Position of this key in the canonical order.
    #[must_use]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    /// Whether this is the reserved derived-state key.
    #[must_use]
    pub const fn is_derived(self) -> bool {
        matches!(self, Self::Derived)
    }

    /// Stable wire name, as used by string-keyed callers.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Derived => "derived",
            Self::DebtorList => "debtor-list",
            Self::DebtorDetail => "debtor-detail",
            Self::Calendar => "calendar",
            Self::Monitoring => "monitoring",
            Self::Report => "report",
        }
    }

    /// Look up a key by its stable name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.name() == name)
    }

    /// Keys that can carry a renderer (everything except [`ViewKey::Derived`]).
    pub fn renderable() -> impl Iterator<Item = ViewKey> {
        Self::ALL.into_iter().filter(|key| !key.is_derived())
    }

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Membership test for string-keyed callers.
#[must_use]
pub fn is_known_key(name: &str) -> bool {
    ViewKey::from_name(name).is_some()
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A name that is not part of the view-key universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownViewKey(pub String);

impl fmt::Display for UnknownViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown view key: {:?}", self.0)
    }
}

impl std::error::Error for UnknownViewKey {}

impl FromStr for ViewKey {
    type Err = UnknownViewKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownViewKey(s.to_owned()))
    }
}

impl IntoIterator for ViewKey {
    type Item = ViewKey;
    type IntoIter = std::iter::Once<ViewKey>;

    fn into_iter(self) -> Self::IntoIter {
        std::iter::once(self)
    }
}

bitflags! {
    /// A set of view keys, one bit per key at its canonical ordinal.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ViewKeySet: u16 {
        const DERIVED = ViewKey::Derived.bit();
        const DEBTOR_LIST = ViewKey::DebtorList.bit();
        const DEBTOR_DETAIL = ViewKey::DebtorDetail.bit();
        const CALENDAR = ViewKey::Calendar.bit();
        const MONITORING = ViewKey::Monitoring.bit();
        const REPORT = ViewKey::Report.bit();
    }
}

impl ViewKeySet {
    /// Whether `key` is a member.
    #[must_use]
    pub fn has(self, key: ViewKey) -> bool {
        self.contains(Self::from(key))
    }

    /// Add `key`; returns `true` if it was not already present.
    pub fn mark(&mut self, key: ViewKey) -> bool {
        let fresh = !self.has(key);
        self.insert(Self::from(key));
        fresh
    }

    /// Take the current contents, leaving the set empty.
    #[must_use]
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Members in canonical order.
    pub fn iter_keys(self) -> impl Iterator<Item = ViewKey> {
        ViewKey::ALL.into_iter().filter(move |key| self.has(*key))
    }
}

impl From<ViewKey> for ViewKeySet {
    fn from(key: ViewKey) -> Self {
        Self::from_bits_retain(key.bit())
    }
}

impl FromIterator<ViewKey> for ViewKeySet {
    fn from_iter<I: IntoIterator<Item = ViewKey>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |set, key| set | Self::from(key))
    }
}
