//! Freshness validators
//!
//! A validator decides whether a value read from a storage tier may be served.
//! Closures `Fn(&str, &T) -> bool` are validators too.

use crate::context;
use crate::journal::Journal;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Predicate over a cached value
pub trait Validator<T>: Send + Sync {
    fn validate(&self, key: &str, item: &T) -> bool;

    /// Validate on behalf of a request whose context owns `journal`
    fn validate_in(&self, key: &str, item: &T, _journal: Option<&Journal>) -> bool {
        self.validate(key, item)
    }

    /// Whether this validator reads the fetch journal. Requests using one
    /// record a journal entry after every successful fetch.
    fn is_age_based(&self) -> bool {
        false
    }
}

impl<T, F> Validator<T> for F
where
    F: Fn(&str, &T) -> bool + Send + Sync,
{
    fn validate(&self, key: &str, item: &T) -> bool {
        self(key, item)
    }
}

/// Accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysValid;

impl<T> Validator<T> for AlwaysValid {
    fn validate(&self, _key: &str, _item: &T) -> bool {
        true
    }
}

/// Time-to-live validator backed by the journal
///
/// Data with no journal entry is considered valid. Otherwise it is valid
/// while `last_fetch + ttl >= now`.
#[derive(Debug, Clone)]
pub struct AgeValidator {
    ttl: Duration,
    journal: Option<Arc<Journal>>,
}

impl AgeValidator {
    /// Validator reading the journal of the request's context
    ///
    /// Used outside a request, it reads the journal of the current context.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, journal: None }
    }

    /// Validator reading a specific journal
    pub fn with_journal(journal: Arc<Journal>, ttl: Duration) -> Self {
        Self {
            ttl,
            journal: Some(journal),
        }
    }

    pub fn minutes(minutes: u64) -> Self {
        Self::new(Duration::from_secs(minutes.saturating_mul(60)))
    }

    pub fn hours(hours: u64) -> Self {
        Self::new(Duration::from_secs(hours.saturating_mul(60 * 60)))
    }

    pub fn days(days: u64) -> Self {
        Self::new(Duration::from_secs(days.saturating_mul(24 * 60 * 60)))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, key: &str, journal: Option<&Journal>) -> bool {
        let Some(journal) = self.journal.as_deref().or(journal) else {
            return true;
        };
        let Some(last_fetch) = journal.read(key) else {
            return true;
        };

        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        match last_fetch.checked_add_signed(ttl) {
            Some(expires_at) => expires_at >= Utc::now(),
            None => true,
        }
    }
}

impl<T> Validator<T> for AgeValidator {
    fn validate(&self, key: &str, _item: &T) -> bool {
        let current = context::current().and_then(|ctx| ctx.journal());
        self.is_fresh(key, current.as_deref())
    }

    fn validate_in(&self, key: &str, _item: &T, journal: Option<&Journal>) -> bool {
        self.is_fresh(key, journal)
    }

    fn is_age_based(&self) -> bool {
        true
    }
}
