//! Subscription filtering
//!
//! `SubscriptionFilter` decides which samples of a published batch a session
//! receives. Lookups are O(1) on the sample's signal id.

use std::collections::HashSet;

use tsp_protocol::{Measurement, SubscribeRequest};
use uuid::Uuid;

/// Set of signals a session subscribed to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubscriptionFilter {
    /// Every signal
    #[default]
    All,
    /// Only the listed signals
    Signals(HashSet<Uuid>),
}

impl SubscriptionFilter {
    /// Filter over the listed signals (an empty list means every signal)
    pub fn from_signals(ids: impl IntoIterator<Item = Uuid>) -> Self {
        let ids: HashSet<Uuid> = ids.into_iter().collect();
        if ids.is_empty() {
            Self::All
        } else {
            Self::Signals(ids)
        }
    }

    #[inline]
    pub fn matches(&self, signal_id: &Uuid) -> bool {
        match self {
            Self::All => true,
            Self::Signals(ids) => ids.contains(signal_id),
        }
    }

    /// Number of listed signals (`None` for all)
    pub fn signal_count(&self) -> Option<usize> {
        match self {
            Self::All => None,
            Self::Signals(ids) => Some(ids.len()),
        }
    }
}

/// An active subscription: which signals, and whether NaN samples were
/// asked to be dropped
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Subscription {
    pub filter: SubscriptionFilter,
    pub filter_nan: bool,
}

impl Subscription {
    pub fn from_request(request: &SubscribeRequest) -> Self {
        Self {
            filter: SubscriptionFilter::from_signals(request.signal_ids.iter().copied()),
            filter_nan: request.filter_nan,
        }
    }

    /// Human-readable summary for responses and logs
    pub fn describe(&self) -> String {
        match self.filter.signal_count() {
            None => "subscribed to all signals".to_string(),
            Some(1) => "subscribed to 1 signal".to_string(),
            Some(n) => format!("subscribed to {n} signals"),
        }
    }
}

/// Publisher-wide NaN policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NanPolicy {
    /// Per-session requests are honored
    pub allowed: bool,
    /// NaN samples are dropped for every session
    pub forced: bool,
}

impl NanPolicy {
    /// Whether NaN samples are dropped for a session with this subscription
    #[inline]
    pub fn drops_nan(&self, subscription: &Subscription) -> bool {
        self.forced || (self.allowed && subscription.filter_nan)
    }

    /// Select the samples of a batch this subscription receives
    pub fn select<'a>(
        &self,
        subscription: &Subscription,
        batch: &'a [Measurement],
    ) -> Vec<&'a Measurement> {
        let drop_nan = self.drops_nan(subscription);
        batch
            .iter()
            .filter(|m| subscription.filter.matches(&m.signal_id()))
            .filter(|m| !(drop_nan && m.is_nan()))
            .collect()
    }
}
