//! Subscription registry.
//!
//! Tracks one [`Subscription`] per canonical subject. The canonical key
//! (deterministic serialized subject) is the only map key; a `Subject` is
//! never keyed by its display name.

use crate::subscription::{Subscription, SubscriptionState};
use dashmap::DashMap;
use tether_protocol::{Message, MessageId, Subject};
use thiserror::Error;
use tracing::debug;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Synchronous read against a subject with no subscription.
    #[error("Not subscribed to subject: {0}")]
    NotSubscribed(String),
}

/// Canonical-subject-keyed subscription tracking.
#[derive(Debug, Default)]
pub struct Registry {
    subscriptions: DashMap<String, Subscription>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending subscription.
    ///
    /// Returns `false` if a subscription (pending or active) already exists
    /// for this canonical subject.
    pub fn insert_pending(&self, subject: Subject) -> bool {
        let key = subject.canonical_key();
        if self.subscriptions.contains_key(&key) {
            return false;
        }
        debug!(subject = %subject.name, "Subscription registered");
        self.subscriptions.insert(key, Subscription::new(subject));
        true
    }

    /// Flip a pending subscription to active.
    pub fn activate(&self, subject: &Subject) {
        if let Some(mut sub) = self.subscriptions.get_mut(&subject.canonical_key()) {
            sub.activate();
        }
    }

    /// Remove a subscription entirely (unsubscribe or subscribe rejection).
    pub fn remove(&self, subject: &Subject) -> Option<Subscription> {
        let removed = self
            .subscriptions
            .remove(&subject.canonical_key())
            .map(|(_, sub)| sub);
        if removed.is_some() {
            debug!(subject = %subject.name, "Subscription removed");
        }
        removed
    }

    /// Whether any subscription exists for this subject.
    #[must_use]
    pub fn contains(&self, subject: &Subject) -> bool {
        self.subscriptions.contains_key(&subject.canonical_key())
    }

    /// State of the subscription for this subject, if any.
    #[must_use]
    pub fn state(&self, subject: &Subject) -> Option<SubscriptionState> {
        self.subscriptions
            .get(&subject.canonical_key())
            .map(|sub| sub.state())
    }

    /// Run `f` against the subscription for `subject`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotSubscribed`] if no subscription exists.
    pub fn with<R>(
        &self,
        subject: &Subject,
        f: impl FnOnce(&Subscription) -> R,
    ) -> Result<R, RegistryError> {
        self.subscriptions
            .get(&subject.canonical_key())
            .map(|sub| f(&sub))
            .ok_or_else(|| RegistryError::NotSubscribed(subject.name.clone()))
    }

    /// Run `f` against the subscription for `subject`, mutably.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotSubscribed`] if no subscription exists.
    pub fn with_mut<R>(
        &self,
        subject: &Subject,
        f: impl FnOnce(&mut Subscription) -> R,
    ) -> Result<R, RegistryError> {
        self.subscriptions
            .get_mut(&subject.canonical_key())
            .map(|mut sub| f(&mut sub))
            .ok_or_else(|| RegistryError::NotSubscribed(subject.name.clone()))
    }

    /// Snapshot of every active subscription's subject and resume cursor,
    /// for resubscription after a reconnect.
    #[must_use]
    pub fn resume_points(&self) -> Vec<(Subject, Option<MessageId>)> {
        self.subscriptions
            .iter()
            .filter(|entry| entry.state() == SubscriptionState::Active && !entry.subject().local)
            .map(|entry| (entry.subject().clone(), entry.last_id()))
            .collect()
    }

    /// Drain every tracked pin across all subscriptions (disconnect).
    /// Local subjects keep theirs; they are not bound to the channel.
    #[must_use]
    pub fn take_all_pins(&self) -> Vec<Message> {
        let mut pins = Vec::new();
        for mut entry in self.subscriptions.iter_mut() {
            if entry.subject().local {
                continue;
            }
            pins.extend(entry.take_pins());
        }
        pins
    }

    /// Number of tracked subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_pending_idempotent() {
        let registry = Registry::new();
        assert!(registry.insert_pending("chat".into()));
        assert!(!registry.insert_pending("chat".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_acl_subjects_are_distinct() {
        let registry = Registry::new();
        assert!(registry.insert_pending("chat".into()));
        assert!(registry.insert_pending(Subject::new("chat").readable_only_by("p1")));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_reads_before_subscribe_fail() {
        let registry = Registry::new();
        let err = registry.with(&"chat".into(), |sub| sub.messages().len());
        assert!(matches!(err, Err(RegistryError::NotSubscribed(_))));
    }

    #[test]
    fn test_resume_points_skip_pending_and_local() {
        let registry = Registry::new();
        registry.insert_pending("active".into());
        registry.activate(&"active".into());
        registry.insert_pending("pending".into());
        registry.insert_pending(Subject::new("scratch").local());
        registry.activate(&Subject::new("scratch").local());

        let points = registry.resume_points();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].0.name, "active");
        assert_eq!(points[0].1, None);
    }

    #[test]
    fn test_take_all_pins() {
        let registry = Registry::new();
        registry.insert_pending("a".into());
        registry.insert_pending("b".into());
        registry
            .with_mut(&"a".into(), |sub| {
                sub.insert_pin(Message::local("a".into(), json!("p1")));
            })
            .unwrap();
        registry
            .with_mut(&"b".into(), |sub| {
                sub.insert_pin(Message::local("b".into(), json!("p2")));
            })
            .unwrap();

        assert_eq!(registry.take_all_pins().len(), 2);
        assert_eq!(registry.take_all_pins().len(), 0);
    }
}
