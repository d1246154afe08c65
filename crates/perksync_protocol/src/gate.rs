//! Verification gates.
//!
//! A gate decides whether a candidate value may be held by a user. Gates are
//! pure: they read the context and the candidate and mutate neither, so the
//! server may evaluate them outside of any store lock.

use crate::key::UserKey;
use crate::perk::Perk;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// Identity and entitlement facts for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationContext {
    user: UserKey,
    entitlements: BTreeSet<String>,
    tier: u8,
}

impl VerificationContext {
    /// Creates a context with no entitlements and tier zero.
    pub fn new(user: UserKey) -> Self {
        Self {
            user,
            entitlements: BTreeSet::new(),
            tier: 0,
        }
    }

    /// Adds a named entitlement.
    pub fn with_entitlement(mut self, name: impl Into<String>) -> Self {
        self.entitlements.insert(name.into());
        self
    }

    /// Sets the supporter tier.
    pub fn with_tier(mut self, tier: u8) -> Self {
        self.tier = tier;
        self
    }

    /// The user these facts describe.
    pub fn user(&self) -> UserKey {
        self.user
    }

    /// Returns true if the user holds the named entitlement.
    pub fn has_entitlement(&self, name: &str) -> bool {
        self.entitlements.contains(name)
    }

    /// Iterates the user's entitlements in sorted order.
    pub fn entitlements(&self) -> impl Iterator<Item = &str> {
        self.entitlements.iter().map(String::as_str)
    }

    /// The supporter tier.
    pub fn tier(&self) -> u8 {
        self.tier
    }
}

/// What a user must have to hold a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Available to every user.
    Anyone,
    /// Requires the named entitlement.
    Entitlement(&'static str),
    /// Requires at least this supporter tier.
    MinTier(u8),
}

impl Requirement {
    /// Evaluates the requirement against a context.
    pub fn is_met(&self, context: &VerificationContext) -> bool {
        match self {
            Requirement::Anyone => true,
            Requirement::Entitlement(name) => context.has_entitlement(name),
            Requirement::MinTier(tier) => context.tier() >= *tier,
        }
    }
}

/// Decides whether a candidate value is allowed for a user.
pub trait VerificationGate<T>: Send + Sync {
    /// Returns true if `context`'s user may hold `candidate`.
    fn is_eligible(&self, context: &VerificationContext, candidate: &T) -> bool;
}

impl<T, F> VerificationGate<T> for F
where
    F: Fn(&VerificationContext, &T) -> bool + Send + Sync,
{
    fn is_eligible(&self, context: &VerificationContext, candidate: &T) -> bool {
        self(context, candidate)
    }
}

/// Gate that evaluates the requirement attached to the candidate itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerkGate;

impl<T: Perk> VerificationGate<T> for PerkGate {
    fn is_eligible(&self, context: &VerificationContext, candidate: &T) -> bool {
        candidate.requirement().is_met(context)
    }
}

/// Gate that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl<T> VerificationGate<T> for AllowAll {
    fn is_eligible(&self, _context: &VerificationContext, _candidate: &T) -> bool {
        true
    }
}

/// Supplies the verification context for a user.
pub trait IdentityProvider: Send + Sync {
    /// Returns the current facts for `user`.
    fn context(&self, user: UserKey) -> VerificationContext;
}

/// An identity provider backed by a fixed table.
///
/// Users missing from the table get a bare context (no entitlements,
/// tier zero).
#[derive(Debug, Default)]
pub struct StaticIdentities {
    contexts: RwLock<HashMap<UserKey, VerificationContext>>,
}

impl StaticIdentities {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the context for its user.
    pub fn insert(&self, context: VerificationContext) {
        self.contexts.write().insert(context.user(), context);
    }

    /// Removes a user's context.
    pub fn remove(&self, user: UserKey) -> Option<VerificationContext> {
        self.contexts.write().remove(&user)
    }
}

impl IdentityProvider for StaticIdentities {
    fn context(&self, user: UserKey) -> VerificationContext {
        self.contexts
            .read()
            .get(&user)
            .cloned()
            .unwrap_or_else(|| VerificationContext::new(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserKey {
        UserKey::from_bytes([1u8; 16])
    }

    #[test]
    fn requirement_evaluation() {
        let bare = VerificationContext::new(user());
        let patron = VerificationContext::new(user())
            .with_tier(2)
            .with_entitlement("developer");

        assert!(Requirement::Anyone.is_met(&bare));
        assert!(!Requirement::MinTier(1).is_met(&bare));
        assert!(Requirement::MinTier(2).is_met(&patron));
        assert!(!Requirement::MinTier(3).is_met(&patron));
        assert!(!Requirement::Entitlement("developer").is_met(&bare));
        assert!(Requirement::Entitlement("developer").is_met(&patron));
    }

    #[test]
    fn closure_gate() {
        let gate = |ctx: &VerificationContext, candidate: &u8| ctx.tier() >= *candidate;
        let ctx = VerificationContext::new(user()).with_tier(3);
        assert!(gate.is_eligible(&ctx, &3));
        assert!(!gate.is_eligible(&ctx, &4));
    }

    #[test]
    fn allow_all_gate() {
        let ctx = VerificationContext::new(user());
        assert!(VerificationGate::<u8>::is_eligible(&AllowAll, &ctx, &0));
    }

    #[test]
    fn static_identities_default_to_bare_context() {
        let identities = StaticIdentities::new();
        let ctx = identities.context(user());
        assert_eq!(ctx.tier(), 0);
        assert_eq!(ctx.entitlements().count(), 0);

        identities.insert(VerificationContext::new(user()).with_tier(4));
        assert_eq!(identities.context(user()).tier(), 4);

        identities.remove(user());
        assert_eq!(identities.context(user()).tier(), 0);
    }
}
