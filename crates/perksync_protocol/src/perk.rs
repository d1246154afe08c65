//! Replicated payloads and change detection.

use crate::gate::Requirement;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// A per-user payload replicated by the managers.
///
/// One generic manager pair is instantiated per `Perk` type; everything that
/// differs between payloads lives here: the routing kind, the field-wise
/// comparison and the eligibility requirement of a candidate value.
pub trait Perk:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Routing name carried in every frame for this payload.
    const KIND: &'static str;

    /// Returns true if `self` differs from `stored` in any meaningful field.
    ///
    /// Implementations should compare optional fields with [`field_changed`].
    fn has_changed(&self, stored: &Self) -> bool {
        self != stored
    }

    /// The requirement a user must meet to hold this value.
    fn requirement(&self) -> Requirement;
}

/// Compares one optional field.
///
/// `(None, None)` is unchanged, `(None, Some)` and `(Some, None)` are
/// changed, and two present values are changed iff they are not equal.
pub fn field_changed<F: PartialEq>(stored: Option<&F>, candidate: Option<&F>) -> bool {
    match (stored, candidate) {
        (None, None) => false,
        (Some(stored), Some(candidate)) => stored != candidate,
        _ => true,
    }
}

/// Decides whether replacing `stored` with `candidate` warrants an update.
///
/// An absent entry becoming present, a present entry becoming absent, and a
/// present entry whose fields changed all require an update.
pub fn needs_update<T: Perk>(stored: Option<&T>, candidate: Option<&T>) -> bool {
    match (stored, candidate) {
        (None, None) => false,
        (Some(stored), Some(candidate)) => candidate.has_changed(stored),
        _ => true,
    }
}
