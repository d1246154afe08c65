//! Property-based test generators using proptest.
//!
//! Provides strategies for generating users, records and request
//! sequences for replication tests.

use perksync_protocol::{MoaSkin, MoaSkinPerk, UserKey};
use proptest::prelude::*;
use uuid::Uuid;

/// Strategy for generating arbitrary user keys.
pub fn user_key_strategy() -> impl Strategy<Value = UserKey> {
    prop::array::uniform16(any::<u8>()).prop_map(UserKey::from_bytes)
}

/// Strategy for generating moa ids.
pub fn moa_id_strategy() -> impl Strategy<Value = Uuid> {
    prop::array::uniform16(any::<u8>()).prop_map(Uuid::from_bytes)
}

/// Strategy for picking a skin from the catalog, or none.
pub fn moa_skin_strategy() -> impl Strategy<Value = Option<&'static MoaSkin>> {
    prop::option::of((0..MoaSkin::all().len()).prop_map(|index| &MoaSkin::all()[index]))
}

/// Strategy for generating moa skin records.
pub fn moa_skin_perk_strategy() -> impl Strategy<Value = MoaSkinPerk> {
    (prop::option::of(moa_id_strategy()), moa_skin_strategy())
        .prop_map(|(moa_id, skin)| MoaSkinPerk::new(moa_id, skin))
}

/// One client request in a generated sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// User `user` asks to store `value` for itself.
    Apply {
        /// Index into the test's user table.
        user: usize,
        /// Requested record.
        value: MoaSkinPerk,
    },
    /// User `user` asks to delete its own record.
    Remove {
        /// Index into the test's user table.
        user: usize,
    },
}

impl Request {
    /// Index of the requesting user.
    pub fn user(&self) -> usize {
        match self {
            Request::Apply { user, .. } | Request::Remove { user } => *user,
        }
    }
}

/// Strategy for generating request sequences over `users` users.
///
/// Applies outnumber removes three to one so records tend to exist.
pub fn request_sequence_strategy(
    users: usize,
    max_len: usize,
) -> impl Strategy<Value = Vec<Request>> {
    let users = users.max(1);
    let request = prop_oneof![
        3 => (0..users, moa_skin_perk_strategy())
            .prop_map(|(user, value)| Request::Apply { user, value }),
        1 => (0..users).prop_map(|user| Request::Remove { user }),
    ];
    prop::collection::vec(request, 0..=max_len)
}
