//! The moa skin cosmetic.
//!
//! A moa skin record pairs the skin a user picked with the moa they last
//! rode. Skins come from a fixed catalog; each catalog entry carries its own
//! [`Requirement`], so eligibility is decided by the server's catalog and
//! never by anything a client puts on the wire.

use crate::gate::Requirement;
use crate::perk::{field_changed, Perk};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One entry of the skin catalog.
#[derive(Debug)]
pub struct MoaSkin {
    id: &'static str,
    display_name: &'static str,
    requirement: Requirement,
}

static MOA_SKINS: [MoaSkin; 9] = [
    MoaSkin::new("blue", "Blue", Requirement::Anyone),
    MoaSkin::new("white", "White", Requirement::Anyone),
    MoaSkin::new("black", "Black", Requirement::Anyone),
    MoaSkin::new("orange", "Orange", Requirement::Anyone),
    MoaSkin::new("gilded", "Gilded", Requirement::MinTier(1)),
    MoaSkin::new("arctic", "Arctic", Requirement::MinTier(2)),
    MoaSkin::new("phoenix", "Phoenix", Requirement::MinTier(3)),
    MoaSkin::new("founder", "Founder", Requirement::Entitlement("founder")),
    MoaSkin::new("developer", "Developer", Requirement::Entitlement("developer")),
];

impl MoaSkin {
    const fn new(id: &'static str, display_name: &'static str, requirement: Requirement) -> Self {
        Self {
            id,
            display_name,
            requirement,
        }
    }

    /// Looks up a skin by id.
    pub fn by_id(id: &str) -> Option<&'static MoaSkin> {
        MOA_SKINS.iter().find(|skin| skin.id == id)
    }

    /// Every skin in the catalog.
    pub fn all() -> &'static [MoaSkin] {
        &MOA_SKINS
    }

    /// Stable identifier used on the wire.
    pub fn id(&self) -> &'static str {
        self.id
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        self.display_name
    }

    /// What a user needs to wear this skin.
    pub fn requirement(&self) -> Requirement {
        self.requirement
    }
}

impl PartialEq for MoaSkin {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MoaSkin {}

impl fmt::Display for MoaSkin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name)
    }
}

/// The replicated moa skin record of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoaSkinPerk {
    /// The moa the user most recently rode.
    #[serde(with = "moa_id")]
    pub moa_id: Option<Uuid>,
    /// The chosen skin.
    #[serde(with = "skin_id")]
    pub skin: Option<&'static MoaSkin>,
}

impl MoaSkinPerk {
    /// Creates a record.
    pub fn new(moa_id: Option<Uuid>, skin: Option<&'static MoaSkin>) -> Self {
        Self { moa_id, skin }
    }
}

impl Perk for MoaSkinPerk {
    const KIND: &'static str = "moa_skin";

    fn has_changed(&self, stored: &Self) -> bool {
        field_changed(stored.moa_id.as_ref(), self.moa_id.as_ref())
            || field_changed(stored.skin, self.skin)
    }

    fn requirement(&self) -> Requirement {
        self.skin
            .map(MoaSkin::requirement)
            .unwrap_or(Requirement::Anyone)
    }
}

mod moa_id {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(id: &Option<Uuid>, s: S) -> Result<S::Ok, S::Error> {
        match id {
            Some(id) => s.serialize_some(&id.hyphenated().to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Uuid>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|text| Uuid::parse_str(&text).map_err(D::Error::custom))
            .transpose()
    }
}

mod skin_id {
    use super::MoaSkin;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        skin: &Option<&'static MoaSkin>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match skin {
            Some(skin) => s.serialize_some(skin.id()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<&'static MoaSkin>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|id| {
                MoaSkin::by_id(&id).ok_or_else(|| D::Error::custom(format!("unknown moa skin: {id}")))
            })
            .transpose()
    }
}
