//! CLI command implementations.

pub mod demo;
pub mod inspect;
pub mod verify;

use perksync_protocol::Requirement;

/// Short human-readable form of a requirement.
pub fn describe_requirement(requirement: Requirement) -> String {
    match requirement {
        Requirement::Anyone => "anyone".to_string(),
        Requirement::Entitlement(name) => format!("entitlement:{name}"),
        Requirement::MinTier(tier) => format!("tier>={tier}"),
    }
}
