//! Verify command implementation.

use super::describe_requirement;
use perksync_protocol::{
    MoaSkinPerk, Perk, PerkGate, UserKey, VerificationContext, VerificationGate,
};
use perksync_store::{FilePersistence, PersistenceProvider};
use std::path::Path;

/// Verification result.
#[derive(Debug)]
pub struct VerifyResult {
    /// Number of records checked.
    pub records_checked: usize,
    /// Users whose record the entitlement set does not allow.
    pub failures: Vec<(UserKey, String)>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Checks every record against a context holding `entitlements` and
/// `tier`. With `prune`, failing records are removed from the snapshot.
pub fn verify(
    path: &Path,
    entitlements: &[String],
    tier: u8,
    prune: bool,
) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No snapshot found at {:?}", path).into());
    }

    let persistence = FilePersistence::<MoaSkinPerk>::new(path);
    let mut records = persistence.load()?;
    let records_checked = records.len();

    let context_for = |user: UserKey| {
        entitlements
            .iter()
            .fold(VerificationContext::new(user).with_tier(tier), |ctx, name| {
                ctx.with_entitlement(name.as_str())
            })
    };

    let mut failures: Vec<(UserKey, String)> = records
        .iter()
        .filter(|(user, perk)| !PerkGate.is_eligible(&context_for(**user), *perk))
        .map(|(user, perk)| (*user, describe_requirement(perk.requirement())))
        .collect();
    failures.sort();

    if prune && !failures.is_empty() {
        for (user, _) in &failures {
            records.remove(user);
        }
        persistence.save(&records)?;
    }

    Ok(VerifyResult {
        records_checked,
        failures,
    })
}

/// Runs the verify command.
pub fn run(
    path: &Path,
    entitlements: &[String],
    tier: u8,
    prune: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying snapshot at {:?}", path);
    println!();

    let result = verify(path, entitlements, tier, prune)?;

    println!("Records checked: {}", result.records_checked);
    for (user, requirement) in &result.failures {
        println!("  FAIL {user}: requires {requirement}");
    }
    println!();

    if result.is_ok() {
        println!("✓ All records pass");
        Ok(())
    } else if prune {
        println!("✓ Pruned {} records", result.failures.len());
        Ok(())
    } else {
        Err(format!("{} records fail verification", result.failures.len()).into())
    }
}
