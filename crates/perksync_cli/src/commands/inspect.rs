//! Inspect command implementation.

use super::describe_requirement;
use perksync_protocol::{MoaSkinPerk, Perk, PROTOCOL_VERSION};
use perksync_store::{FilePersistence, PersistenceProvider};
use serde::Serialize;
use std::path::Path;

/// Snapshot inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Snapshot path.
    pub path: String,
    /// Payload kind.
    pub kind: &'static str,
    /// Snapshot format version.
    pub version: u16,
    /// Snapshot size in bytes.
    pub size: u64,
    /// Records sorted by user.
    pub records: Vec<RecordEntry>,
}

/// One record of a snapshot.
#[derive(Debug, Serialize)]
pub struct RecordEntry {
    /// User key.
    pub user: String,
    /// Skin id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skin: Option<&'static str>,
    /// Last ridden moa.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moa_id: Option<String>,
    /// What a user needs to hold this record.
    pub requirement: String,
}

/// Reads a snapshot into an inspection result.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No snapshot found at {:?}", path).into());
    }

    let size = std::fs::metadata(path)?.len();
    let mut records: Vec<_> = FilePersistence::<MoaSkinPerk>::new(path)
        .load()?
        .into_iter()
        .collect();
    records.sort_by_key(|(user, _)| *user);

    Ok(InspectResult {
        path: path.display().to_string(),
        kind: MoaSkinPerk::KIND,
        version: PROTOCOL_VERSION,
        size,
        records: records
            .into_iter()
            .map(|(user, perk)| RecordEntry {
                user: user.to_string(),
                skin: perk.skin.map(|skin| skin.id()),
                moa_id: perk.moa_id.map(|id| id.to_string()),
                requirement: describe_requirement(perk.requirement()),
            })
            .collect(),
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("perksync Snapshot Inspection");
    println!("============================");
    println!();
    println!("Path:    {}", result.path);
    println!("Kind:    {}", result.kind);
    println!("Version: {}", result.version);
    println!("Size:    {} bytes", result.size);
    println!();
    println!("Records: {}", result.records.len());

    for record in &result.records {
        println!(
            "  {}  skin={}  moa={}  ({})",
            record.user,
            record.skin.unwrap_or("-"),
            record.moa_id.as_deref().unwrap_or("-"),
            record.requirement
        );
    }
}
