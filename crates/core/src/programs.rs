use std::{collections::BTreeMap, fs, path::Path, str::FromStr};

use solana_pubkey::Pubkey;
use soltrace_types::{ProgramEntry, ProgramManifest};

use crate::{
    error::{EngineError, EngineResult},
    idl::IdlDocument,
};

/// One manifest entry with its program id parsed up front, so a bad key
/// fails at load time instead of mid-replay.
#[derive(Clone, Debug)]
pub struct ProgramRecord {
    pub entry: ProgramEntry,
    pub program_id: Pubkey,
}

impl ProgramRecord {
    pub fn load_idl(&self) -> EngineResult<IdlDocument> {
        IdlDocument::from_file(&self.entry.idl)
    }
}

/// The set of programs known to the toolchain, keyed by name.
pub struct ProgramRegistry {
    records: BTreeMap<String, ProgramRecord>,
}

impl ProgramRegistry {
    /// Loads `{"programs": [...]}` from disk. Relative schema paths are
    /// resolved against the manifest's directory.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let raw = fs::read_to_string(path)?;
        let mut manifest: ProgramManifest = serde_json::from_str(&raw)?;
        if let Some(base) = path.parent() {
            for entry in &mut manifest.programs {
                if entry.idl.is_relative() {
                    entry.idl = base.join(&entry.idl);
                }
            }
        }
        Self::from_manifest(manifest)
    }

    pub fn from_manifest(manifest: ProgramManifest) -> EngineResult<Self> {
        let mut records = BTreeMap::new();
        for entry in manifest.programs {
            let program_id =
                Pubkey::from_str(&entry.program_id).map_err(|e| EngineError::InvalidKeyFormat {
                    account: entry.name.clone(),
                    value: entry.program_id.clone(),
                    reason: e.to_string(),
                })?;
            records.insert(entry.name.clone(), ProgramRecord { entry, program_id });
        }
        Ok(Self { records })
    }

    pub fn get(&self, name: &str) -> EngineResult<&ProgramRecord> {
        self.records
            .get(name)
            .ok_or_else(|| EngineError::UnknownProgram(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.records.keys().map(|k| k.as_str()).collect()
    }
}
