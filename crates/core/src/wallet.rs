use std::path::{Path, PathBuf};

use solana_keypair::{read_keypair_file, Keypair};
use solana_pubkey::Pubkey;
use solana_signer::Signer;

use crate::error::{EngineError, EngineResult};

/// A directory of JSON keypair files, one wallet per file.
///
/// Wallets are loaded lazily on lookup; the store itself only remembers the
/// directory, so externally added files become visible without a reload.
#[derive(Clone, Debug)]
pub struct WalletStore {
    dir: PathBuf,
}

impl WalletStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names of every wallet in the store, sorted, without the `.json`
    /// extension.
    pub fn list_names(&self) -> EngineResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// True when a wallet file with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    /// Loads the keypair stored under `name`. The name may be given with or
    /// without the `.json` extension.
    pub fn load(&self, name: &str) -> EngineResult<Keypair> {
        let path = self.path_for(name);
        if !path.is_file() {
            return Err(EngineError::WalletNotFound(name.to_string()));
        }
        read_keypair_file(&path).map_err(|e| EngineError::WalletUnreadable {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Public key of the wallet stored under `name`.
    pub fn pubkey(&self, name: &str) -> EngineResult<Pubkey> {
        Ok(self.load(name)?.pubkey())
    }

    fn path_for(&self, name: &str) -> PathBuf {
        let file = if name.ends_with(".json") {
            name.to_string()
        } else {
            format!("{}.json", name)
        };
        self.dir.join(file)
    }
}
