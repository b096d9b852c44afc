use std::{collections::BTreeMap, str::FromStr};

use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signer::Signer;
use soltrace_types::{AccountBindings, CallEntry};

use crate::{
    error::{EngineError, EngineResult},
    idl::InstructionSchema,
    pda::{self, SeedBytes, SeedSpec},
    wallet::WalletStore,
};

/// An account reference as authored in a trace, before resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountRef {
    /// A wallet from the wallet store, able to sign.
    Wallet(String),
    /// A program-derived address given directly as a key.
    PdaKey(Pubkey),
    /// A program-derived address to derive from seeds.
    PdaSeeds(Vec<SeedSpec>),
    /// An external key the engine holds no signing material for.
    External(Pubkey),
}

impl AccountRef {
    /// Parses one positional CSV cell. Cells carry an explicit marker:
    /// `W:<wallet>`, `P:<key-or-seeds>`, `E:<base58>`. A `P:` payload that
    /// parses as a base58 key is taken verbatim; otherwise it is a
    /// `/`-separated seed list.
    pub fn from_cell(account: &str, cell: &str) -> EngineResult<Self> {
        let cell = cell.trim();
        if let Some(name) = cell.strip_prefix("W:") {
            return Ok(AccountRef::Wallet(name.trim().to_string()));
        }
        if let Some(payload) = cell.strip_prefix("P:") {
            let payload = payload.trim();
            if let Ok(key) = Pubkey::from_str(payload) {
                return Ok(AccountRef::PdaKey(key));
            }
            let seeds = payload
                .split('/')
                .map(seed_from_token)
                .collect::<EngineResult<Vec<_>>>()?;
            return Ok(AccountRef::PdaSeeds(seeds));
        }
        if let Some(raw) = cell.strip_prefix("E:") {
            let raw = raw.trim();
            let key = Pubkey::from_str(raw).map_err(|e| EngineError::InvalidKeyFormat {
                account: account.to_string(),
                value: raw.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(AccountRef::External(key));
        }
        Err(EngineError::InvalidKeyFormat {
            account: account.to_string(),
            value: cell.to_string(),
            reason: "missing W:, P: or E: marker".to_string(),
        })
    }

    /// Interprets one named JSON binding. Plain strings are tried as an
    /// actor name, then a wallet name, then a base58 key (on-curve keys are
    /// external, off-curve keys are taken as an already-derived address).
    /// Objects carry a derivation directive: `{"opt": "seeds", "param":
    /// [...]}` or `{"opt": "random"}`.
    pub fn from_json(
        account: &str,
        value: &serde_json::Value,
        actors: &BTreeMap<String, String>,
        wallets: &WalletStore,
    ) -> EngineResult<Self> {
        match value {
            serde_json::Value::String(text) => {
                let text = text.trim();
                if let Some(wallet) = actors.get(text) {
                    return Ok(AccountRef::Wallet(wallet.clone()));
                }
                if wallets.contains(text) {
                    return Ok(AccountRef::Wallet(text.to_string()));
                }
                let key = Pubkey::from_str(text).map_err(|e| EngineError::InvalidKeyFormat {
                    account: account.to_string(),
                    value: text.to_string(),
                    reason: e.to_string(),
                })?;
                if key.is_on_curve() {
                    Ok(AccountRef::External(key))
                } else {
                    Ok(AccountRef::PdaKey(key))
                }
            }
            serde_json::Value::Object(directive) => {
                let opt = directive
                    .get("opt")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| EngineError::InvalidKeyFormat {
                        account: account.to_string(),
                        value: value.to_string(),
                        reason: "derivation directive lacks an 'opt' field".to_string(),
                    })?;
                match opt {
                    "random" => Ok(AccountRef::PdaSeeds(vec![SeedSpec::Random])),
                    "seeds" => {
                        let params = directive
                            .get("param")
                            .and_then(|v| v.as_array())
                            .ok_or_else(|| EngineError::InvalidKeyFormat {
                                account: account.to_string(),
                                value: value.to_string(),
                                reason: "'seeds' directive needs a 'param' array".to_string(),
                            })?;
                        let seeds = params
                            .iter()
                            .map(|p| match p {
                                serde_json::Value::String(token) => {
                                    let token = token.trim();
                                    if let Some(wallet) = actors.get(token) {
                                        Ok(SeedSpec::Wallet(wallet.clone()))
                                    } else {
                                        seed_from_token(token)
                                    }
                                }
                                serde_json::Value::Number(n) => {
                                    SeedSpec::literal(&n.to_string())
                                }
                                other => Err(EngineError::InvalidKeyFormat {
                                    account: account.to_string(),
                                    value: other.to_string(),
                                    reason: "seed must be a string or number".to_string(),
                                }),
                            })
                            .collect::<EngineResult<Vec<_>>>()?;
                        Ok(AccountRef::PdaSeeds(seeds))
                    }
                    other => Err(EngineError::InvalidKeyFormat {
                        account: account.to_string(),
                        value: value.to_string(),
                        reason: format!("unknown derivation directive '{}'", other),
                    }),
                }
            }
            other => Err(EngineError::InvalidKeyFormat {
                account: account.to_string(),
                value: other.to_string(),
                reason: "account binding must be a string or directive object".to_string(),
            }),
        }
    }
}

/// Lowers one seed token: `random` draws a fresh seed, `wallet:<name>` and
/// `account:<name>` late-bind to public keys, anything else is a UTF-8
/// literal.
fn seed_from_token(token: &str) -> EngineResult<SeedSpec> {
    let token = token.trim();
    if token == "random" {
        return Ok(SeedSpec::Random);
    }
    if let Some(name) = token.strip_prefix("wallet:") {
        return Ok(SeedSpec::Wallet(name.trim().to_string()));
    }
    if let Some(name) = token.strip_prefix("account:") {
        return Ok(SeedSpec::Account(name.trim().to_string()));
    }
    SeedSpec::literal(token)
}

/// One fully resolved account: its declared name, its address, and the
/// signing keypair when the engine holds one.
pub struct ResolvedAccount {
    pub name: String,
    pub pubkey: Pubkey,
    pub signing_key: Option<Keypair>,
}

/// All accounts of one call, in schema declaration order.
pub struct ResolvedAccounts {
    pub accounts: Vec<ResolvedAccount>,
}

impl ResolvedAccounts {
    pub fn pubkey_of(&self, name: &str) -> Option<Pubkey> {
        self.accounts
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.pubkey)
    }

    pub fn signers(&self) -> Vec<&Keypair> {
        self.accounts
            .iter()
            .filter_map(|a| a.signing_key.as_ref())
            .collect()
    }
}

/// Resolves trace account bindings against an instruction schema.
pub struct AccountResolver<'a> {
    wallets: &'a WalletStore,
    program_id: Pubkey,
}

impl<'a> AccountResolver<'a> {
    pub fn new(wallets: &'a WalletStore, program_id: Pubkey) -> Self {
        Self {
            wallets,
            program_id,
        }
    }

    /// Collects the per-account references of one call, in schema order.
    pub fn collect_refs(
        &self,
        schema: &InstructionSchema,
        entry: &CallEntry,
        actors: &BTreeMap<String, String>,
    ) -> EngineResult<Vec<AccountRef>> {
        match &entry.accounts {
            AccountBindings::Positional(cells) => {
                if cells.len() != schema.accounts.len() {
                    return Err(EngineError::MissingAccount {
                        instruction: schema.name.clone(),
                        expected: schema.accounts.len(),
                        resolved: cells.len(),
                    });
                }
                schema
                    .accounts
                    .iter()
                    .zip(cells)
                    .map(|(spec, cell)| AccountRef::from_cell(&spec.name, cell))
                    .collect()
            }
            AccountBindings::Named(bound) => {
                // Keys are renamed so camelCase bindings match snake_case
                // schema names.
                let mut renamed: BTreeMap<String, &serde_json::Value> = BTreeMap::new();
                for (key, value) in bound {
                    renamed.insert(crate::idl::camel_to_snake(key), value);
                }
                for key in renamed.keys() {
                    if !schema.accounts.iter().any(|a| &a.name == key) {
                        return Err(EngineError::UnknownAccount {
                            instruction: schema.name.clone(),
                            account: key.clone(),
                        });
                    }
                }
                schema
                    .accounts
                    .iter()
                    .map(|spec| {
                        let value = renamed.get(&spec.name).ok_or_else(|| {
                            EngineError::MissingAccount {
                                instruction: schema.name.clone(),
                                expected: schema.accounts.len(),
                                resolved: renamed.len(),
                            }
                        })?;
                        AccountRef::from_json(&spec.name, value, actors, self.wallets)
                    })
                    .collect()
            }
        }
    }

    /// Resolves references to concrete addresses, left to right so a seed
    /// may name any account resolved before it.
    pub fn resolve(
        &self,
        schema: &InstructionSchema,
        refs: Vec<AccountRef>,
    ) -> EngineResult<ResolvedAccounts> {
        let mut accounts: Vec<ResolvedAccount> = Vec::with_capacity(refs.len());
        for (spec, reference) in schema.accounts.iter().zip(refs) {
            let resolved = match reference {
                AccountRef::Wallet(name) => {
                    let keypair = self.wallets.load(&name)?;
                    let pubkey = keypair.pubkey();
                    ResolvedAccount {
                        name: spec.name.clone(),
                        pubkey,
                        signing_key: spec.is_signer.then_some(keypair),
                    }
                }
                AccountRef::External(pubkey) => {
                    if spec.is_signer {
                        warn!(
                            "account '{}' is declared a signer but bound to an external key; \
                             signing will fail if the transaction is submitted",
                            spec.name
                        );
                    }
                    ResolvedAccount {
                        name: spec.name.clone(),
                        pubkey,
                        signing_key: None,
                    }
                }
                AccountRef::PdaKey(pubkey) => {
                    if spec.is_signer {
                        return Err(EngineError::InvalidAccountBinding(spec.name.clone()));
                    }
                    ResolvedAccount {
                        name: spec.name.clone(),
                        pubkey,
                        signing_key: None,
                    }
                }
                AccountRef::PdaSeeds(seeds) => {
                    if spec.is_signer {
                        return Err(EngineError::InvalidAccountBinding(spec.name.clone()));
                    }
                    let bytes = self.materialize_seeds(schema, &accounts, &seeds)?;
                    let (pubkey, bump) = pda::derive(&self.program_id, &bytes)?;
                    debug!("derived {} for account '{}' (bump {})", pubkey, spec.name, bump);
                    ResolvedAccount {
                        name: spec.name.clone(),
                        pubkey,
                        signing_key: None,
                    }
                }
            };
            accounts.push(resolved);
        }
        Ok(ResolvedAccounts { accounts })
    }

    fn materialize_seeds(
        &self,
        schema: &InstructionSchema,
        resolved: &[ResolvedAccount],
        seeds: &[SeedSpec],
    ) -> EngineResult<SeedBytes> {
        let mut out = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let bytes = match seed {
                SeedSpec::Literal(bytes) => bytes.clone(),
                SeedSpec::Random => pda::random_seed(),
                SeedSpec::Wallet(name) => self.wallets.pubkey(name)?.to_bytes().to_vec(),
                SeedSpec::Account(name) => resolved
                    .iter()
                    .find(|a| &a.name == name)
                    .map(|a| a.pubkey.to_bytes().to_vec())
                    .ok_or_else(|| EngineError::UnknownAccount {
                        instruction: schema.name.clone(),
                        account: name.clone(),
                    })?,
            };
            out.push(bytes);
        }
        Ok(SeedBytes(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_keypair::write_keypair_file;
    use tempfile::TempDir;

    use crate::idl::{AccountSpec, InstructionSchema};

    fn schema(accounts: &[(&str, bool)]) -> InstructionSchema {
        InstructionSchema {
            name: "join".to_string(),
            accounts: accounts
                .iter()
                .map(|(name, is_signer)| AccountSpec {
                    name: name.to_string(),
                    is_signer: *is_signer,
                    is_writable: true,
                })
                .collect(),
            args: Vec::new(),
            needs_system_program: false,
        }
    }

    fn store_with(names: &[&str]) -> (TempDir, WalletStore) {
        let dir = TempDir::new().unwrap();
        for name in names {
            let keypair = Keypair::new();
            write_keypair_file(&keypair, dir.path().join(format!("{}.json", name))).unwrap();
        }
        let store = WalletStore::new(dir.path());
        (dir, store)
    }

    fn program_id() -> Pubkey {
        Pubkey::from_str("BPFLoaderUpgradeab1e11111111111111111111111").unwrap()
    }

    #[test]
    fn cell_markers_parse() {
        assert_eq!(
            AccountRef::from_cell("owner", "W:alice").unwrap(),
            AccountRef::Wallet("alice".to_string())
        );
        let external = Keypair::new().pubkey();
        assert_eq!(
            AccountRef::from_cell("oracle", &format!("E:{}", external)).unwrap(),
            AccountRef::External(external)
        );
        assert_eq!(
            AccountRef::from_cell("bet_info", "P:bet_info/wallet:alice").unwrap(),
            AccountRef::PdaSeeds(vec![
                SeedSpec::Literal(b"bet_info".to_vec()),
                SeedSpec::Wallet("alice".to_string()),
            ])
        );
        assert!(AccountRef::from_cell("owner", "alice").is_err());
    }

    #[test]
    fn json_string_falls_through_actor_wallet_key() {
        let (_dir, store) = store_with(&["oracle_wallet"]);
        let mut actors = BTreeMap::new();
        actors.insert("p1".to_string(), "alice".to_string());

        assert_eq!(
            AccountRef::from_json("owner", &serde_json::json!("p1"), &actors, &store).unwrap(),
            AccountRef::Wallet("alice".to_string())
        );
        assert_eq!(
            AccountRef::from_json("oracle", &serde_json::json!("oracle_wallet"), &actors, &store)
                .unwrap(),
            AccountRef::Wallet("oracle_wallet".to_string())
        );

        let on_curve = Keypair::new().pubkey();
        assert_eq!(
            AccountRef::from_json("x", &serde_json::json!(on_curve.to_string()), &actors, &store)
                .unwrap(),
            AccountRef::External(on_curve)
        );

        let (off_curve, _) =
            Pubkey::find_program_address(&[b"bet_info"], &program_id());
        assert_eq!(
            AccountRef::from_json("x", &serde_json::json!(off_curve.to_string()), &actors, &store)
                .unwrap(),
            AccountRef::PdaKey(off_curve)
        );

        assert!(
            AccountRef::from_json("x", &serde_json::json!("not a key"), &actors, &store).is_err()
        );
    }

    #[test]
    fn seed_directive_lowers_params() {
        let (_dir, store) = store_with(&[]);
        let actors = BTreeMap::new();
        let directive = serde_json::json!({
            "opt": "seeds",
            "param": ["bet_info", "wallet:alice", "account:owner", "random", 7]
        });
        assert_eq!(
            AccountRef::from_json("bet_info", &directive, &actors, &store).unwrap(),
            AccountRef::PdaSeeds(vec![
                SeedSpec::Literal(b"bet_info".to_vec()),
                SeedSpec::Wallet("alice".to_string()),
                SeedSpec::Account("owner".to_string()),
                SeedSpec::Random,
                SeedSpec::Literal(b"7".to_vec()),
            ])
        );
    }

    #[test]
    fn resolves_wallet_and_pda_in_schema_order() {
        let (_dir, store) = store_with(&["alice"]);
        let resolver = AccountResolver::new(&store, program_id());
        let schema = schema(&[("owner", true), ("bet_info", false)]);
        let refs = vec![
            AccountRef::Wallet("alice".to_string()),
            AccountRef::PdaSeeds(vec![
                SeedSpec::Literal(b"bet_info".to_vec()),
                SeedSpec::Account("owner".to_string()),
            ]),
        ];
        let resolved = resolver.resolve(&schema, refs).unwrap();
        assert_eq!(resolved.accounts.len(), 2);
        assert_eq!(resolved.signers().len(), 1);
        assert_eq!(
            resolved.pubkey_of("owner").unwrap(),
            store.pubkey("alice").unwrap()
        );

        let expected = Pubkey::find_program_address(
            &[b"bet_info", store.pubkey("alice").unwrap().as_ref()],
            &program_id(),
        )
        .0;
        assert_eq!(resolved.pubkey_of("bet_info").unwrap(), expected);
    }

    #[test]
    fn pda_bound_to_signer_slot_is_rejected() {
        let (_dir, store) = store_with(&[]);
        let resolver = AccountResolver::new(&store, program_id());
        let schema = schema(&[("owner", true)]);
        let refs = vec![AccountRef::PdaSeeds(vec![SeedSpec::Literal(
            b"seed".to_vec(),
        )])];
        assert!(matches!(
            resolver.resolve(&schema, refs),
            Err(EngineError::InvalidAccountBinding(name)) if name == "owner"
        ));
    }

    #[test]
    fn positional_cell_count_must_match_schema() {
        let (_dir, store) = store_with(&[]);
        let resolver = AccountResolver::new(&store, program_id());
        let schema = schema(&[("owner", true), ("bet_info", false)]);
        let entry = CallEntry {
            sequence_id: 1,
            program: "price_bet".to_string(),
            instruction: "join".to_string(),
            accounts: AccountBindings::Positional(vec!["W:alice".to_string()]),
            args: soltrace_types::ArgBindings::Positional(Vec::new()),
            provider_wallet: None,
            network: None,
            submit: false,
        };
        assert!(matches!(
            resolver.collect_refs(&schema, &entry, &BTreeMap::new()),
            Err(EngineError::MissingAccount {
                expected: 2,
                resolved: 1,
                ..
            })
        ));
    }
}
