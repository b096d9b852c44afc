use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use solana_hash::Hash;
use solana_keypair::{write_keypair_file, Keypair};
use solana_message::VersionedMessage;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use soltrace_types::{
    AccountBindings, ArgBindings, BarrierEntry, CallEntry, Cluster, NetworkId, ProgramEntry,
    ProgramManifest, Trace, TraceEntry, STATUS_NOT_DEPLOYED, STATUS_NOT_SENT,
};
use tempfile::TempDir;

use crate::{
    builder::BuiltTransaction,
    error::{EngineError, EngineResult},
    programs::ProgramRegistry,
    replay::{write_report, ReplayEngine},
    rpc::ClusterRpc,
    wallet::WalletStore,
};

const PROGRAM_ID: &str = "BPFLoaderUpgradeab1e11111111111111111111111";

const PRICE_BET_IDL: &str = r#"{
    "name": "price_bet",
    "instructions": [
        {
            "name": "join",
            "accounts": [
                {"name": "participant1", "isSigner": true, "isMut": true},
                {"name": "participant2", "isSigner": true, "isMut": true},
                {"name": "oracle", "isSigner": false, "isMut": false},
                {"name": "betInfo", "isSigner": false, "isMut": true},
                {"name": "systemProgram", "isSigner": false, "isMut": false}
            ],
            "args": [
                {"name": "delay", "type": "u64"},
                {"name": "wager", "type": "u64"}
            ]
        },
        {
            "name": "win",
            "accounts": [
                {"name": "oracle", "isSigner": true, "isMut": false},
                {"name": "betInfo", "isSigner": false, "isMut": true}
            ],
            "args": []
        }
    ]
}"#;

/// A scripted cluster: the slot advances by one on every query, fees are a
/// fixed price, and sends are recorded rather than transmitted.
struct MockRpc {
    slot: AtomicU64,
    fail_fee: bool,
    sent: Mutex<Vec<String>>,
}

impl MockRpc {
    fn new(start_slot: u64) -> Self {
        Self {
            slot: AtomicU64::new(start_slot),
            fail_fee: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    fn current_slot(&self) -> u64 {
        self.slot.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterRpc for MockRpc {
    async fn latest_blockhash(&self) -> EngineResult<Hash> {
        Ok(Hash::default())
    }

    async fn fee_for_message(&self, _message: &VersionedMessage) -> EngineResult<u64> {
        if self.fail_fee {
            Err(EngineError::RpcUnavailable("fee api disabled".to_string()))
        } else {
            Ok(5_000)
        }
    }

    async fn slot(&self) -> EngineResult<u64> {
        Ok(self.slot.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn balance(&self, _pubkey: &Pubkey) -> EngineResult<u64> {
        Ok(0)
    }

    async fn send(&self, tx: &BuiltTransaction) -> EngineResult<Signature> {
        let signature = tx.signature().unwrap_or_default();
        self.sent.lock().unwrap().push(signature.to_string());
        Ok(signature)
    }

    fn network(&self) -> NetworkId {
        NetworkId::Localnet
    }
}

struct Fixture {
    _dir: TempDir,
    wallets: WalletStore,
    registry: ProgramRegistry,
    out_dir: PathBuf,
}

fn fixture(deployed: bool) -> Fixture {
    let dir = TempDir::new().unwrap();
    for name in ["alice", "bob", "oracle_wallet"] {
        write_keypair_file(&Keypair::new(), dir.path().join(format!("{}.json", name))).unwrap();
    }
    let idl_path = dir.path().join("price_bet.json");
    std::fs::write(&idl_path, PRICE_BET_IDL).unwrap();

    let registry = ProgramRegistry::from_manifest(ProgramManifest {
        programs: vec![ProgramEntry {
            name: "price_bet".to_string(),
            program_id: PROGRAM_ID.to_string(),
            idl: idl_path,
            cluster: Cluster::Localnet,
            deployed,
        }],
    })
    .unwrap();

    let out_dir = dir.path().join("results");
    Fixture {
        wallets: WalletStore::new(dir.path()),
        registry,
        out_dir,
        _dir: dir,
    }
}

fn actors() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("p1".to_string(), "alice".to_string()),
        ("p2".to_string(), "bob".to_string()),
    ])
}

fn join_call(sequence_id: u64, submit: bool) -> CallEntry {
    CallEntry {
        sequence_id,
        program: "price_bet".to_string(),
        instruction: "join".to_string(),
        accounts: AccountBindings::Named(BTreeMap::from([
            ("participant1".to_string(), serde_json::json!("p1")),
            ("participant2".to_string(), serde_json::json!("p2")),
            ("oracle".to_string(), serde_json::json!("oracle_wallet")),
            (
                "betInfo".to_string(),
                serde_json::json!({"opt": "seeds", "param": ["bet_info", "wallet:alice"]}),
            ),
        ])),
        args: ArgBindings::Named(BTreeMap::from([
            ("delay".to_string(), serde_json::json!("300")),
            ("wager".to_string(), serde_json::json!(1)),
        ])),
        provider_wallet: Some("alice".to_string()),
        network: None,
        submit,
    }
}

fn win_call(sequence_id: u64, submit: bool) -> CallEntry {
    CallEntry {
        sequence_id,
        program: "price_bet".to_string(),
        instruction: "win".to_string(),
        accounts: AccountBindings::Named(BTreeMap::from([
            ("oracle".to_string(), serde_json::json!("oracle_wallet")),
            (
                "betInfo".to_string(),
                serde_json::json!({"opt": "seeds", "param": ["bet_info", "wallet:alice"]}),
            ),
        ])),
        args: ArgBindings::Named(BTreeMap::new()),
        provider_wallet: Some("oracle_wallet".to_string()),
        network: None,
        submit,
    }
}

fn trace_of(entries: Vec<TraceEntry>) -> Trace {
    Trace {
        title: "price_bet_round".to_string(),
        actors: actors(),
        entries,
    }
}

#[tokio::test]
async fn replays_a_full_round_and_writes_the_report() {
    let fx = fixture(false);
    let rpc = MockRpc::new(100);
    let mut engine = ReplayEngine::new(&rpc, &fx.wallets, &fx.registry);

    let trace = trace_of(vec![
        TraceEntry::Call(join_call(1, false)),
        TraceEntry::Call(win_call(2, false)),
    ]);
    let report = engine.run(&trace, None).await;

    assert_eq!(report.network, "localnet");
    assert_eq!(report.platform, "Solana");
    assert_eq!(report.trace_title, "price_bet_round_results");
    assert_eq!(report.actions.len(), 2);

    let join = &report.actions[0];
    assert_eq!(join.sequence_id, 1);
    assert_eq!(join.function_name, "join");
    assert!(join.transaction_size_bytes > 0);
    assert_eq!(join.transaction_fees_lamports, Some(5_000));
    assert_eq!(join.transaction_hash, STATUS_NOT_SENT);

    let win = &report.actions[1];
    assert_eq!(win.function_name, "win");
    // The two-signer join transaction is strictly larger than the
    // single-signer win.
    assert!(join.transaction_size_bytes > win.transaction_size_bytes);

    let path = write_report(&report, &fx.out_dir).unwrap();
    assert!(path.ends_with("price_bet_round_results.json"));
    let reread: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(reread["actions"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn a_failing_entry_does_not_void_the_rest() {
    let fx = fixture(false);
    let rpc = MockRpc::new(0);
    let mut engine = ReplayEngine::new(&rpc, &fx.wallets, &fx.registry);

    let mut broken = join_call(1, false);
    broken.instruction = "fold".to_string();
    let trace = trace_of(vec![
        TraceEntry::Call(broken),
        TraceEntry::Call(win_call(2, false)),
    ]);

    let report = engine.run(&trace, None).await;
    assert_eq!(report.actions.len(), 1);
    assert_eq!(report.actions[0].sequence_id, 2);
}

#[tokio::test(start_paused = true)]
async fn barrier_gates_progress_on_slot_advancement() {
    let fx = fixture(false);
    let rpc = MockRpc::new(1_000);
    let mut engine = ReplayEngine::new(&rpc, &fx.wallets, &fx.registry);

    let trace = trace_of(vec![
        TraceEntry::Call(join_call(1, false)),
        TraceEntry::Barrier(BarrierEntry {
            sequence_id: 2,
            slots: 5,
        }),
        TraceEntry::Call(win_call(3, false)),
    ]);

    let started = tokio::time::Instant::now();
    let report = engine.run(&trace, None).await;

    assert_eq!(report.actions.len(), 2);
    assert_eq!(report.actions[0].sequence_id, 1);
    assert_eq!(report.actions[1].sequence_id, 3);
    // Four below-target polls, one slot apiece.
    assert!(started.elapsed() >= Duration::from_millis(4 * 400));
    assert!(rpc.current_slot() >= 1_005);
}

#[tokio::test]
async fn submission_is_gated_on_deployment() {
    let undeployed = fixture(false);
    let rpc = MockRpc::new(0);
    let mut engine = ReplayEngine::new(&rpc, &undeployed.wallets, &undeployed.registry);
    let report = engine
        .run(&trace_of(vec![TraceEntry::Call(join_call(1, true))]), None)
        .await;
    assert_eq!(report.actions[0].transaction_hash, STATUS_NOT_DEPLOYED);
    assert!(rpc.sent.lock().unwrap().is_empty());

    let deployed = fixture(true);
    let rpc = MockRpc::new(0);
    let mut engine = ReplayEngine::new(&rpc, &deployed.wallets, &deployed.registry);
    let report = engine
        .run(&trace_of(vec![TraceEntry::Call(join_call(1, true))]), None)
        .await;
    let hash = &report.actions[0].transaction_hash;
    assert_ne!(hash, STATUS_NOT_SENT);
    assert_ne!(hash, STATUS_NOT_DEPLOYED);
    assert_eq!(rpc.sent.lock().unwrap().as_slice(), &[hash.clone()]);
}

#[tokio::test]
async fn fee_lookup_failure_degrades_to_unknown() {
    let fx = fixture(false);
    let mut rpc = MockRpc::new(0);
    rpc.fail_fee = true;
    let mut engine = ReplayEngine::new(&rpc, &fx.wallets, &fx.registry);
    let report = engine
        .run(&trace_of(vec![TraceEntry::Call(win_call(1, false))]), None)
        .await;
    assert_eq!(report.actions.len(), 1);
    assert_eq!(report.actions[0].transaction_fees_lamports, None);
    assert!(report.actions[0].transaction_size_bytes > 0);
}

#[tokio::test]
async fn a_cancelled_run_still_reports_what_completed() {
    let fx = fixture(false);
    let rpc = MockRpc::new(0);
    let mut engine = ReplayEngine::new(&rpc, &fx.wallets, &fx.registry);
    let cancel = AtomicBool::new(true);
    let report = engine
        .run(
            &trace_of(vec![
                TraceEntry::Call(join_call(1, false)),
                TraceEntry::Call(win_call(2, false)),
            ]),
            Some(&cancel),
        )
        .await;
    assert!(report.actions.is_empty());
    assert_eq!(report.trace_title, "price_bet_round_results");
}
