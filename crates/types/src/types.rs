use std::{collections::BTreeMap, fmt, path::PathBuf, str::FromStr};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_DEVNET_RPC_URL, DEFAULT_LOCALNET_RPC_URL, DEFAULT_MAINNET_RPC_URL};

/// The cluster a program was deployed to, as recorded in the program manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Cluster {
    Localnet,
    #[default]
    Devnet,
    Mainnet,
}

impl Cluster {
    pub fn rpc_url(&self) -> &'static str {
        match self {
            Cluster::Localnet => DEFAULT_LOCALNET_RPC_URL,
            Cluster::Devnet => DEFAULT_DEVNET_RPC_URL,
            Cluster::Mainnet => DEFAULT_MAINNET_RPC_URL,
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cluster::Localnet => write!(f, "localnet"),
            Cluster::Devnet => write!(f, "devnet"),
            Cluster::Mainnet => write!(f, "mainnet"),
        }
    }
}

impl FromStr for Cluster {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "localnet" => Ok(Cluster::Localnet),
            "devnet" => Ok(Cluster::Devnet),
            "mainnet" | "mainnet-beta" => Ok(Cluster::Mainnet),
            _ => Err(format!(
                "Invalid cluster: {}. Valid values are: localnet, devnet, mainnet",
                s
            )),
        }
    }
}

/// Network identifier used to tag replay reports, inferred from the RPC
/// endpoint actually in use rather than from any manifest claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkId {
    Localnet,
    Devnet,
    Testnet,
    MainnetBeta,
    Unknown,
}

impl NetworkId {
    pub fn from_endpoint(endpoint: &str) -> Self {
        let lowered = endpoint.to_lowercase();
        if lowered.contains("devnet") {
            NetworkId::Devnet
        } else if lowered.contains("testnet") {
            NetworkId::Testnet
        } else if lowered.contains("mainnet") {
            NetworkId::MainnetBeta
        } else if lowered.contains("localhost")
            || lowered.contains("127.0.0.1")
            || lowered.contains("8899")
        {
            NetworkId::Localnet
        } else {
            NetworkId::Unknown
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkId::Localnet => write!(f, "localnet"),
            NetworkId::Devnet => write!(f, "devnet"),
            NetworkId::Testnet => write!(f, "testnet"),
            NetworkId::MainnetBeta => write!(f, "mainnet-beta"),
            NetworkId::Unknown => write!(f, "unknown"),
        }
    }
}

/// One deployed (or at least compiled) program known to the toolchain.
///
/// The compiler/deployer is an external collaborator; this entry is the
/// narrow interface the engine consumes: where the program lives, which
/// schema document describes it, and whether submission is allowed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgramEntry {
    pub name: String,
    /// Base58 program id.
    pub program_id: String,
    /// Path to the program's IDL-style schema document.
    pub idl: PathBuf,
    #[serde(default)]
    pub cluster: Cluster,
    /// Whether the program is actually deployed on `cluster`. Entries that
    /// were only compiled keep size/fee estimation but refuse submission.
    #[serde(default)]
    pub deployed: bool,
}

/// The program manifest consumed from disk: `{"programs": [...]}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProgramManifest {
    pub programs: Vec<ProgramEntry>,
}

/// Runtime configuration for one replay run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Directory of JSON keypair files.
    pub wallets_dir: PathBuf,
    /// Path to the program manifest.
    pub programs_manifest: PathBuf,
    /// Directory where result reports are written.
    pub output_dir: PathBuf,
    /// Overrides the cluster-derived RPC endpoint when set.
    #[serde(default)]
    pub rpc_url: Option<String>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            wallets_dir: PathBuf::from("wallets"),
            programs_manifest: PathBuf::from("programs.json"),
            output_dir: PathBuf::from("results"),
            rpc_url: None,
        }
    }
}

/// An ordered, externally authored list of operations to replay.
#[derive(Clone, Debug, PartialEq)]
pub struct Trace {
    pub title: String,
    /// Actor name -> wallet name bindings from the trace's actor table.
    pub actors: BTreeMap<String, String>,
    pub entries: Vec<TraceEntry>,
}

/// One trace entry: either a program call or a slot-wait barrier.
#[derive(Clone, Debug, PartialEq)]
pub enum TraceEntry {
    Call(CallEntry),
    Barrier(BarrierEntry),
}

impl TraceEntry {
    pub fn sequence_id(&self) -> u64 {
        match self {
            TraceEntry::Call(call) => call.sequence_id,
            TraceEntry::Barrier(barrier) => barrier.sequence_id,
        }
    }
}

/// A synchronization barrier: wait until the cluster advances by `slots`
/// slots past the slot observed when the barrier is reached.
#[derive(Clone, Debug, PartialEq)]
pub struct BarrierEntry {
    pub sequence_id: u64,
    pub slots: u64,
}

/// A single instruction invocation recorded in a trace.
#[derive(Clone, Debug, PartialEq)]
pub struct CallEntry {
    pub sequence_id: u64,
    pub program: String,
    pub instruction: String,
    pub accounts: AccountBindings,
    /// Raw argument values, still uncoerced.
    pub args: ArgBindings,
    /// Wallet funding the transaction fee. Falls back to the trace-level
    /// provider when absent.
    pub provider_wallet: Option<String>,
    /// Network the entry was authored against (CSV traces carry it per row).
    pub network: Option<Cluster>,
    pub submit: bool,
}

/// Account references as authored: CSV traces are positional (cells in
/// schema order), JSON traces bind by account name.
#[derive(Clone, Debug, PartialEq)]
pub enum AccountBindings {
    Positional(Vec<String>),
    Named(BTreeMap<String, serde_json::Value>),
}

/// Argument values as authored: CSV traces list them in declaration order,
/// JSON traces bind by argument name.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgBindings {
    Positional(Vec<String>),
    Named(BTreeMap<String, serde_json::Value>),
}

/// JSON trace document as found on disk.
#[derive(Clone, Debug, Deserialize)]
pub struct TraceDocument {
    pub trace_title: String,
    #[serde(default)]
    pub trace_actors: BTreeMap<String, String>,
    /// Program every step targets unless a step overrides it.
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub provider_wallet: Option<String>,
    pub trace_execution: Vec<TraceStep>,
}

/// One raw step of a JSON trace document. A step carrying `wait_slots` is a
/// barrier; anything else must name a function to call.
#[derive(Clone, Debug, Deserialize)]
pub struct TraceStep {
    pub sequence_id: u64,
    #[serde(default)]
    pub wait_slots: Option<u64>,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub solana: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub args: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub provider_wallet: Option<String>,
    #[serde(default)]
    pub send_transaction: Option<serde_json::Value>,
}

/// Result record for one replayed call, in input order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportAction {
    pub sequence_id: u64,
    pub function_name: String,
    pub transaction_size_bytes: u64,
    pub transaction_fees_lamports: Option<u64>,
    pub transaction_hash: String,
    pub execution_time_in_slots: u64,
}

/// The report artifact produced by one replay run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplayReport {
    pub network: String,
    pub platform: String,
    pub trace_title: String,
    pub generated_at: DateTime<Local>,
    pub actions: Vec<ReportAction>,
}

impl ReplayReport {
    pub fn new(network: NetworkId, trace_title: &str) -> Self {
        Self {
            network: network.to_string(),
            platform: "Solana".to_string(),
            trace_title: format!("{}_results", trace_title),
            generated_at: Local::now(),
            actions: Vec::new(),
        }
    }
}
