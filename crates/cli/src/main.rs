use std::{
    path::PathBuf,
    process,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::Local;
use clap::{ArgAction, Parser, Subcommand};
use fern::colors::{Color, ColoredLevelConfig};
use log::{debug, error, warn};
use solana_pubkey::Pubkey;
use soltrace_core::{
    idl::IdlDocument,
    pda::{self, SeedBytes},
    programs::ProgramRegistry,
    replay::{write_report, ReplayEngine},
    rpc::{ClusterRpc, RpcConnection},
    trace,
    wallet::WalletStore,
    EngineError, EngineResult,
};
use soltrace_types::{Cluster, ReplayConfig, TraceEntry};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None, name = "soltrace", bin_name = "soltrace")]
struct Opts {
    #[clap(subcommand)]
    command: Command,
    /// Increase log verbosity (eg. soltrace -vv replay trace.json)
    #[arg(long = "verbose", short = 'v', global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a trace and write the measurement report
    #[clap(name = "replay", bin_name = "replay")]
    Replay(ReplayCommand),
    /// Derive a program-derived address from literal seeds
    #[clap(name = "pda", bin_name = "pda")]
    Pda(PdaCommand),
    /// Inspect a schema document
    #[clap(name = "inspect", bin_name = "inspect")]
    Inspect(InspectCommand),
    /// Query the lamport balance of an account
    #[clap(name = "balance", bin_name = "balance")]
    Balance(BalanceCommand),
}

#[derive(Parser, Debug)]
struct ReplayCommand {
    /// Path to the trace file, .json or .csv (eg. soltrace replay round.csv)
    trace: PathBuf,
    /// Path to a JSON replay configuration file; flags below override it
    #[arg(long = "config", short = 'c')]
    config: Option<PathBuf>,
    /// Directory of JSON keypair files (default "wallets")
    #[arg(long = "wallets", short = 'w')]
    wallets: Option<PathBuf>,
    /// Path to the program manifest (default "programs.json")
    #[arg(long = "programs", short = 'p')]
    programs: Option<PathBuf>,
    /// Directory the report is written to (default "results")
    #[arg(long = "out", short = 'o')]
    out: Option<PathBuf>,
    /// RPC endpoint (cannot be used with --network)
    #[arg(long = "url", short = 'u', conflicts_with = "network")]
    rpc_url: Option<String>,
    /// Choose a predefined cluster (eg. soltrace replay round.csv --network devnet)
    #[arg(long = "network", short = 'n', conflicts_with = "rpc_url")]
    network: Option<Cluster>,
}

#[derive(Parser, Debug)]
struct PdaCommand {
    /// Base58 program id
    program_id: String,
    /// Literal seeds, applied in order (eg. soltrace pda <id> bet_info round_1)
    #[arg(required = true)]
    seeds: Vec<String>,
}

#[derive(Parser, Debug)]
struct InspectCommand {
    /// Path to the schema document
    idl: PathBuf,
    /// Show one instruction in detail instead of listing all of them
    instruction: Option<String>,
}

#[derive(Parser, Debug)]
struct BalanceCommand {
    /// Base58 account key
    pubkey: String,
    /// RPC endpoint to query
    #[arg(long = "url", short = 'u')]
    rpc_url: Option<String>,
    /// Choose a predefined cluster (eg. soltrace balance <key> --network devnet)
    #[arg(long = "network", short = 'n', conflicts_with = "rpc_url")]
    network: Option<Cluster>,
}

#[tokio::main]
async fn main() {
    let opts = Opts::parse();
    init_logger(match opts.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    });

    let outcome = match opts.command {
        Command::Replay(cmd) => handle_replay(cmd).await,
        Command::Pda(cmd) => handle_pda(cmd),
        Command::Inspect(cmd) => handle_inspect(cmd),
        Command::Balance(cmd) => handle_balance(cmd).await,
    };
    if let Err(e) = outcome {
        error!("{}", e);
        process::exit(1);
    }
}

fn init_logger(level: log::LevelFilter) {
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red)
        .debug(Color::Blue)
        .trace(Color::White);

    let result = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} {} {}",
                Local::now().format("%H:%M:%S"),
                colors.color(record.level()),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply();
    if let Err(e) = result {
        eprintln!("failed to initialize logger: {}", e);
    }
}

async fn handle_replay(cmd: ReplayCommand) -> EngineResult<()> {
    let mut config = match &cmd.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str::<ReplayConfig>(&raw)
                .map_err(|e| EngineError::Config(e.to_string()))?
        }
        None => ReplayConfig::default(),
    };
    if let Some(dir) = cmd.wallets {
        config.wallets_dir = dir;
    }
    if let Some(path) = cmd.programs {
        config.programs_manifest = path;
    }
    if let Some(dir) = cmd.out {
        config.output_dir = dir;
    }
    if let Some(url) = cmd.rpc_url {
        config.rpc_url = Some(url);
    }

    let registry = ProgramRegistry::load(&config.programs_manifest)?;
    let wallets = WalletStore::new(&config.wallets_dir);
    debug!("wallets available: {:?}", wallets.list_names()?);
    let trace = trace::load_trace(&cmd.trace)?;

    let endpoint = match (&config.rpc_url, cmd.network) {
        (Some(url), _) => url.clone(),
        (None, Some(network)) => network.rpc_url().to_string(),
        // Fall back to the cluster the trace itself was authored against.
        (None, None) => trace
            .entries
            .iter()
            .find_map(|entry| match entry {
                TraceEntry::Call(call) => call.network,
                TraceEntry::Barrier(_) => None,
            })
            .unwrap_or_default()
            .rpc_url()
            .to_string(),
    };
    let rpc = RpcConnection::new(endpoint);

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing the current entry");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let mut engine = ReplayEngine::new(&rpc, &wallets, &registry);
    let report = engine.run(&trace, Some(&cancel)).await;
    let path = write_report(&report, &config.output_dir)?;
    println!("{}", path.display());
    Ok(())
}

fn handle_pda(cmd: PdaCommand) -> EngineResult<()> {
    let program_id =
        Pubkey::from_str(&cmd.program_id).map_err(|e| EngineError::InvalidKeyFormat {
            account: "program".to_string(),
            value: cmd.program_id.clone(),
            reason: e.to_string(),
        })?;
    let seeds = SeedBytes(cmd.seeds.iter().map(|s| s.as_bytes().to_vec()).collect());
    let (address, bump) = pda::derive(&program_id, &seeds)?;
    println!("{} (bump {})", address, bump);
    Ok(())
}

fn handle_inspect(cmd: InspectCommand) -> EngineResult<()> {
    let idl = IdlDocument::from_file(&cmd.idl)?;
    match cmd.instruction {
        None => {
            for name in idl.instructions() {
                println!("{}", name);
            }
        }
        Some(instruction) => {
            let schema = idl.resolve(&instruction)?;
            println!("{}", schema.name);
            for account in &schema.accounts {
                println!(
                    "  account {} (signer: {}, writable: {})",
                    account.name, account.is_signer, account.is_writable
                );
            }
            if schema.needs_system_program {
                println!("  account system_program (implicit)");
            }
            for arg in &schema.args {
                println!("  arg {}: {:?}", arg.name, arg.kind);
            }
        }
    }
    Ok(())
}

async fn handle_balance(cmd: BalanceCommand) -> EngineResult<()> {
    let pubkey = Pubkey::from_str(&cmd.pubkey).map_err(|e| EngineError::InvalidKeyFormat {
        account: "account".to_string(),
        value: cmd.pubkey.clone(),
        reason: e.to_string(),
    })?;
    let endpoint = match (&cmd.rpc_url, cmd.network) {
        (Some(url), _) => url.clone(),
        (None, network) => network.unwrap_or_default().rpc_url().to_string(),
    };
    let rpc = RpcConnection::new(endpoint);
    let lamports = rpc.balance(&pubkey).await?;
    println!("{} lamports ({} SOL)", lamports, lamports as f64 / 1e9);
    Ok(())
}
