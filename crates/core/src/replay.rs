use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use solana_keypair::Keypair;
use soltrace_types::{
    ArgBindings, BarrierEntry, CallEntry, ReplayReport, ReportAction, Trace, TraceEntry,
    DEFAULT_SLOT_TIME_MS, SLOT_POLL_RETRY_DELAY_MS, STATUS_NOT_DEPLOYED, STATUS_NOT_SENT,
};

use crate::{
    accounts::AccountResolver,
    builder::{self, BuiltTransaction},
    coder::{self, Value},
    error::{EngineError, EngineResult},
    estimate,
    idl::{camel_to_snake, IdlDocument, InstructionSchema},
    programs::{ProgramRecord, ProgramRegistry},
    rpc::ClusterRpc,
    wallet::WalletStore,
};

/// Replays a trace against a cluster: every call is measured, barriers gate
/// progress on slot advancement, and the outcome is collected into a report.
///
/// Entry failures are terminal for the entry only; the run always produces
/// a report covering whatever succeeded.
pub struct ReplayEngine<'a> {
    rpc: &'a dyn ClusterRpc,
    wallets: &'a WalletStore,
    programs: &'a ProgramRegistry,
    schemas: BTreeMap<String, IdlDocument>,
}

impl<'a> ReplayEngine<'a> {
    pub fn new(
        rpc: &'a dyn ClusterRpc,
        wallets: &'a WalletStore,
        programs: &'a ProgramRegistry,
    ) -> Self {
        Self {
            rpc,
            wallets,
            programs,
            schemas: BTreeMap::new(),
        }
    }

    /// Runs the trace front to back. A set `cancel` flag stops the run at
    /// the next entry boundary (or mid-barrier); everything measured so far
    /// is still reported.
    pub async fn run(&mut self, trace: &Trace, cancel: Option<&AtomicBool>) -> ReplayReport {
        let mut report = ReplayReport::new(self.rpc.network(), &trace.title);
        info!(
            "replaying '{}': {} entries against {}",
            trace.title,
            trace.entries.len(),
            self.rpc.network()
        );

        for entry in &trace.entries {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                warn!("replay cancelled at entry {}", entry.sequence_id());
                break;
            }
            match entry {
                TraceEntry::Barrier(barrier) => self.wait_for_slots(barrier, cancel).await,
                TraceEntry::Call(call) => match self.execute_call(trace, call).await {
                    Ok(action) => {
                        info!(
                            "entry {}: {} ({} bytes, fee {:?}, {} slots)",
                            action.sequence_id,
                            action.function_name,
                            action.transaction_size_bytes,
                            action.transaction_fees_lamports,
                            action.execution_time_in_slots
                        );
                        report.actions.push(action);
                    }
                    Err(e) => {
                        error!("entry {} failed: {}", call.sequence_id, e);
                    }
                },
            }
        }
        report
    }

    async fn execute_call(&mut self, trace: &Trace, call: &CallEntry) -> EngineResult<ReportAction> {
        let record = self.programs.get(&call.program)?;
        let schema = self.schema_for(record, &call.instruction)?;

        let resolver = AccountResolver::new(self.wallets, record.program_id);
        let refs = resolver.collect_refs(&schema, call, &trace.actors)?;
        let resolved = resolver.resolve(&schema, refs)?;
        let values = coerce_args(&schema, &call.args)?;

        let signers = resolved.signers();
        let provider = match &call.provider_wallet {
            Some(name) => Some(self.wallets.load(name)?),
            None => None,
        };
        let provider: &Keypair = match provider.as_ref() {
            Some(keypair) => keypair,
            None => signers.first().copied().ok_or_else(|| {
                EngineError::Trace(format!(
                    "entry {} names no provider wallet and no signer to fall back on",
                    call.sequence_id
                ))
            })?,
        };

        let start_slot = self.rpc.slot().await?;
        let blockhash = self.rpc.latest_blockhash().await?;
        let instruction =
            builder::build_instruction(&record.program_id, &schema, &resolved, &values)?;
        let tx = BuiltTransaction::build(instruction, provider, &signers, blockhash)?;
        let end_slot = self.rpc.slot().await?;

        let size = estimate::transaction_size(&tx)?;
        let fee = estimate::transaction_fee(self.rpc, &tx).await;

        let hash = if !call.submit {
            STATUS_NOT_SENT.to_string()
        } else if !record.entry.deployed {
            warn!(
                "entry {}: '{}' is not deployed, skipping submission",
                call.sequence_id, call.program
            );
            STATUS_NOT_DEPLOYED.to_string()
        } else {
            self.rpc.send(&tx).await?.to_string()
        };

        Ok(ReportAction {
            sequence_id: call.sequence_id,
            function_name: schema.name,
            transaction_size_bytes: size,
            transaction_fees_lamports: fee,
            transaction_hash: hash,
            execution_time_in_slots: end_slot.saturating_sub(start_slot),
        })
    }

    fn schema_for(
        &mut self,
        record: &ProgramRecord,
        instruction: &str,
    ) -> EngineResult<InstructionSchema> {
        if !self.schemas.contains_key(&record.entry.name) {
            let doc = record.load_idl()?;
            self.schemas.insert(record.entry.name.clone(), doc);
        }
        self.schemas[&record.entry.name].resolve(instruction)
    }

    /// Blocks until the cluster has advanced `slots` past the slot observed
    /// on entry. Polls once per expected slot; transient RPC errors are
    /// retried after a longer delay and never abort the run.
    async fn wait_for_slots(&self, barrier: &BarrierEntry, cancel: Option<&AtomicBool>) {
        let start = loop {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                return;
            }
            match self.rpc.slot().await {
                Ok(slot) => break slot,
                Err(e) => {
                    warn!("slot query failed at barrier {}: {}", barrier.sequence_id, e);
                    tokio::time::sleep(Duration::from_millis(SLOT_POLL_RETRY_DELAY_MS)).await;
                }
            }
        };
        let target = start + barrier.slots;
        info!(
            "barrier {}: waiting {} slots (slot {} -> {})",
            barrier.sequence_id, barrier.slots, start, target
        );
        loop {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                return;
            }
            match self.rpc.slot().await {
                Ok(slot) if slot >= target => return,
                Ok(_) => {
                    tokio::time::sleep(Duration::from_millis(DEFAULT_SLOT_TIME_MS)).await;
                }
                Err(e) => {
                    warn!("slot query failed at barrier {}: {}", barrier.sequence_id, e);
                    tokio::time::sleep(Duration::from_millis(SLOT_POLL_RETRY_DELAY_MS)).await;
                }
            }
        }
    }
}

/// Coerces a call's raw argument bindings against the schema, in
/// declaration order.
fn coerce_args(schema: &InstructionSchema, args: &ArgBindings) -> EngineResult<Vec<Value>> {
    match args {
        ArgBindings::Positional(cells) => {
            if cells.len() != schema.args.len() {
                return Err(EngineError::InvalidArgument {
                    name: schema.name.clone(),
                    reason: format!(
                        "expected {} arguments, got {}",
                        schema.args.len(),
                        cells.len()
                    ),
                });
            }
            schema
                .args
                .iter()
                .zip(cells)
                .map(|(spec, cell)| coder::coerce(&spec.name, &spec.kind, cell))
                .collect()
        }
        ArgBindings::Named(bound) => {
            let mut renamed: BTreeMap<String, &serde_json::Value> = BTreeMap::new();
            for (key, value) in bound {
                renamed.insert(camel_to_snake(key), value);
            }
            schema
                .args
                .iter()
                .map(|spec| {
                    let value =
                        renamed
                            .get(&spec.name)
                            .ok_or_else(|| EngineError::InvalidArgument {
                                name: spec.name.clone(),
                                reason: "no value bound".to_string(),
                            })?;
                    coder::coerce_json(&spec.name, &spec.kind, value)
                })
                .collect()
        }
    }
}

/// Writes the report as pretty JSON to `<title>.json` under `dir`, creating
/// the directory if needed. Returns the path written.
pub fn write_report(report: &ReplayReport, dir: &Path) -> EngineResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", report.trace_title));
    let rendered = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, rendered)?;
    info!("report written to {}", path.display());
    Ok(path)
}
