use std::path::Path;

use soltrace_types::{
    AccountBindings, ArgBindings, BarrierEntry, CallEntry, Cluster, Trace, TraceDocument,
    TraceEntry,
};

use crate::error::{EngineError, EngineResult};

/// Instruction-field sentinel that turns a CSV row into a barrier.
const BARRIER_INSTRUCTION: &str = "wait_slots";

/// Loads a trace from disk, dispatching on the file extension: `.json` for
/// document traces, `.csv` for delimited ones.
pub fn load_trace(path: &Path) -> EngineResult<Trace> {
    let title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| EngineError::Trace(format!("cannot derive a title from {:?}", path)))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            let raw = std::fs::read_to_string(path)?;
            from_json(&raw)
        }
        Some("csv") => {
            let raw = std::fs::read_to_string(path)?;
            from_csv(&title, &raw)
        }
        other => Err(EngineError::Trace(format!(
            "unsupported trace format {:?}; expected .json or .csv",
            other
        ))),
    }
}

/// Parses a JSON trace document into the replayable form.
pub fn from_json(raw: &str) -> EngineResult<Trace> {
    let doc: TraceDocument = serde_json::from_str(raw).map_err(|e| EngineError::Trace(e.to_string()))?;

    let mut entries = Vec::with_capacity(doc.trace_execution.len());
    for step in &doc.trace_execution {
        if let Some(slots) = step.wait_slots {
            entries.push(TraceEntry::Barrier(BarrierEntry {
                sequence_id: step.sequence_id,
                slots,
            }));
            continue;
        }
        let instruction = step.function_name.clone().ok_or_else(|| {
            EngineError::Trace(format!(
                "step {} names neither a function nor a slot wait",
                step.sequence_id
            ))
        })?;
        let program = step
            .program
            .clone()
            .or_else(|| doc.program.clone())
            .ok_or_else(|| {
                EngineError::Trace(format!("step {} targets no program", step.sequence_id))
            })?;
        entries.push(TraceEntry::Call(CallEntry {
            sequence_id: step.sequence_id,
            program,
            instruction,
            accounts: AccountBindings::Named(step.solana.clone()),
            args: ArgBindings::Named(step.args.clone()),
            provider_wallet: step
                .provider_wallet
                .clone()
                .or_else(|| doc.provider_wallet.clone()),
            network: None,
            submit: flag(step.send_transaction.as_ref()),
        }));
    }

    Ok(Trace {
        title: doc.trace_title,
        actors: doc.trace_actors,
        entries,
    })
}

/// Parses a delimited trace. Rows are
/// `[id, program, instruction, accountRef.., argValue.., provider, network,
/// submit]`; account cells carry a `W:`/`P:`/`E:` marker, which is also how
/// the account/argument boundary is found. A row whose instruction field is
/// `wait_slots` is a barrier and carries the slot offset in the next cell.
pub fn from_csv(title: &str, raw: &str) -> EngineResult<Trace> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cells: Vec<&str> = record.iter().collect();
        if cells.is_empty() || cells[0].is_empty() || cells[0].starts_with('#') {
            continue;
        }
        if cells.len() < 3 {
            return Err(EngineError::Trace(format!(
                "row '{}' has too few cells",
                cells.join(",")
            )));
        }
        let sequence_id: u64 = cells[0]
            .parse()
            .map_err(|_| EngineError::Trace(format!("'{}' is not a sequence id", cells[0])))?;

        if cells[2] == BARRIER_INSTRUCTION {
            let offset = cells.get(3).copied().unwrap_or_default();
            let slots: u64 = offset.parse().map_err(|_| {
                EngineError::Trace(format!("'{}' is not a slot offset", offset))
            })?;
            entries.push(TraceEntry::Barrier(BarrierEntry { sequence_id, slots }));
            continue;
        }

        if cells.len() < 6 {
            return Err(EngineError::Trace(format!(
                "row {} has too few cells for a call",
                sequence_id
            )));
        }
        let middle = &cells[3..cells.len() - 3];
        let account_count = middle
            .iter()
            .take_while(|c| {
                c.starts_with("W:") || c.starts_with("P:") || c.starts_with("E:")
            })
            .count();
        let accounts = middle[..account_count]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let args = middle[account_count..]
            .iter()
            .map(|c| c.to_string())
            .collect();

        let tail = &cells[cells.len() - 3..];
        let provider_wallet = (!tail[0].is_empty()).then(|| tail[0].to_string());
        let network = if tail[1].is_empty() {
            None
        } else {
            Some(tail[1].parse::<Cluster>().map_err(EngineError::Trace)?)
        };
        let submit = matches!(tail[2].to_lowercase().as_str(), "true" | "1" | "yes");

        entries.push(TraceEntry::Call(CallEntry {
            sequence_id,
            program: cells[1].to_string(),
            instruction: cells[2].to_string(),
            accounts: AccountBindings::Positional(accounts),
            args: ArgBindings::Positional(args),
            provider_wallet,
            network,
            submit,
        }));
    }

    Ok(Trace {
        title: title.to_string(),
        actors: Default::default(),
        entries,
    })
}

fn flag(value: Option<&serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_trace_parses_calls_and_barriers_in_order() {
        let raw = r#"{
            "trace_title": "price_bet_round",
            "trace_actors": {"p1": "alice", "p2": "bob"},
            "program": "price_bet",
            "provider_wallet": "alice",
            "trace_execution": [
                {
                    "sequence_id": 1,
                    "function_name": "join",
                    "solana": {
                        "participant1": "p1",
                        "participant2": "p2",
                        "oracle": "oracle_wallet",
                        "betInfo": {"opt": "seeds", "param": ["bet_info"]}
                    },
                    "args": {"delay": "300", "wager": "1"},
                    "send_transaction": true
                },
                {"sequence_id": 2, "wait_slots": 5},
                {
                    "sequence_id": 3,
                    "function_name": "win",
                    "solana": {"oracle": "oracle_wallet", "betInfo": {"opt": "seeds", "param": ["bet_info"]}},
                    "args": {}
                }
            ]
        }"#;
        let trace = from_json(raw).unwrap();
        assert_eq!(trace.title, "price_bet_round");
        assert_eq!(trace.actors.len(), 2);
        assert_eq!(trace.entries.len(), 3);

        match &trace.entries[0] {
            TraceEntry::Call(call) => {
                assert_eq!(call.sequence_id, 1);
                assert_eq!(call.program, "price_bet");
                assert_eq!(call.instruction, "join");
                assert_eq!(call.provider_wallet.as_deref(), Some("alice"));
                assert!(call.submit);
            }
            other => panic!("expected a call, got {:?}", other),
        }
        match &trace.entries[1] {
            TraceEntry::Barrier(barrier) => {
                assert_eq!(barrier.sequence_id, 2);
                assert_eq!(barrier.slots, 5);
            }
            other => panic!("expected a barrier, got {:?}", other),
        }
        match &trace.entries[2] {
            TraceEntry::Call(call) => assert!(!call.submit),
            other => panic!("expected a call, got {:?}", other),
        }
    }

    #[test]
    fn json_step_without_function_or_wait_is_rejected() {
        let raw = r#"{
            "trace_title": "broken",
            "trace_execution": [{"sequence_id": 1}]
        }"#;
        assert!(matches!(from_json(raw), Err(EngineError::Trace(_))));
    }

    #[test]
    fn csv_trace_splits_accounts_from_args_at_the_marker_boundary() {
        let raw = "\
1,price_bet,join,W:alice,W:bob,E:BPFLoaderUpgradeab1e11111111111111111111111,P:bet_info,300,1,alice,devnet,true
2,price_bet,wait_slots,5
3,price_bet,win,W:oracle_wallet,P:bet_info,alice,devnet,false
";
        let trace = from_csv("round", raw).unwrap();
        assert_eq!(trace.title, "round");
        assert_eq!(trace.entries.len(), 3);

        match &trace.entries[0] {
            TraceEntry::Call(call) => {
                assert_eq!(call.instruction, "join");
                match &call.accounts {
                    AccountBindings::Positional(cells) => assert_eq!(cells.len(), 4),
                    other => panic!("expected positional accounts, got {:?}", other),
                }
                match &call.args {
                    ArgBindings::Positional(args) => {
                        assert_eq!(args, &vec!["300".to_string(), "1".to_string()])
                    }
                    other => panic!("expected positional args, got {:?}", other),
                }
                assert_eq!(call.network, Some(Cluster::Devnet));
                assert!(call.submit);
            }
            other => panic!("expected a call, got {:?}", other),
        }
        assert!(matches!(
            &trace.entries[1],
            TraceEntry::Barrier(BarrierEntry { slots: 5, .. })
        ));
        match &trace.entries[2] {
            TraceEntry::Call(call) => {
                assert_eq!(call.instruction, "win");
                assert!(!call.submit);
            }
            other => panic!("expected a call, got {:?}", other),
        }
    }

    #[test]
    fn csv_rejects_non_numeric_sequence_ids() {
        assert!(matches!(
            from_csv("bad", "one,price_bet,win,W:a,,x,devnet,false\n"),
            Err(EngineError::Trace(_))
        ));
    }

    #[test]
    fn csv_skips_comments_and_blank_rows() {
        let raw = "# a comment row\n1,price_bet,wait_slots,2\n";
        let trace = from_csv("t", raw).unwrap();
        assert_eq!(trace.entries.len(), 1);
    }
}
