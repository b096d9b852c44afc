use crate::{builder::BuiltTransaction, error::EngineResult, rpc::ClusterRpc};

/// Exact on-wire size of the built transaction, in bytes.
pub fn transaction_size(tx: &BuiltTransaction) -> EngineResult<u64> {
    tx.serialized_size()
}

/// Asks the cluster what the transaction would cost.
///
/// Fee measurement is best effort: an unreachable cluster or an endpoint
/// without fee support degrades to `None` rather than failing the entry,
/// since size and hash are still worth reporting.
pub async fn transaction_fee(rpc: &dyn ClusterRpc, tx: &BuiltTransaction) -> Option<u64> {
    match rpc.fee_for_message(&tx.message()).await {
        Ok(fee) => Some(fee),
        Err(e) => {
            warn!("fee lookup failed, reporting unknown: {}", e);
            None
        }
    }
}
