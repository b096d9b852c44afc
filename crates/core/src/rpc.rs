use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_clock::Slot;
use solana_commitment_config::CommitmentConfig;
use solana_hash::Hash;
use solana_message::VersionedMessage;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use soltrace_types::NetworkId;

use crate::{builder::BuiltTransaction, error::EngineResult};

/// The narrow slice of cluster RPC the engine needs. Replay and estimation
/// run against this trait so tests can substitute a scripted cluster.
#[async_trait]
pub trait ClusterRpc: Send + Sync {
    async fn latest_blockhash(&self) -> EngineResult<Hash>;

    /// Fee in lamports the cluster would charge for this signed message.
    async fn fee_for_message(&self, message: &VersionedMessage) -> EngineResult<u64>;

    async fn slot(&self) -> EngineResult<Slot>;

    async fn balance(&self, pubkey: &Pubkey) -> EngineResult<u64>;

    async fn send(&self, tx: &BuiltTransaction) -> EngineResult<Signature>;

    fn network(&self) -> NetworkId;
}

/// A live JSON-RPC connection at confirmed commitment.
pub struct RpcConnection {
    client: RpcClient,
    network: NetworkId,
}

impl RpcConnection {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let network = NetworkId::from_endpoint(&endpoint);
        info!("connecting to {} ({})", endpoint, network);
        Self {
            client: RpcClient::new_with_commitment(endpoint, CommitmentConfig::confirmed()),
            network,
        }
    }
}

#[async_trait]
impl ClusterRpc for RpcConnection {
    async fn latest_blockhash(&self) -> EngineResult<Hash> {
        Ok(self.client.get_latest_blockhash().await?)
    }

    async fn fee_for_message(&self, message: &VersionedMessage) -> EngineResult<u64> {
        let fee = match message {
            VersionedMessage::Legacy(m) => self.client.get_fee_for_message(m).await?,
            VersionedMessage::V0(m) => self.client.get_fee_for_message(m).await?,
        };
        Ok(fee)
    }

    async fn slot(&self) -> EngineResult<Slot> {
        Ok(self.client.get_slot().await?)
    }

    async fn balance(&self, pubkey: &Pubkey) -> EngineResult<u64> {
        Ok(self.client.get_balance(pubkey).await?)
    }

    async fn send(&self, tx: &BuiltTransaction) -> EngineResult<Signature> {
        let signature = match tx {
            BuiltTransaction::Legacy(tx) => self.client.send_transaction(tx).await?,
            BuiltTransaction::Versioned(tx) => self.client.send_transaction(tx).await?,
        };
        Ok(signature)
    }

    fn network(&self) -> NetworkId {
        self.network
    }
}
