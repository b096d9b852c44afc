use sha2::{Digest, Sha256};
use solana_hash::Hash;
use solana_instruction::{AccountMeta, Instruction};
use solana_keypair::Keypair;
use solana_message::{v0, VersionedMessage};
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::{versioned::VersionedTransaction, Transaction};

use crate::{
    accounts::ResolvedAccounts,
    coder::{self, Value},
    error::{EngineError, EngineResult},
    idl::InstructionSchema,
};

const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::from_str_const("11111111111111111111111111111111");

/// First 8 bytes of sha256("global:<instruction>"), prepended to every
/// instruction's data.
pub fn discriminator(instruction: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{}", instruction).as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// Encodes the instruction data: discriminator, then each argument in
/// declaration order.
pub fn encode_data(schema: &InstructionSchema, values: &[Value]) -> EngineResult<Vec<u8>> {
    debug_assert_eq!(schema.args.len(), values.len());
    let mut data = discriminator(&schema.name).to_vec();
    for (spec, value) in schema.args.iter().zip(values) {
        coder::encode(&spec.name, &spec.kind, value, &mut data)?;
    }
    Ok(data)
}

/// Assembles the instruction: metas in schema order, writability and
/// signerness from the schema, the implicit runtime account re-appended
/// last when the schema declared it.
pub fn build_instruction(
    program_id: &Pubkey,
    schema: &InstructionSchema,
    resolved: &ResolvedAccounts,
    values: &[Value],
) -> EngineResult<Instruction> {
    if resolved.accounts.len() != schema.accounts.len() {
        return Err(EngineError::MissingAccount {
            instruction: schema.name.clone(),
            expected: schema.accounts.len(),
            resolved: resolved.accounts.len(),
        });
    }

    let mut metas: Vec<AccountMeta> = schema
        .accounts
        .iter()
        .zip(&resolved.accounts)
        .map(|(spec, account)| {
            if spec.is_writable {
                AccountMeta::new(account.pubkey, spec.is_signer)
            } else {
                AccountMeta::new_readonly(account.pubkey, spec.is_signer)
            }
        })
        .collect();
    if schema.needs_system_program {
        metas.push(AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false));
    }

    Ok(Instruction {
        program_id: *program_id,
        accounts: metas,
        data: encode_data(schema, values)?,
    })
}

/// A transaction in whichever form was built for it.
///
/// Calls with account-level signers take the legacy form so every keypair
/// signs the final message; calls whose only signer is the fee provider
/// take the v0 versioned form.
pub enum BuiltTransaction {
    Legacy(Transaction),
    Versioned(VersionedTransaction),
}

impl BuiltTransaction {
    /// Builds and signs the transaction for one instruction. `signers` are
    /// the account-level keypairs; the provider pays the fee and always
    /// signs.
    pub fn build(
        instruction: Instruction,
        provider: &Keypair,
        signers: &[&Keypair],
        blockhash: Hash,
    ) -> EngineResult<Self> {
        if signers.is_empty() {
            let message = v0::Message::try_compile(&provider.pubkey(), &[instruction], &[], blockhash)
                .map_err(|e| EngineError::Signing(e.to_string()))?;
            let tx = VersionedTransaction::try_new(VersionedMessage::V0(message), &[provider])
                .map_err(|e| EngineError::Signing(e.to_string()))?;
            return Ok(BuiltTransaction::Versioned(tx));
        }

        // The provider signs first as fee payer; account signers follow,
        // deduplicated in case the provider doubles as one of them.
        let mut signing: Vec<&Keypair> = vec![provider];
        for signer in signers {
            if signing.iter().all(|s| s.pubkey() != signer.pubkey()) {
                signing.push(signer);
            }
        }
        let mut tx = Transaction::new_with_payer(&[instruction], Some(&provider.pubkey()));
        tx.try_sign(&signing, blockhash)
            .map_err(|e| EngineError::Signing(e.to_string()))?;
        Ok(BuiltTransaction::Legacy(tx))
    }

    /// Exact on-wire size in bytes.
    pub fn serialized_size(&self) -> EngineResult<u64> {
        let bytes = match self {
            BuiltTransaction::Legacy(tx) => bincode::serialize(tx),
            BuiltTransaction::Versioned(tx) => bincode::serialize(tx),
        }
        .map_err(|e| EngineError::Serialization(e.to_string()))?;
        Ok(bytes.len() as u64)
    }

    /// The signed message, in the versioned envelope the fee API expects.
    pub fn message(&self) -> VersionedMessage {
        match self {
            BuiltTransaction::Legacy(tx) => VersionedMessage::Legacy(tx.message.clone()),
            BuiltTransaction::Versioned(tx) => tx.message.clone(),
        }
    }

    /// First signature, which doubles as the transaction hash.
    pub fn signature(&self) -> Option<Signature> {
        match self {
            BuiltTransaction::Legacy(tx) => tx.signatures.first().copied(),
            BuiltTransaction::Versioned(tx) => tx.signatures.first().copied(),
        }
    }

    pub fn into_versioned(self) -> VersionedTransaction {
        match self {
            BuiltTransaction::Legacy(tx) => tx.into(),
            BuiltTransaction::Versioned(tx) => tx,
        }
    }
}
