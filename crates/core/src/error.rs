use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Failure taxonomy of the engine. Entry-level failures abort only the
/// entry they occurred in; the replay loop decides whether to continue.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("program '{0}' is not known to the toolchain")]
    UnknownProgram(String),

    #[error("instruction '{instruction}' not found in the schema of program '{program}'")]
    UnknownInstruction {
        program: String,
        instruction: String,
    },

    #[error("account '{account}' is not declared by instruction '{instruction}'")]
    UnknownAccount {
        instruction: String,
        account: String,
    },

    #[error("argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("unsupported argument type '{0}'")]
    UnsupportedType(String),

    #[error("wallet '{0}' not found in the wallet store")]
    WalletNotFound(String),

    #[error("wallet '{name}' could not be read: {reason}")]
    WalletUnreadable { name: String, reason: String },

    #[error("invalid public key '{value}' for account '{account}': {reason}")]
    InvalidKeyFormat {
        account: String,
        value: String,
        reason: String,
    },

    #[error("account '{0}' resolves to a program-derived address but the schema marks it as a signer")]
    InvalidAccountBinding(String),

    #[error("no valid program-derived address exists for the given program id and seeds")]
    NoValidAddressFound,

    #[error("seed is {0} bytes long; program-derived address seeds are limited to 32 bytes")]
    SeedTooLong(usize),

    #[error("instruction '{instruction}' declares {expected} accounts but {resolved} were resolved")]
    MissingAccount {
        instruction: String,
        expected: usize,
        resolved: usize,
    },

    #[error("argument '{name}' value {value} does not fit the declared {width}-bit width")]
    EncodingOverflow {
        name: String,
        value: String,
        width: u16,
    },

    #[error("rpc unavailable: {0}")]
    RpcUnavailable(String),

    #[error("transaction signing failed: {0}")]
    Signing(String),

    #[error("transaction serialization failed: {0}")]
    Serialization(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("malformed trace: {0}")]
    Trace(String),

    #[error("malformed schema document: {0}")]
    Schema(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<solana_client::client_error::ClientError> for EngineError {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        EngineError::RpcUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Schema(e.to_string())
    }
}

impl From<csv::Error> for EngineError {
    fn from(e: csv::Error) -> Self {
        EngineError::Trace(e.to_string())
    }
}
