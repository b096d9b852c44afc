/// Assumed wall-clock duration of one slot, used to pace barrier polling.
pub const DEFAULT_SLOT_TIME_MS: u64 = 400;

/// Delay before re-polling the slot height after a transient RPC failure.
pub const SLOT_POLL_RETRY_DELAY_MS: u64 = 2_000;

pub const DEFAULT_LOCALNET_RPC_URL: &str = "http://127.0.0.1:8899";
pub const DEFAULT_DEVNET_RPC_URL: &str = "https://api.devnet.solana.com";
pub const DEFAULT_MAINNET_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// Status string recorded when an entry did not request submission.
pub const STATUS_NOT_SENT: &str = "transaction not sent";
/// Status string recorded when the target program is not deployed.
pub const STATUS_NOT_DEPLOYED: &str = "program is not deployed";
