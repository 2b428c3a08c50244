//! Error types for Arbiter.

use serde::Serialize;

/// Top-level error type for the client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),

    #[error("Moderation error: {0}")]
    Moderation(#[from] ModerationError),
}

/// Failure domains for structured error reporting.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDomain {
    Config,
    Wallet,
    Storage,
    Contract,
}

/// Structured error payload for machine-readable CLI output.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub domain: ErrorDomain,
    pub code: &'static str,
    pub retryable: bool,
    pub message: String,
}

impl ErrorPayload {
    fn new(
        domain: ErrorDomain,
        code: &'static str,
        retryable: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            domain,
            code,
            retryable,
            message: message.into(),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error object returned by an EIP-1193 provider `request` call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("provider error {code}: {message}")]
pub struct ProviderRpcError {
    pub code: i64,
    pub message: String,
}

impl ProviderRpcError {
    /// The user declined the prompt.
    pub const USER_REJECTED: i64 = 4001;
    /// The provider does not know the requested chain.
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    /// Generic internal error used by transports without a provider code.
    pub const INTERNAL: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL, message)
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == Self::USER_REJECTED
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == Self::UNRECOGNIZED_CHAIN
    }
}

/// Wallet interaction errors surfaced at session transition boundaries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("Wallet provider is not installed")]
    NotInstalled,

    #[error("User rejected the request")]
    UserRejected,

    #[error("{0}")]
    RequestFailed(String),

    #[error("No accounts found after switch")]
    NoAccountsAfterSwitch,

    #[error("Another wallet operation is already in progress")]
    Busy,

    #[error("Wallet session has shut down")]
    ShutDown,
}

impl WalletError {
    pub fn request_failed(context: &str, err: &ProviderRpcError) -> Self {
        Self::RequestFailed(format!("{context}: {}", err.message))
    }
}

/// Durable key-value storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt storage file {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Arbitration contract errors.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("RPC call {method} failed: {reason}")]
    Rpc { method: String, reason: String },

    #[error("Failed to sync with ledger: {0}")]
    Sync(String),

    #[error("Could not file report: {0}")]
    WriteFailed(String),

    #[error("Consensus failed, oracles could not reach agreement: {0}")]
    ConsensusFailed(String),

    #[error("Transaction {hash} was rejected")]
    Rejected { hash: String },

    #[error("Transaction {hash} not accepted after {attempts} attempts")]
    ReceiptTimeout { hash: String, attempts: u32 },

    #[error("No account bound for contract writes")]
    MissingAccount,

    #[error("Invalid contract payload: {0}")]
    InvalidPayload(String),
}

/// Errors from the moderation workflow layer.
#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error("Wallet not connected or contract missing.")]
    WalletNotConnected,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl Error {
    /// Classify this error for structured output.
    pub fn to_error_payload(&self) -> ErrorPayload {
        match self {
            Self::Config(err) => {
                let code = match err {
                    ConfigError::MissingRequired { .. } => "config.missing",
                    ConfigError::InvalidValue { .. } => "config.invalid_value",
                    ConfigError::ParseError(_) => "config.parse_failed",
                    ConfigError::Io(_) => "config.io",
                };
                ErrorPayload::new(ErrorDomain::Config, code, false, self.to_string())
            }
            Self::Wallet(err) => {
                let (code, retryable) = match err {
                    WalletError::NotInstalled => ("wallet.not_installed", false),
                    WalletError::UserRejected => ("wallet.user_rejected", true),
                    WalletError::RequestFailed(_) => ("wallet.request_failed", true),
                    WalletError::NoAccountsAfterSwitch => ("wallet.no_accounts", true),
                    WalletError::Busy => ("wallet.busy", true),
                    WalletError::ShutDown => ("wallet.shut_down", false),
                };
                ErrorPayload::new(ErrorDomain::Wallet, code, retryable, self.to_string())
            }
            Self::Storage(_) => {
                ErrorPayload::new(ErrorDomain::Storage, "storage.failed", true, self.to_string())
            }
            Self::Contract(err) | Self::Moderation(ModerationError::Contract(err)) => {
                let (code, retryable) = match err {
                    ContractError::Rpc { .. } => ("contract.rpc_failed", true),
                    ContractError::Sync(_) => ("contract.sync_failed", true),
                    ContractError::WriteFailed(_) => ("contract.write_failed", true),
                    ContractError::ConsensusFailed(_) => ("contract.consensus_failed", true),
                    ContractError::Rejected { .. } => ("contract.rejected", false),
                    ContractError::ReceiptTimeout { .. } => ("contract.receipt_timeout", true),
                    ContractError::MissingAccount => ("contract.missing_account", false),
                    ContractError::InvalidPayload(_) => ("contract.invalid_payload", false),
                };
                ErrorPayload::new(ErrorDomain::Contract, code, retryable, self.to_string())
            }
            Self::Moderation(ModerationError::WalletNotConnected) => ErrorPayload::new(
                ErrorDomain::Wallet,
                "wallet.not_connected",
                false,
                self.to_string(),
            ),
            Self::Moderation(ModerationError::InvalidInput(_)) => ErrorPayload::new(
                ErrorDomain::Contract,
                "contract.invalid_input",
                false,
                self.to_string(),
            ),
        }
    }
}

/// Result type alias for the client.
pub type Result<T> = std::result::Result<T, Error>;
