//! Arbitration contract client.
//!
//! [`ModerationArbitrator`] reads cases and reputation from the moderation
//! contract and submits reports and arbitration requests, waiting for the
//! validators to accept each transaction. The ledger is reached through a
//! [`ContractTransport`].

pub mod arbitrator;
pub mod transport;
pub mod types;

pub use arbitrator::{ModerationArbitrator, PollPolicy};
pub use transport::{ContractTransport, RpcContractTransport};
pub use types::{CaseFilters, ModerationCase, ReputationEntry, TransactionReceipt, TxStatus};
