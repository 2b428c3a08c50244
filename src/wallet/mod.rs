//! Wallet session subsystem.
//!
//! - [`provider`]: the injected-provider seam and the adapter that maps its
//!   failures into [`WalletError`](crate::error::WalletError)s.
//! - [`network`]: expected-network policy and the add-chain descriptor.
//! - [`intent`]: persisted disconnect-intent flag.
//! - [`session`]: the state machine consumers observe and drive.
//! - [`rpc`]: a provider backed by a JSON-RPC endpoint.

pub mod intent;
pub mod network;
pub mod provider;
pub mod rpc;
pub mod session;

#[cfg(test)]
pub mod mock;

pub use intent::{DISCONNECT_FLAG_KEY, DisconnectIntent};
pub use network::{NetworkDescriptor, build_network_descriptor, matches_expected, to_hex};
pub use provider::{InjectedProvider, ProviderAdapter, ProviderEvent, Subscription};
pub use rpc::RpcWalletProvider;
pub use session::{SessionHandle, SessionPhase, SessionState, WalletSession};
