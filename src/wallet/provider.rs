//! Capability-checked access to an injected wallet provider.
//!
//! [`InjectedProvider`] mirrors the EIP-1193 surface a wallet extension
//! injects (`request`, `on`, `removeListener`). [`ProviderAdapter`] wraps an
//! optional provider (absent means "not installed") and maps raw provider
//! errors onto [`WalletError`] kinds.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::config::NetworkConfig;
use crate::error::{ProviderRpcError, WalletError};
use crate::wallet::network::{NetworkDescriptor, build_network_descriptor, to_hex};

pub const METHOD_REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
pub const METHOD_ACCOUNTS: &str = "eth_accounts";
pub const METHOD_CHAIN_ID: &str = "eth_chainId";
pub const METHOD_SWITCH_CHAIN: &str = "wallet_switchEthereumChain";
pub const METHOD_ADD_CHAIN: &str = "wallet_addEthereumChain";
pub const METHOD_REQUEST_PERMISSIONS: &str = "wallet_requestPermissions";

/// Event emitted by the provider outside of any request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// `accountsChanged`: the full authorized account list, first is active.
    AccountsChanged(Vec<String>),
    /// `chainChanged`: the new hex chain id.
    ChainChanged(String),
}

pub type EventListener = Arc<dyn Fn(ProviderEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// EIP-1193 style provider.
#[async_trait]
pub trait InjectedProvider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError>;

    /// Register a listener for `accountsChanged` and `chainChanged`.
    fn add_listener(&self, listener: EventListener) -> ListenerId;

    /// Returns `false` if the listener was not registered.
    fn remove_listener(&self, id: ListenerId) -> bool;
}

/// Listener bookkeeping shared by provider implementations.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<ListenerId, EventListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: EventListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(id, listener);
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every listener. Listeners run outside the registry lock so they
    /// may add or remove listeners themselves.
    pub fn emit(&self, event: &ProviderEvent) {
        let listeners: Vec<EventListener> = self.lock().values().cloned().collect();
        for listener in listeners {
            listener(event.clone());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ListenerId, EventListener>> {
        // A panicking listener cannot leave the map half-updated.
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle for a registered listener. Dropping it does **not** unsubscribe;
/// pass it to [`ProviderAdapter::unsubscribe`].
#[must_use = "listeners stay registered until explicitly unsubscribed"]
#[derive(Debug)]
pub struct Subscription {
    id: ListenerId,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

/// Wallet operations over an optional injected provider.
#[derive(Clone)]
pub struct ProviderAdapter {
    provider: Option<Arc<dyn InjectedProvider>>,
    network: NetworkConfig,
}

impl ProviderAdapter {
    pub fn new(provider: Option<Arc<dyn InjectedProvider>>, network: NetworkConfig) -> Self {
        Self { provider, network }
    }

    /// Adapter with no provider installed.
    pub fn unavailable(network: NetworkConfig) -> Self {
        Self::new(None, network)
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    fn provider(&self) -> Result<&Arc<dyn InjectedProvider>, WalletError> {
        self.provider.as_ref().ok_or(WalletError::NotInstalled)
    }

    /// Prompt for account access (`eth_requestAccounts`).
    pub async fn request_accounts(&self) -> Result<Vec<String>, WalletError> {
        let provider = self.provider()?;
        let value = provider
            .request(METHOD_REQUEST_ACCOUNTS, json!([]))
            .await
            .map_err(|e| {
                if e.is_user_rejection() {
                    WalletError::UserRejected
                } else {
                    WalletError::request_failed("Connection failed", &e)
                }
            })?;
        parse_accounts(value)
            .map_err(|reason| WalletError::RequestFailed(format!("Connection failed: {reason}")))
    }

    /// Authorized accounts without prompting. Empty when none are
    /// authorized, no provider is installed, or the query fails.
    pub async fn current_accounts(&self) -> Vec<String> {
        let Some(provider) = &self.provider else {
            return Vec::new();
        };
        match provider.request(METHOD_ACCOUNTS, json!([])).await {
            Ok(value) => parse_accounts(value).unwrap_or_else(|reason| {
                tracing::warn!("Ignoring malformed eth_accounts response: {}", reason);
                Vec::new()
            }),
            Err(e) => {
                tracing::warn!("Failed to get accounts: {}", e);
                Vec::new()
            }
        }
    }

    /// Current hex chain id (`eth_chainId`).
    pub async fn current_chain_id(&self) -> Result<String, WalletError> {
        let provider = self.provider()?;
        let value = provider
            .request(METHOD_CHAIN_ID, json!([]))
            .await
            .map_err(|e| WalletError::request_failed("Failed to get chain ID", &e))?;
        value.as_str().map(str::to_string).ok_or_else(|| {
            WalletError::RequestFailed(format!("Failed to get chain ID: unexpected value {value}"))
        })
    }

    /// Ask the wallet to switch chains, registering the network first when
    /// the wallet does not know it.
    pub async fn request_chain_switch(&self, target_chain_id: u64) -> Result<(), WalletError> {
        let provider = self.provider()?;
        let params = json!([{ "chainId": to_hex(target_chain_id) }]);
        match provider.request(METHOD_SWITCH_CHAIN, params).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_unrecognized_chain() => {
                tracing::info!(
                    "Chain {} unknown to wallet, registering it",
                    to_hex(target_chain_id)
                );
                self.request_chain_add(&self.descriptor_for(target_chain_id))
                    .await
            }
            Err(e) if e.is_user_rejection() => Err(WalletError::UserRejected),
            Err(e) => Err(WalletError::request_failed("Failed to switch network", &e)),
        }
    }

    /// Switch to the configured network.
    pub async fn switch_to_expected_network(&self) -> Result<(), WalletError> {
        self.request_chain_switch(self.network.chain_id).await
    }

    /// Register a network with the wallet (`wallet_addEthereumChain`).
    pub async fn request_chain_add(&self, descriptor: &NetworkDescriptor) -> Result<(), WalletError> {
        let provider = self.provider()?;
        let descriptor = serde_json::to_value(descriptor).map_err(|e| {
            WalletError::RequestFailed(format!("Failed to encode network descriptor: {e}"))
        })?;
        provider
            .request(METHOD_ADD_CHAIN, Value::Array(vec![descriptor]))
            .await
            .map(|_| ())
            .map_err(|e| WalletError::request_failed("Failed to add Arbitration Network", &e))
    }

    /// Re-prompt for account permissions so the user can pick another
    /// account, then return the newly active one.
    pub async fn request_account_switch(&self) -> Result<String, WalletError> {
        let provider = self.provider()?;
        provider
            .request(METHOD_REQUEST_PERMISSIONS, json!([{ "eth_accounts": {} }]))
            .await
            .map_err(|e| {
                if e.is_user_rejection() {
                    WalletError::UserRejected
                } else {
                    WalletError::request_failed("Failed to switch account", &e)
                }
            })?;

        self.current_accounts()
            .await
            .into_iter()
            .next()
            .ok_or(WalletError::NoAccountsAfterSwitch)
    }

    pub fn subscribe(&self, listener: EventListener) -> Result<Subscription, WalletError> {
        let provider = self.provider()?;
        Ok(Subscription {
            id: provider.add_listener(listener),
        })
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        match &self.provider {
            Some(provider) => provider.remove_listener(subscription.id),
            None => false,
        }
    }

    fn descriptor_for(&self, chain_id: u64) -> NetworkDescriptor {
        let mut descriptor = build_network_descriptor(&self.network);
        descriptor.chain_id = to_hex(chain_id);
        descriptor
    }
}

/// Decode an account list, rejecting non-string entries.
pub fn parse_accounts(value: Value) -> Result<Vec<String>, String> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(account) => Ok(account),
                other => Err(format!("account entry is not a string: {other}")),
            })
            .collect(),
        other => Err(format!("expected an account array, got {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::mock::MockProvider;

    fn adapter(mock: &Arc<MockProvider>) -> ProviderAdapter {
        let provider: Arc<dyn InjectedProvider> = mock.clone();
        ProviderAdapter::new(Some(provider), NetworkConfig::default())
    }

    #[tokio::test]
    async fn test_unavailable_adapter_reports_not_installed() {
        let adapter = ProviderAdapter::unavailable(NetworkConfig::default());
        assert!(!adapter.is_available());
        assert_eq!(
            adapter.request_accounts().await,
            Err(WalletError::NotInstalled)
        );
        assert_eq!(
            adapter.current_chain_id().await,
            Err(WalletError::NotInstalled)
        );
        assert!(adapter.current_accounts().await.is_empty());
        assert_eq!(
            adapter.request_chain_switch(61999).await,
            Err(WalletError::NotInstalled)
        );
        assert!(adapter.subscribe(Arc::new(|_| {})).is_err());
    }

    #[tokio::test]
    async fn test_request_accounts_maps_rejection_code() {
        let mock = Arc::new(MockProvider::new());
        mock.fail_next(METHOD_REQUEST_ACCOUNTS, ProviderRpcError::new(4001, "denied"));
        assert_eq!(
            adapter(&mock).request_accounts().await,
            Err(WalletError::UserRejected)
        );

        mock.fail_next(METHOD_REQUEST_ACCOUNTS, ProviderRpcError::new(-32002, "pending"));
        assert_eq!(
            adapter(&mock).request_accounts().await,
            Err(WalletError::RequestFailed(
                "Connection failed: pending".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_current_accounts_swallows_failures() {
        let mock = Arc::new(MockProvider::new());
        mock.set_accounts(vec!["0xAAA".to_string()]);
        assert_eq!(adapter(&mock).current_accounts().await, vec!["0xAAA"]);

        mock.fail_next(METHOD_ACCOUNTS, ProviderRpcError::internal("down"));
        assert!(adapter(&mock).current_accounts().await.is_empty());
    }

    #[tokio::test]
    async fn test_chain_switch_adds_unknown_network() {
        let mock = Arc::new(MockProvider::new());
        mock.set_chain_id("0x1");
        mock.fail_next(
            METHOD_SWITCH_CHAIN,
            ProviderRpcError::new(4902, "Unrecognized chain ID"),
        );

        adapter(&mock).request_chain_switch(61999).await.unwrap();

        let calls = mock.calls();
        let add = calls
            .iter()
            .find(|(method, _)| method == METHOD_ADD_CHAIN)
            .expect("add chain requested");
        assert_eq!(add.1[0]["chainId"], "0xF22F");
        assert_eq!(add.1[0]["nativeCurrency"]["decimals"], 18);
    }

    #[tokio::test]
    async fn test_chain_switch_other_errors_fail() {
        let mock = Arc::new(MockProvider::new());
        mock.fail_next(METHOD_SWITCH_CHAIN, ProviderRpcError::internal("nope"));
        assert_eq!(
            adapter(&mock).switch_to_expected_network().await,
            Err(WalletError::RequestFailed(
                "Failed to switch network: nope".to_string()
            ))
        );

        mock.fail_next(METHOD_SWITCH_CHAIN, ProviderRpcError::new(4902, "unknown"));
        mock.fail_next(METHOD_ADD_CHAIN, ProviderRpcError::new(4001, "denied"));
        assert!(matches!(
            adapter(&mock).switch_to_expected_network().await,
            Err(WalletError::RequestFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_account_switch_outcomes() {
        let mock = Arc::new(MockProvider::new());
        mock.set_accounts(vec!["0xBBB".to_string(), "0xAAA".to_string()]);
        assert_eq!(
            adapter(&mock).request_account_switch().await.unwrap(),
            "0xBBB"
        );

        mock.fail_next(METHOD_REQUEST_PERMISSIONS, ProviderRpcError::new(4001, "no"));
        assert_eq!(
            adapter(&mock).request_account_switch().await,
            Err(WalletError::UserRejected)
        );

        mock.set_accounts(Vec::new());
        assert_eq!(
            adapter(&mock).request_account_switch().await,
            Err(WalletError::NoAccountsAfterSwitch)
        );
    }

    #[tokio::test]
    async fn test_subscriptions_require_explicit_removal() {
        let mock = Arc::new(MockProvider::new());
        let adapter = adapter(&mock);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let subscription = adapter
            .subscribe(Arc::new(move |event| sink.lock().unwrap().push(event)))
            .unwrap();
        mock.emit(ProviderEvent::ChainChanged("0x1".to_string()));
        assert_eq!(mock.listener_count(), 1);

        assert!(adapter.unsubscribe(subscription));
        assert_eq!(mock.listener_count(), 0);
        mock.emit(ProviderEvent::ChainChanged("0x2".to_string()));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![ProviderEvent::ChainChanged("0x1".to_string())]
        );
    }

    #[test]
    fn test_parse_accounts_shapes() {
        assert_eq!(parse_accounts(json!(["0xA", "0xB"])).unwrap(), vec!["0xA", "0xB"]);
        assert!(parse_accounts(Value::Null).unwrap().is_empty());
        assert!(parse_accounts(json!([1])).is_err());
        assert!(parse_accounts(json!({"a": 1})).is_err());
    }
}
