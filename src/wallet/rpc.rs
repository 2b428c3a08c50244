//! Wallet provider backed by a JSON-RPC endpoint.
//!
//! Forwards `request` calls to the endpoint unchanged. The endpoint cannot
//! push events, so a background task polls `eth_accounts` and `eth_chainId`
//! and emits `accountsChanged` / `chainChanged` when either differs from the
//! previous observation.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

use crate::error::ProviderRpcError;
use crate::jsonrpc::JsonRpcClient;
use crate::wallet::provider::{
    EventListener, InjectedProvider, ListenerId, ListenerRegistry, METHOD_ACCOUNTS,
    METHOD_CHAIN_ID, ProviderEvent, parse_accounts,
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Observed {
    accounts: Option<Vec<String>>,
    chain_id: Option<String>,
}

pub struct RpcWalletProvider {
    rpc: JsonRpcClient,
    listeners: ListenerRegistry,
    observed: Mutex<Observed>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl RpcWalletProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            rpc: JsonRpcClient::new(url),
            listeners: ListenerRegistry::new(),
            observed: Mutex::new(Observed::default()),
            poller: Mutex::new(None),
        }
    }

    /// Create the provider and start polling for changes.
    pub fn spawn(url: impl Into<String>, poll_interval: Duration) -> Arc<Self> {
        let provider = Arc::new(Self::new(url));
        provider.start_polling(poll_interval);
        provider
    }

    pub fn url(&self) -> &str {
        self.rpc.url()
    }

    /// Start the poll loop. Replaces any previous loop. The loop holds only a
    /// weak reference and exits once the provider is dropped.
    pub fn start_polling(self: &Arc<Self>, interval: Duration) {
        let weak = Arc::downgrade(self);
        let task = tokio::spawn(poll_loop(weak, interval));
        if let Some(previous) = self.lock_poller().replace(task) {
            previous.abort();
        }
    }

    pub fn stop_polling(&self) {
        if let Some(task) = self.lock_poller().take() {
            task.abort();
        }
    }

    fn lock_poller(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.poller
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_observed(&self) -> std::sync::MutexGuard<'_, Observed> {
        self.observed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Query the endpoint once and emit events for whatever changed since
    /// the last poll. The first successful poll only records a baseline.
    pub async fn poll_once(&self) {
        let accounts = match self.rpc.call(METHOD_ACCOUNTS, json!([])).await {
            Ok(value) => match parse_accounts(value) {
                Ok(accounts) => Some(accounts),
                Err(e) => {
                    tracing::debug!("Ignoring malformed eth_accounts reply: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::debug!("Wallet poll eth_accounts failed: {}", e);
                None
            }
        };
        let chain_id = match self.rpc.call(METHOD_CHAIN_ID, json!([])).await {
            Ok(Value::String(chain_id)) => Some(chain_id),
            Ok(other) => {
                tracing::debug!("Ignoring non-string eth_chainId reply: {}", other);
                None
            }
            Err(e) => {
                tracing::debug!("Wallet poll eth_chainId failed: {}", e);
                None
            }
        };

        let mut events = Vec::new();
        {
            let mut observed = self.lock_observed();
            if let Some(accounts) = accounts {
                if observed.accounts.as_ref().is_some_and(|prev| *prev != accounts) {
                    events.push(ProviderEvent::AccountsChanged(accounts.clone()));
                }
                observed.accounts = Some(accounts);
            }
            if let Some(chain_id) = chain_id {
                if observed.chain_id.as_ref().is_some_and(|prev| *prev != chain_id) {
                    events.push(ProviderEvent::ChainChanged(chain_id.clone()));
                }
                observed.chain_id = Some(chain_id);
            }
        }

        for event in events {
            self.listeners.emit(&event);
        }
    }
}

impl Drop for RpcWalletProvider {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

async fn poll_loop(provider: Weak<RpcWalletProvider>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(provider) = provider.upgrade() else {
            break;
        };
        provider.poll_once().await;
    }
}

#[async_trait]
impl InjectedProvider for RpcWalletProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        self.rpc
            .call(method, params)
            .await
            .map_err(|e| ProviderRpcError::new(e.code, e.message))
    }

    fn add_listener(&self, listener: EventListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::test_server;

    fn wallet_state() -> Arc<Mutex<(Vec<String>, String)>> {
        Arc::new(Mutex::new((vec!["0xAAA".to_string()], "0x1".to_string())))
    }

    async fn serve(state: Arc<Mutex<(Vec<String>, String)>>) -> test_server::TestServer {
        test_server::spawn(move |method, _params| {
            let state = state.lock().unwrap();
            match method {
                "eth_accounts" => Ok(json!(state.0)),
                "eth_chainId" => Ok(json!(state.1)),
                "wallet_switchEthereumChain" => {
                    Err((4902, "Unrecognized chain ID".to_string()))
                }
                _ => Err((-32601, "Method not found".to_string())),
            }
        })
        .await
    }

    #[tokio::test]
    async fn test_request_forwards_provider_error_codes() {
        let server = serve(wallet_state()).await;
        let provider = RpcWalletProvider::new(&server.url);

        let chain = provider.request("eth_chainId", json!([])).await.unwrap();
        assert_eq!(chain, json!("0x1"));

        let err = provider
            .request("wallet_switchEthereumChain", json!([{ "chainId": "0xF22F" }]))
            .await
            .unwrap_err();
        assert!(err.is_unrecognized_chain());
    }

    #[tokio::test]
    async fn test_poll_emits_only_on_change() {
        let state = wallet_state();
        let server = serve(state.clone()).await;
        let provider = RpcWalletProvider::new(&server.url);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        provider.add_listener(Arc::new(move |event: ProviderEvent| {
            sink.lock().unwrap().push(event)
        }));

        provider.poll_once().await;
        provider.poll_once().await;
        assert!(seen.lock().unwrap().is_empty());

        state.lock().unwrap().1 = "0xF22F".to_string();
        provider.poll_once().await;
        state.lock().unwrap().0 = Vec::new();
        provider.poll_once().await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ProviderEvent::ChainChanged("0xF22F".to_string()),
                ProviderEvent::AccountsChanged(Vec::new()),
            ]
        );
    }

    #[tokio::test]
    async fn test_poll_loop_stops_when_provider_dropped() {
        let server = serve(wallet_state()).await;
        let provider = RpcWalletProvider::spawn(&server.url, Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(provider);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let polled = server.calls().len();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(polled > 0);
        assert_eq!(server.calls().len(), polled);
    }
}
