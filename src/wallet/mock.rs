//! Scriptable in-process provider.
//!
//! Behaves like a cooperative wallet extension: it answers the standard
//! methods from its own state, emits `chainChanged` after a successful
//! switch, and lets callers inject provider errors or hold a request open
//! to simulate a pending confirmation popup.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::oneshot;

use crate::error::ProviderRpcError;
use crate::wallet::provider::{
    EventListener, InjectedProvider, ListenerId, ListenerRegistry, METHOD_ACCOUNTS,
    METHOD_ADD_CHAIN, METHOD_CHAIN_ID, METHOD_REQUEST_ACCOUNTS, METHOD_REQUEST_PERMISSIONS,
    METHOD_SWITCH_CHAIN, ProviderEvent,
};

#[derive(Default)]
struct MockState {
    accounts: Vec<String>,
    chain_id: String,
    failures: HashMap<String, VecDeque<ProviderRpcError>>,
    holds: HashMap<String, VecDeque<oneshot::Receiver<()>>>,
    calls: Vec<(String, Value)>,
}

pub struct MockProvider {
    state: Mutex<MockState>,
    listeners: ListenerRegistry,
}

/// Releases a request held by [`MockProvider::hold_next`].
pub struct HeldRequest {
    release: oneshot::Sender<()>,
}

impl HeldRequest {
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// A wallet with no authorized accounts on chain `0x1`.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                chain_id: "0x1".to_string(),
                ..MockState::default()
            }),
            listeners: ListenerRegistry::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_accounts(&self, accounts: Vec<String>) {
        self.lock().accounts = accounts;
    }

    pub fn set_chain_id(&self, chain_id: &str) {
        self.lock().chain_id = chain_id.to_string();
    }

    pub fn chain_id(&self) -> String {
        self.lock().chain_id.clone()
    }

    /// Fail the next call to `method` with `error`. Queued per method.
    pub fn fail_next(&self, method: &str, error: ProviderRpcError) {
        self.lock()
            .failures
            .entry(method.to_string())
            .or_default()
            .push_back(error);
    }

    /// Block the next call to `method` until the returned handle is released
    /// (or dropped).
    pub fn hold_next(&self, method: &str) -> HeldRequest {
        let (tx, rx) = oneshot::channel();
        self.lock()
            .holds
            .entry(method.to_string())
            .or_default()
            .push_back(rx);
        HeldRequest { release: tx }
    }

    /// Every request seen so far, in order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.lock().calls.iter().filter(|(m, _)| m == method).count()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Simulate a change made in the wallet UI: update state, then notify.
    pub fn emit(&self, event: ProviderEvent) {
        {
            let mut state = self.lock();
            match &event {
                ProviderEvent::AccountsChanged(accounts) => state.accounts = accounts.clone(),
                ProviderEvent::ChainChanged(chain_id) => state.chain_id = chain_id.clone(),
            }
        }
        self.listeners.emit(&event);
    }

    fn switch_chain(&self, chain_id: Option<&str>) -> Result<Value, ProviderRpcError> {
        let chain_id = chain_id
            .ok_or_else(|| ProviderRpcError::new(-32602, "missing chainId"))?
            .to_string();
        self.emit(ProviderEvent::ChainChanged(chain_id));
        Ok(Value::Null)
    }
}

#[async_trait]
impl InjectedProvider for MockProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        let (hold, failure) = {
            let mut state = self.lock();
            state.calls.push((method.to_string(), params.clone()));
            let hold = state.holds.get_mut(method).and_then(VecDeque::pop_front);
            let failure = state.failures.get_mut(method).and_then(VecDeque::pop_front);
            (hold, failure)
        };

        if let Some(hold) = hold {
            let _ = hold.await;
        }
        if let Some(error) = failure {
            return Err(error);
        }

        match method {
            METHOD_REQUEST_ACCOUNTS | METHOD_ACCOUNTS => Ok(json!(self.lock().accounts)),
            METHOD_CHAIN_ID => Ok(json!(self.lock().chain_id)),
            METHOD_SWITCH_CHAIN => self.switch_chain(params[0]["chainId"].as_str()),
            METHOD_ADD_CHAIN => self.switch_chain(params[0]["chainId"].as_str()),
            METHOD_REQUEST_PERMISSIONS => Ok(json!([{ "parentCapability": "eth_accounts" }])),
            other => Err(ProviderRpcError::new(
                4200,
                format!("method {other} is not supported"),
            )),
        }
    }

    fn add_listener(&self, listener: EventListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}
