//! Wallet session state machine.
//!
//! A [`WalletSession`] owns the reconciled view of the wallet (address,
//! chain, provider availability, loading) and is the only writer of it.
//! User-initiated transitions and provider events are posted as messages to
//! one queue and applied strictly in arrival order by a single consumer task.
//! Provider prompts can block indefinitely, so they run on their own tasks
//! and post their completion back to the queue; events keep being applied
//! while a prompt is open.
//!
//! Consumers hold a cloneable [`SessionHandle`], read snapshots through a
//! `watch` channel, and receive outcomes as [`Notice`](crate::notice::Notice)s.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::WalletError;
use crate::notice::{Notice, NoticeLevel, Notifier};
use crate::wallet::intent::DisconnectIntent;
use crate::wallet::network::matches_expected;
use crate::wallet::provider::{ProviderAdapter, ProviderEvent, Subscription};

const INSTALL_URL: &str = "https://metamask.io/download/";

/// Coarse lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Disconnected,
    Connected,
}

/// Immutable snapshot of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    phase: SessionPhase,
    address: Option<String>,
    chain_id: Option<String>,
    is_connected: bool,
    is_loading: bool,
    is_provider_available: bool,
    is_on_expected_network: bool,
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn chain_id(&self) -> Option<&str> {
        self.chain_id.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_provider_available(&self) -> bool {
        self.is_provider_available
    }

    pub fn is_on_expected_network(&self) -> bool {
        self.is_on_expected_network
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitStage {
    Pending,
    Running,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Connect,
    SwitchAccount,
}

/// Mutable session data. Only [`SessionActor`] touches it.
#[derive(Debug)]
struct SessionCore {
    expected_chain_id: u64,
    init: InitStage,
    address: Option<String>,
    chain_id: Option<String>,
    provider_available: bool,
    on_expected_network: bool,
    in_flight: Option<Operation>,
    /// Set when an event or a user transition decided the address while the
    /// init probe was outstanding; the probe result is stale then.
    address_settled_during_init: bool,
    chain_settled_during_init: bool,
}

impl SessionCore {
    fn new(expected_chain_id: u64, provider_available: bool) -> Self {
        Self {
            expected_chain_id,
            init: InitStage::Pending,
            address: None,
            chain_id: None,
            provider_available,
            on_expected_network: false,
            in_flight: None,
            address_settled_during_init: false,
            chain_settled_during_init: false,
        }
    }

    fn snapshot(&self) -> SessionState {
        let phase = match (self.init, &self.address) {
            (InitStage::Pending, None) => SessionPhase::Uninitialized,
            (InitStage::Running, None) => SessionPhase::Initializing,
            (_, Some(_)) => SessionPhase::Connected,
            (InitStage::Done, None) => SessionPhase::Disconnected,
        };
        SessionState {
            phase,
            address: self.address.clone(),
            chain_id: self.chain_id.clone(),
            is_connected: self.address.is_some(),
            is_loading: self.init == InitStage::Running || self.in_flight.is_some(),
            is_provider_available: self.provider_available,
            is_on_expected_network: self.on_expected_network,
        }
    }

    fn set_chain(&mut self, chain_id: String) {
        self.chain_id = Some(chain_id);
        self.recompute_network();
    }

    fn settle_address(&mut self, address: Option<String>) {
        if self.init == InitStage::Running {
            self.address_settled_during_init = true;
        }
        self.address = address;
    }

    fn settle_chain(&mut self, chain_id: String) {
        if self.init == InitStage::Running {
            self.chain_settled_during_init = true;
        }
        self.set_chain(chain_id);
    }

    fn recompute_network(&mut self) {
        self.on_expected_network = self
            .chain_id
            .as_deref()
            .is_some_and(|id| matches_expected(id, self.expected_chain_id));
    }
}

/// Result of the initialization probe.
#[derive(Debug)]
enum InitProbe {
    DisconnectIntent,
    Queried {
        accounts: Vec<String>,
        chain_id: Result<String, WalletError>,
    },
}

/// Successful part of a connect attempt.
#[derive(Debug)]
struct ConnectOutcome {
    address: String,
    switch_error: Option<WalletError>,
    chain_id: Option<String>,
}

type Reply<T> = oneshot::Sender<T>;

enum SessionMessage {
    Initialize(Reply<SessionState>),
    InitFinished(InitProbe, Reply<SessionState>),
    Connect(Reply<Result<String, WalletError>>),
    ConnectFinished(
        Result<ConnectOutcome, WalletError>,
        Reply<Result<String, WalletError>>,
    ),
    Disconnect(Reply<()>),
    SwitchAccount(Reply<Result<String, WalletError>>),
    SwitchFinished(
        Result<String, WalletError>,
        Reply<Result<String, WalletError>>,
    ),
    Provider(ProviderEvent),
    Flush(Reply<()>),
    Shutdown(Reply<()>),
}

/// Owner of the session task.
///
/// Call [`WalletSession::shutdown`] to stop it: the provider listener is only
/// removed there, never implicitly.
pub struct WalletSession {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

impl WalletSession {
    /// Spawn the session task and subscribe to provider events.
    ///
    /// Must be called from within a Tokio runtime. The session starts
    /// `Uninitialized`; call [`SessionHandle::initialize`].
    pub fn start(adapter: ProviderAdapter, intent: DisconnectIntent, notifier: Notifier) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let core = SessionCore::new(adapter.network().chain_id, adapter.is_available());
        let (state_tx, state_rx) = watch::channel(core.snapshot());

        let subscription = if adapter.is_available() {
            let events = tx.clone();
            adapter
                .subscribe(Arc::new(move |event: ProviderEvent| {
                    let _ = events.send(SessionMessage::Provider(event));
                }))
                .ok()
        } else {
            None
        };

        let actor = SessionActor {
            adapter,
            intent,
            notifier,
            tx: tx.clone(),
            state_tx,
            core,
            subscription,
        };
        let task = tokio::spawn(actor.run(rx));

        Self {
            handle: SessionHandle { tx, state_rx },
            task,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Remove the provider listener and stop the session task.
    pub async fn shutdown(self) {
        let (reply, done) = oneshot::channel();
        if self.handle.tx.send(SessionMessage::Shutdown(reply)).is_ok() {
            let _ = done.await;
        }
        if let Err(e) = self.task.await {
            tracing::warn!("Wallet session task ended abnormally: {}", e);
        }
    }
}

/// Cloneable access to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionMessage>,
    state_rx: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Latest published snapshot.
    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Wait until a snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionState) -> bool,
    ) -> Result<SessionState, WalletError> {
        let mut rx = self.state_rx.clone();
        let state = rx
            .wait_for(predicate)
            .await
            .map_err(|_| WalletError::ShutDown)?;
        Ok(state.clone())
    }

    async fn call<T>(
        &self,
        message: impl FnOnce(Reply<T>) -> SessionMessage,
    ) -> Result<T, WalletError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(message(reply))
            .map_err(|_| WalletError::ShutDown)?;
        response.await.map_err(|_| WalletError::ShutDown)
    }

    /// Probe the provider and restore any existing authorization, unless the
    /// user explicitly disconnected last time. Calling it again returns the
    /// current state.
    pub async fn initialize(&self) -> Result<SessionState, WalletError> {
        self.call(SessionMessage::Initialize).await
    }

    /// Prompt for accounts and switch to the expected network.
    pub async fn connect(&self) -> Result<String, WalletError> {
        self.call(SessionMessage::Connect).await?
    }

    /// Forget the address and remember the logout across restarts.
    pub async fn disconnect(&self) -> Result<(), WalletError> {
        self.call(SessionMessage::Disconnect).await
    }

    /// Prompt the user to pick a different account.
    pub async fn switch_account(&self) -> Result<String, WalletError> {
        self.call(SessionMessage::SwitchAccount).await?
    }

    /// Resolve once every message posted before this call has been applied.
    pub async fn flush(&self) -> Result<(), WalletError> {
        self.call(SessionMessage::Flush).await
    }
}

struct SessionActor {
    adapter: ProviderAdapter,
    intent: DisconnectIntent,
    notifier: Notifier,
    tx: mpsc::UnboundedSender<SessionMessage>,
    state_tx: watch::Sender<SessionState>,
    core: SessionCore,
    subscription: Option<Subscription>,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionMessage>) {
        while let Some(message) = rx.recv().await {
            if let SessionMessage::Shutdown(reply) = message {
                if let Some(subscription) = self.subscription.take() {
                    self.adapter.unsubscribe(subscription);
                }
                let _ = reply.send(());
                break;
            }
            self.handle(message).await;
            self.publish();
        }
        tracing::debug!("Wallet session stopped");
    }

    fn publish(&self) {
        let snapshot = self.core.snapshot();
        self.state_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    async fn handle(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Initialize(reply) => self.on_initialize(reply),
            SessionMessage::InitFinished(probe, reply) => self.on_init_finished(probe, reply),
            SessionMessage::Connect(reply) => self.on_connect(reply),
            SessionMessage::ConnectFinished(result, reply) => {
                self.on_connect_finished(result, reply).await
            }
            SessionMessage::Disconnect(reply) => self.on_disconnect(reply).await,
            SessionMessage::SwitchAccount(reply) => self.on_switch_account(reply),
            SessionMessage::SwitchFinished(result, reply) => {
                self.on_switch_finished(result, reply).await
            }
            SessionMessage::Provider(event) => self.on_provider_event(event).await,
            SessionMessage::Flush(reply) => {
                let _ = reply.send(());
            }
            SessionMessage::Shutdown(_) => {}
        }
    }

    fn on_initialize(&mut self, reply: Reply<SessionState>) {
        if self.core.init != InitStage::Pending {
            let _ = reply.send(self.core.snapshot());
            return;
        }

        if !self.adapter.is_available() {
            tracing::info!("No wallet provider detected");
            self.core.provider_available = false;
            self.core.init = InitStage::Done;
            self.reply_with_state(reply);
            return;
        }

        self.core.init = InitStage::Running;
        self.core.address_settled_during_init = false;
        self.core.chain_settled_during_init = false;
        self.publish();

        let adapter = self.adapter.clone();
        let intent = self.intent.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let probe = if intent.is_set().await {
                InitProbe::DisconnectIntent
            } else {
                let accounts = adapter.current_accounts().await;
                let chain_id = adapter.current_chain_id().await;
                InitProbe::Queried { accounts, chain_id }
            };
            let _ = tx.send(SessionMessage::InitFinished(probe, reply));
        });
    }

    fn on_init_finished(&mut self, probe: InitProbe, reply: Reply<SessionState>) {
        self.core.init = InitStage::Done;
        match probe {
            InitProbe::DisconnectIntent => {
                tracing::info!("Disconnect intent set, skipping automatic reconnect");
            }
            InitProbe::Queried {
                accounts,
                chain_id: Ok(chain_id),
            } => {
                // Anything applied while probing is newer than the probe.
                if !self.core.chain_settled_during_init {
                    self.core.set_chain(chain_id);
                }
                if !self.core.address_settled_during_init {
                    self.core.address = accounts.into_iter().next();
                }
                match &self.core.address {
                    Some(address) => tracing::info!("Restored wallet session for {}", address),
                    None => tracing::debug!("No authorized accounts at startup"),
                }
            }
            InitProbe::Queried {
                chain_id: Err(e), ..
            } => {
                tracing::error!("Session init failed: {}", e);
            }
        }
        self.reply_with_state(reply);
    }

    fn on_connect(&mut self, reply: Reply<Result<String, WalletError>>) {
        if let Some(op) = self.core.in_flight {
            tracing::debug!("Rejecting connect while {:?} is in flight", op);
            let _ = reply.send(Err(WalletError::Busy));
            return;
        }
        self.core.in_flight = Some(Operation::Connect);
        self.publish();

        let adapter = self.adapter.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = connect_with(&adapter).await;
            let _ = tx.send(SessionMessage::ConnectFinished(result, reply));
        });
    }

    async fn on_connect_finished(
        &mut self,
        result: Result<ConnectOutcome, WalletError>,
        reply: Reply<Result<String, WalletError>>,
    ) {
        self.core.in_flight = None;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.report_failure("Arbiter Login Failed", "Connection cancelled", &e);
                self.reply_with(reply, Err(e));
                return;
            }
        };

        self.clear_intent().await;
        self.core.settle_address(Some(outcome.address.clone()));
        if let Some(chain_id) = outcome.chain_id {
            self.core.settle_chain(chain_id);
        }
        tracing::info!(
            address = %outcome.address,
            on_expected_network = self.core.on_expected_network,
            "Wallet connected"
        );

        if let Some(e) = &outcome.switch_error {
            tracing::warn!("Connected but network switch failed: {}", e);
            self.report_failure("Network Switch Failed", "Network switch cancelled", e);
        }
        self.reply_with(reply, Ok(outcome.address));
    }

    async fn on_disconnect(&mut self, reply: Reply<()>) {
        if let Err(e) = self.intent.set().await {
            tracing::warn!("Failed to persist disconnect intent: {}", e);
        }
        if let Some(address) = &self.core.address {
            tracing::info!("Wallet {} disconnected", address);
        }
        self.core.settle_address(None);
        self.publish();
        let _ = reply.send(());
    }

    fn on_switch_account(&mut self, reply: Reply<Result<String, WalletError>>) {
        if let Some(op) = self.core.in_flight {
            tracing::debug!("Rejecting account switch while {:?} is in flight", op);
            let _ = reply.send(Err(WalletError::Busy));
            return;
        }
        self.core.in_flight = Some(Operation::SwitchAccount);
        self.publish();

        let adapter = self.adapter.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = adapter.request_account_switch().await;
            let _ = tx.send(SessionMessage::SwitchFinished(result, reply));
        });
    }

    async fn on_switch_finished(
        &mut self,
        result: Result<String, WalletError>,
        reply: Reply<Result<String, WalletError>>,
    ) {
        self.core.in_flight = None;
        match result {
            Ok(address) => {
                self.clear_intent().await;
                tracing::info!("Switched wallet account to {}", address);
                self.core.settle_address(Some(address.clone()));
                self.reply_with(reply, Ok(address));
            }
            Err(e) => {
                self.report_failure("Account Switch Failed", "Account switch cancelled", &e);
                self.reply_with(reply, Err(e));
            }
        }
    }

    async fn on_provider_event(&mut self, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => {
                tracing::debug!(count = accounts.len(), "accountsChanged");
                // Chain changes arrive as their own event, so the cached id is current.
                self.core.recompute_network();
                let first = accounts.into_iter().next();
                if first.is_some() {
                    self.clear_intent().await;
                }
                self.core.settle_address(first);
            }
            ProviderEvent::ChainChanged(chain_id) => {
                tracing::debug!(chain_id = %chain_id, "chainChanged");
                self.core.settle_chain(chain_id);
            }
        }
    }

    async fn clear_intent(&self) {
        if let Err(e) = self.intent.clear().await {
            tracing::warn!("Failed to clear disconnect intent: {}", e);
        }
    }

    /// Turn a wallet failure into the matching notice.
    fn report_failure(&self, error_title: &str, cancelled_title: &str, error: &WalletError) {
        match error {
            WalletError::UserRejected => {
                self.notifier.cancelled(cancelled_title);
            }
            WalletError::NotInstalled => {
                self.notifier.publish(
                    Notice::new(NoticeLevel::Warning, "Wallet Not Installed")
                        .with_description("Install a browser wallet to connect as an arbiter.")
                        .with_action("Install", INSTALL_URL),
                );
            }
            WalletError::Busy | WalletError::ShutDown => {}
            other => {
                self.notifier.error(error_title, Some(&other.to_string()));
            }
        }
    }

    fn reply_with_state(&self, reply: Reply<SessionState>) {
        self.publish();
        let _ = reply.send(self.core.snapshot());
    }

    fn reply_with<T>(&self, reply: Reply<T>, value: T) {
        self.publish();
        let _ = reply.send(value);
    }
}

/// Request accounts, then try to move the wallet onto the expected network.
/// A failed switch does not undo the connection.
async fn connect_with(adapter: &ProviderAdapter) -> Result<ConnectOutcome, WalletError> {
    let address = adapter
        .request_accounts()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| WalletError::RequestFailed("No accounts found".to_string()))?;

    let switch_error = adapter.switch_to_expected_network().await.err();
    let chain_id = match adapter.current_chain_id().await {
        Ok(chain_id) => Some(chain_id),
        Err(e) => {
            tracing::warn!("Could not read chain after connect: {}", e);
            None
        }
    };

    Ok(ConnectOutcome {
        address,
        switch_error,
        chain_id,
    })
}
