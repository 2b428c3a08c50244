//! Moderation workflows on top of the wallet session.
//!
//! Binds the arbitration contract to whichever address the session currently
//! holds, enforces the wallet preconditions for writes, tracks the operation
//! in flight, and reports every outcome as a notice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::config::Config;
use crate::contract::{
    CaseFilters, ContractTransport, ModerationArbitrator, ModerationCase, RpcContractTransport,
    TransactionReceipt,
};
use crate::error::ModerationError;
use crate::format::same_address;
use crate::notice::{NoticeAction, Notifier};
use crate::wallet::SessionHandle;

/// Rows shown by [`ModerationService::leaderboard`] unless told otherwise.
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

const STUDIO_URL: &str = "https://studio.genlayer.com";

/// One ranked arbiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardRow {
    /// 1-based.
    pub rank: usize,
    pub address: String,
    pub points: i64,
    pub is_current_user: bool,
}

#[derive(Default)]
struct InFlight {
    filing: bool,
    arbitrating_case_id: Option<String>,
}

#[derive(Clone)]
pub struct ModerationService {
    session: SessionHandle,
    transport: Arc<dyn ContractTransport>,
    contract_address: Option<String>,
    notifier: Notifier,
    poll_interval: Option<Duration>,
    in_flight: Arc<Mutex<InFlight>>,
    setup_notice_sent: Arc<AtomicBool>,
}

impl ModerationService {
    pub fn new(
        session: SessionHandle,
        transport: Arc<dyn ContractTransport>,
        contract_address: Option<String>,
        notifier: Notifier,
    ) -> Self {
        Self {
            session,
            transport,
            contract_address,
            notifier,
            poll_interval: None,
            in_flight: Arc::new(Mutex::new(InFlight::default())),
            setup_notice_sent: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Service reaching the contract over the configured network endpoint.
    pub fn from_config(session: SessionHandle, config: &Config, notifier: Notifier) -> Self {
        Self::new(
            session,
            Arc::new(RpcContractTransport::new(config.network.rpc_url.clone())),
            config.contract.address.clone(),
            notifier,
        )
    }

    /// Override the receipt poll interval of every write.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InFlight> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Contract client bound to the session's current address.
    ///
    /// Without a configured contract address this returns `None` and, the
    /// first time, raises a "Setup Required" notice.
    pub fn arbitrator(&self) -> Option<ModerationArbitrator> {
        let Some(contract_address) = &self.contract_address else {
            if !self.setup_notice_sent.swap(true, Ordering::SeqCst) {
                self.notifier.config_error(
                    "Setup Required",
                    "Moderation contract address not configured in .env file.",
                    Some(NoticeAction {
                        label: "Studio".to_string(),
                        url: STUDIO_URL.to_string(),
                    }),
                );
            }
            return None;
        };

        let account = self.session.state().address().map(str::to_string);
        let arbitrator =
            ModerationArbitrator::new(self.transport.clone(), contract_address.clone(), account);
        Some(match self.poll_interval {
            Some(interval) => arbitrator.with_poll_interval(interval),
            None => arbitrator,
        })
    }

    /// All cases matching `filters`. Empty when no contract is configured.
    pub async fn cases(&self, filters: &CaseFilters) -> Result<Vec<ModerationCase>, ModerationError> {
        let Some(arbitrator) = self.arbitrator() else {
            return Ok(Vec::new());
        };
        let mut cases = arbitrator.get_cases().await?;
        cases.retain(|case| filters.matches(case));
        Ok(cases)
    }

    /// Top arbiters, at most `limit` rows.
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardRow>, ModerationError> {
        let Some(arbitrator) = self.arbitrator() else {
            return Ok(Vec::new());
        };
        let entries = arbitrator.get_leaderboard().await?;
        let state = self.session.state();
        Ok(entries
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(index, entry)| LeaderboardRow {
                rank: index + 1,
                is_current_user: state
                    .address()
                    .is_some_and(|me| same_address(me, &entry.address)),
                address: entry.address,
                points: entry.points,
            })
            .collect())
    }

    /// Reputation of the connected arbiter; 0 when not connected.
    pub async fn player_points(&self) -> i64 {
        let state = self.session.state();
        if !state.is_connected() {
            return 0;
        }
        match self.arbitrator() {
            Some(arbitrator) => arbitrator.get_arbiter_reputation(state.address()).await,
            None => 0,
        }
    }

    pub fn is_filing(&self) -> bool {
        self.lock().filing
    }

    /// Case currently being arbitrated, if any.
    pub fn arbitrating_case_id(&self) -> Option<String> {
        self.lock().arbitrating_case_id.clone()
    }

    fn writable_arbitrator(&self) -> Result<ModerationArbitrator, ModerationError> {
        let arbitrator = self.arbitrator().ok_or(ModerationError::WalletNotConnected)?;
        if arbitrator.account().is_none() {
            return Err(ModerationError::WalletNotConnected);
        }
        Ok(arbitrator)
    }

    /// Submit an incident report. Both fields must contain more than
    /// whitespace.
    pub async fn file_report(
        &self,
        incident_report: &str,
        community_rules: &str,
    ) -> Result<TransactionReceipt, ModerationError> {
        if incident_report.trim().is_empty() {
            return Err(ModerationError::InvalidInput(
                "Description of the incident is required".to_string(),
            ));
        }
        if community_rules.trim().is_empty() {
            return Err(ModerationError::InvalidInput(
                "Relevant rules must be provided for arbitration".to_string(),
            ));
        }

        let result = match self.writable_arbitrator() {
            Ok(arbitrator) => {
                self.lock().filing = true;
                let result = arbitrator
                    .file_report(incident_report, community_rules)
                    .await
                    .map_err(ModerationError::from);
                self.lock().filing = false;
                result
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(receipt) => {
                tracing::info!(hash = %receipt.hash, "Case filed");
                self.notifier.success(
                    "Case Filed",
                    Some("The incident has been recorded for AI arbitration."),
                );
            }
            Err(e) => {
                self.notifier
                    .error("Submission Failed", Some(&e.to_string()));
            }
        }
        result
    }

    /// Trigger consensus on `case_id`.
    pub async fn arbitrate(&self, case_id: &str) -> Result<TransactionReceipt, ModerationError> {
        let result = match self.writable_arbitrator() {
            Ok(arbitrator) => {
                self.lock().arbitrating_case_id = Some(case_id.to_string());
                let result = arbitrator
                    .arbitrate(case_id)
                    .await
                    .map_err(ModerationError::from);
                self.lock().arbitrating_case_id = None;
                result
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(receipt) => {
                tracing::info!(case_id, hash = %receipt.hash, "Arbitration complete");
                self.notifier.success(
                    "Arbitration Complete",
                    Some("GenLayer consensus reached. The verdict is now immutable."),
                );
            }
            Err(e) => {
                self.notifier
                    .error("Arbitration Error", Some(&e.to_string()));
            }
        }
        result
    }
}
