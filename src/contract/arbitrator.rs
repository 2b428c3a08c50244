//! Client for the moderation arbitration contract.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::contract::transport::{ContractTransport, RpcContractTransport};
use crate::contract::types::{
    ModerationCase, ReputationEntry, TransactionReceipt, TxStatus, parse_cases,
    parse_leaderboard, parse_points,
};
use crate::error::ContractError;

const FN_GET_ALL_CASES: &str = "get_all_cases";
const FN_GET_REPUTATION: &str = "get_arbiter_reputation";
const FN_GET_LEADERBOARD: &str = "getLeaderboard";
const FN_FILE_REPORT: &str = "file_report";
const FN_ARBITRATE: &str = "arbitrate";

/// How long to wait for a transaction to reach `ACCEPTED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub retries: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub const FILE_REPORT: Self = Self {
        retries: 30,
        interval: Duration::from_secs(5),
    };

    /// Consensus over a verdict takes longer than a plain write.
    pub const ARBITRATE: Self = Self {
        retries: 50,
        interval: Duration::from_secs(5),
    };
}

#[derive(Clone)]
pub struct ModerationArbitrator {
    transport: Arc<dyn ContractTransport>,
    contract_address: String,
    account: Option<String>,
    poll_interval: Option<Duration>,
}

impl std::fmt::Debug for ModerationArbitrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModerationArbitrator")
            .field("contract_address", &self.contract_address)
            .field("account", &self.account)
            .finish()
    }
}

impl ModerationArbitrator {
    pub fn new(
        transport: Arc<dyn ContractTransport>,
        contract_address: impl Into<String>,
        account: Option<String>,
    ) -> Self {
        Self {
            transport,
            contract_address: contract_address.into(),
            account,
            poll_interval: None,
        }
    }

    /// Arbitrator talking JSON-RPC to `endpoint`.
    pub fn connect(
        endpoint: impl Into<String>,
        contract_address: impl Into<String>,
        account: Option<String>,
    ) -> Self {
        Self::new(
            Arc::new(RpcContractTransport::new(endpoint)),
            contract_address,
            account,
        )
    }

    /// Override the receipt poll interval for every write.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// Rebind the account used for writes.
    pub fn update_account(&mut self, address: impl Into<String>) {
        self.account = Some(address.into());
    }

    pub async fn get_cases(&self) -> Result<Vec<ModerationCase>, ContractError> {
        let raw = self
            .transport
            .read(&self.contract_address, FN_GET_ALL_CASES, json!([]))
            .await
            .map_err(|e| {
                tracing::error!("Error fetching moderation cases: {}", e);
                ContractError::Sync(e.to_string())
            })?;
        Ok(parse_cases(raw))
    }

    /// Reputation points of `address`. Never fails: missing address and read
    /// errors both count as zero.
    pub async fn get_arbiter_reputation(&self, address: Option<&str>) -> i64 {
        let Some(address) = address else {
            return 0;
        };
        match self
            .transport
            .read(&self.contract_address, FN_GET_REPUTATION, json!([address]))
            .await
        {
            Ok(raw) => parse_points(&raw),
            Err(e) => {
                tracing::warn!("Error fetching reputation for {}: {}", address, e);
                0
            }
        }
    }

    /// All ranked arbiters, highest points first.
    pub async fn get_leaderboard(&self) -> Result<Vec<ReputationEntry>, ContractError> {
        let raw = self
            .transport
            .read(&self.contract_address, FN_GET_LEADERBOARD, json!([]))
            .await
            .map_err(|e| ContractError::Sync(e.to_string()))?;
        Ok(parse_leaderboard(raw))
    }

    /// File an incident report judged against `community_rules`.
    pub async fn file_report(
        &self,
        incident_report: &str,
        community_rules: &str,
    ) -> Result<TransactionReceipt, ContractError> {
        self.write_and_wait(
            FN_FILE_REPORT,
            json!([incident_report, community_rules]),
            PollPolicy::FILE_REPORT,
        )
        .await
        .map_err(|e| match e {
            ContractError::Rpc { .. } | ContractError::InvalidPayload(_) => {
                tracing::error!("Error filing report: {}", e);
                ContractError::WriteFailed(e.to_string())
            }
            other => other,
        })
    }

    /// Ask the validators to reach a verdict on `case_id`.
    pub async fn arbitrate(&self, case_id: &str) -> Result<TransactionReceipt, ContractError> {
        self.write_and_wait(FN_ARBITRATE, json!([case_id]), PollPolicy::ARBITRATE)
            .await
            .map_err(|e| match e {
                ContractError::Rpc { .. } | ContractError::InvalidPayload(_) => {
                    tracing::error!("Error during arbitration: {}", e);
                    ContractError::ConsensusFailed(e.to_string())
                }
                other => other,
            })
    }

    async fn write_and_wait(
        &self,
        function: &str,
        args: serde_json::Value,
        policy: PollPolicy,
    ) -> Result<TransactionReceipt, ContractError> {
        let from = self.account.as_deref().ok_or(ContractError::MissingAccount)?;
        let hash = self
            .transport
            .write(&self.contract_address, from, function, args)
            .await?;
        tracing::info!(function, hash = %hash, "Transaction submitted");

        let policy = PollPolicy {
            interval: self.poll_interval.unwrap_or(policy.interval),
            ..policy
        };
        self.wait_for_acceptance(&hash, policy).await
    }

    /// Poll the receipt until it is accepted, rejected, or the retry budget
    /// runs out. Lookup errors count against the budget.
    async fn wait_for_acceptance(
        &self,
        hash: &str,
        policy: PollPolicy,
    ) -> Result<TransactionReceipt, ContractError> {
        for attempt in 1..=policy.retries {
            match self.transport.receipt(hash).await {
                Ok(Some(receipt)) if receipt.status.is_accepted() => {
                    tracing::info!(hash, attempt, "Transaction accepted");
                    return Ok(receipt);
                }
                Ok(Some(receipt)) if receipt.status == TxStatus::Rejected => {
                    return Err(ContractError::Rejected {
                        hash: hash.to_string(),
                    });
                }
                Ok(Some(receipt)) => {
                    tracing::debug!(hash, attempt, status = %receipt.status, "Waiting for acceptance");
                }
                Ok(None) => tracing::debug!(hash, attempt, "Transaction not yet known"),
                Err(e) => tracing::warn!(hash, attempt, "Receipt lookup failed: {}", e),
            }
            if attempt < policy.retries {
                tokio::time::sleep(policy.interval).await;
            }
        }
        Err(ContractError::ReceiptTimeout {
            hash: hash.to_string(),
            attempts: policy.retries,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;
    use pretty_assertions::assert_eq;

    fn arbitrator(transport: &Arc<MockTransport>, account: Option<&str>) -> ModerationArbitrator {
        let transport: Arc<dyn ContractTransport> = transport.clone();
        ModerationArbitrator::new(transport, "0xC0", account.map(str::to_string))
            .with_poll_interval(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_get_cases_wraps_transport_failure_as_sync_error() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_reads();
        let err = arbitrator(&transport, None).get_cases().await.unwrap_err();
        assert!(matches!(err, ContractError::Sync(_)));
        assert!(err.to_string().starts_with("Failed to sync with ledger"));
    }

    #[tokio::test]
    async fn test_reputation_defaults_to_zero() {
        let transport = Arc::new(MockTransport::new());
        transport.set_read(FN_GET_REPUTATION, json!("15"));
        let contract = arbitrator(&transport, None);

        assert_eq!(contract.get_arbiter_reputation(None).await, 0);
        assert_eq!(contract.get_arbiter_reputation(Some("0xA")).await, 15);

        transport.fail_reads();
        assert_eq!(contract.get_arbiter_reputation(Some("0xA")).await, 0);
    }

    #[tokio::test]
    async fn test_file_report_polls_until_accepted() {
        let transport = Arc::new(MockTransport::new());
        transport.push_statuses([
            TxStatus::Pending,
            TxStatus::Other("COMMITTING".into()),
            TxStatus::Accepted,
        ]);
        let contract = arbitrator(&transport, Some("0xME"));

        let receipt = contract.file_report("raid in #lobby", "no raids").await.unwrap();
        assert_eq!(receipt.status, TxStatus::Accepted);
        assert_eq!(transport.receipt_polls(), 3);
        assert_eq!(
            transport.writes(),
            vec![(
                "0xME".to_string(),
                FN_FILE_REPORT.to_string(),
                json!(["raid in #lobby", "no raids"])
            )]
        );
    }

    #[tokio::test]
    async fn test_rejected_transaction_fails_immediately() {
        let transport = Arc::new(MockTransport::new());
        transport.push_statuses([TxStatus::Rejected, TxStatus::Accepted]);
        let err = arbitrator(&transport, Some("0xME"))
            .arbitrate("4")
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::Rejected { .. }));
        assert_eq!(transport.receipt_polls(), 1);
    }

    #[tokio::test]
    async fn test_arbitrate_times_out_after_retry_budget() {
        let transport = Arc::new(MockTransport::new());
        let err = arbitrator(&transport, Some("0xME"))
            .arbitrate("4")
            .await
            .unwrap_err();
        match err {
            ContractError::ReceiptTimeout { attempts, .. } => {
                assert_eq!(attempts, PollPolicy::ARBITRATE.retries)
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.receipt_polls(), 50);
    }

    #[tokio::test]
    async fn test_write_failures_are_mapped_per_operation() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_writes();
        let contract = arbitrator(&transport, Some("0xME"));

        assert!(matches!(
            contract.file_report("r", "c").await,
            Err(ContractError::WriteFailed(_))
        ));
        assert!(matches!(
            contract.arbitrate("1").await,
            Err(ContractError::ConsensusFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_writes_require_an_account() {
        let transport = Arc::new(MockTransport::new());
        let mut contract = arbitrator(&transport, None);
        assert!(matches!(
            contract.arbitrate("1").await,
            Err(ContractError::MissingAccount)
        ));

        transport.push_statuses([TxStatus::Finalized]);
        contract.update_account("0xNEW");
        contract.arbitrate("1").await.unwrap();
        assert_eq!(transport.writes()[0].0, "0xNEW");
    }
}
