//! Contract transport seam.
//!
//! The arbitrator only needs three primitives from the ledger: a read-only
//! call, a state-changing write that yields a transaction hash, and a
//! receipt lookup. [`RpcContractTransport`] provides them over JSON-RPC.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::contract::types::TransactionReceipt;
use crate::error::ContractError;
use crate::jsonrpc::JsonRpcClient;

pub const METHOD_CALL: &str = "gen_call";
pub const METHOD_SEND_TRANSACTION: &str = "eth_sendTransaction";
pub const METHOD_GET_TRANSACTION: &str = "eth_getTransactionByHash";

#[async_trait]
pub trait ContractTransport: Send + Sync {
    /// Execute a view function.
    async fn read(&self, contract: &str, function: &str, args: Value)
    -> Result<Value, ContractError>;

    /// Submit a transaction calling `function` from `from`; returns its hash.
    async fn write(
        &self,
        contract: &str,
        from: &str,
        function: &str,
        args: Value,
    ) -> Result<String, ContractError>;

    /// Current receipt, or `None` while the node does not know the hash yet.
    async fn receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>, ContractError>;
}

/// Calldata envelope understood by the node.
fn calldata(function: &str, args: Value) -> Value {
    json!({ "method": function, "args": args })
}

pub struct RpcContractTransport {
    rpc: JsonRpcClient,
}

impl RpcContractTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            rpc: JsonRpcClient::new(endpoint),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.rpc.url()
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ContractError> {
        self.rpc
            .call(method, params)
            .await
            .map_err(|e| ContractError::Rpc {
                method: method.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl ContractTransport for RpcContractTransport {
    async fn read(
        &self,
        contract: &str,
        function: &str,
        args: Value,
    ) -> Result<Value, ContractError> {
        tracing::debug!(contract, function, "contract read");
        self.call(
            METHOD_CALL,
            json!([{
                "type": "read",
                "to": contract,
                "data": calldata(function, args),
            }]),
        )
        .await
    }

    async fn write(
        &self,
        contract: &str,
        from: &str,
        function: &str,
        args: Value,
    ) -> Result<String, ContractError> {
        tracing::debug!(contract, from, function, "contract write");
        let result = self
            .call(
                METHOD_SEND_TRANSACTION,
                json!([{
                    "from": from,
                    "to": contract,
                    "value": "0x0",
                    "data": calldata(function, args),
                }]),
            )
            .await?;
        match result {
            Value::String(hash) => Ok(hash),
            other => Err(ContractError::InvalidPayload(format!(
                "expected a transaction hash, got {other}"
            ))),
        }
    }

    async fn receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>, ContractError> {
        let result = self.call(METHOD_GET_TRANSACTION, json!([hash])).await?;
        if result.is_null() {
            return Ok(None);
        }
        let mut receipt: TransactionReceipt = serde_json::from_value(result)
            .map_err(|e| ContractError::InvalidPayload(format!("receipt for {hash}: {e}")))?;
        if receipt.hash.is_empty() {
            receipt.hash = hash.to_string();
        }
        Ok(Some(receipt))
    }
}
