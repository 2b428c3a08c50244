//! Expected-network policy.
//!
//! Pure helpers: chain-id encoding, matching the observed chain against the
//! configured target, and the descriptor handed to `wallet_addEthereumChain`.

use serde::{Deserialize, Serialize};

use crate::config::NetworkConfig;

/// Decimals of the native currency on the arbitration network.
pub const NATIVE_CURRENCY_DECIMALS: u8 = 18;

/// Encode a chain id as `0x`-prefixed uppercase hex (`61999` -> `0xF22F`).
pub fn to_hex(chain_id: u64) -> String {
    format!("0x{chain_id:X}")
}

/// Parse a hex chain id. The `0x` prefix is optional and case is ignored.
pub fn parse_chain_id(hex: &str) -> Option<u64> {
    let trimmed = hex.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Whether an observed hex chain id equals the expected numeric id.
pub fn matches_expected(observed_hex: &str, expected: u64) -> bool {
    parse_chain_id(observed_hex) == Some(expected)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Network registration payload for `wallet_addEthereumChain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDescriptor {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

pub fn build_network_descriptor(config: &NetworkConfig) -> NetworkDescriptor {
    NetworkDescriptor {
        chain_id: to_hex(config.chain_id),
        chain_name: config.chain_name.clone(),
        native_currency: NativeCurrency {
            name: config.currency_symbol.clone(),
            symbol: config.currency_symbol.clone(),
            decimals: NATIVE_CURRENCY_DECIMALS,
        },
        rpc_urls: vec![config.rpc_url.clone()],
        block_explorer_urls: Vec::new(),
    }
}
