use std::collections::HashMap;

use alloy::primitives::{Address, B256, Bytes, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::error::DecodeError;

/// One owner's approval as returned by the transaction service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfirmation {
    pub owner: Address,
    #[serde(default)]
    pub submission_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    #[serde(default)]
    pub signature: Option<Bytes>,
}

/// A raw outgoing transaction exactly as the Safe transaction service reports it.
///
/// Big integers arrive as decimal strings, addresses may be null for legacy rows,
/// and the gas accounting fields default to zero when absent. Immutable once
/// fetched.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransactionRecord {
    #[serde(default, deserialize_with = "addr_or_zero")]
    pub to: Address,
    #[serde(default, deserialize_with = "u256_from_dec")]
    pub value: U256,
    #[serde(default)]
    pub data: Option<Bytes>,
    #[serde(default)]
    pub operation: u8,
    #[serde(default)]
    pub nonce: Option<u64>,
    #[serde(default)]
    pub safe_tx_gas: u64,
    #[serde(default)]
    pub base_gas: u64,
    #[serde(default, deserialize_with = "u256_from_dec")]
    pub gas_price: U256,
    #[serde(default, deserialize_with = "addr_or_zero")]
    pub gas_token: Address,
    #[serde(default, deserialize_with = "addr_or_zero")]
    pub refund_receiver: Address,
    #[serde(default)]
    pub is_executed: bool,
    #[serde(default)]
    pub is_successful: Option<bool>,
    #[serde(default)]
    pub submission_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub execution_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub executor: Option<Address>,
    #[serde(default)]
    pub confirmations: Vec<RawConfirmation>,
    #[serde(default)]
    pub safe_tx_hash: Option<B256>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    /// Synthetic marker for the seeded wallet-creation record; never on the wire.
    #[serde(default)]
    pub creation: bool,
}

impl RawTransactionRecord {
    /// The synthetic record representing the wallet's deployment. Seeded at the
    /// head of every fetch cycle; the remote history never contains it.
    pub fn creation() -> Self {
        Self {
            to: Address::ZERO,
            value: U256::ZERO,
            data: None,
            operation: 0,
            nonce: None,
            safe_tx_gas: 0,
            base_gas: 0,
            gas_price: U256::ZERO,
            gas_token: Address::ZERO,
            refund_receiver: Address::ZERO,
            is_executed: true,
            is_successful: None,
            submission_date: None,
            execution_date: None,
            block_number: None,
            executor: None,
            confirmations: vec![],
            safe_tx_hash: None,
            transaction_hash: None,
            creation: true,
        }
    }

    /// Call data, treating `Some(0x)` the same as absent.
    pub fn call_data(&self) -> Option<&Bytes> {
        self.data.as_ref().filter(|d| !d.is_empty())
    }
}

/// Wire shape of the history endpoint body.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryResponse {
    pub count: u64,
    pub results: Vec<RawTransactionRecord>,
}

/// Outcome of one conditional fetch against the history endpoint.
#[derive(Debug, Clone)]
pub enum HistoryPage {
    /// The service signalled 304; the previous result is still current.
    NotModified,
    Page {
        etag: Option<String>,
        results: Vec<RawTransactionRecord>,
    },
}

/// Normalized owner approval. Built once during normalization, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub owner: Address,
    pub transaction_hash: Option<B256>,
    pub signature: Option<Bytes>,
}

/// Symbol and precision for a token contract.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

/// Refund owed to the submitter, present only when the record carries a gas price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundParams {
    /// Decimal-formatted fee in the refund token's precision.
    pub fee: String,
    pub symbol: String,
}

/// Terminal classification of one outgoing transaction.
///
/// Exactly one variant applies; the classifier is a total function over its
/// inputs, so mutual exclusivity holds by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxClass {
    /// Call into the wallet itself (owner/threshold/module management).
    SettingsChange,
    /// Empty self-call used to burn a nonce.
    Cancellation,
    /// Non-fungible token movement, detected from bytecode or calldata shape.
    Erc721Transfer,
    /// ERC-20 `transfer` with resolvable token metadata.
    TokenTransfer,
    /// Batched sub-calls; `upgrade` marks a master-copy migration batch.
    MultiSend { upgrade: bool },
    /// Arbitrary contract interaction.
    Custom,
    /// Plain value transfer, including the synthetic creation record.
    EtherTransfer,
}

impl TxClass {
    pub fn is_settings_change(self) -> bool {
        self == TxClass::SettingsChange
    }

    pub fn is_cancellation(self) -> bool {
        self == TxClass::Cancellation
    }

    pub fn is_token_transfer(self) -> bool {
        self == TxClass::TokenTransfer
    }

    pub fn is_multi_send(self) -> bool {
        matches!(self, TxClass::MultiSend { .. })
    }

    pub fn is_upgrade(self) -> bool {
        matches!(self, TxClass::MultiSend { upgrade: true })
    }

    pub fn is_custom(self) -> bool {
        self == TxClass::Custom
    }
}

impl std::fmt::Display for TxClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxClass::SettingsChange => write!(f, "settings-change"),
            TxClass::Cancellation => write!(f, "cancellation"),
            TxClass::Erc721Transfer => write!(f, "erc721-transfer"),
            TxClass::TokenTransfer => write!(f, "token-transfer"),
            TxClass::MultiSend { upgrade: true } => write!(f, "upgrade"),
            TxClass::MultiSend { upgrade: false } => write!(f, "multi-send"),
            TxClass::Custom => write!(f, "custom"),
            TxClass::EtherTransfer => write!(f, "ether-transfer"),
        }
    }
}

/// One packed sub-call inside a multi-send batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubCall {
    pub operation: u8,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Parameters recovered for the winning classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedParams {
    /// ERC-20 transfer recipient and amount.
    Transfer { to: Address, amount: U256 },
    /// A recognized wallet-management method with its named arguments.
    SettingsChange {
        method: String,
        params: Vec<(String, String)>,
    },
    /// The walked sub-call list of a multi-send batch.
    MultiSend(Vec<SubCall>),
    /// Selector and payload size of an arbitrary call.
    Custom { selector: [u8; 4], data_len: usize },
}

/// Decode outcome, kept as a three-state value so "this class has no parameters"
/// and "a decode was attempted and failed" stay distinguishable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamDecode {
    NotApplicable,
    Failed(DecodeError),
    Decoded(DecodedParams),
}

impl ParamDecode {
    pub fn is_decoded(&self) -> bool {
        matches!(self, ParamDecode::Decoded(_))
    }

    pub fn params(&self) -> Option<&DecodedParams> {
        match self {
            ParamDecode::Decoded(p) => Some(p),
            _ => None,
        }
    }
}

/// The canonical reconciled transaction: the raw record plus everything the
/// pipeline derived from it. Built once per fetch cycle and replaced wholesale
/// on the next one.
#[derive(Debug, Clone)]
pub struct SafeTransaction {
    pub record: RawTransactionRecord,
    pub class: TxClass,
    /// Token symbol/decimals, resolved only for token transfers.
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    pub decoded: ParamDecode,
    pub refund_params: Option<RefundParams>,
    pub confirmations: Vec<Confirmation>,
}

/// Reconciled history for one fetch cycle, partitioned by cancellation status
/// and keyed by the wallet address.
#[derive(Debug, Default)]
pub struct OutgoingHistory {
    pub outgoing: HashMap<Address, Vec<SafeTransaction>>,
    pub cancel: HashMap<Address, Vec<SafeTransaction>>,
}

impl OutgoingHistory {
    pub fn outgoing_for(&self, safe: Address) -> &[SafeTransaction] {
        self.outgoing.get(&safe).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cancel_for(&self, safe: Address) -> &[SafeTransaction] {
        self.cancel.get(&safe).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Preset connection endpoints for one network.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub tx_service_url: String,
    pub symbol: String,
}

fn addr_or_zero<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Address>::deserialize(deserializer)?.unwrap_or_default())
}

/// The service serializes big integers as decimal strings ("1000000"), but a few
/// legacy rows carry plain JSON numbers; accept both.
fn u256_from_dec<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DecValue {
        Text(String),
        Number(u64),
    }

    match DecValue::deserialize(deserializer)? {
        DecValue::Text(s) => U256::from_str_radix(s.trim(), 10).map_err(serde::de::Error::custom),
        DecValue::Number(n) => Ok(U256::from(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE_ROW: &str = r#"{
        "safe": "0xbc78a3346CB77A9db4e11Bb5A9b1Aa0C35c5a276",
        "to": "0x6810e776880C02933D47DB1b9fc05908e5386b96",
        "value": "1000000000000000000",
        "data": "0xa9059cbb000000000000000000000000d8da6bf26964af9d7eed9e03e53415d37aa960450000000000000000000000000000000000000000000000000000000000000064",
        "operation": 0,
        "gasToken": null,
        "safeTxGas": 23112,
        "baseGas": 49360,
        "gasPrice": "0",
        "refundReceiver": "0x0000000000000000000000000000000000000000",
        "nonce": 7,
        "submissionDate": "2022-11-16T12:04:13.899565Z",
        "executionDate": "2022-11-16T12:05:24Z",
        "blockNumber": 15988669,
        "transactionHash": "0x72c4c44b018076b623a4a03d2e6a3acbf155d9f2e7bd6bf4f1f3a3e1a352b2c5",
        "safeTxHash": "0x1cd4a2cf6544f02d67a9a4741dfee39bc5d4b79a1c84061446e645c7bcbbcc15",
        "isExecuted": true,
        "isSuccessful": true,
        "executor": "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045",
        "confirmations": [
            {
                "owner": "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045",
                "submissionDate": "2022-11-16T12:04:13.899565Z",
                "transactionHash": null,
                "signature": "0x0001"
            }
        ]
    }"#;

    #[test]
    fn test_deserialize_service_row() {
        let row: RawTransactionRecord = serde_json::from_str(SERVICE_ROW).unwrap();
        assert_eq!(row.value, U256::from(10u64).pow(U256::from(18u64)));
        assert_eq!(row.nonce, Some(7));
        assert_eq!(row.safe_tx_gas, 23112);
        assert_eq!(row.base_gas, 49360);
        assert_eq!(row.gas_price, U256::ZERO);
        // null gasToken collapses to the native sentinel
        assert_eq!(row.gas_token, Address::ZERO);
        assert!(row.is_executed);
        assert_eq!(row.is_successful, Some(true));
        assert_eq!(row.confirmations.len(), 1);
        assert!(row.confirmations[0].transaction_hash.is_none());
        assert!(!row.creation);
        assert_eq!(row.call_data().unwrap().len(), 68);
    }

    #[test]
    fn test_deserialize_minimal_row() {
        let row: RawTransactionRecord =
            serde_json::from_str(r#"{"to": "0x6810e776880C02933D47DB1b9fc05908e5386b96"}"#)
                .unwrap();
        assert_eq!(row.value, U256::ZERO);
        assert!(row.data.is_none());
        assert!(row.nonce.is_none());
        assert!(row.confirmations.is_empty());
        assert!(!row.is_executed);
    }

    #[test]
    fn test_deserialize_numeric_gas_price() {
        let row: RawTransactionRecord =
            serde_json::from_str(r#"{"to": null, "gasPrice": 12, "value": "34"}"#).unwrap();
        assert_eq!(row.to, Address::ZERO);
        assert_eq!(row.gas_price, U256::from(12u64));
        assert_eq!(row.value, U256::from(34u64));
    }

    #[test]
    fn test_creation_record() {
        let tx = RawTransactionRecord::creation();
        assert!(tx.creation);
        assert!(tx.is_executed);
        assert_eq!(tx.to, Address::ZERO);
        assert_eq!(tx.value, U256::ZERO);
        assert!(tx.nonce.is_none());
        assert!(tx.call_data().is_none());
    }

    #[test]
    fn test_call_data_empty_is_none() {
        let mut tx = RawTransactionRecord::creation();
        tx.data = Some(Bytes::new());
        assert!(tx.call_data().is_none());

        tx.data = Some(Bytes::from(vec![0x01]));
        assert!(tx.call_data().is_some());
    }

    #[test]
    fn test_history_response_shape() {
        let body = format!(r#"{{"count": 1, "results": [{SERVICE_ROW}]}}"#);
        let page: HistoryResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results.len(), 1);
    }

    #[test]
    fn test_tx_class_display() {
        assert_eq!(TxClass::SettingsChange.to_string(), "settings-change");
        assert_eq!(TxClass::Cancellation.to_string(), "cancellation");
        assert_eq!(TxClass::Erc721Transfer.to_string(), "erc721-transfer");
        assert_eq!(TxClass::TokenTransfer.to_string(), "token-transfer");
        assert_eq!(TxClass::MultiSend { upgrade: false }.to_string(), "multi-send");
        assert_eq!(TxClass::MultiSend { upgrade: true }.to_string(), "upgrade");
        assert_eq!(TxClass::Custom.to_string(), "custom");
        assert_eq!(TxClass::EtherTransfer.to_string(), "ether-transfer");
    }

    #[test]
    fn test_tx_class_flags() {
        assert!(TxClass::Cancellation.is_cancellation());
        assert!(!TxClass::Custom.is_cancellation());
        assert!(TxClass::MultiSend { upgrade: true }.is_multi_send());
        assert!(TxClass::MultiSend { upgrade: true }.is_upgrade());
        assert!(!TxClass::MultiSend { upgrade: false }.is_upgrade());
        assert!(TxClass::TokenTransfer.is_token_transfer());
        assert!(TxClass::SettingsChange.is_settings_change());
        assert!(TxClass::Custom.is_custom());
    }

    #[test]
    fn test_param_decode_accessors() {
        let decoded = ParamDecode::Decoded(DecodedParams::Custom {
            selector: [1, 2, 3, 4],
            data_len: 36,
        });
        assert!(decoded.is_decoded());
        assert!(decoded.params().is_some());

        assert!(!ParamDecode::NotApplicable.is_decoded());
        assert!(ParamDecode::NotApplicable.params().is_none());
    }

    #[test]
    fn test_outgoing_history_accessors() {
        let safe = Address::from_slice(&[0xaa; 20]);
        let history = OutgoingHistory::default();
        assert!(history.outgoing_for(safe).is_empty());
        assert!(history.cancel_for(safe).is_empty());
    }
}
