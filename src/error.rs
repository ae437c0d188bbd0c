use thiserror::Error;

/// Failures while talking to the Safe transaction service.
///
/// A 304 response is not an error and never appears here; it is surfaced as
/// `HistoryPage::NotModified`.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("history request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("history endpoint returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("could not decode history response: {0}")]
    Body(#[from] serde_json::Error),
}

/// Failures of the batched on-chain call executor.
#[derive(Error, Debug)]
pub enum BatchCallError {
    /// The batch could not be assembled or the round-trip itself failed.
    /// All items in the batch are lost when this happens.
    #[error("batch round-trip failed: {0}")]
    Transport(String),

    /// A single call inside the batch was rejected by the node.
    #[error("call to {target} failed: {message}")]
    Call { target: String, message: String },

    /// A call succeeded but its return data did not decode as the expected type.
    #[error("return data from {target} did not decode: {message}")]
    Decode { target: String, message: String },
}

/// Token metadata resolution failures.
///
/// `Unresolvable` and `CachedMiss` are semantic misses: the caller demotes the
/// transaction to a custom call instead of failing the pipeline. `Transport`
/// means the chain could not be asked at all; it is never recorded as a miss,
/// and the next cycle probes the address again.
#[derive(Error, Debug)]
pub enum TokenResolutionError {
    /// The probe never reached the node.
    #[error("token metadata probe lost in transport: {0}")]
    Transport(String),

    #[error("token {0} does not answer either ERC-20 interface")]
    Unresolvable(String),

    /// A previous probe already failed for this address and the miss was cached.
    #[error("token {0} is a cached miss")]
    CachedMiss(String),
}

/// A parameter decode was attempted for the winning classification and failed.
///
/// Carried inside `ParamDecode::Failed`; never aborts the transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("calldata too short: {got} bytes, need {need}")]
    TooShort { got: usize, need: usize },

    #[error("multi-send payload is malformed at byte {offset}")]
    MalformedBatch { offset: usize },

    #[error("unknown method selector {0}")]
    UnknownSelector(String),
}

/// Fatal per-record normalization failure.
///
/// The record is dropped from the batch; the rest of the cycle proceeds.
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("refund fee overflows: gas_price={gas_price} base_gas={base_gas} safe_tx_gas={safe_tx_gas}")]
    RefundOverflow {
        gas_price: String,
        base_gas: u64,
        safe_tx_gas: u64,
    },
}
