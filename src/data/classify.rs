use alloy::primitives::{Address, Bytes, U256};

use crate::data::tokens::KnownTokens;
use crate::data::types::{DecodedParams, ParamDecode, SubCall, TxClass};
use crate::error::DecodeError;
use crate::utils::format_selector;

/// ERC-20 `transfer(address,uint256)`.
pub const ERC20_TRANSFER: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
/// ERC-721 `safeTransferFrom(address,address,uint256)`. Contracts that dispatch
/// this method carry the selector verbatim in their bytecode.
pub const ERC721_SAFE_TRANSFER_FROM: [u8; 4] = [0x42, 0x84, 0x2e, 0x0e];
/// MultiSend `multiSend(bytes)`.
pub const MULTI_SEND: [u8; 4] = [0x8d, 0x80, 0xff, 0x0a];

// Gnosis Safe management methods.
const ADD_OWNER_WITH_THRESHOLD: [u8; 4] = [0x0d, 0x58, 0x2f, 0x13];
const REMOVE_OWNER: [u8; 4] = [0xf8, 0xdc, 0x5d, 0xd9];
const SWAP_OWNER: [u8; 4] = [0xe3, 0x18, 0xb5, 0x2b];
const CHANGE_THRESHOLD: [u8; 4] = [0x69, 0x4e, 0x80, 0xc3];
const CHANGE_MASTER_COPY: [u8; 4] = [0x7d, 0xe7, 0xed, 0xef];
const SET_FALLBACK_HANDLER: [u8; 4] = [0xf0, 0x8a, 0x03, 0x23];
const ENABLE_MODULE: [u8; 4] = [0x61, 0x0b, 0x59, 0x25];
const DISABLE_MODULE: [u8; 4] = [0xe0, 0x09, 0xcf, 0xde];

/// Minimum calldata for a two-word call such as `transfer(address,uint256)`.
const MIN_TRANSFER_LENGTH: usize = 4 + 32 + 32;

/// Classify one outgoing transaction from its destination, value, calldata,
/// the destination's deployed bytecode, and the fungible-token registry.
///
/// Pure and deterministic: the same inputs always produce the same class.
/// Earlier rules take precedence, and the trailing `EtherTransfer` fallback
/// makes the function total.
pub fn classify(
    safe: Address,
    to: Address,
    value: U256,
    data: Option<&Bytes>,
    code: Option<&Bytes>,
    known_tokens: &KnownTokens,
) -> TxClass {
    let call_data = data.filter(|d| !d.is_empty());

    if to == safe && value.is_zero() {
        return if call_data.is_some() {
            TxClass::SettingsChange
        } else {
            TxClass::Cancellation
        };
    }

    if is_erc721_transfer(to, value, call_data, code, known_tokens) {
        return TxClass::Erc721Transfer;
    }

    if is_token_transfer(value, call_data) {
        return TxClass::TokenTransfer;
    }

    if is_multi_send(value, call_data) {
        let upgrade = call_data.map(is_upgrade_batch).unwrap_or(false);
        return TxClass::MultiSend { upgrade };
    }

    if to != safe && call_data.is_some() {
        return TxClass::Custom;
    }

    TxClass::EtherTransfer
}

/// Calldata opens with the ERC-20 transfer selector and the transaction itself
/// carries no value (the amount lives inside the calldata).
pub fn is_token_transfer(value: U256, data: Option<&Bytes>) -> bool {
    matches!(data, Some(d) if d.len() >= 4 && d[..4] == ERC20_TRANSFER && value.is_zero())
}

/// Heuristic ERC-721 detection: the destination's bytecode dispatches
/// `safeTransferFrom`, or the calldata looks like a token transfer toward an
/// address the registry does not recognize as a fungible token.
fn is_erc721_transfer(
    to: Address,
    value: U256,
    data: Option<&Bytes>,
    code: Option<&Bytes>,
    known_tokens: &KnownTokens,
) -> bool {
    if let Some(code) = code {
        if code_contains_selector(code, &ERC721_SAFE_TRANSFER_FROM) {
            return true;
        }
    }
    is_token_transfer(value, data) && !known_tokens.contains(to)
}

fn is_multi_send(value: U256, data: Option<&Bytes>) -> bool {
    matches!(data, Some(d) if d.len() >= 4 && d[..4] == MULTI_SEND && value.is_zero())
}

/// An upgrade batch migrates the wallet implementation: it must contain both a
/// `changeMasterCopy` and a `setFallbackHandler` sub-call. A batch that fails
/// to decode is never an upgrade.
fn is_upgrade_batch(data: &Bytes) -> bool {
    let Ok(calls) = decode_multi_send(data) else {
        return false;
    };
    let has = |selector: [u8; 4]| {
        calls
            .iter()
            .any(|c| c.data.len() >= 4 && c.data[..4] == selector)
    };
    has(CHANGE_MASTER_COPY) && has(SET_FALLBACK_HANDLER)
}

fn code_contains_selector(code: &Bytes, selector: &[u8; 4]) -> bool {
    code.windows(4).any(|w| w == selector)
}

/// First four bytes of the calldata, when present.
pub fn selector_of(data: &Bytes) -> Option<[u8; 4]> {
    if data.len() < 4 {
        return None;
    }
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&data[..4]);
    Some(selector)
}

/// Decode parameters for the winning classification.
///
/// Only the winning class is attempted, and a failed decode is reported as
/// `ParamDecode::Failed` rather than an error; a transaction is never dropped
/// because its parameters did not parse.
pub fn decode_params(class: TxClass, data: Option<&Bytes>) -> ParamDecode {
    let call_data = data.filter(|d| !d.is_empty());
    let result = match class {
        TxClass::TokenTransfer | TxClass::Erc721Transfer => decode_transfer(call_data),
        TxClass::SettingsChange => decode_settings(call_data),
        TxClass::MultiSend { .. } => {
            decode_required(call_data).and_then(decode_multi_send).map(DecodedParams::MultiSend)
        }
        TxClass::Custom => decode_custom(call_data),
        TxClass::Cancellation | TxClass::EtherTransfer => return ParamDecode::NotApplicable,
    };
    match result {
        Ok(params) => ParamDecode::Decoded(params),
        Err(err) => ParamDecode::Failed(err),
    }
}

fn decode_required(data: Option<&Bytes>) -> Result<&Bytes, DecodeError> {
    data.ok_or(DecodeError::TooShort { got: 0, need: 4 })
}

/// Recipient and amount of an ERC-20 style `transfer` call.
pub fn decode_transfer(data: Option<&Bytes>) -> Result<DecodedParams, DecodeError> {
    let data = decode_required(data)?;
    let selector = selector_of(data).ok_or(DecodeError::TooShort {
        got: data.len(),
        need: 4,
    })?;
    if selector != ERC20_TRANSFER {
        return Err(DecodeError::UnknownSelector(format_selector(&selector)));
    }
    if data.len() < MIN_TRANSFER_LENGTH {
        return Err(DecodeError::TooShort {
            got: data.len(),
            need: MIN_TRANSFER_LENGTH,
        });
    }
    Ok(DecodedParams::Transfer {
        to: word_address(data, 0)?,
        amount: word_u256(data, 1)?,
    })
}

/// Named arguments of a recognized wallet-management method. Unrecognized
/// selectors keep the transaction but decode to the bare selector.
fn decode_settings(data: Option<&Bytes>) -> Result<DecodedParams, DecodeError> {
    let data = decode_required(data)?;
    let selector = selector_of(data).ok_or(DecodeError::TooShort {
        got: data.len(),
        need: 4,
    })?;

    let (method, params) = match selector {
        ADD_OWNER_WITH_THRESHOLD => (
            "addOwnerWithThreshold",
            vec![
                ("owner".to_string(), word_address(data, 0)?.to_string()),
                ("_threshold".to_string(), word_u256(data, 1)?.to_string()),
            ],
        ),
        REMOVE_OWNER => (
            "removeOwner",
            vec![
                ("prevOwner".to_string(), word_address(data, 0)?.to_string()),
                ("owner".to_string(), word_address(data, 1)?.to_string()),
                ("_threshold".to_string(), word_u256(data, 2)?.to_string()),
            ],
        ),
        SWAP_OWNER => (
            "swapOwner",
            vec![
                ("prevOwner".to_string(), word_address(data, 0)?.to_string()),
                ("oldOwner".to_string(), word_address(data, 1)?.to_string()),
                ("newOwner".to_string(), word_address(data, 2)?.to_string()),
            ],
        ),
        CHANGE_THRESHOLD => (
            "changeThreshold",
            vec![("_threshold".to_string(), word_u256(data, 0)?.to_string())],
        ),
        CHANGE_MASTER_COPY => (
            "changeMasterCopy",
            vec![("_masterCopy".to_string(), word_address(data, 0)?.to_string())],
        ),
        SET_FALLBACK_HANDLER => (
            "setFallbackHandler",
            vec![("handler".to_string(), word_address(data, 0)?.to_string())],
        ),
        ENABLE_MODULE => (
            "enableModule",
            vec![("module".to_string(), word_address(data, 0)?.to_string())],
        ),
        DISABLE_MODULE => (
            "disableModule",
            vec![
                ("prevModule".to_string(), word_address(data, 0)?.to_string()),
                ("module".to_string(), word_address(data, 1)?.to_string()),
            ],
        ),
        other => {
            return Ok(DecodedParams::SettingsChange {
                method: format_selector(&other),
                params: vec![],
            });
        }
    };

    Ok(DecodedParams::SettingsChange {
        method: method.to_string(),
        params,
    })
}

fn decode_custom(data: Option<&Bytes>) -> Result<DecodedParams, DecodeError> {
    let data = decode_required(data)?;
    let selector = selector_of(data).ok_or(DecodeError::TooShort {
        got: data.len(),
        need: 4,
    })?;
    Ok(DecodedParams::Custom {
        selector,
        data_len: data.len() - 4,
    })
}

/// Walk the packed multi-send payload.
///
/// Layout after the selector: a dynamic `bytes` head (offset word, length word)
/// followed by the packed sub-calls, each `operation (1) | to (20) | value (32)
/// | data_len (32) | data (data_len)`.
pub fn decode_multi_send(data: &Bytes) -> Result<Vec<SubCall>, DecodeError> {
    let selector = selector_of(data).ok_or(DecodeError::TooShort {
        got: data.len(),
        need: 4,
    })?;
    if selector != MULTI_SEND {
        return Err(DecodeError::UnknownSelector(format_selector(&selector)));
    }

    let head = &data[4..];
    let offset = small_usize(word_u256_raw(head, 0)?).ok_or(DecodeError::MalformedBatch { offset: 4 })?;
    let length_pos = offset
        .checked_add(32)
        .filter(|end| *end <= head.len())
        .ok_or(DecodeError::MalformedBatch { offset })?;
    let length = small_usize(word_u256_at(head, offset)?)
        .ok_or(DecodeError::MalformedBatch { offset })?;
    let packed = head
        .get(length_pos..length_pos + length)
        .ok_or(DecodeError::MalformedBatch { offset: length_pos })?;

    let mut calls = Vec::new();
    let mut cursor = 0usize;
    while cursor < packed.len() {
        // fixed header: operation, to, value, data length
        let header_end = cursor + 1 + 20 + 32 + 32;
        if header_end > packed.len() {
            return Err(DecodeError::MalformedBatch { offset: cursor });
        }
        let operation = packed[cursor];
        let to = Address::from_slice(&packed[cursor + 1..cursor + 21]);
        let value = U256::from_be_slice(&packed[cursor + 21..cursor + 53]);
        let data_len = small_usize(U256::from_be_slice(&packed[cursor + 53..cursor + 85]))
            .ok_or(DecodeError::MalformedBatch { offset: cursor + 53 })?;
        let data_end = header_end
            .checked_add(data_len)
            .filter(|end| *end <= packed.len())
            .ok_or(DecodeError::MalformedBatch { offset: header_end })?;
        calls.push(SubCall {
            operation,
            to,
            value,
            data: Bytes::from(packed[header_end..data_end].to_vec()),
        });
        cursor = data_end;
    }

    Ok(calls)
}

/// Word `index` of the argument section (selector already skipped).
fn word(data: &Bytes, index: usize) -> Result<&[u8], DecodeError> {
    let start = 4 + index * 32;
    let end = start + 32;
    if data.len() < end {
        return Err(DecodeError::TooShort {
            got: data.len(),
            need: end,
        });
    }
    Ok(&data[start..end])
}

fn word_address(data: &Bytes, index: usize) -> Result<Address, DecodeError> {
    let w = word(data, index)?;
    Ok(Address::from_slice(&w[12..]))
}

fn word_u256(data: &Bytes, index: usize) -> Result<U256, DecodeError> {
    Ok(U256::from_be_slice(word(data, index)?))
}

fn word_u256_raw(data: &[u8], index: usize) -> Result<U256, DecodeError> {
    word_u256_at(data, index * 32)
}

fn word_u256_at(data: &[u8], at: usize) -> Result<U256, DecodeError> {
    let end = at.checked_add(32).ok_or(DecodeError::MalformedBatch { offset: at })?;
    if data.len() < end {
        return Err(DecodeError::MalformedBatch { offset: at });
    }
    Ok(U256::from_be_slice(&data[at..end]))
}

/// Lengths and offsets inside calldata must stay well below the address space.
fn small_usize(value: U256) -> Option<usize> {
    if value > U256::from(u32::MAX) {
        return None;
    }
    Some(value.to::<u64>() as usize)
}
