use std::fs;
use std::io::Write;

use alloy::primitives::Address;

use crate::data::types::{DecodedParams, OutgoingHistory, ParamDecode, SafeTransaction};
use crate::utils::format_selector;

/// Export a reconciled history to CSV, outgoing group first, cancellations after.
///
/// Columns: group, nonce, class, to, value_wei, token_symbol, transfer_to,
/// transfer_amount, method, refund_fee, refund_symbol, confirmations,
/// executed, successful, safe_tx_hash
pub fn export_history_csv(
    history: &OutgoingHistory,
    safe: Address,
    path: &str,
) -> Result<String, String> {
    let file = fs::File::create(path).map_err(|e| format!("Failed to create file: {e}"))?;
    let mut wtr = csv::Writer::from_writer(file);

    wtr.write_record([
        "group",
        "nonce",
        "class",
        "to",
        "value_wei",
        "token_symbol",
        "transfer_to",
        "transfer_amount",
        "method",
        "refund_fee",
        "refund_symbol",
        "confirmations",
        "executed",
        "successful",
        "safe_tx_hash",
    ])
    .map_err(|e| format!("Failed to write CSV header: {e}"))?;

    let mut rows = 0usize;
    let groups = [
        ("outgoing", history.outgoing_for(safe)),
        ("cancel", history.cancel_for(safe)),
    ];
    for (group, txs) in groups {
        for tx in txs {
            let (transfer_to, transfer_amount, method) = decoded_columns(tx);
            wtr.write_record(&[
                group.to_string(),
                tx.record.nonce.map(|n| n.to_string()).unwrap_or_default(),
                tx.class.to_string(),
                format!("{:#x}", tx.record.to),
                tx.record.value.to_string(),
                tx.symbol.clone().unwrap_or_default(),
                transfer_to,
                transfer_amount,
                method,
                tx.refund_params
                    .as_ref()
                    .map(|r| r.fee.clone())
                    .unwrap_or_default(),
                tx.refund_params
                    .as_ref()
                    .map(|r| r.symbol.clone())
                    .unwrap_or_default(),
                tx.confirmations.len().to_string(),
                tx.record.is_executed.to_string(),
                tx.record
                    .is_successful
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
                tx.record
                    .safe_tx_hash
                    .map(|h| format!("{h:#x}"))
                    .unwrap_or_default(),
            ])
            .map_err(|e| format!("Failed to write CSV row: {e}"))?;
            rows += 1;
        }
    }

    wtr.flush().map_err(|e| format!("Failed to flush CSV: {e}"))?;

    Ok(format!("Exported {rows} transactions to {path}"))
}

/// Export a reconciled history to pretty-printed JSON.
pub fn export_history_json(
    history: &OutgoingHistory,
    safe: Address,
    path: &str,
) -> Result<String, String> {
    let json = serde_json::json!({
        "safe": format!("{safe:#x}"),
        "outgoing": history
            .outgoing_for(safe)
            .iter()
            .map(tx_json)
            .collect::<Vec<_>>(),
        "cancel": history
            .cancel_for(safe)
            .iter()
            .map(tx_json)
            .collect::<Vec<_>>(),
    });

    let formatted = serde_json::to_string_pretty(&json)
        .map_err(|e| format!("Failed to serialize JSON: {e}"))?;

    let mut file = fs::File::create(path).map_err(|e| format!("Failed to create file: {e}"))?;
    file.write_all(formatted.as_bytes())
        .map_err(|e| format!("Failed to write file: {e}"))?;

    Ok(format!("Exported history to {path}"))
}

fn tx_json(tx: &SafeTransaction) -> serde_json::Value {
    serde_json::json!({
        "nonce": tx.record.nonce,
        "class": tx.class.to_string(),
        "to": format!("{:#x}", tx.record.to),
        "value_wei": tx.record.value.to_string(),
        "token_symbol": tx.symbol,
        "token_decimals": tx.decimals,
        "decoded": decoded_json(&tx.decoded),
        "refund": tx.refund_params.as_ref().map(|r| serde_json::json!({
            "fee": r.fee,
            "symbol": r.symbol,
        })),
        "confirmations": tx
            .confirmations
            .iter()
            .map(|c| format!("{:#x}", c.owner))
            .collect::<Vec<_>>(),
        "executed": tx.record.is_executed,
        "successful": tx.record.is_successful,
        "safe_tx_hash": tx.record.safe_tx_hash.map(|h| format!("{h:#x}")),
        "execution_date": tx.record.execution_date.map(|d| d.to_rfc3339()),
        "creation": tx.record.creation,
    })
}

fn decoded_json(decoded: &ParamDecode) -> serde_json::Value {
    match decoded {
        ParamDecode::NotApplicable => serde_json::Value::Null,
        ParamDecode::Failed(err) => serde_json::json!({ "error": err.to_string() }),
        ParamDecode::Decoded(DecodedParams::Transfer { to, amount }) => serde_json::json!({
            "recipient": format!("{to:#x}"),
            "amount": amount.to_string(),
        }),
        ParamDecode::Decoded(DecodedParams::SettingsChange { method, params }) => {
            serde_json::json!({
                "method": method,
                "params": params.iter().map(|(name, value)| serde_json::json!({
                    "name": name,
                    "value": value,
                })).collect::<Vec<_>>(),
            })
        }
        ParamDecode::Decoded(DecodedParams::MultiSend(calls)) => serde_json::json!({
            "sub_calls": calls.iter().map(|c| serde_json::json!({
                "operation": c.operation,
                "to": format!("{:#x}", c.to),
                "value": c.value.to_string(),
                "data_len": c.data.len(),
            })).collect::<Vec<_>>(),
        }),
        ParamDecode::Decoded(DecodedParams::Custom { selector, data_len }) => {
            serde_json::json!({
                "selector": format_selector(selector),
                "data_len": data_len,
            })
        }
    }
}

fn decoded_columns(tx: &SafeTransaction) -> (String, String, String) {
    match tx.decoded.params() {
        Some(DecodedParams::Transfer { to, amount }) => {
            (format!("{to:#x}"), amount.to_string(), String::new())
        }
        Some(DecodedParams::SettingsChange { method, .. }) => {
            (String::new(), String::new(), method.clone())
        }
        Some(DecodedParams::MultiSend(calls)) => (
            String::new(),
            String::new(),
            format!("multiSend({} calls)", calls.len()),
        ),
        Some(DecodedParams::Custom { selector, .. }) => {
            (String::new(), String::new(), format_selector(selector))
        }
        None => (String::new(), String::new(), String::new()),
    }
}
