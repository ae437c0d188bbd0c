mod config;
mod data;
mod error;
mod utils;

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use chrono::Utc;
use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::data::cache::EtagCache;
use crate::data::export::{export_history_csv, export_history_json};
use crate::data::history::TransactionService;
use crate::data::provider::EthProvider;
use crate::data::tokens::KnownTokens;
use crate::data::types::{DecodedParams, OutgoingHistory, SafeTransaction};
use crate::data::{ChainCodeSource, ChainTokenSource, HistoryService};
use crate::utils::{format_u256_as_decimal, truncate_address, truncate_hash};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();

    // Resolve endpoints: chain preset first, explicit flags override
    let Some(mut chain) = data::chains::get_chain_config(&config.chain) else {
        return Err(eyre!(
            "unknown chain '{}', expected one of {:?}",
            config.chain,
            data::chains::supported_chains()
        ));
    };
    if let Some(rpc_url) = &config.rpc_url {
        chain.rpc_url = rpc_url.clone();
    }
    if let Some(tx_service_url) = &config.tx_service_url {
        chain.tx_service_url = tx_service_url.clone();
    }

    info!(chain = %chain.name, rpc = %chain.rpc_url, "connecting");
    let provider = Arc::new(EthProvider::connect(&chain.rpc_url).await?);
    if provider.chain_id() != chain.chain_id {
        warn!(
            expected = chain.chain_id,
            actual = provider.chain_id(),
            "RPC chain id differs from preset"
        );
    }

    let known_tokens = KnownTokens::defaults_for(provider.chain_id());
    let service = HistoryService::new(
        TransactionService::new(&chain.tx_service_url),
        ChainCodeSource::new(Arc::clone(&provider)),
        ChainTokenSource::new(Arc::clone(&provider)),
        chain.symbol.clone(),
    );

    let mut etags = EtagCache::new();
    let mut current: Option<OutgoingHistory> = None;

    loop {
        match service.load_outgoing(config.safe, &mut etags, &known_tokens).await {
            Some(history) => {
                print_summary(&history, config.safe);
                run_exports(&config, &history);
                current = Some(history);
            }
            None => {
                // keep showing the previous result; nothing changed remotely
                let held = current
                    .as_ref()
                    .map(|h| h.outgoing_for(config.safe).len())
                    .unwrap_or(0);
                info!(outgoing = held, "history unchanged");
            }
        }

        if config.interval_secs == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_secs(config.interval_secs)).await;
    }

    Ok(())
}

fn print_summary(history: &OutgoingHistory, safe: Address) {
    let outgoing = history.outgoing_for(safe);
    let cancel = history.cancel_for(safe);
    println!(
        "\n[{}] {}: {} outgoing, {} cancellations",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        truncate_address(&safe),
        outgoing.len(),
        cancel.len()
    );

    for tx in outgoing {
        println!("  {}", describe(tx));
    }
    if !cancel.is_empty() {
        println!("  cancellations:");
        for tx in cancel {
            println!("  {}", describe(tx));
        }
    }
}

fn describe(tx: &SafeTransaction) -> String {
    if tx.record.creation {
        return "#-    creation".to_string();
    }

    let nonce = tx
        .record
        .nonce
        .map(|n| n.to_string())
        .unwrap_or_else(|| "-".to_string());
    let class = tx.class.to_string();
    let mut line = format!(
        "#{nonce:<4} {class:<16} to {}",
        truncate_address(&tx.record.to)
    );

    match (tx.decoded.params(), tx.symbol.as_deref(), tx.decimals) {
        (Some(DecodedParams::Transfer { to, amount }), Some(symbol), Some(decimals)) => {
            line.push_str(&format!(
                " {} {symbol} -> {}",
                format_u256_as_decimal(*amount, decimals),
                truncate_address(to)
            ));
        }
        (Some(DecodedParams::SettingsChange { method, .. }), _, _) => {
            line.push_str(&format!(" {method}"));
        }
        _ => {}
    }

    if !tx.record.value.is_zero() {
        line.push_str(&format!(
            " value {}",
            format_u256_as_decimal(tx.record.value, 18)
        ));
    }
    if let Some(refund) = &tx.refund_params {
        line.push_str(&format!(" refund {} {}", refund.fee, refund.symbol));
    }
    if let Some(hash) = &tx.record.safe_tx_hash {
        line.push_str(&format!(" [{}]", truncate_hash(hash)));
    }
    line
}

fn run_exports(config: &Config, history: &OutgoingHistory) {
    if let Some(path) = &config.export_csv {
        match export_history_csv(history, config.safe, path) {
            Ok(message) => info!("{message}"),
            Err(message) => warn!("{message}"),
        }
    }
    if let Some(path) = &config.export_json {
        match export_history_json(history, config.safe, path) {
            Ok(message) => info!("{message}"),
            Err(message) => warn!("{message}"),
        }
    }
}
