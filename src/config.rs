use alloy::primitives::Address;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "safe-scan", about = "Reconcile a Safe wallet's outgoing transaction history")]
pub struct Config {
    /// Safe wallet address to reconcile
    #[arg(short, long, env = "SAFE_ADDRESS")]
    pub safe: Address,

    /// Chain preset (ethereum, gnosis, arbitrum, polygon, sepolia)
    #[arg(long, default_value = "ethereum")]
    pub chain: String,

    /// RPC endpoint URL, overriding the chain preset
    #[arg(short, long)]
    pub rpc_url: Option<String>,

    /// Transaction service URL, overriding the chain preset
    #[arg(long)]
    pub tx_service_url: Option<String>,

    /// Seconds between fetch cycles; 0 runs a single cycle and exits
    #[arg(long, default_value = "30")]
    pub interval_secs: u64,

    /// Write the reconciled history to this CSV file after each cycle
    #[arg(long)]
    pub export_csv: Option<String>,

    /// Write the reconciled history to this JSON file after each cycle
    #[arg(long)]
    pub export_json: Option<String>,
}
