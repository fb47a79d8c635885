// src/main.rs
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenv::dotenv;
use ethers::providers::{Http, Provider};
use ethers::types::Address;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

mod account;
mod bundler;
mod constants;
mod contracts;
mod error;
mod rpc;
mod scenario;
mod types;

use crate::account::{ProofSubmitterAccount, SmartAccount};
use crate::bundler::BundlerClient;
use crate::constants::{
    DEFAULT_BUNDLER_URL, DEFAULT_ETH_RPC_URL, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_RECEIPT_TIMEOUT_SECS, HOLESKY_CHAIN_ID, PROOF_SUBMITTER_ACCOUNT,
};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Send a ProofSubmitter user operation through an ERC-4337 bundler", long_about = None)]
struct Args {
    /// Owner key of the smart account
    #[clap(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    #[clap(long, env = "PIMLICO_API_KEY", hide_env_values = true)]
    pimlico_api_key: String,

    #[clap(short, long, default_value = DEFAULT_ETH_RPC_URL)]
    eth_rpc_url: String,

    #[clap(short, long, default_value = DEFAULT_BUNDLER_URL)]
    bundler_url: String,

    #[clap(short, long, default_value_t = HOLESKY_CHAIN_ID)]
    chain_id: u64,

    #[clap(short, long, default_value = PROOF_SUBMITTER_ACCOUNT)]
    account_address: Address,

    #[clap(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    poll_interval_ms: u64,

    #[clap(long, default_value_t = DEFAULT_RECEIPT_TIMEOUT_SECS)]
    receipt_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command line arguments
    let args = Args::parse();

    if let Err(err) = run(args).await {
        error!("{:?}", err);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    // Create Ethereum client
    let provider = Arc::new(Provider::<Http>::try_from(args.eth_rpc_url.as_str())?);

    let account = ProofSubmitterAccount::new(
        &args.private_key,
        args.account_address,
        args.chain_id,
        provider.clone(),
    )?;

    // Create the bundler client against the relay
    let bundler_url = format!("{}?apikey={}", args.bundler_url, args.pimlico_api_key);
    let bundler = BundlerClient::new(account, provider.clone(), &bundler_url)?
        .with_poll_interval(Duration::from_millis(args.poll_interval_ms))
        .with_timeout(Duration::from_secs(args.receipt_timeout_secs));

    // Sanity checks against the relay; failures here only warn
    bundler.check_relay().await;

    let call = scenario::proof_submission_call(provider)?;
    info!(
        "Sending user operation from {} (owner {}) to {}",
        bundler.account().address().await?,
        bundler.account().owner(),
        call.to
    );

    // Submit and wait for inclusion
    let hash = bundler.send_user_operation(&[call]).await?;
    let receipt = bundler.wait_for_user_operation_receipt(hash).await?;

    println!("{}", serde_json::to_string_pretty(&receipt)?);
    info!("Done.");

    Ok(())
}
