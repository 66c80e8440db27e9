//! ImProof vault browser: entry point.
//!
//! Resolves the network the user would see, lists the connected wallet's
//! vaults (or every vault when no wallet is configured) and prints the vault
//! view-models as JSON for the presentation layer.

use std::sync::Arc;

use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vault_engine::ledger::rpc::RpcLedger;
use vault_engine::{ChainRegistry, Config, Ledger, NetworkView, VaultDirectory, VaultView};

#[derive(Serialize)]
struct Listing {
    network: NetworkView,
    supported: bool,
    vaults: Vec<VaultView>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;
    let ledger: Arc<dyn Ledger> = Arc::new(RpcLedger::new(client, &config));

    // A connected wallet reports its own network; fall back to the node's.
    let connected = match (config.wallet_address, config.wallet_chain_id) {
        (None, _) => None,
        (Some(_), Some(chain)) => Some(chain),
        (Some(_), None) => match ledger.chain_id().await {
            Ok(chain) => Some(chain),
            Err(e) => {
                warn!("Could not read chain id, using target network: {e}");
                None
            }
        },
    };
    let network = ChainRegistry::builtin().resolve(
        connected,
        config.target_chain_id,
        config.mock_token_address,
    );
    if !network.is_supported() {
        warn!("No stablecoins configured for network {}", network.network);
    }
    let labels: Vec<String> = network.stablecoins.iter().map(|d| d.label()).collect();
    info!("Network {}: {}", network.network, labels.join(", "));

    let directory = VaultDirectory::new(Arc::clone(&ledger), network.clone());
    let vaults = match config.wallet_address {
        Some(wallet) => directory.views_for_beneficiary(wallet, config.listing_timeout()).await?,
        None => directory.views_all(config.listing_timeout()).await?,
    };

    let listing = Listing {
        supported: network.is_supported(),
        network,
        vaults,
    };
    println!("{}", serde_json::to_string_pretty(&listing)?);

    Ok(())
}
