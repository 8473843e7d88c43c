//! CIRX Settlement Service
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌──────────────┐    ┌──────────┐
//! │  Store   │───▶│ Verification │───▶│   Transfer   │───▶│  Ledger  │
//! │ (PG/mem) │    │   (EVM RPC)  │    │   (signer)   │    │  (NAG)   │
//! └──────────┘    └──────────────┘    └──────────────┘    └──────────┘
//! ```
//!
//! Usage: `cirx_settlement [--env <name>] [--once]`

use anyhow::Context;
use std::sync::Arc;

use cirx_settlement::config::{AppConfig, LedgerConfig};
use cirx_settlement::logging::init_logging;
use cirx_settlement::protocol::{LedgerSigner, ProtocolClient};
use cirx_settlement::services::{EvmPaymentVerifier, LedgerTransferService, TieredPricing};
use cirx_settlement::swap::{InMemoryTransactionStore, PgTransactionStore, TransactionStore};
use cirx_settlement::worker::{
    CirxTransferWorker, PaymentVerificationWorker, SettlementScheduler, TransactionMonitor,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn run_once() -> bool {
    std::env::args().any(|a| a == "--once")
}

/// Settlement wallet signer from the configured environment variables.
/// The raw private key wins over the seed phrase.
fn load_signer(config: &LedgerConfig) -> anyhow::Result<Option<LedgerSigner>> {
    if let Ok(key) = std::env::var(&config.private_key_env) {
        let signer = LedgerSigner::from_private_key_hex(&key)
            .with_context(|| format!("invalid key in {}", config.private_key_env))?;
        return Ok(Some(signer));
    }
    if let Ok(seed) = std::env::var(&config.seed_phrase_env) {
        let signer = LedgerSigner::from_seed_phrase(&seed)
            .with_context(|| format!("invalid seed phrase in {}", config.seed_phrase_env))?;
        return Ok(Some(signer));
    }
    Ok(None)
}

async fn connect_store(config: &AppConfig) -> anyhow::Result<Arc<dyn TransactionStore>> {
    match &config.postgres_url {
        Some(url) => {
            let store = PgTransactionStore::connect(url)
                .await
                .context("failed to connect to PostgreSQL")?;
            tracing::info!("Using PostgreSQL record store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("postgres_url not set, records are kept in memory only");
            Ok(Arc::new(InMemoryTransactionStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env).context("failed to load configuration")?;
    let _log_guard = init_logging(&app_config);

    tracing::info!("Starting CIRX settlement in {} mode", env);

    let store = connect_store(&app_config).await?;

    let signer = load_signer(&app_config.ledger)?;
    match &signer {
        Some(s) => tracing::info!(wallet = %s.wallet_address(), "Settlement wallet loaded"),
        None => tracing::warn!("No settlement wallet configured, transfers will fail"),
    }

    let wallet_configured = signer.is_some();
    let client = Arc::new(ProtocolClient::new(
        app_config.ledger.gateway_url(),
        app_config.ledger.blockchain_id(),
        app_config.ledger.timeout(),
        signer,
    )?);
    let pricing = Arc::new(TieredPricing::new(&app_config.pricing));
    let transfer_service = Arc::new(LedgerTransferService::new(client, pricing));
    let verifier = Arc::new(EvmPaymentVerifier::new(
        &app_config.chains,
        app_config.verification.call_timeout(),
    )?);

    let verification_worker = Arc::new(PaymentVerificationWorker::new(
        store.clone(),
        verifier,
        &app_config.verification,
    ));
    let transfer_worker = Arc::new(CirxTransferWorker::new(
        store.clone(),
        transfer_service,
        &app_config.transfer,
    ));
    let monitor = Arc::new(TransactionMonitor::new(
        store,
        &app_config.monitor,
        wallet_configured,
    ));
    let scheduler = SettlementScheduler::new(
        verification_worker,
        transfer_worker,
        app_config.scheduler.clone(),
    )
    .with_monitor(monitor);

    if run_once() {
        let report = scheduler.tick().await;
        tracing::info!(report = %serde_json::to_string(&report)?, "Single tick finished");
        if !report.failures.is_empty() {
            anyhow::bail!("{} settlement passes failed", report.failures.len());
        }
        return Ok(());
    }

    scheduler.run().await
}
