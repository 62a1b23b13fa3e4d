//! The rollup guest binary: wires configuration, storage, engine, and
//! router together and drives the host's finish loop forever.

use anyhow::Result;
use lcore_engine::Engine;
use lcore_node::rollup::{RollupClient, RollupRequest};
use lcore_node::router::Router;
use lcore_storage::Store;
use lcore_types::config::NodeConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

/// How often (in input indices) the statistics refresh runs. Maintenance
/// never changes logical state.
const MAINTENANCE_INTERVAL: u64 = 1024;

fn init_tracing() -> Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing_log::LogTracer::init()?;
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing()?;

    let config = NodeConfig::from_env();
    tracing::info!(rollup_url = %config.rollup_url, "starting attestation engine");

    let store = Store::open_in_memory()?;
    let engine = Engine::new(store, &config.engine);
    let mut router = Router::new(engine, config.router.clone());
    let client = RollupClient::new(&config.rollup_url)?;

    let mut accept = true;
    loop {
        let request = match client.finish(accept).await {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "finish round-trip failed; retrying");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                continue;
            }
        };

        accept = match request {
            RollupRequest::Advance { metadata, payload } => {
                let outcome =
                    router.handle_advance(&metadata.msg_sender, metadata.input_index, &payload);
                for report in &outcome.reports {
                    client.report(report).await?;
                }
                for notice in &outcome.notices {
                    client.notice(notice).await?;
                }
                if outcome.accept && metadata.input_index % MAINTENANCE_INTERVAL == 0 {
                    run_maintenance(router.engine_mut());
                }
                outcome.accept
            }
            RollupRequest::Inspect { payload } => {
                let report = router.handle_inspect(&payload);
                client.report(&report).await?;
                true
            }
        };
    }
}

fn run_maintenance(engine: &mut Engine) {
    let store = engine.store_mut();
    if let Err(e) = store.analyze() {
        tracing::warn!(error = %e, "analyze failed");
    }
    match store.integrity_check() {
        Ok(lines) if lines == ["ok"] => tracing::debug!("integrity check ok"),
        Ok(lines) => tracing::error!(?lines, "integrity check reported problems"),
        Err(e) => tracing::warn!(error = %e, "integrity check failed"),
    }
}
