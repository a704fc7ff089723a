//! Claw client - headless feed follower
//!
//! Connects to the realtime endpoint, keeps the feed in sync and logs every
//! snapshot until interrupted.

use std::rc::Rc;

use anyhow::Context;
use claw_client::{log_info, logging, ApiClient, ClientConfig, FeedSession};
use tokio::task::LocalSet;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    logging::init("claw_client=debug");

    let config = ClientConfig::from_env();
    let api = ApiClient::new()
        .with_base_url(config.api_url.clone())
        .with_auth(config.auth_token.clone());

    LocalSet::new().run_until(run(config, api)).await
}

async fn run(config: ClientConfig, api: ApiClient) -> anyhow::Result<()> {
    let session = FeedSession::new(&config, Rc::new(api));

    let _subscription = session.subscribe(|snapshot| {
        log_info!("Feed updated: {} posts", snapshot.len());
        if let Some(newest) = snapshot.first() {
            let shown = newest.display();
            let posted = newest
                .created_at()
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "unknown time".to_string());
            log_info!("Newest: {} by {} at {}: {}", newest.id, shown.user, posted, shown.content);
        }
    });

    log_info!("Connecting to {}", config.ws_url);
    session.connect();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    log_info!("Shutting down");
    session.shutdown();
    Ok(())
}
