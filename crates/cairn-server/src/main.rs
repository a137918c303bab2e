//! Directory server binary.

use anyhow::Context;

use cairn_server::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    cairn_core::init_logging(config.log_format);
    cairn_store::metrics::describe();

    cairn_server::serve(config).await.context("server failed")?;
    Ok(())
}
