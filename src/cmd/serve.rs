//! HTTP service command, `issueforge serve`.

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

use issueforge::config::{AppConfig, CliOverrides};
use issueforge::{logging, server};

pub async fn cmd_serve(
    config_path: Option<&Path>,
    overrides: CliOverrides,
    open: bool,
) -> Result<()> {
    let config = AppConfig::load(config_path, &overrides)?;
    logging::init(config.log_format);

    let (listener, local_addr) = server::bind(&config).await?;
    info!(address = %local_addr, dev_mode = config.dev_mode, "issueforge listening");
    println!(
        "{} http://{}",
        console::style("issueforge running at").bold().green(),
        local_addr
    );

    if open {
        let url = format!("http://localhost:{}", local_addr.port());
        tokio::spawn(async move {
            // Small delay so the server is accepting before the browser hits it
            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
            if let Err(e) = open::that(&url) {
                warn!(error = %e, "failed to open browser");
            }
        });
    }

    server::start_server(config, listener).await
}
