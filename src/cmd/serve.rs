//! Server commands: `jobboard serve` and `jobboard init-db`.

use anyhow::Result;

use jobboard::config::JobboardConfig;
use jobboard::dashboard::server;

pub async fn cmd_serve(config: JobboardConfig) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }
    server::start_server(config).await
}

pub fn cmd_init_db(config: &JobboardConfig) -> Result<()> {
    server::open_store(config)?;
    println!(
        "Job database initialized at {}",
        config.server.db_path.display()
    );
    Ok(())
}
