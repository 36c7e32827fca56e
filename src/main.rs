mod config;
mod link;
mod logging;
mod naming;
mod paths;
mod repository;
mod server;
mod store;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();
    server::run().await
}
