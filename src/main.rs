use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    autoheal_cli::cli::run().await
}
