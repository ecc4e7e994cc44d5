/// bin/barforge.rs — thin entry point, all logic lives in `cli::run`.
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    barforge::cli::run().await
}
