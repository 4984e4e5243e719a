use clap::Parser;
use timeflash_agent::{Cli, run};

#[tokio::main]
async fn main() -> Result<(), timeflash_agent::AppError> {
    run(Cli::parse()).await
}
