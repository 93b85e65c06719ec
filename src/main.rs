use anyhow::Result;
use clap::Parser;
use std::{process::ExitCode, sync::Arc};

use logproxy::{Args, TracingSink, logging, serve};

#[tokio::main]
async fn main() -> ExitCode {
    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = args.into_config().await?;
    logging::init(&config.log)?;
    serve(config, Arc::new(TracingSink)).await
}
