use anyhow::Result;
use clap::Parser;
use tau_mcp_proxy::{init_tracing, run_cli, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.into(), cli.log_file.as_deref())?;
    let exit_code = run_cli(cli).await?;
    // Blocking stdin reads cannot be cancelled, so skip runtime teardown.
    std::process::exit(exit_code);
}
