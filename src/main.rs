use anyhow::Result;
use clap::Parser;
use tracing::error;

use dns_sniffer::cli::Cli;
use dns_sniffer::{logging, sniffer, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.debug);

    if cli.list_devices {
        sniffer::list_devices()?;
        return Ok(());
    }

    let config = Config::try_from(cli).inspect_err(|err| error!("{err}"))?;
    sniffer::run(config).await.inspect_err(|err| error!("{err}"))?;
    Ok(())
}
