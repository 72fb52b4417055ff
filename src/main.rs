mod cli;

use anyhow::{Error, Result};
use clap::Parser;
use cli::{command, Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    ooi_m2m::logging::init(cli.verbose);

    let result = match &cli.command {
        Commands::Files(request) => {
            let config = command::make_config(&cli, Some(request));
            command::files(&config, request).await
        }
        Commands::Fetch {
            request,
            output,
            output_dir,
        } => {
            let config = command::make_config(&cli, Some(request));
            command::fetch(&config, request, output.clone(), output_dir.clone()).await
        }
        listing => {
            let config = command::make_config(&cli, None);
            command::inventory(&config, listing).await
        }
    };

    match result {
        Ok(message) => println!("{}", message),
        Err(e) => eprintln!("Error: {}", e),
    }

    Ok(())
}
