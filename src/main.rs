use pubsub_gateway::cli::{commands, Cli, Commands};
use pubsub_gateway::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Start(args) => {
            // The start command configures logging from its own config file
            let config = commands::load_config(&args)?;
            init_tracing(&config.logging);
            commands::start::execute(config).await?;
        }
        command => {
            init_tracing(&LoggingConfig::default());
            commands::execute_command(command).await?;
        }
    }

    Ok(())
}
