use clap::{Parser, ValueEnum};
use rowstream::{run, CliResult, Command};
use rowstream_common::ConnectionConfig;
use rowstream_connector_memory::MemoryDatabase;
use rowstream_connector_mysql::MySqlSource;
use rowstream_stream::ConnectionProvider;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML file with host, port, user, password and name keys. DB_* variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Backend::Mysql)]
    backend: Backend,

    /// CSV file loaded into the memory backend before the command runs.
    #[arg(long)]
    seed: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    Memory,
    Mysql,
}

#[tokio::main]
async fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ConnectionConfig::load(args.config.as_deref())?;
    info!(server = %config.display_target(), backend = ?args.backend, "starting");

    let mut stdout = std::io::stdout().lock();
    match args.backend {
        Backend::Memory => {
            let provider = ConnectionProvider::new(MemoryDatabase::new(&config).source(&config));
            if let Some(csv) = args.seed {
                run(provider.clone(), Command::Seed { csv }, &mut std::io::sink()).await?;
            }
            run(provider, args.command, &mut stdout).await
        }
        Backend::Mysql => {
            if args.seed.is_some() {
                return Err("--seed only applies to the memory backend; use the seed command instead".into());
            }
            run(ConnectionProvider::new(MySqlSource::new(config)), args.command, &mut stdout).await
        }
    }
}
