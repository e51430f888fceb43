use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use humantime_serde::re::humantime;

use xtftp::config::TftpConfig;
use xtftp::tftp::client::{
    ArgsSource, Client, ClientConfig, DEFAULT_MODE, DEFAULT_PORT, DEFAULT_TIMEOUT, Direction,
    PromptSource, RequestSource,
};

#[derive(Parser)]
#[command(name = "xtftp", version, about = "Lock-step TFTP client")]
struct Cli {
    /// Configuration file (defaults to ./xtftp.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a file from the server
    Get {
        /// File name on the server
        remote: String,
        /// Local path (defaults to the remote base name)
        local: Option<String>,
        #[command(flatten)]
        server: ServerArgs,
    },
    /// Upload a file to the server
    Put {
        /// Local file to send
        local: String,
        /// File name on the server (defaults to the local base name)
        remote: Option<String>,
        #[command(flatten)]
        server: ServerArgs,
    },
    /// Prompt for server, operation and file name
    Shell,
}

#[derive(Args, Default)]
struct ServerArgs {
    /// Server host name or IP address
    #[arg(short, long)]
    server: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Receive timeout per exchange, e.g. "5s" or "500ms"
    #[arg(short, long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Transfer mode
    #[arg(short, long)]
    mode: Option<String>,

    /// Wait for ACK 0 after a write request before sending data
    #[arg(long)]
    write_handshake: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let file = TftpConfig::discover(cli.config.as_deref())?.unwrap_or_default();

    let (mut source, overrides): (Box<dyn RequestSource>, ServerArgs) = match cli.command {
        Some(Commands::Get { remote, local, server }) => {
            let args = args_source(&file, &server, Direction::Get, remote, local)?;
            (Box::new(args), server)
        }
        Some(Commands::Put { local, remote, server }) => {
            let args = args_source(&file, &server, Direction::Put, local, remote)?;
            (Box::new(args), server)
        }
        Some(Commands::Shell) | None => {
            let prompt = PromptSource {
                default_host: file.server.clone(),
                default_port: file.port.unwrap_or(DEFAULT_PORT),
                default_mode: file.mode.clone().unwrap_or_else(|| DEFAULT_MODE.to_string()),
            };
            (Box::new(prompt), ServerArgs::default())
        }
    };

    let request = source.request()?;

    let config = ClientConfig::from_addr(request.server)
        .with_timeout(overrides.timeout.or(file.timeout).unwrap_or(DEFAULT_TIMEOUT))
        .with_mode(request.mode.clone())
        .with_write_handshake(overrides.write_handshake || file.write_handshake.unwrap_or(false));

    if !request.mode.eq_ignore_ascii_case(DEFAULT_MODE) {
        log::warn!("Mode '{}' is sent as given; data is not translated", request.mode);
    }
    log::info!("Server: {}, timeout: {:?}", request.server, config.timeout);

    Client::new(config)
        .run(&request)
        .with_context(|| format!("{} '{}' failed", request.direction, request.remote))?;

    Ok(())
}

fn args_source(
    file: &TftpConfig,
    server: &ServerArgs,
    direction: Direction,
    name: String,
    target: Option<String>,
) -> Result<ArgsSource> {
    let host = server
        .server
        .clone()
        .or_else(|| file.server.clone())
        .ok_or_else(|| anyhow!("Server not specified. Please use --server or the config file."))?;

    Ok(ArgsSource {
        host,
        port: server.port.or(file.port).unwrap_or(DEFAULT_PORT),
        direction,
        file: name,
        target,
        mode: server
            .mode
            .clone()
            .or_else(|| file.mode.clone())
            .unwrap_or_else(|| DEFAULT_MODE.to_string()),
    })
}
