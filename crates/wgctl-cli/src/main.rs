#![deny(unsafe_code)]

//! `wgctl`: control-plane client for WireGuard-style tunnel interfaces.

mod render;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroize;

use wgctl_config::AppConfig;
use wgctl_core::resolver::SystemResolver;
use wgctl_core::{ClientError, Configuration, ControlClient, InterfaceState, PrivateKey};

static LONG_VERSION: LazyLock<String> = LazyLock::new(wgctl_core::build_info::long_version);

/// Query and configure tunnel interfaces over their UAPI control socket.
#[derive(Parser)]
#[command(name = "wgctl", version, long_version = LONG_VERSION.as_str(), about, long_about = None)]
struct Cli {
    /// Path to configuration file. Defaults apply when it does not exist.
    #[arg(short, long, default_value = "wgctl.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the state of one interface, or of every discoverable interface.
    Show {
        interface: Option<String>,

        /// Print JSON instead of the text summary.
        #[arg(long)]
        json: bool,
    },

    /// List interfaces with a reachable control endpoint.
    Interfaces,

    /// Apply a TOML configuration file to an interface.
    Setconf { interface: String, file: PathBuf },

    /// Show or set the engine's DNS monitor interval.
    Dns {
        interface: String,

        /// New interval in seconds (at least 10). Omit to show the current one.
        seconds: Option<u64>,
    },

    /// Read a base64 private key on stdin and print its public key.
    Pubkey,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.logging.level, cli.verbose);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            if let Some(hint) = e.downcast_ref::<ClientError>().and_then(ClientError::hint) {
                eprintln!("hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; otherwise `-v` raises the configured level.
fn init_tracing(configured: &str, verbose: u8) {
    let level = match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    match cli.command {
        Commands::Show { interface, json } => cmd_show(&client(&config), interface, json).await,
        Commands::Interfaces => cmd_interfaces(&client(&config)).await,
        Commands::Setconf { interface, file } => {
            cmd_setconf(&client(&config), &interface, &file).await
        }
        Commands::Dns { interface, seconds } => {
            cmd_dns(&client(&config), &interface, seconds).await
        }
        Commands::Pubkey => cmd_pubkey().await,
        Commands::Config { show } => cmd_config(&cli.config, &config, show),
    }
}

fn client(config: &AppConfig) -> ControlClient {
    let resolver = SystemResolver::new(Duration::from_secs(config.monitor.resolve_timeout_secs));
    ControlClient::from_config(&config.transport).with_resolver(Arc::new(resolver))
}

async fn cmd_show(client: &ControlClient, interface: Option<String>, json: bool) -> Result<()> {
    print!("{}", show_report(client, interface, json).await?);
    Ok(())
}

/// A named interface must answer. When every discovered interface is shown,
/// one that fails is reported in place and the rest are still listed.
async fn show_report(
    client: &ControlClient,
    interface: Option<String>,
    json: bool,
) -> Result<String> {
    let named = interface.is_some();
    let mut outcomes: Vec<(String, Result<InterfaceState, ClientError>)> = Vec::new();
    match interface {
        Some(name) => {
            let state = client.query(&name).await?;
            outcomes.push((name, Ok(state)));
        }
        None => {
            for name in client.discover().await? {
                let result = client.query(&name).await;
                if let Err(e) = &result {
                    warn!(interface = %name, error = %e, "interface did not answer");
                }
                outcomes.push((name, result));
            }
        }
    }

    if json {
        let states: Vec<&InterfaceState> =
            outcomes.iter().filter_map(|(_, r)| r.as_ref().ok()).collect();
        let text = match (named, states.as_slice()) {
            (true, [single]) => serde_json::to_string_pretty(single)?,
            _ => serde_json::to_string_pretty(&states)?,
        };
        return Ok(format!("{text}\n"));
    }

    let now = SystemTime::now();
    let blocks: Vec<String> = outcomes
        .iter()
        .map(|(name, result)| match result {
            Ok(state) => render::render_interface(state, now),
            Err(e) => render::render_failure(name, e),
        })
        .collect();
    Ok(blocks.join("\n"))
}

async fn cmd_interfaces(client: &ControlClient) -> Result<()> {
    for name in client.discover().await? {
        println!("{name}");
    }
    Ok(())
}

async fn cmd_setconf(client: &ControlClient, interface: &str, file: &Path) -> Result<()> {
    let mut text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let parsed: Result<Configuration, _> = toml::from_str(&text);
    text.zeroize();
    let config = parsed.with_context(|| format!("parsing {}", file.display()))?;

    debug!(interface, peers = config.peers.len(), "applying configuration");
    client.apply(interface, &config).await?;
    info!(interface, "configuration applied");
    Ok(())
}

async fn cmd_dns(client: &ControlClient, interface: &str, seconds: Option<u64>) -> Result<()> {
    if let Some(secs) = seconds {
        client.set_dns_interval(interface, secs).await?;
        println!("{interface}: dns monitor interval set to {secs}s");
        return Ok(());
    }

    let state = client.query(interface).await?;
    match state.dns_monitor_interval {
        Some(secs) => println!(
            "{interface}: dns monitor every {secs}s, {} peer(s) tracked",
            state.dns_monitored_peers.unwrap_or(0)
        ),
        None => println!("{interface}: engine does not report a dns monitor"),
    }
    Ok(())
}

async fn cmd_pubkey() -> Result<()> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("reading private key from stdin")?;
    let key = PrivateKey::from_base64(&input);
    input.zeroize();
    println!("{}", key.context("invalid private key")?.public_key());
    Ok(())
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("serializing configuration")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))
    } else {
        debug!(path = %path.display(), "config file not found, using defaults");
        Ok(AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_dns_set() {
        let cli = Cli::try_parse_from(["wgctl", "dns", "wg0", "30"]).unwrap();
        match cli.command {
            Commands::Dns { interface, seconds } => {
                assert_eq!(interface, "wg0");
                assert_eq!(seconds, Some(30));
            }
            _ => panic!("expected dns command"),
        }
    }

    #[test]
    fn test_parse_show_json_without_interface() {
        let cli = Cli::try_parse_from(["wgctl", "-vv", "show", "--json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Show { interface: None, json: true }));
    }

    #[tokio::test]
    async fn test_missing_config_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).await.unwrap();
        assert_eq!(config.monitor.interval_secs, 60);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_show_against_fake_engine() {
        let server = wgctl_test_utils::uapi_server::FakeUapiServer::start(
            "wg0",
            vec!["listen_port=51820\nerrno=0\n\n".to_string()],
        )
        .await;
        let client = ControlClient::new(server.transport());
        let text = show_report(&client, Some("wg0".to_string()), true).await.unwrap();
        assert!(text.contains("\"listen_port\": 51820"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_show_all_survives_stale_socket() {
        let ok = "listen_port=51820\nerrno=0\n\n".to_string();
        let server =
            wgctl_test_utils::uapi_server::FakeUapiServer::start("wg0", vec![ok.clone(), ok]).await;
        let transport = server.transport();
        // A socket file whose listener is gone.
        drop(std::os::unix::net::UnixListener::bind(transport.describe("wg1")).unwrap());
        let client = ControlClient::new(transport);

        let text = show_report(&client, None, false).await.unwrap();
        assert!(text.starts_with("interface: wg0\n"));
        assert!(text.contains("listening port: 51820"));
        assert!(text.contains("interface: wg1 (error: "));

        let json = show_report(&client, None, true).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_array().map(Vec::len), Some(1));

        let err = show_report(&client, Some("wg1".to_string()), false)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<ClientError>().and_then(ClientError::hint).is_some());
    }
}
