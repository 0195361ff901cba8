use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use callrelay_core::config::{Config, LoggingConfig};
use callrelay_core::session_store::InMemorySessionStore;
use callrelay_core::types::Message;
use callrelay_gateway::{ConversationRelay, GatewayState, RelaySettings};
use callrelay_providers::CompletionRequest;

#[derive(Parser)]
#[command(
    name = "callrelay",
    about = "AI phone receptionist: relays Twilio speech turns to a chat model and answers with TwiML",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server
    Serve {
        /// Port to listen on (default: PORT env var, then 4000)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Send one message through the configured model and print the reply
    Chat {
        /// Message to send
        #[arg(short, long)]
        message: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show system status
    Status,

    /// Diagnose common issues
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value (dotted path, e.g. voice.greeting)
    Get { key: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let dotenv = dotenvy::dotenv();

    // Load config
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    let mut config = Config::load(&config_path)?;
    config.apply_env_overrides()?;

    init_logging(config.logging.as_ref(), cli.verbose)?;
    if let Some(warning) = dotenv_warning(&dotenv) {
        tracing::warn!("{warning}");
    }

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.set_port(port);
            }

            let (warnings, errors) = config.validate();
            for warning in &warnings {
                tracing::warn!("{warning}");
            }
            if !errors.is_empty() {
                for error in &errors {
                    tracing::error!("{error}");
                }
                anyhow::bail!("Refusing to start with {} config error(s)", errors.len());
            }

            serve(config).await?;
        }
        Commands::Chat { message } => {
            let (provider, credentials) = callrelay_providers::from_config(&config)?;
            let request = CompletionRequest {
                model: config.model(),
                messages: vec![Message::system(config.system_prompt()), Message::user(message)],
                max_tokens: config.max_tokens(),
                temperature: Some(config.temperature()),
            };
            let completion = provider.complete(&request, &credentials).await?;
            println!("{}", completion.text);
            if let Some(usage) = completion.usage {
                tracing::debug!(
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "Completion usage"
                );
            }
        }
        Commands::Status => {
            let provider = config.provider();
            println!("callrelay v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Listen: {}:{}", config.bind_addr(), config.port());
            println!("Provider: {}", provider.effective_id());
            println!("Model: {}", config.model());
            println!(
                "API key: {}",
                if provider.resolve_api_key().is_some() { "configured" } else { "missing" }
            );
            println!("History cap: {} messages", config.max_messages());
        }
        Commands::Doctor => doctor(&config, &config_path).await,
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&redacted(&config))?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match redacted(&config).get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("Config key not set: {key}"),
            },
        },
    }

    Ok(())
}

/// Build the relay from config and run the gateway until Ctrl-C.
async fn serve(config: Config) -> anyhow::Result<()> {
    let port = config.port();
    let (provider, credentials) = callrelay_providers::from_config(&config)?;
    tracing::info!(provider = provider.id(), model = %config.model(), "Using chat provider");

    let sessions = Arc::new(InMemorySessionStore::new(
        config.system_prompt(),
        config.max_messages(),
    ));
    let relay = ConversationRelay::new(
        RelaySettings::from_config(&config),
        sessions,
        provider,
        credentials,
    );

    let state = GatewayState::new(Arc::new(config), relay);

    #[cfg(feature = "metrics")]
    let state = {
        let handle = callrelay_gateway::metrics::install_prometheus_recorder()?;
        tracing::info!("Prometheus metrics enabled at /metrics");
        state.with_prometheus(handle)
    };

    callrelay_gateway::start_gateway(Arc::new(state), port).await
}

async fn doctor(config: &Config, config_path: &std::path::Path) {
    println!("callrelay doctor");
    if config_path.exists() {
        println!("  [ok]   config file {}", config_path.display());
    } else {
        println!("  [info] no config file at {}, using defaults", config_path.display());
    }

    let (warnings, errors) = config.validate();
    for warning in &warnings {
        println!("  [warn] {warning}");
    }
    for error in &errors {
        println!("  [fail] {error}");
    }

    match callrelay_providers::from_config(config) {
        Ok((provider, credentials)) => match provider.list_models(&credentials).await {
            Ok(models) => {
                let has_model = models.iter().any(|m| m.id == config.model());
                println!("  [ok]   {} reachable, {} models listed", provider.id(), models.len());
                if !has_model {
                    println!("  [warn] model '{}' not in provider's model list", config.model());
                }
            }
            Err(e) => println!("  [fail] {} unreachable: {e}", provider.id()),
        },
        Err(e) => println!("  [fail] cannot build provider: {e}"),
    }

    if errors.is_empty() {
        println!("No blocking problems found.");
    }
}

/// A missing `.env` is normal; anything else is worth reporting.
fn dotenv_warning<T>(result: &dotenvy::Result<T>) -> Option<String> {
    match result {
        Err(e) if !e.not_found() => Some(format!("Ignoring unreadable .env file: {e}")),
        _ => None,
    }
}

/// Copy of the config with direct secrets masked, for printing.
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    if let Some(provider) = config.provider.as_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some("********".into());
        }
    }
    config
}

/// Initialize tracing. `RUST_LOG` wins over the configured level.
fn init_logging(logging: Option<&LoggingConfig>, verbose: bool) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = logging
                .and_then(|l| l.level.as_deref())
                .unwrap_or(default_level);
            let mut directives = vec![level.to_string()];
            if let Some(logging) = logging {
                directives.extend(logging.filters.iter().cloned());
            }
            EnvFilter::try_new(directives.join(","))?
        }
    };

    let json = logging.is_some_and(|l| l.format == "json");
    let stdout = logging.is_some_and(|l| l.output == "stdout");
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match (json, stdout) {
        (true, true) => builder.json().with_writer(std::io::stdout).init(),
        (true, false) => builder.json().with_writer(std::io::stderr).init(),
        (false, true) => builder.with_writer(std::io::stdout).init(),
        (false, false) => builder.with_writer(std::io::stderr).init(),
    }

    Ok(())
}
