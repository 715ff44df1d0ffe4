use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "smsxmpp")]
#[command(about = "SMS <-> XMPP gateway component", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the gateway: HTTP webhook listener, XMPP component session, and the loop between them.
    Serve {
        /// Config file path (default: SMSXMPP_CONFIG_PATH or ~/.smsxmpp/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP webhook port (default from config or 9677)
        #[arg(long)]
        http_port: Option<u16>,

        /// XMPP component port (default from config or 5347)
        #[arg(long)]
        xmpp_port: Option<u16>,
    },

    /// Load and validate the configuration, then print what would run.
    Check {
        /// Config file path (default: SMSXMPP_CONFIG_PATH or ~/.smsxmpp/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("smsxmpp {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve {
            config,
            http_port,
            xmpp_port,
        }) => {
            if let Err(e) = run_serve(config, http_port, xmpp_port).await {
                log::error!("serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Check { config }) => {
            if let Err(e) = run_check(config) {
                log::error!("check failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    http_port: Option<u16>,
    xmpp_port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = http_port {
        config.http.port = p;
    }
    if let Some(p) = xmpp_port {
        config.xmpp.port = p;
    }
    log::info!("using config {}", path.display());
    lib::supervisor::run(config).await
}

fn run_check(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    config.validate()?;
    let provider = lib::sms::select_provider(&config)?;
    let auth = if config.http.basic_auth().is_some() {
        "basic auth"
    } else {
        "no auth"
    };

    println!("config:     {}", path.display());
    println!("component:  {}", config.xmpp.component_name.trim());
    println!("xmpp:       {}:{}", config.xmpp.host, config.xmpp.port);
    println!("http:       {}:{} ({})", config.http.host, config.http.port, auth);
    println!("provider:   {}", provider.name());
    println!("users:      {}", config.users.len());
    for (jid, phone) in &config.users {
        println!("  {} -> {}", jid, phone);
    }
    Ok(())
}
