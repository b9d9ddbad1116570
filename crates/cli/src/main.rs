use clap::{Parser, Subcommand};
use std::path::PathBuf;

use lib::agent::{ChatAgent, Speaker};
use lib::modes::ChatMode;

#[derive(Parser)]
#[command(name = "chatbridge")]
#[command(about = "Chat bot bridging a OneBot gateway to an AI command-line tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the setup wizard (gateway URL, token, admin QQ, prompt) and save the config.
    Init {
        /// Config file path (default: CHATBRIDGE_CONFIG_PATH or ~/.chatbridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Connect to the gateway and answer `:`-prefixed chat messages. Runs the wizard first when
    /// no ws_url is configured.
    Run {
        /// Config file path (default: CHATBRIDGE_CONFIG_PATH or ~/.chatbridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Run the setup wizard even if a config exists.
        #[arg(long)]
        reconfigure: bool,
    },

    /// Chat with the agent locally (interactive, no gateway connection).
    Chat {
        /// Config file path (default: CHATBRIDGE_CONFIG_PATH or ~/.chatbridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// History key to chat as.
        #[arg(long, value_name = "KEY", default_value = "local")]
        user: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("chatbridge {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config, reconfigure }) => {
            if let Err(e) = run_bot(config, reconfigure).await {
                log::error!("bot failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config, user }) => {
            if let Err(e) = run_chat(config, user).await {
                log::error!("chat failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    lib::init::setup_interactive(&path, config)?;
    println!("configuration saved to {}", path.display());
    Ok(())
}

async fn run_bot(config_path: Option<PathBuf>, reconfigure: bool) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if reconfigure || config.ws_url().is_none() {
        config = lib::init::setup_interactive(&path, config)?;
    } else {
        log::info!("loaded config from {}", path.display());
    }
    lib::bot::run_bot(config, path).await
}

async fn run_chat(config_path: Option<PathBuf>, user: String) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let (config, path) = lib::config::load_config(config_path)?;
    let agent = ChatAgent::from_config(&config, &path)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    println!("chatting as {} (/mode <name>, /clear, /quit)", user);

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        if input.eq_ignore_ascii_case("/clear") {
            agent.clear_history(&user).await;
            println!("history cleared");
            continue;
        }
        if let Some(name) = input.strip_prefix("/mode") {
            if name.trim().is_empty() {
                for mode in ChatMode::ALL {
                    println!("  {} - {}", mode, mode.description());
                }
                println!("current: {}", agent.mode(&user));
                continue;
            }
            match agent.modes().set_named(&user, name) {
                Ok(mode) => println!("mode set to {} ({})", mode, mode.description()),
                Err(e) => eprintln!("{}", e),
            }
            continue;
        }

        let reply = agent.reply(&user, input, Speaker::User).await;
        println!("< {}", reply.trim());
    }

    agent.gateway().shutdown();
    Ok(())
}
