use clap::{Parser, Subcommand, ValueEnum};
use lib::bot::Bot;
use lib::channels::{Connection, SlackConnection, StdioConnection};

#[derive(Parser)]
#[command(name = "bosun")]
#[command(about = "Bosun chat-command bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the bot. On the terminal each stdin line is a message and replies go to stdout.
    Run {
        /// Config file path (default: BOSUN_CONFIG_PATH or ~/.bosun/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Bot name answered by `!who` (default from config or "Bosun")
        #[arg(long, short)]
        name: Option<String>,

        /// Chat service to connect to
        #[arg(long, value_enum, default_value_t = ConnectionKind::Stdio)]
        connection: ConnectionKind,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ConnectionKind {
    /// stdin/stdout
    Stdio,
    /// Slack RTM (token from SLACK_TOKEN or channels.slack.token)
    Slack,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("bosun {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Run {
            config,
            name,
            connection,
        }) => {
            tokio::select! {
                res = run_bot(config, name, connection) => {
                    if let Err(e) = res {
                        log::error!("bot failed: {:#}", e);
                        std::process::exit(1);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    log::info!("interrupt received, shutting down");
                }
            }
            // The stdin reader may still be parked on a blocking read.
            std::process::exit(0);
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_bot(
    config_path: Option<std::path::PathBuf>,
    name: Option<String>,
    kind: ConnectionKind,
) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    let name = name.unwrap_or_else(|| lib::config::resolve_bot_name(&config));

    let bot = Bot::new(name, config.bot.handler_timeout());
    bot.register_all(lib::plugins::standard_handlers(&config));

    let mut conn: Box<dyn Connection> = match kind {
        ConnectionKind::Stdio => Box::new(StdioConnection::new(
            bot.name(),
            config.bot.channel_capacity,
        )),
        ConnectionKind::Slack => Box::new(SlackConnection::from_config(&config)),
    };
    bot.run(conn.as_mut()).await?;
    Ok(())
}
