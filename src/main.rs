use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use emojibot::config::Config;
use emojibot::state::AppState;

/// Emoji catalog bot: browse a public emoji catalog and manage server emojis.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Port for the interactions endpoint [env: PORT]
    #[arg(long)]
    port: Option<u16>,
    /// Global settings document [env: EMOJIBOT_CONFIG]
    #[arg(long)]
    config: Option<PathBuf>,
    /// Per-server settings document [env: EMOJIBOT_SETTINGS]
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Adult keyword list [env: EMOJIBOT_KEYWORDS]
    #[arg(long)]
    keywords: Option<PathBuf>,
    /// Where server backups are written [env: EMOJIBOT_BACKUP_DIR]
    #[arg(long)]
    backup_dir: Option<PathBuf>,
    /// Base URL of the chat platform [env: ACCORD_URL]
    #[arg(long)]
    platform_url: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(path) = self.config {
            config.config_path = path;
        }
        if let Some(path) = self.settings {
            config.settings_path = path;
        }
        if let Some(path) = self.keywords {
            config.keywords_path = path;
        }
        if let Some(path) = self.backup_dir {
            config.backup_dir = path;
        }
        if let Some(url) = self.platform_url {
            config.platform_url = url;
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "emojibot=debug,tower_http=info".into()),
        )
        .init();

    let mut config = Config::from_env();
    Cli::parse().apply(&mut config);
    print_banner(&config);

    if config.bot_token.is_none() {
        tracing::warn!("BOT_TOKEN is not set; platform requests will be unauthenticated");
    }

    if let Err(e) = tokio::fs::create_dir_all(&config.backup_dir).await {
        tracing::error!("failed to create backup directory {:?}: {:?}", config.backup_dir, e);
    }

    let state = AppState::from_config(&config);

    // Forget idle rate-limit buckets so the map does not grow without bound.
    let limiter = state.rate_limits.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            limiter.prune();
        }
    });

    let app = emojibot::routes::router(state);

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .expect("failed to bind");

    let actual_port = listener
        .local_addr()
        .expect("failed to get local address")
        .port();
    eprintln!("  \x1b[32m→ listening on 0.0.0.0:{actual_port}\x1b[0m");
    eprintln!();

    axum::serve(listener, app).await.expect("server error");
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");

    eprintln!();
    eprintln!("  \x1b[1;36memojibot\x1b[0m \x1b[2mv{version}\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mport\x1b[0m         {}", config.port);
    eprintln!("  \x1b[2mplatform\x1b[0m     {}", config.platform_url);
    eprintln!("  \x1b[2mconfig\x1b[0m       {}", config.config_path.display());
    eprintln!("  \x1b[2msettings\x1b[0m     {}", config.settings_path.display());
    eprintln!("  \x1b[2mbackups\x1b[0m      {}", config.backup_dir.display());
    eprintln!();
}
