//! lectern server binary.
//!
//! Configuration comes from an optional TOML file (`--config`, default
//! `config.toml`) with `LECTERN_*` environment variables layered on top.
//!
//! ```text
//! server --create-user radha      # password read from stdin
//! server --hash-password          # print a PHC string and exit
//! server                          # serve the API and the audio proxy
//! ```

use std::{
  io::{self, BufRead as _, Write as _},
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use lectern_core::store::LectureStore;
use lectern_server::{AppState, ServerConfig, auth::hash_password, router};
use lectern_store_sqlite::SqliteStore;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

#[derive(Parser)]
#[command(author, version, about = "Lectern audio lecture server")]
struct Cli {
  /// TOML configuration file; missing is fine when env vars cover it.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Hash a password read from stdin, print it and exit.
  #[arg(long, conflicts_with = "create_user")]
  hash_password: bool,

  /// Create a listener account (password read from stdin) and exit.
  #[arg(long, value_name = "USERNAME")]
  create_user: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let filter = EnvFilter::builder()
    .with_default_directive(LevelFilter::INFO.into())
    .from_env_lossy();
  tracing_subscriber::fmt().with_env_filter(filter).init();

  let cli = Cli::parse();

  if cli.hash_password {
    println!("{}", hash_password(&prompt_password()?)?);
    return Ok(());
  }

  let cfg = load_config(cli.config)?;
  let db_path = home_relative(&cfg.store_path);
  let store = SqliteStore::open(&db_path)
    .await
    .with_context(|| format!("cannot open database {}", db_path.display()))?;

  if let Some(username) = cli.create_user {
    return create_user(&store, username).await;
  }

  let bind = format!("{}:{}", cfg.host, cfg.port);
  let state = AppState::new(Arc::new(store), cfg).context("cannot build audio http client")?;

  let listener = tokio::net::TcpListener::bind(&bind)
    .await
    .with_context(|| format!("cannot listen on {bind}"))?;
  tracing::info!(%bind, "lectern listening");

  axum::serve(listener, router(state)).await.context("http server stopped")
}

fn load_config(path: PathBuf) -> anyhow::Result<ServerConfig> {
  config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(config::Environment::with_prefix("LECTERN"))
    .build()
    .context("cannot read configuration")?
    .try_deserialize()
    .context("invalid configuration")
}

async fn create_user(store: &SqliteStore, username: String) -> anyhow::Result<()> {
  let password = prompt_password()?;
  anyhow::ensure!(!password.is_empty(), "password for {username} is empty");

  let user = store
    .add_user(username, hash_password(&password)?)
    .await
    .context("cannot create user")?;
  tracing::info!(user_id = %user.user_id, username = %user.username, "user created");
  Ok(())
}

/// One line from stdin, without its line ending.
fn prompt_password() -> anyhow::Result<String> {
  eprint!("Password: ");
  io::stderr().flush().ok();
  let mut buf = String::new();
  io::stdin().lock().read_line(&mut buf)?;
  Ok(buf.trim_end_matches(['\n', '\r']).to_owned())
}

/// `~/x` becomes `$HOME/x`; other paths are returned unchanged.
fn home_relative(path: &Path) -> PathBuf {
  match (path.strip_prefix("~"), std::env::var_os("HOME")) {
    (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
    _ => path.to_owned(),
  }
}
