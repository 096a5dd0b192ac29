use std::net::SocketAddr;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal::ctrl_c;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sprintify::api::{self, rate_limit, AppState};
use sprintify::config::Config;
use sprintify::db::Database;
use sprintify::jobs::{self, Scheduler};
use sprintify::models::Role;
use sprintify::push;

#[derive(Parser)]
#[command(name = "sprintify")]
#[command(about = "Sprint and goal planning backend with AI-assisted plans")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API and background jobs (default)
    Serve,
    /// Mint a bearer token signed with the configured secret
    Token {
        #[arg(long)]
        uid: String,

        #[arg(long)]
        email: String,

        #[arg(long)]
        name: Option<String>,

        /// Lifetime of the token in hours
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
    /// Run one maintenance job immediately
    Job {
        #[arg(value_enum)]
        kind: JobKind,
    },
    /// Set the role of an existing user (bootstrap the first admin)
    Promote {
        #[arg(long)]
        uid: String,

        #[arg(long, value_enum, default_value_t = RoleArg::Admin)]
        role: RoleArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum JobKind {
    Daily,
    Hourly,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Normal,
    Premium,
    Admin,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Normal => Role::Normal,
            RoleArg::Premium => Role::Premium,
            RoleArg::Admin => Role::Admin,
        }
    }
}

fn open_database(config: &Config) -> anyhow::Result<Database> {
    let db = match &config.database {
        Some(path) => Database::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?,
        None => Database::open_default().context("failed to open default database")?,
    };
    db.migrate().context("failed to migrate database")?;
    Ok(db)
}

fn require_secret(config: &Config) -> anyhow::Result<String> {
    match config.secret() {
        Some(secret) => Ok(secret.to_string()),
        None => bail!("a JWT secret is required: pass --jwt-secret or set SPRINTIFY_JWT_SECRET"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "sprintify=debug,sprintify_core=info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await?,
        Commands::Token {
            uid,
            email,
            name,
            hours,
        } => {
            let secret = require_secret(&config)?;
            let token = api::auth::issue_token(
                &secret,
                &uid,
                &email,
                name.as_deref(),
                chrono::Duration::hours(hours),
            )?;
            println!("{token}");
        }
        Commands::Job { kind } => {
            let db = open_database(&config)?;
            let sender = push::push_sender(&config);
            match kind {
                JobKind::Daily => {
                    let report = jobs::run_daily(&db, sender.as_ref(), Utc::now()).await;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                JobKind::Hourly => {
                    let report = jobs::run_hourly(&db, sender.as_ref(), Utc::now()).await;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
            }
        }
        Commands::Promote { uid, role } => {
            let db = open_database(&config)?;
            let role = Role::from(role);
            if !db.set_role(&uid, role)? {
                bail!("no user with uid {uid}; they must register first");
            }
            println!("{uid} is now {}", role.as_str());
        }
    }

    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let secret = require_secret(&config)?;
    let db = open_database(&config)?;
    let addr = config.bind_addr();
    let run_jobs = !config.no_jobs;

    let state = AppState::new(db.clone(), config, &secret);
    rate_limit::spawn_cleanup(
        vec![state.limiter.clone(), state.ai_limiter.clone()],
        std::time::Duration::from_secs(60),
    );
    if run_jobs {
        Scheduler::new(db, state.push.clone()).spawn();
    } else {
        info!("background jobs disabled");
    }

    let app = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Sprintify listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Sprintify shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
