use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use gradreq_ranking::config::Config;
use gradreq_ranking::engine::AggregationEngine;
use gradreq_ranking::error::{AuthError, PublishError};
use gradreq_ranking::export::{self, ExportFormat};
use gradreq_ranking::intake::{IntakeRegistry, Upload};
use gradreq_ranking::models::ArtifactId;
use gradreq_ranking::notice::{NoticeBoard, NoticeLevel};
use gradreq_ranking::parse::ParserSet;
use gradreq_ranking::publisher::PublishedArtifact;
use gradreq_ranking::session::{AuthContext, HttpAuthService, Role, SessionStore};
use gradreq_ranking::workflow::{announce, RankingWorkflow};
use gradreq_ranking::{db, guard};

#[derive(Parser)]
#[command(name = "gradreq-ranking")]
#[command(about = "Faculty graduation ranking generator for the dean's office", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in through the university auth service
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "GRADREQ_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the logged-in user and their dashboard
    Whoami,
    /// Merge department ranking files into the faculty ranking
    Rank {
        #[arg(long = "file", required = true)]
        files: Vec<PathBuf>,
        /// Declared MIME type for every file instead of guessing from the extension
        #[arg(long)]
        media_type: Option<String>,
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Store the published ranking in Postgres (needs DATABASE_URL)
        #[arg(long)]
        archive: bool,
        /// Run without a dean's office session
        #[arg(long)]
        skip_auth: bool,
    },
    /// Create or upgrade the archive schema
    InitDb,
    /// Export an archived ranking
    Show {
        #[arg(long)]
        artifact: Uuid,
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Login { email, password } => {
            let mut auth = auth_context(&config)?;
            let user = auth.login(&email, &password).await?;
            println!(
                "Logged in as {} ({}). Dashboard: {}",
                user.name,
                user.role.as_str(),
                guard::dashboard_route(Some(user))
            );
        }
        Commands::Logout => {
            SessionStore::new(&config.session_file).clear()?;
            println!("Logged out.");
        }
        Commands::Whoami => {
            let mut auth = auth_context(&config)?;
            match auth.restore().await? {
                Some(user) => println!(
                    "{} <{}> ({}). Dashboard: {}",
                    user.name,
                    user.email,
                    user.role.as_str(),
                    guard::dashboard_route(Some(user))
                ),
                None => println!("Not logged in. Go to {}.", guard::LOGIN_ROUTE),
            }
        }
        Commands::Rank {
            files,
            media_type,
            format,
            out,
            archive,
            skip_auth,
        } => {
            if !skip_auth {
                let mut auth = auth_context(&config)?;
                let user = auth.restore().await?;
                let user = guard::require_role(user, Role::DeansOffice)?;
                info!(email = %user.email, "ranking requested");
            }

            let mut notices = NoticeBoard::new(config.notice_ttl);
            let mut registry = IntakeRegistry::new();
            let uploads = files
                .iter()
                .map(|path| read_upload(path, media_type.as_deref()))
                .collect::<anyhow::Result<Vec<_>>>()?;
            registry.submit_batch(uploads, &mut notices);
            print_notices(&mut notices);

            let workflow = RankingWorkflow::new(
                AggregationEngine::new(ParserSet::standard()),
                config.generation_timeout,
            );
            let handle = workflow.trigger(&registry)?;
            println!("Generating faculty ranking (run {})...", handle.run_id);
            let outcome = handle.wait().await;
            announce(&outcome, &mut notices);
            print_notices(&mut notices);
            let artifact = outcome?;

            let out = out.unwrap_or_else(|| {
                PathBuf::from(format!("faculty-ranking-{}.{}", artifact.id, format.extension()))
            });
            write_artifact(&artifact, format, &out)?;

            println!("Top students:");
            for entry in artifact.records.iter().take(10) {
                println!(
                    "- #{} {} ({}, {}) GPA {:.2}",
                    entry.rank,
                    entry.record.name,
                    entry.record.student_id,
                    entry.record.department,
                    entry.record.gpa
                );
            }

            if archive {
                let pool = connect(&config).await?;
                if db::archive_artifact(&pool, &artifact).await? {
                    println!("Archived ranking {}.", artifact.id);
                } else {
                    println!("Ranking {} was already archived.", artifact.id);
                }
            }
        }
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Show {
            artifact,
            format,
            out,
        } => {
            let pool = connect(&config).await?;
            let id = ArtifactId(artifact);
            let artifact = db::fetch_artifact(&pool, id)
                .await?
                .ok_or(PublishError::NotFound(id))?;
            let out = out.unwrap_or_else(|| {
                PathBuf::from(format!("faculty-ranking-{}.{}", artifact.id, format.extension()))
            });
            write_artifact(&artifact, format, &out)?;
        }
    }

    Ok(())
}

fn auth_context(config: &Config) -> anyhow::Result<AuthContext<HttpAuthService>> {
    let base_url = config.auth_url.as_deref().ok_or(AuthError::NotConfigured)?;
    Ok(AuthContext::new(
        HttpAuthService::new(base_url),
        SessionStore::new(&config.session_file),
    ))
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

fn read_upload(path: &Path, media_type: Option<&str>) -> anyhow::Result<Upload> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let declared_type = media_type
        .map(str::to_string)
        .unwrap_or_else(|| mime_guess::from_path(path).first_or_octet_stream().to_string());
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(Upload {
        name,
        declared_type,
        bytes,
    })
}

fn write_artifact(artifact: &PublishedArtifact, format: ExportFormat, out: &Path) -> anyhow::Result<()> {
    let rendered = export::render(artifact, format)?;
    std::fs::write(out, rendered)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!("Ranking written to {}.", out.display());
    Ok(())
}

fn print_notices(notices: &mut NoticeBoard) {
    for notice in notices.active(Utc::now()) {
        match notice.level {
            NoticeLevel::Success => println!("{}", notice.message),
            NoticeLevel::Error => eprintln!("error: {}", notice.message),
        }
    }
    notices.clear();
}
