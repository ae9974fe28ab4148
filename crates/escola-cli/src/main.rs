//! `escola`: command-line front end for enrollment intake.
//!
//! Reads `escola.toml` (or the path given with `--config`) plus `ESCOLA_*`
//! environment variables, opens the SQLite store, and runs one command.
//!
//! ```
//! escola unit add "Escola Municipal Centro"
//! escola period add 2027
//! escola enroll --cpf 529.982.247-25 --name "Ana Souza" --birth-date 2018-05-02 \
//!   --unit <UNIT_ID> --period <PERIOD_ID> \
//!   --residence comprovante.pdf --history historico.pdf
//! escola worker
//! ```

mod settings;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use bytes::Bytes;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use escola_core::{
  document::{Document, DocumentState, Upload},
  store::{DocumentStore, EnrollmentQueries},
};
use escola_intake::{
  DispatchSignal, EnrollmentIntake, IntakeError, IntakeRequest, LocalFileStorage,
  MaterializationDispatcher, SystemClock,
};
use escola_store_sqlite::SqliteStore;
use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use settings::Settings;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "escola", author, version, about = "Escola enrollment intake")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "escola.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Manage school units.
  Unit {
    #[command(subcommand)]
    action: UnitAction,
  },
  /// Manage academic periods.
  Period {
    #[command(subcommand)]
    action: PeriodAction,
  },
  /// Enroll a student and upload their documents.
  Enroll(EnrollArgs),
  /// List the enrollments of a unit in a period.
  List {
    #[arg(long)]
    unit:   Uuid,
    #[arg(long)]
    period: Uuid,
  },
  /// Show a stored document.
  Document { document_id: Uuid },
  /// Process queued document uploads until interrupted, then finish the
  /// uploads already started.
  Worker,
  /// Print row counts.
  Stats,
}

#[derive(Subcommand)]
enum UnitAction {
  Add { name: String },
}

#[derive(Subcommand)]
enum PeriodAction {
  Add { year: i32 },
}

#[derive(clap::Args)]
struct EnrollArgs {
  /// CPF, bare digits or XXX.XXX.XXX-XX.
  #[arg(long)]
  cpf:        String,
  #[arg(long)]
  name:       String,
  /// YYYY-MM-DD
  #[arg(long)]
  birth_date: NaiveDate,
  #[arg(long)]
  unit:       Uuid,
  #[arg(long)]
  period:     Uuid,
  /// Proof of residence file.
  #[arg(long)]
  residence:  PathBuf,
  /// Academic history file.
  #[arg(long)]
  history:    PathBuf,
  /// Leave the uploads queued for `escola worker` instead of running them.
  #[arg(long)]
  no_upload:  bool,
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;
  let store = Arc::new(store);

  match cli.command {
    Command::Unit { action: UnitAction::Add { name } } => {
      let unit_id = store.add_unit(&name).await.context("failed to add unit")?;
      println!("{unit_id}");
    }
    Command::Period { action: PeriodAction::Add { year } } => {
      let period_id = store.add_period(year).await.context("failed to add period")?;
      println!("{period_id}");
    }
    Command::Enroll(args) => enroll(&settings, store, args).await?,
    Command::List { unit, period } => {
      let enrollments = store
        .list_enrollments(unit, period)
        .await
        .context("failed to list enrollments")?;
      println!("{}", serde_json::to_string_pretty(&enrollments)?);
    }
    Command::Document { document_id } => {
      let document = store
        .get_document(document_id)
        .await
        .context("failed to read document")?
        .with_context(|| format!("document {document_id} not found"))?;
      println!("{}", serde_json::to_string_pretty(&describe(&document))?);
    }
    Command::Worker => {
      let dispatcher = dispatcher(&settings, store, DispatchSignal::new());
      dispatcher
        .run_until(async {
          if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
          }
          tracing::info!("shutting down; finishing in-flight uploads");
        })
        .await;
    }
    Command::Stats => {
      let counts = store.counts().await.context("failed to count rows")?;
      println!("{}", serde_json::to_string_pretty(&counts)?);
    }
  }

  Ok(())
}

// ─── Commands ────────────────────────────────────────────────────────────────

async fn enroll(settings: &Settings, store: Arc<SqliteStore>, args: EnrollArgs) -> anyhow::Result<()> {
  let request = IntakeRequest {
    national_id:        args.cpf,
    full_name:          args.name,
    birth_date:         args.birth_date,
    unit_id:            args.unit,
    period_id:          args.period,
    proof_of_residence: read_upload(&args.residence).await?,
    academic_history:   read_upload(&args.history).await?,
  };

  let signal = DispatchSignal::new();
  let intake = EnrollmentIntake::new(
    store.clone(),
    store.clone(),
    store.clone(),
    Arc::new(SystemClock),
    signal.clone(),
  );

  let enrollment_id = match intake.enroll(request).await {
    Ok(id) => id,
    Err(e) => {
      println!("{}", serde_json::to_string_pretty(&report(&e))?);
      return Err(e).context("enrollment rejected");
    }
  };
  println!("{}", json!({ "enrollment_id": enrollment_id }));

  if !args.no_upload {
    let processed = dispatcher(settings, store, signal)
      .drain()
      .await
      .context("failed to process uploads")?;
    tracing::info!(processed, "uploads processed");
  }

  Ok(())
}

fn dispatcher(
  settings: &Settings,
  store: Arc<SqliteStore>,
  signal: DispatchSignal,
) -> MaterializationDispatcher<SqliteStore, LocalFileStorage> {
  let uploader = LocalFileStorage::new(&settings.upload_dir, settings.public_prefix.clone());
  MaterializationDispatcher::new(store, Arc::new(uploader), signal, settings.poll_interval())
    .with_claim_timeout(settings.claim_timeout())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

async fn read_upload(path: &Path) -> anyhow::Result<Upload> {
  let content = tokio::fs::read(path)
    .await
    .with_context(|| format!("failed to read {path:?}"))?;
  let filename = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .with_context(|| format!("{path:?} has no file name"))?;
  Ok(Upload { filename, content: Bytes::from(content) })
}

/// Machine-readable form of a rejected request.
fn report(e: &IntakeError) -> serde_json::Value {
  match e {
    IntakeError::Validation(fields) => json!({ "error": "validation", "fields": fields }),
    IntakeError::Conflict(message) => json!({ "error": "conflict", "message": message }),
    IntakeError::Store(source) => json!({ "error": "store", "message": source.to_string() }),
  }
}

fn describe(document: &Document) -> serde_json::Value {
  match &document.state {
    DocumentState::Pending { content } => json!({
      "document_id": document.document_id,
      "status": "pending",
      "size": content.len(),
      "content_sha256": document.content_sha256,
      "created_at": document.created_at,
    }),
    DocumentState::Finalized { location } => json!({
      "document_id": document.document_id,
      "status": "finalized",
      "location": location,
      "content_sha256": document.content_sha256,
      "created_at": document.created_at,
    }),
  }
}
