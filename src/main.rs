//! # Cardsmith CLI
//!
//! Command-line interface for ID card generation.
//!
//! ## Usage
//!
//! ```bash
//! # List templates
//! cardsmith templates --kind event
//!
//! # Render the sample record with a template as JSON
//! cardsmith render --template modern
//!
//! # Save one card as PNG
//! cardsmith render --template nandha-student --record ada.json --png ada.png
//!
//! # Generate a batch
//! cardsmith batch --kind event --csv people.csv --template modern --taglines --out dist/
//!
//! # Verify a scanned payload
//! cardsmith verify '{"id":"PID-1","name":"Ada","org":"Expo"}'
//!
//! # Run the HTTP API
//! cardsmith serve --listen 0.0.0.0:8080
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cardsmith::{
    AppConfig, CardError, Record, RecordKind, TemplateDefinition,
    batch::{Artifact, BatchJob, BatchState, CardFormat, EnhancementOptions, OutputFormat, package::single_card},
    render::render,
    server,
    template::{TemplateError, catalog},
    verify::decode_payload,
};

/// Cardsmith - ID card templating and check-in
#[derive(Parser, Debug)]
#[command(name = "cardsmith")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: AppConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List built-in templates
    Templates {
        /// Only templates for this record kind (student, event)
        #[arg(long)]
        kind: Option<RecordKind>,
    },

    /// Render one card
    Render {
        /// Template id
        #[arg(long)]
        template: String,

        /// Record as a JSON file (defaults to the template kind's sample)
        #[arg(long, value_name = "FILE")]
        record: Option<PathBuf>,

        /// Save the card as PNG
        #[arg(long, value_name = "FILE", conflicts_with = "pdf")]
        png: Option<PathBuf>,

        /// Save the card as a one-page PDF
        #[arg(long, value_name = "FILE")]
        pdf: Option<PathBuf>,
    },

    /// Generate cards for every row of a CSV file
    Batch {
        /// Record kind of the CSV rows
        #[arg(long)]
        kind: RecordKind,

        /// CSV file with a header row
        #[arg(long, value_name = "FILE")]
        csv: PathBuf,

        /// Template id
        #[arg(long)]
        template: String,

        /// Generate taglines (event batches)
        #[arg(long)]
        taglines: bool,

        /// Enhance photos
        #[arg(long)]
        enhance_photos: bool,

        /// Archive format
        #[arg(long, value_enum, default_value_t = OutputFormat::Zip)]
        format: OutputFormat,

        /// Output directory
        #[arg(long, value_name = "DIR", default_value = ".")]
        out: PathBuf,
    },

    /// Check a scanned QR payload
    Verify {
        /// Decoded QR text
        payload: String,
    },

    /// Run the HTTP API
    Serve,
}

fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardsmith=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), CardError> {
    let cli = Cli::parse();
    let config = cli.config;

    match cli.command {
        Commands::Templates { kind } => {
            for template in catalog::all()
                .iter()
                .filter(|t| kind.is_none_or(|k| t.kind == k))
            {
                println!(
                    "  {:<26} {:<8} {}x{}  {}",
                    template.id, template.kind, template.width, template.height, template.name
                );
            }
            Ok(())
        }

        Commands::Render {
            template,
            record,
            png,
            pdf,
        } => {
            let template = lookup(&template)?;
            let record = match record {
                Some(path) => read_record(&path)?,
                None => Record::sample(template.kind),
            };
            template.ensure_kind(record.kind())?;

            let format = match (png, pdf) {
                (Some(path), _) => Some((CardFormat::Png, path)),
                (None, Some(path)) => Some((CardFormat::Pdf, path)),
                (None, None) => None,
            };
            let Some((format, path)) = format else {
                let card = render(&record, template, config.qr().as_ref());
                let json = serde_json::to_string_pretty(&card)
                    .map_err(|e| CardError::Render(e.to_string()))?;
                println!("{}", json);
                return Ok(());
            };

            let runtime = runtime()?;
            let generator = config.generator(config.http_client()?);
            let image = runtime.block_on(generator.capture_one(&record, template))?;
            let artifact = single_card(format, &record, (template.width, template.height), &image)?;
            std::fs::write(&path, &artifact.bytes)?;
            println!("Saved {} to {}", artifact.file_name, path.display());
            Ok(())
        }

        Commands::Batch {
            kind,
            csv,
            template,
            taglines,
            enhance_photos,
            format,
            out,
        } => {
            let template = lookup(&template)?.clone();
            let text = std::fs::read_to_string(&csv)?;
            let options = EnhancementOptions {
                taglines,
                enhance_photos,
                format,
            };
            let runtime = runtime()?;
            let artifact = runtime.block_on(generate(&config, kind, &text, template, options))?;
            let path = write_artifact(&out, &artifact)?;
            println!("Saved {}", path.display());
            Ok(())
        }

        Commands::Verify { payload } => {
            let payload = decode_payload(&payload)?;
            println!("Verified");
            println!("  Name:         {}", payload.name);
            println!("  ID:           {}", payload.id);
            println!("  Organization: {}", payload.org);
            Ok(())
        }

        Commands::Serve => runtime()?.block_on(server::serve(config)),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, CardError> {
    Ok(tokio::runtime::Runtime::new()?)
}

fn lookup(id: &str) -> Result<&'static TemplateDefinition, CardError> {
    catalog::by_id(id).ok_or_else(|| TemplateError::UnknownTemplate(id.to_string()).into())
}

fn read_record(path: &Path) -> Result<Record, CardError> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| CardError::Render(format!("Invalid record {}: {}", path.display(), e)))
}

/// Drive a batch job from import to download.
async fn generate(
    config: &AppConfig,
    kind: RecordKind,
    csv: &str,
    template: TemplateDefinition,
    options: EnhancementOptions,
) -> Result<Artifact, CardError> {
    let client = config.http_client()?;
    let generator = config.generator(client.clone());
    let mut job = BatchJob::new(config.placeholder_style());

    let count = job.import(kind, csv, &config.import_options(), config.loader(client))?;
    println!("Imported {} {} records", count, kind);
    job.begin_review()?;
    let photos = job.settle_photos().await;
    println!("Photos: {}/{} resolved", photos.resolved, photos.total);
    job.select_template(template)?;
    job.configure(options)?;

    let plan = job.confirm()?;
    let mut progress = plan.progress.subscribe();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let update = progress.borrow_and_update().clone();
            eprintln!("[{:>3.0}%] {}", update.percent, update.status);
        }
    });
    let result = generator.run(plan).await;
    reporter.abort();
    job.finish(result)?;

    job.artifact().cloned().ok_or_else(|| match job.state() {
        BatchState::Error(message) => CardError::Packaging(message.clone()),
        state => CardError::InvalidTransition {
            action: "download",
            state: state.name(),
        },
    })
}

fn write_artifact(dir: &Path, artifact: &Artifact) -> Result<PathBuf, CardError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(&artifact.file_name);
    std::fs::write(&path, &artifact.bytes)?;
    Ok(path)
}
