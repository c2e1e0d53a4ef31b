//! LexOps CLI — run the legal pipelines from the command line.
//!
//! Inputs are files on disk (documents, JSON snapshots, issue lists); the
//! outcome of every run is printed to stdout as JSON (or YAML), logs go to
//! stderr, and a failed run exits non-zero.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use lexops_cli::commands::{self, OutputFormat};
use lexops_core::stages::model::SearchFilters;

/// LexOps — bilingual legal workflow pipelines
#[derive(Parser)]
#[command(name = "lexops", version, about = "LexOps — bilingual legal workflow pipelines")]
pub struct Cli {
    /// Path to the YAML config file
    #[arg(long, global = true, env = "LEXOPS_CONFIG")]
    config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Admit files into a matter: manifest, text segments, case snapshot, risk
    Intake {
        /// Files to admit
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Matter identifier
        #[arg(long)]
        case_id: String,
        /// Source: gmail, outlook, upload, whatsapp_export or dms
        #[arg(long, default_value = "upload")]
        source_type: String,
        /// JSON object with source metadata (email headers, language hints)
        #[arg(long)]
        metadata: Option<PathBuf>,
    },

    /// Draft a bilingual pleading from a case snapshot
    Draft {
        /// JSON case snapshot (as produced by `intake`)
        #[arg(long)]
        snapshot: PathBuf,
        /// Template id, e.g. TPL-HighCourt-MS-v2; inferred when omitted
        #[arg(long)]
        template_id: Option<String>,
        /// JSON array of issues to plead
        #[arg(long)]
        issues: Option<PathBuf>,
        /// JSON array of prayers for relief
        #[arg(long)]
        prayers: Option<PathBuf>,
    },

    /// Search authorities and build an argument memo
    Research {
        /// Research question
        query: String,
        /// Only authorities from this court
        #[arg(long)]
        court: Option<String>,
        #[arg(long)]
        year_from: Option<i32>,
        #[arg(long)]
        year_to: Option<i32>,
        /// Only binding authorities
        #[arg(long)]
        binding_only: bool,
        /// Maximum number of authorities
        #[arg(long)]
        limit: Option<usize>,
        /// Skip the search: build the memo from this JSON array of authorities
        #[arg(long)]
        authorities: Option<PathBuf>,
        /// JSON array of issues for the memo (with --authorities)
        #[arg(long, requires = "authorities")]
        issues: Option<PathBuf>,
    },

    /// Certification pack, evidence index and hearing bundle for a matter
    Evidence {
        /// Matter identifier
        #[arg(long)]
        case_id: String,
        /// JSON array of documents; none means an empty bundle
        #[arg(long)]
        documents: Option<PathBuf>,
    },

    /// Run a pipeline from a JSON file holding its initial state
    Run {
        /// intake, drafting, research or evidence
        pipeline: String,
        /// JSON object with the initial state
        #[arg(long)]
        input: PathBuf,
    },

    /// Describe the pipeline graphs
    Pipelines {
        /// One line per pipeline
        #[arg(long)]
        compact: bool,
    },

    /// Show the effective configuration (API key masked)
    Config,
}

#[tokio::main]
async fn main() {
    let dotenv_files = commands::load_dotenv(Path::new("."));
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the results.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lexops_core=info,lexops_cli=info".into()),
        )
        .init();
    for path in &dotenv_files {
        tracing::debug!("[CLI] Loaded environment from '{}'", path.display());
    }

    let result = match cli.command {
        Some(command) => dispatch(command, cli.config, cli.format).await,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn dispatch(command: Commands, config_path: Option<PathBuf>, format: OutputFormat) -> Result<(), String> {
    let config = commands::load_config(config_path.as_deref())?;
    if let Commands::Config = command {
        return commands::config::run(&config, config_path.as_deref());
    }
    let engine = commands::init_engine(&config)?;

    match command {
        Commands::Intake {
            files,
            case_id,
            source_type,
            metadata,
        } => commands::intake::run(&engine, &files, &source_type, &case_id, metadata.as_deref(), format).await,

        Commands::Draft {
            snapshot,
            template_id,
            issues,
            prayers,
        } => {
            commands::draft::run(
                &engine,
                &snapshot,
                template_id.as_deref(),
                issues.as_deref(),
                prayers.as_deref(),
                format,
            )
            .await
        }

        Commands::Research {
            query,
            court,
            year_from,
            year_to,
            binding_only,
            limit,
            authorities,
            issues,
        } => match authorities {
            Some(authorities) => {
                commands::research::run_memo(&engine, &query, &authorities, issues.as_deref(), format).await
            }
            None => {
                let filters = SearchFilters {
                    court,
                    year_from,
                    year_to,
                    binding_only,
                    limit,
                };
                commands::research::run(&engine, &query, &filters, format).await
            }
        },

        Commands::Evidence { case_id, documents } => {
            commands::evidence::run(&engine, &case_id, documents.as_deref(), format).await
        }

        Commands::Run { pipeline, input } => commands::run::run(&engine, &pipeline, &input, format).await,

        Commands::Pipelines { compact } => commands::pipelines::list(&engine, compact, format),

        Commands::Config => Ok(()),
    }
}
