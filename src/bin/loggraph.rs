//! loggraph CLI - build a knowledge graph from parsed log records
//!
//! Reads NDJSON log records and template definitions, annotates templates
//! (reusing the persisted template archive), types every line and writes the
//! resulting graph.

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use loggraph::persistence::JsonTemplateFile;
use loggraph::{ingest, write_graph, OutputFormat, Pipeline, PipelineConfig, TemplatePersistence};

#[derive(Parser)]
#[command(name = "loggraph")]
#[command(version, about = "Turn parsed log records into a typed knowledge graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by commands that read the pipeline configuration.
#[derive(clap::Args)]
struct ConfigArgs {
    /// Pipeline configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Template archive path (overrides config and LOGGRAPH_STORE)
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Pattern file (overrides config and LOGGRAPH_PATTERNS)
    #[arg(short, long)]
    patterns: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate templates, type every line and write the graph
    Build {
        /// Log records (NDJSON)
        #[arg(short, long)]
        records: PathBuf,

        /// Template definitions (NDJSON)
        #[arg(short, long)]
        templates: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,

        /// Graph output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Graph output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Type lines on a single thread
        #[arg(long)]
        sequential: bool,
    },

    /// Annotate templates and update the archive without building a graph
    Annotate {
        /// Log records (NDJSON), used to pick exemplar lines
        #[arg(short, long)]
        records: PathBuf,

        /// Template definitions (NDJSON)
        #[arg(short, long)]
        templates: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// List the effective pattern registry in priority order
    Patterns {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// List the templates stored in an archive
    Inspect {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build {
            records,
            templates,
            config,
            output,
            format,
            sequential,
        } => build(records, templates, config, output, format, sequential),
        Commands::Annotate {
            records,
            templates,
            config,
        } => annotate(records, templates, config),
        Commands::Patterns { config } => list_patterns(config),
        Commands::Inspect { config } => inspect(config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Resolve configuration with precedence: CLI > environment > config file > default
fn load_config(args: ConfigArgs) -> loggraph::Result<PipelineConfig> {
    let mut config = match args.config {
        Some(path) => PipelineConfig::load_from_file(path)?,
        None => PipelineConfig::default(),
    };
    config.apply_env()?;

    if let Some(store) = args.store {
        config.store = store;
    }
    if let Some(patterns) = args.patterns {
        config.patterns = Some(patterns);
    }
    Ok(config)
}

fn build(
    records: PathBuf,
    templates: PathBuf,
    args: ConfigArgs,
    output: Option<PathBuf>,
    format: Option<OutputFormat>,
    sequential: bool,
) -> loggraph::Result<()> {
    let mut config = load_config(args)?;
    if output.is_some() {
        config.output = output;
    }
    if let Some(format) = format {
        config.format = format;
    }
    if sequential {
        config.parallel = false;
    }

    let registry = config.registry()?;
    let records = ingest::read_records(&records)?;
    let templates = ingest::read_templates(&templates)?;
    eprintln!("  ✓ Loaded {} records and {} templates", records.len(), templates.len());

    let pipeline = Pipeline::new(registry, JsonTemplateFile::new(&config.store))
        .parallel(config.parallel);
    let outcome = pipeline.run(&templates, &records);

    match &config.output {
        Some(path) => {
            let file = File::create(path).map_err(loggraph::error::SerializationError::from)?;
            write_graph(&outcome.build.graph, config.format, &config.base_iri, BufWriter::new(file))?;
            eprintln!("  ✓ Wrote graph to {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            write_graph(&outcome.build.graph, config.format, &config.base_iri, stdout.lock())?;
        }
    }

    eprintln!("{}", outcome.build.report);
    outcome.persistence?;
    eprintln!("  ✓ Saved {} templates to {}", outcome.build.store.len(), config.store.display());
    Ok(())
}

fn annotate(records: PathBuf, templates: PathBuf, args: ConfigArgs) -> loggraph::Result<()> {
    let config = load_config(args)?;
    let registry = config.registry()?;
    let records = ingest::read_records(&records)?;
    let templates = ingest::read_templates(&templates)?;

    let pipeline = Pipeline::new(registry, JsonTemplateFile::new(&config.store));
    let outcome = pipeline.annotate(&templates, &records);

    eprintln!("{}", outcome.report);
    outcome.persistence?;
    eprintln!("  ✓ Saved {} templates to {}", outcome.store.len(), config.store.display());
    Ok(())
}

fn list_patterns(args: ConfigArgs) -> loggraph::Result<()> {
    let config = load_config(args)?;
    let registry = config.registry()?;

    let mut out = io::stdout().lock();
    for (priority, pattern) in registry.iter().enumerate() {
        let kind = if pattern.produces_node { "node" } else { "literal" };
        writeln!(
            out,
            "{:>2}  {:<12} {:<10} {:<16} {:<8} {}",
            priority + 1,
            pattern.name,
            pattern.scope.as_str(),
            pattern.relation,
            kind,
            pattern.matcher.as_str()
        )
        .map_err(loggraph::error::SerializationError::from)?;
    }
    Ok(())
}

fn inspect(args: ConfigArgs) -> loggraph::Result<()> {
    let config = load_config(args)?;
    let file = JsonTemplateFile::new(&config.store);

    let Some(archive) = file.read_archive()? else {
        eprintln!("  ℹ No template archive at {}", config.store.display());
        return Ok(());
    };
    eprintln!(
        "  ℹ Archive version {}, saved {}, {} templates",
        archive.version,
        archive.saved_at,
        archive.templates.len()
    );

    let templates = file.load_templates()?;
    let mut out = io::stdout().lock();
    for template in templates {
        let slots: Vec<String> = template.type_vector.iter().map(ToString::to_string).collect();
        writeln!(
            out,
            "{}  [{}]  {}",
            &template.fingerprint.as_str()[..12],
            slots.join(", "),
            template.text
        )
        .map_err(loggraph::error::SerializationError::from)?;
    }
    Ok(())
}
