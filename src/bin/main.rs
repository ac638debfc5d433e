//! Avocado CLI - register a schema and query it with context/view documents
//!
//! Usage:
//!   avocado init [--schema <schema.toml>] [--publish] [--concepts]
//!   avocado sql --context <context.json> --view <view.json> [--dialect <dialect>]
//!   avocado export <format> --context <context.json> --view <view.json> --output <path>
//!   avocado check --context <context.json> --view <view.json>
//!
//! Examples:
//!   avocado init --schema hr.toml --publish --concepts
//!   avocado sql --context ctx.json --view view.json --dialect postgres
//!   avocado export csv --view view.json --output out.csv --reader threaded

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value as Json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use avocado::cache::Cache;
use avocado::catalog::{Catalog, InitOptions};
use avocado::config::Settings;
use avocado::engine::{engine_for, Engine};
use avocado::export::{load_codes, DirSink, ExporterRegistry, ReadMode, ReadOptions, StreamSink};
use avocado::format::FormatterRegistry;
use avocado::graph::{JoinTree, SchemaGraph};
use avocado::query::{
    ContextParser, Executor, ParsedContext, ParsedView, QueryProcessor, ResultRequest, ViewParser,
};
use avocado::schema::{introspect::introspect_sqlite, SchemaDescription};
use avocado::sql::Dialect;
use avocado::translate::TranslatorRegistry;
use avocado::{Error, Result};

#[derive(Parser)]
#[command(name = "avocado")]
#[command(about = "Avocado - metadata-driven queries over a relational schema")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to AVOCADO_CONFIG, ./avocado.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Source {
    /// Schema description TOML; the connection is introspected if not given
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Connection name from the settings
    #[arg(long)]
    connection: Option<String>,

    /// Application label for introspected tables
    #[arg(long, default_value = "app")]
    app: String,

    /// Root table (defaults to [graph].root)
    #[arg(long)]
    root: Option<String>,
}

#[derive(clap::Args)]
struct Documents {
    /// Context document (JSON)
    #[arg(long)]
    context: Option<PathBuf>,

    /// View document (JSON)
    #[arg(long)]
    view: Option<PathBuf>,

    /// User the documents are resolved for
    #[arg(long)]
    user: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register fields for every column of the schema in the catalog
    Init {
        #[command(flatten)]
        source: Source,

        /// Register key columns too
        #[arg(long)]
        include_keys: bool,

        /// Publish the new fields
        #[arg(long)]
        publish: bool,

        /// Create a concept per new field
        #[arg(long)]
        concepts: bool,

        /// Re-apply heuristics to existing fields
        #[arg(long)]
        force: bool,
    },

    /// Print the SQL for a context/view pair
    Sql {
        #[command(flatten)]
        source: Source,

        #[command(flatten)]
        documents: Documents,

        /// SQL dialect to generate (defaults to the connection's)
        #[arg(short, long)]
        dialect: Option<DialectArg>,

        #[arg(long)]
        offset: Option<u64>,

        #[arg(long)]
        limit: Option<u64>,
    },

    /// Run a context/view pair and export the rows
    Export {
        /// Exporter name (csv, json, excel, sas, r, html)
        format: String,

        #[command(flatten)]
        source: Source,

        #[command(flatten)]
        documents: Documents,

        /// Output file, or directory for multi-file exporters; stdout if not given
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Read mode (defaults to [export].read_mode)
        #[arg(long)]
        reader: Option<ReaderArg>,

        /// First page to export
        #[arg(long)]
        page: Option<u64>,

        /// Rows per page
        #[arg(long)]
        limit: Option<u64>,

        /// Run under this name so it can be cancelled
        #[arg(long)]
        name: Option<String>,

        /// Leave the primary key out of the output
        #[arg(long)]
        no_pk: bool,
    },

    /// Parse documents and print them with errors, warnings and language
    Check {
        #[command(flatten)]
        source: Source,

        #[command(flatten)]
        documents: Documents,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Sqlite,
    Postgres,
    Mysql,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Sqlite => Dialect::Sqlite,
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Mysql => Dialect::MySql,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ReaderArg {
    Default,
    Cached,
    Threaded,
    CachedThreaded,
    Manual,
}

impl From<ReaderArg> for ReadMode {
    fn from(arg: ReaderArg) -> Self {
        match arg {
            ReaderArg::Default => ReadMode::Default,
            ReaderArg::Cached => ReadMode::Cached,
            ReaderArg::Threaded => ReadMode::Threaded,
            ReaderArg::CachedThreaded => ReadMode::CachedThreaded,
            ReaderArg::Manual => ReadMode::Manual,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = load_settings(cli.config.as_deref()).and_then(|settings| match cli.command {
        Commands::Init {
            source,
            include_keys,
            publish,
            concepts,
            force,
        } => cmd_init(
            &settings,
            &source,
            InitOptions {
                include_keys,
                publish,
                concepts,
                force,
            },
        ),
        Commands::Sql {
            source,
            documents,
            dialect,
            offset,
            limit,
        } => cmd_sql(&settings, &source, &documents, dialect, offset, limit),
        Commands::Export {
            format,
            source,
            documents,
            output,
            reader,
            page,
            limit,
            name,
            no_pk,
        } => {
            let mut request = ResultRequest::from_settings(&settings.query);
            if let Some(page) = page {
                request.page = page;
            }
            if let Some(limit) = limit {
                request.limit = limit;
            }
            request.query_name = name;
            request.reader = reader.map(ReadMode::from).unwrap_or(settings.export.read_mode);
            let paged = page.is_some() || limit.is_some();
            cmd_export(
                &settings,
                &source,
                &documents,
                &format,
                output.as_deref(),
                &request,
                paged,
                !no_pk,
            )
        }
        Commands::Check { source, documents } => cmd_check(&settings, &source, &documents),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error ({}): {}", e.kind(), e);
            ExitCode::FAILURE
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = match path {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };
    Ok(settings)
}

/// Everything a command needs to resolve documents.
struct Session {
    catalog: Catalog,
    engine: Option<Arc<dyn Engine>>,
    tree: Arc<JoinTree>,
}

fn open_engine(settings: &Settings, source: &Source) -> Result<Option<Arc<dyn Engine>>> {
    let connection = match &source.connection {
        Some(name) => Some(settings.get_connection(name)?),
        None => settings.default_connection().map(|(_, c)| c),
    };
    match connection {
        Some(conn) => Ok(Some(engine_for(&conn.resolve()?)?)),
        None => Ok(None),
    }
}

fn load_schema(settings: &Settings, source: &Source) -> Result<SchemaDescription> {
    if let Some(path) = &source.schema {
        return Ok(SchemaDescription::load(path)?);
    }
    let (_, conn) = match &source.connection {
        Some(name) => (name.as_str(), settings.get_connection(name)?),
        None => settings
            .default_connection()
            .ok_or_else(|| Error::Input("no --schema given and no connection configured".into()))?,
    };
    let path = conn.resolved_connection_string()?;
    let db = rusqlite::Connection::open(&path).map_err(|e| Error::Execution(e.to_string()))?;
    let description = introspect_sqlite(&db, &source.app)?;
    debug!(path = %path, tables = description.tables.len(), "introspected database");
    Ok(description)
}

fn open_catalog(settings: &Settings) -> Result<Catalog> {
    let mut catalog_settings = settings.catalog.clone();
    catalog_settings.path = settings
        .catalog_path()?
        .map(|p| p.display().to_string());
    let cache = Cache::from_settings(&settings.cache)?;
    Ok(Catalog::open(&catalog_settings, cache)?)
}

fn open_session(settings: &Settings, source: &Source) -> Result<Session> {
    let schema = load_schema(settings, source)?;
    let root = source
        .root
        .clone()
        .or_else(|| settings.graph.root.clone())
        .or_else(|| schema.tables.first().map(|t| t.name.clone()))
        .ok_or_else(|| Error::Input("schema has no tables".into()))?;
    let graph = SchemaGraph::from_description(&schema)?;
    let tree = graph.tree(&root, &settings.graph.exclude, &settings.graph.routes)?;
    let catalog = open_catalog(settings)?.with_schema(Arc::new(schema));
    Ok(Session {
        catalog,
        engine: open_engine(settings, source)?,
        tree: Arc::new(tree),
    })
}

fn read_document(path: Option<&Path>) -> Result<Option<Json>> {
    path.map(|p| {
        let source = fs::read_to_string(p)?;
        Ok(serde_json::from_str(&source)?)
    })
    .transpose()
}

fn parse_documents(
    settings: &Settings,
    session: &Session,
    documents: &Documents,
) -> Result<(Option<ParsedContext>, Option<ParsedView>)> {
    let translators = TranslatorRegistry::new();
    let user = documents.user.as_deref();
    let context = read_document(documents.context.as_deref())?
        .map(|doc| {
            ContextParser::new(&session.catalog, &translators, &session.tree)
                .distinct(settings.query.distinct)
                .parse(&doc, user)
        })
        .transpose()?;
    let view = read_document(documents.view.as_deref())?
        .map(|doc| ViewParser::new(&session.catalog).parse(&doc, user))
        .transpose()?;
    Ok((context, view))
}

fn processor(session: &Session, context: Option<ParsedContext>, view: Option<ParsedView>) -> QueryProcessor {
    let mut processor = QueryProcessor::new(session.tree.clone());
    if let Some(context) = context {
        processor = processor.context(context);
    }
    if let Some(view) = view {
        processor = processor.view(view);
    }
    processor
}

fn cmd_init(settings: &Settings, source: &Source, options: InitOptions) -> Result<()> {
    let schema = load_schema(settings, source)?;
    let catalog = open_catalog(settings)?;
    let engine = open_engine(settings, source)?;
    let report = catalog.init_from_schema(&schema, engine.as_deref(), &options)?;

    for key in &report.created {
        println!("created  {}", key);
    }
    for key in &report.updated {
        println!("updated  {}", key);
    }
    println!(
        "{} created, {} updated, {} skipped",
        report.created.len(),
        report.updated.len(),
        report.skipped.len()
    );
    Ok(())
}

fn cmd_sql(
    settings: &Settings,
    source: &Source,
    documents: &Documents,
    dialect: Option<DialectArg>,
    offset: Option<u64>,
    limit: Option<u64>,
) -> Result<()> {
    let session = open_session(settings, source)?;
    let (context, view) = parse_documents(settings, &session, documents)?;
    let dialect = match (dialect, &session.engine) {
        (Some(arg), _) => arg.into(),
        (None, Some(engine)) => engine.dialect(),
        (None, None) => Dialect::default(),
    };
    let sql = processor(&session, context, view).sql(dialect, offset, limit)?;
    println!("{}", sql);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_export(
    settings: &Settings,
    source: &Source,
    documents: &Documents,
    format: &str,
    output: Option<&Path>,
    request: &ResultRequest,
    paged: bool,
    include_pk: bool,
) -> Result<()> {
    let session = open_session(settings, source)?;
    let engine = session
        .engine
        .clone()
        .ok_or_else(|| Error::Input("exporting needs a configured connection".into()))?;
    let (context, view) = parse_documents(settings, &session, documents)?;
    let processor = processor(&session, context, view).include_pk(include_pk);

    let exporter = ExporterRegistry::new().get(format)?;
    let formats = FormatterRegistry::new();
    let codes = match processor.parsed_view() {
        Some(view) => load_codes(&session.catalog, engine.as_ref(), view)?,
        None => Default::default(),
    };
    let executor = Executor::new(engine);

    let name = request.query_name.as_deref();
    let mut options =
        ReadOptions::from_settings(&settings.export).mode(request.read_mode(&processor));
    let cursor = if !paged {
        processor.get_iterable(&executor, None, None, name)?
    } else if options.mode == ReadMode::Manual {
        let (offset, limit) = request.bounds()?;
        options = options.slice(Some(offset as usize), Some(limit as usize));
        processor.get_iterable(&executor, None, None, name)?
    } else {
        let (offset, limit) = request.bounds()?;
        processor.get_iterable(&executor, Some(offset), Some(limit), name)?
    };

    let export = processor.get_exporter(exporter.clone(), &formats, &codes);
    let rows = match output {
        Some(path) if exporter.file_extension() == "zip" || path.is_dir() => {
            let mut sink = DirSink::new(path);
            let rows = export.write(cursor, options, &mut sink)?;
            for file in sink.written() {
                info!(path = %file.display(), "wrote");
            }
            rows
        }
        Some(path) => {
            let file = std::io::BufWriter::new(fs::File::create(path)?);
            export.write(cursor, options, &mut StreamSink::new(file))?
        }
        None => {
            let stdout = std::io::stdout();
            export.write(cursor, options, &mut StreamSink::new(stdout.lock()))?
        }
    };
    info!(rows, exporter = exporter.short_name(), "export complete");
    Ok(())
}

fn cmd_check(settings: &Settings, source: &Source, documents: &Documents) -> Result<()> {
    let session = open_session(settings, source)?;
    let (context, view) = parse_documents(settings, &session, documents)?;
    let mut out = serde_json::Map::new();
    if let Some(context) = &context {
        out.insert("context".into(), context.to_json());
        out.insert("context_valid".into(), context.is_valid().into());
    }
    if let Some(view) = &view {
        out.insert("view".into(), view.to_json());
        out.insert("view_valid".into(), view.is_valid().into());
    }
    println!("{}", serde_json::to_string_pretty(&Json::Object(out))?);
    Ok(())
}
