use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use metmar_core::bulletin::BulletinSchema;
use metmar_core::config::{DEFAULT_CONFIG_FILENAME, MetmarConfig, load_config, normalize_prefix};
use metmar_core::fetch::UpstreamClient;
use metmar_core::forecasts::{fetch_forecasts, find_forecast};
use metmar_core::gale::extract_warnings;
use metmar_core::server::{BulletinSite, ForecastSite, GaleSite, Handler, SharedFetch, serve};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "metmar=info,metmar_core=info";

#[derive(Debug, Parser)]
#[command(
    name = "metmar",
    version,
    about = "Marine weather bulletins as plain text, and the gale warning chart"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Serve the area index and one report per area")]
    Serve(ServeArgs),
    #[command(about = "Serve the single configured bulletin at /")]
    Bulletin(BulletinArgs),
    #[command(about = "Serve the gale warning chart built from saved bulletins")]
    Gale(GaleArgs),
    #[command(about = "Fetch one area and print its report")]
    Parse(ParseArgs),
    #[command(about = "Print the gap-filled gale warning timeline of a directory")]
    Timeline(TimelineArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[arg(long, value_name = "ADDR", help = "HTTP listening address")]
    http: Option<String>,
    #[arg(long, value_name = "PREFIX", help = "Route prefix")]
    prefix: Option<String>,
}

#[derive(Debug, Args)]
struct BulletinArgs {
    #[arg(long, value_name = "ADDR", help = "HTTP listening address")]
    http: Option<String>,
    #[arg(long, value_name = "URL", help = "Upstream bulletin URL")]
    url: Option<String>,
    #[arg(
        long,
        value_name = "SCHEMA",
        help = "Upstream document layout (single-area|coastal-pair)"
    )]
    schema: Option<String>,
}

#[derive(Debug, Args)]
struct GaleArgs {
    #[arg(value_name = "FORECASTDIR", help = "Directory of saved bulletins")]
    forecast_dir: PathBuf,
    #[arg(long, value_name = "ADDR", help = "HTTP listening address")]
    http: Option<String>,
    #[arg(long, value_name = "PREFIX", help = "Route prefix")]
    prefix: Option<String>,
    #[arg(long, value_name = "PATH", help = "Chart page template")]
    template: Option<PathBuf>,
    #[arg(long, value_name = "PATH", help = "Directory served under /scripts/")]
    scripts: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ParseArgs {
    id: String,
}

#[derive(Debug, Args)]
struct TimelineArgs {
    dir: PathBuf,
}

struct Runtime {
    config_path: PathBuf,
    config: MetmarConfig,
    diagnostics: bool,
}

impl Runtime {
    fn from_cli(cli: &Cli) -> Result<Self> {
        let config_path = cli
            .config
            .clone()
            .or_else(|| env::var_os("METMAR_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));
        let config = load_config(&config_path)?;
        Ok(Self {
            config_path,
            config,
            diagnostics: cli.diagnostics,
        })
    }

    fn print_diagnostics(&self, http: &str, prefix: &str) {
        if !self.diagnostics {
            return;
        }
        println!("[diagnostics]");
        println!("config: {}", display_config_path(&self.config_path));
        println!("http: {http}");
        println!(
            "prefix: {}",
            if prefix.is_empty() { "/" } else { prefix }
        );
        println!("user_agent: {}", self.config.user_agent());
        println!("timeout_ms: {}", self.config.timeout().as_millis());
    }
}

fn display_config_path(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (missing, using defaults)", path.display())
    }
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve(ref args)) => run_serve(&Runtime::from_cli(&cli)?, args),
        Some(Commands::Bulletin(ref args)) => run_bulletin(&Runtime::from_cli(&cli)?, args),
        Some(Commands::Gale(ref args)) => run_gale(&Runtime::from_cli(&cli)?, args),
        Some(Commands::Parse(ref args)) => run_parse(&Runtime::from_cli(&cli)?, args),
        Some(Commands::Timeline(ref args)) => run_timeline(args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn resolve_prefix(runtime: &Runtime, flag: Option<&str>) -> String {
    match flag {
        Some(prefix) => normalize_prefix(prefix),
        None => runtime.config.prefix(),
    }
}

fn resolve_http(runtime: &Runtime, flag: Option<&str>) -> String {
    flag.map(str::to_string)
        .unwrap_or_else(|| runtime.config.http_addr())
}

fn upstream(runtime: &Runtime) -> Result<SharedFetch> {
    Ok(Box::new(UpstreamClient::from_config(&runtime.config)?))
}

fn run_serve(runtime: &Runtime, args: &ServeArgs) -> Result<()> {
    let http = resolve_http(runtime, args.http.as_deref());
    let prefix = resolve_prefix(runtime, args.prefix.as_deref());
    runtime.print_diagnostics(&http, &prefix);
    let site = ForecastSite::new(
        upstream(runtime)?,
        runtime.config.forecast_source()?,
        &prefix,
        &runtime.config.index_title(),
    );
    info!(http = %http, prefix = %prefix, "serving area reports");
    serve(&http, Arc::new(site) as Arc<dyn Handler>)
}

fn run_bulletin(runtime: &Runtime, args: &BulletinArgs) -> Result<()> {
    let http = resolve_http(runtime, args.http.as_deref());
    runtime.print_diagnostics(&http, "");
    let url = args
        .url
        .clone()
        .unwrap_or_else(|| runtime.config.bulletin_url());
    let schema = match args.schema.as_deref() {
        Some(value) => BulletinSchema::parse(value)?,
        None => runtime.config.bulletin_schema(),
    };
    let site = BulletinSite::new(upstream(runtime)?, schema, &url);
    info!(http = %http, url = %url, schema = schema.as_str(), "serving bulletin");
    serve(&http, Arc::new(site) as Arc<dyn Handler>)
}

fn run_gale(runtime: &Runtime, args: &GaleArgs) -> Result<()> {
    if !args.forecast_dir.is_dir() {
        bail!(
            "forecast directory not found: {}",
            args.forecast_dir.display()
        );
    }
    let http = resolve_http(runtime, args.http.as_deref());
    let prefix = resolve_prefix(runtime, args.prefix.as_deref());
    runtime.print_diagnostics(&http, &prefix);
    let template = args
        .template
        .clone()
        .unwrap_or_else(|| PathBuf::from(runtime.config.gale_template()));
    let scripts = args
        .scripts
        .clone()
        .unwrap_or_else(|| PathBuf::from(runtime.config.scripts_dir()));
    let site = GaleSite::new(&args.forecast_dir, &template, &scripts, &prefix)?;
    info!(
        http = %http,
        prefix = %prefix,
        forecast_dir = %args.forecast_dir.display(),
        "serving gale chart"
    );
    serve(&http, Arc::new(site) as Arc<dyn Handler>)
}

fn run_parse(runtime: &Runtime, args: &ParseArgs) -> Result<()> {
    let fetcher = upstream(runtime)?;
    let source = runtime.config.forecast_source()?;
    let forecasts = fetch_forecasts(fetcher.as_ref(), &source)?;
    let forecast = find_forecast(forecasts, &args.id)?;
    print!("{}", forecast.content);
    Ok(())
}

fn run_timeline(args: &TimelineArgs) -> Result<()> {
    let timeline = extract_warnings(&args.dir)?;
    for warning in &timeline {
        println!(
            "{} {}",
            warning.timestamp.format("%Y-%m-%d %H:%M:%S"),
            warning.number
        );
    }
    Ok(())
}
