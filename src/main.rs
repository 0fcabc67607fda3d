use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pixgate::cache::{FileCache, derive_key};
use pixgate::codec::UrlCodec;
use pixgate::config::{self, Config};
use pixgate::descriptor::{Fit, Format, TransformDescriptor};
use pixgate::fetch::{HttpFetcher, SourceFetcher};
use pixgate::handler::TransformHandler;
use pixgate::imaging::{ImageBackend, RustBackend};
use pixgate::server;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_LOG_FILTER: &str = "pixgate=info,tower_http=info";

#[derive(Parser)]
#[command(name = "pixgate")]
#[command(about = "On-demand image transform server with a content-addressed disk cache")]
#[command(long_about = "\
On-demand image transform server with a content-addressed disk cache

Every transform is addressed by a URL on the configured image route:

  GET /api/image?source=<url>&w=<px>&h=<px>&fit=<mode>&fmt=<format>&q=<0-100>

  source   absolute http(s) URL of the original image (required)
  w, h     target box in pixels
  fit      cover | contain | fill | inside (default) | outside
  fmt      webp | avif; omit to keep the source format
  q        encoder quality, clamped to 0-100 (default 100)

Requests that differ only in parameter order, default-valued or unknown
parameters share one canonical URL and therefore one cache entry.

Run 'pixgate gen-config' to generate a documented pixgate.toml.")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./pixgate.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "pixgate=trace" (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP transform server
    Serve {
        /// Socket address to bind, overrides server.listen
        #[arg(long)]
        listen: Option<String>,
        /// Cache directory, overrides cache.dir
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Print the canonical transform URL for a source image
    Url {
        #[arg(long)]
        source: String,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        width: Option<u32>,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        height: Option<u32>,
        #[arg(long)]
        fit: Option<Fit>,
        #[arg(long)]
        format: Option<Format>,
        #[arg(long)]
        quality: Option<i64>,
    },
    /// Show the canonical URL, cache key, and cache files for a request URL
    Key {
        /// Absolute URL or /path?query on the image route
        url: String,
    },
    /// Print a stock pixgate.toml with all options documented
    GenConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;

    match cli.command {
        Command::Serve { listen, cache_dir } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(listen) = listen {
                config.server.listen = listen;
            }
            if let Some(dir) = cache_dir {
                config.cache.dir = dir;
            }
            config.validate()?;
            serve(config).await?;
        }
        Command::Url {
            source,
            width,
            height,
            fit,
            format,
            quality,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let codec = UrlCodec::from_url(config.server.route_url()?);
            let mut descriptor = TransformDescriptor::new(source);
            descriptor.w = width;
            descriptor.h = height;
            if let Some(fit) = fit {
                descriptor = descriptor.with_fit(fit);
            }
            if let Some(format) = format {
                descriptor = descriptor.with_format(format);
            }
            if let Some(q) = quality {
                descriptor = descriptor.with_quality(q);
            }
            println!("{}", codec.encode(&descriptor));
        }
        Command::Key { url } => {
            let config = load_config(cli.config.as_deref())?;
            let codec = UrlCodec::from_url(config.server.route_url()?);
            let canonical = codec.canonicalize(&url)?;
            let key = derive_key(&canonical);
            let cache = FileCache::new(config.cache.resolve_dir(&std::env::current_dir()?));
            let paths = cache.paths(&key)?;
            println!("canonical: {}", canonical);
            println!("key:       {}", key);
            println!("body:      {}", paths.body.display());
            println!("metadata:  {}", paths.meta.display());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// `--log-level` wins over `RUST_LOG`, which wins over the built-in default.
fn init_tracing(log_level: Option<&str>) -> Result<()> {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}

/// An explicit `--config` must exist; the implicit `./pixgate.toml` may not.
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            if !path.exists() {
                bail!("config file not found: {}", path.display());
            }
            info!("Loading configuration from {}", path.display());
            Ok(config::load_config(path)?)
        }
        None => Ok(config::load_config(Path::new(config::DEFAULT_CONFIG_FILE))?),
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("pixgate v{}", env!("CARGO_PKG_VERSION"));
    init_thread_pool(&config.processing);

    let route_url = config.server.route_url()?;
    let route_path = route_url.path().to_string();
    let validator = config.sources.validator()?;
    let fetcher = HttpFetcher::new(config.fetch.limits(), validator.clone())
        .context("failed to build HTTP client")?;
    let cache_root = config.cache.resolve_dir(&std::env::current_dir()?);
    info!("Cache directory: {}", cache_root.display());
    match &config.sources.allowed_hosts {
        Some(hosts) => info!("Allowed source hosts: {:?}", hosts),
        None => info!("Allowed source hosts: any"),
    }

    let handler = TransformHandler::new(
        UrlCodec::from_url(route_url),
        FileCache::new(cache_root),
        validator,
        Arc::new(fetcher) as Arc<dyn SourceFetcher>,
        Arc::new(RustBackend::new()) as Arc<dyn ImageBackend>,
    )
    .with_cache_control(config.server.cache_control.clone());

    let addr = config.server.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Image route: {}", route_path);
    server::serve(listener, server::router(Arc::new(handler), &route_path)).await?;
    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    if rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .is_ok()
    {
        info!("Transform workers: {}", threads);
    }
}
