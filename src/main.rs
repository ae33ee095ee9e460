use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use staticserver::config::{ self, Config };
use staticserver::Server;
use tracing::{ info, warn };
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "staticserver", version, about = "Serve a directory over HTTP/1.1")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Document root
    #[arg(short, long)]
    root: Option<PathBuf>,

    #[arg(short, long)]
    workers: Option<usize>,

    /// Validate the configuration, log it and exit
    #[arg(long)]
    check: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber
        ::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    let args = Args::parse();
    let cfg = load_config(&args)?;

    if args.check {
        log_config(&cfg);
        return Ok(());
    }

    let mut server = Server::new(cfg).context("failed to start server")?;
    server.bind()?;

    let handle = server.shutdown_handle();
    ctrlc
        ::set_handler(move || {
            info!("shutdown requested");
            handle.shutdown();
        })
        .context("failed to install signal handler")?;

    server.run()?;
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut cfg = if args.config.exists() {
        config::parse_config(&args.config).with_context(||
            format!("cannot load {}", args.config.display())
        )?
    } else {
        warn!(path = %args.config.display(), "config file not found, using defaults");
        Config::default()
    };

    if let Some(host) = &args.host {
        cfg.host = host.clone();
    }
    if let Some(port) = args.port {
        cfg.port = port;
    }
    if let Some(root) = &args.root {
        cfg.document_root = root.clone();
    }
    if let Some(workers) = args.workers {
        cfg.workers = workers;
    }

    config::parser::validate(&cfg)?;
    Ok(cfg)
}

fn log_config(cfg: &Config) {
    info!(
        host = %cfg.host,
        port = cfg.port,
        document_root = %cfg.document_root.display(),
        workers = cfg.workers,
        max_connections = cfg.max_connections,
        read_buffer_size = cfg.read_buffer_size,
        write_buffer_size = cfg.write_buffer_size,
        max_path_len = cfg.max_path_len,
        events_capacity = cfg.events_capacity,
        linger_reset = cfg.linger_reset,
        reject_traversal = cfg.reject_traversal,
        "configuration is valid"
    );
}
