use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use visitor_filter::geoip;
use visitor_filter::visitor::signals::{
    HTTP_ACCEPT_LANGUAGE, HTTP_CLIENT_IP, HTTP_REFERER, HTTP_X_FORWARDED_FOR, REMOTE_ADDR,
};
use visitor_filter::visitor::CookieMarkers;
use visitor_filter::{FilterConfig, RequestSignals, VisitorFilter};

#[derive(Parser)]
#[command(name = "vf-check")]
#[command(about = "Evaluate one visitor against a filter policy", long_about = None)]
struct Cli {
    /// Policy file (JSON, TOML or YAML)
    #[arg(long)]
    config: PathBuf,

    /// GeoLite2/GeoIP2 Country or City database
    #[arg(long)]
    geoip: Option<PathBuf>,

    /// Client IP as sent in Client-IP
    #[arg(long)]
    client_ip: Option<String>,

    /// X-Forwarded-For chain
    #[arg(long)]
    forwarded_for: Option<String>,

    /// Socket peer address
    #[arg(long)]
    ip: Option<String>,

    /// Accept-Language header
    #[arg(long)]
    language: Option<String>,

    /// Referer header
    #[arg(long)]
    referer: Option<String>,

    /// Visitor carries the repeat-visit marker
    #[arg(long)]
    was_here: bool,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = FilterConfig::from_file(&cli.config)?;
    let lookup = geoip::lookup_for(cli.geoip.as_deref(), config.needs_geolocation())
        .context("failed to initialize GeoIP lookup")?;
    let filter = VisitorFilter::new(config, lookup);

    let mut signals = RequestSignals::new();
    for (name, value) in [
        (HTTP_CLIENT_IP, cli.client_ip),
        (HTTP_X_FORWARDED_FOR, cli.forwarded_for),
        (REMOTE_ADDR, cli.ip),
        (HTTP_ACCEPT_LANGUAGE, cli.language),
        (HTTP_REFERER, cli.referer),
    ] {
        if let Some(value) = value {
            signals = signals.with_var(name, value);
        }
    }

    let mut markers = if cli.was_here {
        CookieMarkers::from_cookie_header(&format!("{}=1", filter.marker_policy().name()))
    } else {
        CookieMarkers::default()
    };

    let evaluation = filter.evaluate_request(&signals, &mut markers)?;
    println!("{}", serde_json::to_string_pretty(&evaluation)?);

    if !markers.set_cookie_headers().is_empty() {
        eprintln!("would set: {}", markers.set_cookie_headers().join(" | "));
    }

    Ok(if evaluation.verdict.allowed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
