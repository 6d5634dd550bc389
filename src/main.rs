use std::io::BufRead;

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use tcp_probe::cli::Cli;
use tcp_probe::config::{LogFormat, OutputFormat, ProbeConfig};
use tcp_probe::error::ConfigError;
use tcp_probe::prober::{Binding, TcpProber};
use tcp_probe::sink::{self, Event, FanoutSink, JsonSink, MetricsSink, Sink, TextSink};
use tcp_probe::{Controls, Monitor, Resolver, Session, SystemLookup};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config().await?;
    init_tracing(&config)?;

    let mut sink = build_sink(&config);
    let mut resolver = Resolver::new(Box::new(SystemLookup), config.resolver_preference()?)
        .with_timeout(config.resolve_timeout());
    let resolved = match resolver.resolve(&config.host).await {
        Ok(resolved) => resolved,
        Err(e) => {
            let event = Event::SessionAborted {
                hostname: config.host.clone(),
                port: config.port,
                reason: e.to_string(),
            };
            if let Err(sink_err) = sink.on_event(&event) {
                warn!(error = %sink_err, "sink failed to handle event");
            }
            return Err(e.into());
        }
    };

    let binding = config.binding();
    if let Some(Binding::Source(source)) = &binding {
        if source.is_ipv4() != resolved.address.is_ipv4() {
            return Err(ConfigError::SourceFamilyMismatch {
                source_addr: *source,
                target: resolved.address,
            }
            .into());
        }
    }

    let session = Session::new(config.host.clone(), resolved, config.port);
    info!(host = %session.hostname, address = %session.address, literal = session.literal, "resolved target");

    if let Some(addr) = config.output.metrics_addr {
        info!("serving metrics on {}", addr);
        tokio::spawn(sink::metrics::serve_metrics(addr));
    }

    let (snapshot_tx, snapshot_rx) = mpsc::channel(8);
    // Enter on stdin asks for a statistics snapshot. A plain thread, because
    // tokio's stdin would hold up runtime shutdown.
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if line.is_err() || snapshot_tx.blocking_send(()).is_err() {
                break;
            }
        }
        debug!("stdin closed, snapshot requests disabled");
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let monitor = Monitor::new(
        session,
        config.monitor_settings(),
        resolver,
        Box::new(TcpProber::new(binding)),
        sink,
    );
    monitor
        .run(Controls {
            snapshots: snapshot_rx,
            shutdown: shutdown_rx,
        })
        .await?;

    Ok(())
}

fn init_tracing(config: &ProbeConfig) -> anyhow::Result<()> {
    let log_level = config.get_tracing_level()?;
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("tcp_probe={}", log_level.as_str().to_lowercase()).parse()?);

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
    Ok(())
}

fn build_sink(config: &ProbeConfig) -> Box<dyn Sink> {
    let output: Box<dyn Sink> = match config.output.format {
        OutputFormat::Text => Box::new(
            TextSink::stdout()
                .show_timestamp(config.output.show_timestamp)
                .show_source_address(config.output.show_source_address),
        ),
        OutputFormat::Json => Box::new(JsonSink::stdout().pretty(config.output.pretty_json)),
    };

    if config.output.metrics_addr.is_none() {
        return output;
    }
    Box::new(
        FanoutSink::new()
            .with(output)
            .with(Box::new(MetricsSink::new(config.output.enable_latency_history))),
    )
}
