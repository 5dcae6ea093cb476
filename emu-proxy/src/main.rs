use anyhow::{Context, Result};
use clap::{App, Arg, ArgMatches};
use crossbeam::channel::{unbounded, Receiver, SendError};
use emu_core::processor::TunnelRewrite;
use emu_core::state::TranslationTable;
use emu_transport::k12::K12Monitor;
use emu_transport::mbuf::{HeapPool, Mbuf, MbufPool};
use emu_transport::{FrameTransport, TransportConfig};
use std::fs::File;
use std::io::BufReader;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const STATS_INTERVAL: Duration = Duration::from_secs(10);

fn args() -> ArgMatches<'static> {
    App::new("emu-proxy")
        .version("0.1")
        .author("emu contributors")
        .about("Runs one end of the emulator frame transport")
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Base port; the transport uses PORT and PORT+1")
                .default_value("4510")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("server")
                .short("s")
                .long("server")
                .value_name("HOST")
                .help("Use tcp to HOST instead of ipc sockets")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("ipc_prefix")
                .long("ipc-prefix")
                .value_name("PATH")
                .help("Path prefix of the ipc sockets")
                .conflicts_with("server")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("proxy")
                .long("proxy")
                .help("Bind as the routing proxy side instead of connecting as the emulator"),
        )
        .arg(
            Arg::with_name("table")
                .short("t")
                .long("table")
                .value_name("FILE")
                .help("Tunnel key translation table, one `local routed` pair per line")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("routed_vport")
                .long("routed-vport")
                .value_name("VPORT")
                .help("Virtual port of the routed domain")
                .default_value("1")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("rewrite")
                .long("rewrite")
                .help("Enable tunnel key rewriting without the environment switch"),
        )
        .arg(
            Arg::with_name("echo")
                .long("echo")
                .help("Send every delivered frame back out on its virtual port"),
        )
        .arg(
            Arg::with_name("monitor")
                .short("m")
                .long("monitor")
                .help("Dump every frame to stdout in K12 text format"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Log at debug level unless RUST_LOG says otherwise"),
        )
        .get_matches()
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .ok();
}

fn parse_u16(matches: &ArgMatches, name: &str) -> Result<u16> {
    let value = matches.value_of(name).unwrap_or_default();
    value
        .parse()
        .with_context(|| format!("invalid --{} {:?}", name.replace('_', "-"), value))
}

fn transport_config(matches: &ArgMatches) -> Result<TransportConfig> {
    let mut config = TransportConfig::new(parse_u16(matches, "port")?)
        .proxy_mode(matches.is_present("proxy"))
        .tunnel_rewrite(matches.is_present("rewrite"))
        .from_env();
    if let Some(host) = matches.value_of("server") {
        config = config.tcp(host);
    } else if let Some(prefix) = matches.value_of("ipc_prefix") {
        config = config.ipc(prefix);
    }
    Ok(config)
}

fn load_table(path: &str) -> Result<TranslationTable> {
    let file = File::open(path).with_context(|| format!("cannot open table {}", path))?;
    let table = TranslationTable::new();
    let added = table
        .load(BufReader::new(file))
        .with_context(|| format!("cannot load table {}", path))?;
    info!(path, pairs = added, "translation table loaded");
    Ok(table)
}

/// Drains the transport until `running` clears. Frames the handler set aside for echo go
/// back out on the port they came in on.
fn drive(mut transport: FrameTransport, echo: Receiver<Mbuf>, running: Arc<AtomicBool>) {
    let mut last_report = Instant::now();
    while running.load(Ordering::Acquire) {
        transport.recv_timeout(POLL_INTERVAL);
        for frame in echo.try_iter() {
            transport.send(frame);
        }
        transport.flush();
        if last_report.elapsed() >= STATS_INTERVAL {
            info!(stats = %transport.stats(), "transport counters");
            last_report = Instant::now();
        }
    }
    for frame in echo.try_iter() {
        transport.pool().free(frame);
    }
    info!(stats = %transport.stats(), "final counters");
    transport.close();
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = args();
    init_logging(matches.is_present("verbose"));

    let config = transport_config(&matches)?;
    let routed_vport = parse_u16(&matches, "routed_vport")?;
    let rewrite = match matches.value_of("table") {
        Some(path) => Some(TunnelRewrite::new(Arc::new(load_table(path)?), routed_vport)),
        None => None,
    };
    if config.tunnel_rewrite && rewrite.is_none() {
        warn!("rewriting enabled without --table, every frame will be delivered");
    } else if !config.tunnel_rewrite && rewrite.is_some() {
        warn!("--table given but rewriting is off, set --rewrite or the environment switch");
    }

    let pool = Arc::new(HeapPool::new());
    let mut transport = match FrameTransport::create(config.clone(), pool.clone()) {
        Ok(transport) => transport,
        Err(e) => {
            error!(error = %e, port = config.port, "cannot create transport");
            process::exit(1);
        }
    };
    if let Some(rewrite) = rewrite {
        transport = transport.with_tunnel_rewrite(rewrite);
    }
    if matches.is_present("monitor") {
        transport.set_monitor(K12Monitor::stdout());
    }

    let echo = matches.is_present("echo");
    let (echo_tx, echo_rx) = unbounded();
    let handler_pool = Arc::clone(&pool);
    let deliver = move |m: Mbuf| {
        if echo {
            if let Err(SendError(m)) = echo_tx.send(m) {
                handler_pool.free(m);
            }
        } else {
            handler_pool.free(m);
        }
    };
    if config.proxy_mode {
        transport.set_proxy_handler(deliver);
    } else {
        transport.set_handler(deliver);
    }
    transport
        .start_rx()
        .context("cannot start the receive worker")?;

    let running = Arc::new(AtomicBool::new(true));
    let worker = {
        let running = Arc::clone(&running);
        tokio::task::spawn_blocking(move || drive(transport, echo_rx, running))
    };

    tokio::signal::ctrl_c().await.context("cannot wait for ctrl-c")?;
    info!("shutting down");
    running.store(false, Ordering::Release);
    worker.await.context("drive loop panicked")?;
    Ok(())
}
