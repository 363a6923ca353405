//! Connect to a running gpsd instance and show human readable output.

mod logging;

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use clap::Parser;
use gpsdclient::{
    Result,
    classify::ClassifyOptions,
    client::{
        SessionConfig,
        blocking::{GpsdSession, ShutdownHandle},
    },
    error::GpsdClientError,
    filter::ClassFilter,
    protocol::{DEFAULT_HOST, DEFAULT_PORT},
    render::{ReadableRenderer, parse_sky_fields, sky_line},
};

use crate::logging::{LogFormat, LogLevel, init_logging};

type Session = GpsdSession<std::net::TcpStream>;

#[derive(Parser, Debug)]
#[command(
    name = "gpsdclient",
    version,
    about = "Connect to a running gpsd instance and show human readable output"
)]
struct Args {
    /// The host running gpsd.
    #[arg(long, env = "GPSD_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// gpsd port.
    #[arg(long, env = "GPSD_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Output as JSON strings.
    #[arg(long)]
    json: bool,

    /// Output the values of the specified fields of a single SKY response and
    /// exit (e.g. --sky=nSat,uSat).
    #[arg(long, value_name = "FIELDS")]
    sky: Option<String>,

    /// Give up when gpsd sends nothing for this many seconds.
    #[arg(long, value_name = "SECS")]
    read_timeout: Option<u64>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "error")]
    log_level: LogLevel,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.host.clone(), self.port)
            .read_timeout(self.read_timeout.map(Duration::from_secs))
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.log_format, args.log_level);

    std::process::exit(run(&args));
}

fn run(args: &Args) -> i32 {
    // --json takes precedence over --sky
    let sky_fields = match args.sky.as_deref().filter(|_| !args.json) {
        Some(list) => match parse_sky_fields(list) {
            Ok(fields) => Some(fields),
            Err(err) => {
                println!("{err}");
                return 1;
            }
        },
        None => None,
    };

    let interrupt = Interrupt::default();
    interrupt.install();

    let opened = Session::open_with(&args.session_config());
    if interrupt.is_set() {
        println!();
        return 0;
    }
    let mut session = match opened {
        Ok(session) => session,
        Err(err) => {
            println!("{err}");
            return 1;
        }
    };

    interrupt.attach(&session);
    // an interrupt that landed before attach found no socket to shut down
    if interrupt.is_set() {
        println!();
        return 0;
    }

    let result = if args.json {
        stream_json(&mut session)
    } else if let Some(fields) = sky_fields {
        print_sky(&mut session, &fields)
    } else {
        stream_readable(&mut session)
    };

    if interrupt.is_set() {
        println!();
        return 0;
    }

    match result.and_then(|()| session.close()) {
        Ok(()) => 0,
        Err(err) => {
            println!("{err}");
            1
        }
    }
}

/// Ctrl-C state shared with the signal handler
///
/// The handler is installed before connecting. Once a session exists its
/// socket is attached, and an interrupt shuts it down so a blocked read
/// returns immediately.
#[derive(Clone, Default)]
struct Interrupt {
    flag: Arc<AtomicBool>,
    handle: Arc<Mutex<Option<ShutdownHandle>>>,
}

impl Interrupt {
    fn install(&self) {
        let interrupt = self.clone();
        if let Err(err) = ctrlc::set_handler(move || interrupt.trigger()) {
            tracing::warn!(error = %err, "failed to install interrupt handler");
        }
    }

    fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let Ok(slot) = self.handle.lock() else {
            return;
        };
        if let Some(Err(err)) = slot.as_ref().map(ShutdownHandle::shutdown) {
            tracing::warn!(error = %err, "failed to shut down connection");
        }
    }

    fn attach(&self, session: &Session) {
        let handle = match session.shutdown_handle() {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(error = %err, "interrupt handling unavailable");
                return;
            }
        };
        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }
    }

    fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

fn stream_json(session: &mut Session) -> Result<()> {
    for line in session.lines() {
        println!("{}", line?);
    }
    Ok(())
}

fn stream_readable(session: &mut Session) -> Result<()> {
    let mut renderer = ReadableRenderer::new();
    let opts = ClassifyOptions::new().convert_datetime(true);

    for report in session.reports(opts) {
        let report = match report {
            Ok(report) => report,
            Err(err) if !err.is_terminal() => {
                tracing::warn!(error = %err, "skipping report");
                continue;
            }
            Err(err) => return Err(err),
        };

        match renderer.render(&report) {
            Ok(lines) => lines.iter().for_each(|line| println!("{line}")),
            Err(err) => {
                tracing::warn!(error = %err, class = %report.class(), "cannot render report")
            }
        }
    }
    Ok(())
}

fn print_sky(session: &mut Session, fields: &[String]) -> Result<()> {
    let report = session
        .filter(ClassFilter::new(["SKY"]), ClassifyOptions::new())
        .next()
        .ok_or(GpsdClientError::SessionClosed)??;

    println!("{}", sky_line(&report, fields)?);
    Ok(())
}
