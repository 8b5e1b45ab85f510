//! sockguardd: a SOCKS5 proxy that relays only the connections its rules allow.
use std::io;
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser;
use log::*;

use sockguard as sg;

#[derive(Parser, Debug)]
#[command(name = "sockguardd", version, about)]
struct Opt {
    /// Address to listen on (addr:port)
    #[arg(short, long)]
    listen: Option<String>,

    /// Allowed connections: 'cidr:port->cidr:port,...'
    #[arg(short, long)]
    allow: Option<String>,

    /// Denied connections: 'cidr:port->cidr:port,...'
    #[arg(short, long)]
    deny: Option<String>,

    /// Path to a config file (format: yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Grace period for connections on SIGINT
    #[arg(long)]
    interrupt_timeout_ms: Option<u64>,

    /// Grace period for connections on SIGTERM
    #[arg(long)]
    graceful_timeout_ms: Option<u64>,
}

impl Opt {
    fn settings(&self) -> sg::Settings {
        sg::Settings {
            listen: self.listen.clone(),
            allow: self.allow.iter().cloned().collect(),
            deny: self.deny.iter().cloned().collect(),
            interrupt_timeout_ms: self.interrupt_timeout_ms,
            graceful_timeout_ms: self.graceful_timeout_ms,
        }
    }
}

fn load_config(opt: &Opt) -> anyhow::Result<sg::ServerConfig> {
    let file = match &opt.config {
        Some(path) => sg::Settings::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => sg::Settings::default(),
    };
    Ok(file.merge(opt.settings()).build()?)
}

fn set_handler(signals: &[i32], handler: impl Fn(i32) + Send + 'static) -> io::Result<()> {
    use signal_hook::iterator::Signals;
    let mut signals = Signals::new(signals)?;
    std::thread::Builder::new()
        .name("signal".to_owned())
        .spawn(move || signals.forever().for_each(handler))?;
    Ok(())
}

fn run() -> anyhow::Result<i32> {
    use signal_hook::consts::{SIGINT, SIGTERM};

    let opt = Opt::parse();
    debug!("option: {:?}", opt);

    let config = load_config(&opt)?;
    info!("config: {}", config);

    let interrupt = config.interrupt();
    let graceful = config.graceful();
    let (mut server, tx) = sg::Server::new(config).context("creating server")?;
    set_handler(&[SIGINT, SIGTERM], move |signal| {
        let termination = match signal {
            SIGINT => interrupt,
            SIGTERM => graceful,
            _ => return,
        };
        info!("caught {} timeout={:?}", termination.kind, termination.timeout);
        if tx.try_send(sg::ServerCommand::Terminate(termination)).is_err() {
            debug!("termination already requested");
        }
    })
    .context("setting signal handler")?;

    let report = server.serve().context("server error")?;
    Ok(report.exit_code())
}

/// The startup report must reach the user even when logging is turned off.
fn report_fatal(err: &anyhow::Error, logged: bool, stderr: &mut impl io::Write) {
    if logged {
        error!("{:#}", err);
    } else {
        writeln!(stderr, "{:#}", err).ok();
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    match run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            report_fatal(&err, log_enabled!(Level::Error), &mut io::stderr());
            process::exit(1);
        }
    }
}
