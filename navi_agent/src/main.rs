use clap::Parser;
use flexi_logger::{Duplicate, FileSpec, Logger};
use log::{error, info};
use navi_agent::{
    target::{Module, SimSystem},
    AgentResult, Debugger, Session, TcpServer, DEFAULT_PORT,
};

/// Debug agent serving the NAVI remote debugging protocol.
///
/// Binds a TCP port, waits for one frontend connection, and debugs the
/// selected target until the frontend detaches or disconnects.
#[derive(Debug, Parser)]
#[clap(name = "navi-agent", version)]
struct Args {
    /// Path of the executable to debug. Without a target the frontend is
    /// asked to select one.
    target: Option<String>,

    /// Port to listen on.
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Verbose output; pass twice for trace output.
    #[clap(short, long, parse(from_occurrences))]
    verbose: u32,

    /// Also write the log to this file.
    #[clap(short, long)]
    logfile: Option<String>,

    /// Arguments passed to the debuggee.
    #[clap(last = true)]
    argv: Vec<String>,
}

// The handle must stay alive for the duration of the program, otherwise
// the writers shut down.
fn init_logger(args: &Args) -> flexi_logger::LoggerHandle {
    let spec = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let logger = Logger::try_with_env_or_str(spec).unwrap_or_else(|e| {
        eprintln!("Error: logger initialization failed: {e}");
        std::process::exit(1);
    });
    let result = if let Some(logfile) = &args.logfile {
        let file_spec = FileSpec::try_from(logfile.as_str()).unwrap_or_else(|e| {
            eprintln!("Error: invalid log file name {logfile}: {e}");
            std::process::exit(1);
        });
        logger
            .log_to_file(file_spec)
            .duplicate_to_stderr(Duplicate::All)
            .start()
    } else {
        logger.start()
    };
    result.unwrap_or_else(|e| {
        eprintln!("Error: logger initialization failed: {e}");
        std::process::exit(1);
    })
}

// The built-in target: a small simulated process. Real platform backends
// plug in through the library API.
fn build_backend(target: Option<&str>) -> SimSystem {
    let name = target
        .map(|t| {
            t.rsplit(|c| c == '/' || c == '\\')
                .next()
                .unwrap_or(t)
                .to_string()
        })
        .unwrap_or_else(|| "sim-target".to_string());
    SimSystem::builder()
        .region(0x40_0000, vec![0x90; 0x1000])
        .region(0x7f_0000, vec![0; 0x1000])
        .thread(1, 0x40_0000)
        .module(Module {
            name: name.clone(),
            path: target.unwrap_or("sim://target").to_string(),
            base_address: 0x40_0000,
            size: 0x1000,
        })
        .process(&name, 4711)
        .build()
}

fn run(args: &Args) -> AgentResult<()> {
    let transport = TcpServer::bind(args.port)?;
    let backend = Box::new(build_backend(args.target.as_deref()));
    let debugger = match &args.target {
        Some(path) => Debugger::with_executable(backend, path, args.argv.clone()),
        None => Debugger::new(backend),
    };
    Session::new(transport, debugger).run()
}

fn main() {
    let args = Args::parse();
    let _log_handle = init_logger(&args);
    info!("navi-agent starting on port {}", args.port);
    if let Err(e) = run(&args) {
        error!("Session failed: {e}");
        std::process::exit(1);
    }
}
