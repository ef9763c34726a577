use std::path::PathBuf;
use std::process;

use clap::Parser;
use env_logger::Builder;
use log::{error, info, LevelFilter};

use bgpcfgd::{serve, Options};

#[derive(Parser, Debug)]
#[clap(name = "bgpcfgd", rename_all = "kebab-case")]
/// Keeps FRR bgpd configuration in sync with the config database
struct Args {
    /// Path to the constants file (built-in defaults if not provided)
    #[clap(long)]
    constants: Option<PathBuf>,
    /// Newline-delimited JSON table events (reads stdin if not provided)
    #[clap(long)]
    events: Option<PathBuf>,
    /// vtysh binary used to talk to FRR
    #[clap(long, default_value = "vtysh")]
    vtysh: PathBuf,
    /// Don't wait for the FRR daemons before starting
    #[clap(long)]
    no_wait: bool,
    /// Show debug logs (additive for trace logs)
    #[clap(short, parse(from_occurrences))]
    verbose: u8,
}

fn main() {
    let args = Args::parse();

    let (bgpcfgd_level, other_level) = match args.verbose {
        0 => (LevelFilter::Info, LevelFilter::Warn),
        1 => (LevelFilter::Debug, LevelFilter::Warn),
        2 => (LevelFilter::Trace, LevelFilter::Warn),
        _ => (LevelFilter::Trace, LevelFilter::Trace),
    };
    Builder::new()
        .filter(Some("bgpcfgd"), bgpcfgd_level)
        .filter(None, other_level)
        .init();
    info!("Logging at levels {}/{}", bgpcfgd_level, other_level);

    let options = Options {
        constants: args.constants,
        events: args.events,
        vtysh: args.vtysh,
        wait_for_daemons: !args.no_wait,
    };
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Can't start runtime: {}", err);
            process::exit(2);
        }
    };
    if let Err(err) = runtime.block_on(serve(options)) {
        error!("{}", err);
        process::exit(err.exit_code());
    }
    info!("bgpcfgd stopped");
}
