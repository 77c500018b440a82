use {
    crate::cli::{generate_cli, Mode, ProgramArgs},
    lazy_static::lazy_static,
    tracing_subscriber::{EnvFilter, FmtSubscriber},
};

mod cli;
mod error;
mod master;
mod slave;

mod prelude {
    pub use {
        crate::error::{Error as CrateError, Result},
        tracing::{debug, error, info, trace, warn},
    };
}

use crate::prelude::*;

lazy_static! {
    static ref ARGS: ProgramArgs = ProgramArgs::init(generate_cli());
}

/// Must run before ARGS is first dereferenced, otherwise logs generated
/// during CLI parsing are silently dropped.
fn init_logging() {
    let root_subscriber = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::default().add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        }))
        .finish();
    tracing::subscriber::set_global_default(root_subscriber).expect("Failed to init logging");
    info!("<== Logs Start ==>");
}

fn main() {
    init_logging();
    let outcome = match ARGS.mode() {
        Mode::Master {
            listen,
            slaves,
            scripts,
            log_dir,
        } => master::run(*listen, *slaves, scripts, log_dir.as_deref()),
        Mode::Slave { connect, id, sut } => slave::run(*connect, id, sut.as_deref()),
    };
    if let Err(err) = outcome {
        error!("{}", err);
        std::process::exit(1);
    }
}
