#![allow(deprecated)]
use {
    clap::{crate_version, App, Arg, SubCommand},
    std::{
        net::SocketAddr,
        path::{Path, PathBuf},
    },
};

pub fn generate_cli<'a, 'b>() -> App<'a, 'b> {
    App::new("tugframe")
        .about("Drives SUT processes and coordinates harness peers over TCP")
        .version(crate_version!())
        .subcommand(
            SubCommand::with_name("master")
                .about("Listen for slave harnesses and drive the scripted workload")
                .arg(
                    Arg::with_name("listen")
                        .short("l")
                        .long("listen")
                        .takes_value(true)
                        .value_name("HOST:PORT")
                        .default_value("127.0.0.1:49200")
                        .validator(validate_addr)
                        .help("Address to listen on for slave connections"),
                )
                .arg(
                    Arg::with_name("slaves")
                        .short("n")
                        .long("slaves")
                        .takes_value(true)
                        .value_name("COUNT")
                        .default_value("1")
                        .validator(|val| {
                            val.parse::<usize>()
                                .map(|_| ())
                                .map_err(|_| format!("'{}' is not a valid count", &val))
                        })
                        .help("Number of slave harnesses to wait for before starting"),
                )
                .arg(
                    Arg::with_name("scripts")
                        .short("s")
                        .long("scripts")
                        .takes_value(true)
                        .value_name("PATH")
                        .required(true)
                        .validator(validate_path)
                        .help("Workload configuration, one REMOTE line per script run"),
                )
                .arg(
                    Arg::with_name("log-dir")
                        .long("log-dir")
                        .takes_value(true)
                        .value_name("PATH")
                        .help("Directory for per-script result logs (stderr if omitted)"),
                ),
        )
        .subcommand(
            SubCommand::with_name("slave")
                .about("Connect to a master harness and execute scripts on its behalf")
                .arg(
                    Arg::with_name("connect")
                        .short("c")
                        .long("connect")
                        .takes_value(true)
                        .value_name("HOST:PORT")
                        .required(true)
                        .validator(validate_addr)
                        .help("Master harness address"),
                )
                .arg(
                    Arg::with_name("id")
                        .long("id")
                        .takes_value(true)
                        .value_name("NAME")
                        .default_value("slave-0")
                        .help("Identifier reported to the master"),
                )
                .arg(
                    Arg::with_name("sut")
                        .long("sut")
                        .takes_value(true)
                        .value_name("COMMAND")
                        .help("SUT command line to spawn and drive through its pipes"),
                ),
        )
}

fn validate_addr(val: String) -> Result<(), String> {
    val.parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| format!("'{}' is not a valid host:port address", &val))
}

fn validate_path(val: String) -> Result<(), String> {
    if Path::new(&val).exists() {
        Ok(())
    } else {
        Err(format!("'{}' does not exist or is an invalid path", &val))
    }
}

pub enum Mode {
    Master {
        listen: SocketAddr,
        slaves: usize,
        scripts: PathBuf,
        log_dir: Option<PathBuf>,
    },
    Slave {
        connect: SocketAddr,
        id: String,
        sut: Option<String>,
    },
}

pub struct ProgramArgs {
    mode: Mode,
}

impl ProgramArgs {
    /// Retains the user's configuration from the CLI. Validators above
    /// guarantee every `unwrap` here.
    pub fn init(cli: App<'_, '_>) -> Self {
        let store = cli.get_matches();

        let mode = match store.subcommand() {
            ("master", Some(sub)) => Mode::Master {
                listen: sub.value_of("listen").unwrap().parse().unwrap(),
                slaves: sub.value_of("slaves").unwrap().parse().unwrap(),
                scripts: PathBuf::from(sub.value_of("scripts").unwrap()),
                log_dir: sub.value_of("log-dir").map(PathBuf::from),
            },
            ("slave", Some(sub)) => Mode::Slave {
                connect: sub.value_of("connect").unwrap().parse().unwrap(),
                id: sub.value_of("id").unwrap().to_string(),
                sut: sub.value_of("sut").map(str::to_string),
            },
            _ => {
                eprintln!("a subcommand is required, see --help");
                std::process::exit(2);
            }
        };

        Self { mode }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }
}
