//! `vm`: loads a Toy VM image and executes it (§6.4).

use clap::{App, Arg};
use std::fs;
use std::io;
use std::path::PathBuf;
use tvm::vm::{self, LoadError, Vm, VmError};

#[derive(Debug)]
enum Error {
    Io(io::Error, PathBuf),
    Load(LoadError),
    Run(VmError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(e, path) => write!(f, "reading image \"{}\": {}", path.display(), e),
            Error::Load(e) => write!(f, "loading image: {}", e),
            Error::Run(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<LoadError> for Error {
    fn from(e: LoadError) -> Self {
        Error::Load(e)
    }
}

impl From<VmError> for Error {
    fn from(e: VmError) -> Self {
        Error::Run(e)
    }
}

fn run(image_path: &str, trace: bool, interactive: bool) -> Result<(), Error> {
    let bytes = fs::read(image_path).map_err(|e| Error::Io(e, PathBuf::from(image_path)))?;
    let mut machine = Vm::new(&bytes)?;
    machine.trace = trace;

    if interactive {
        vm::interactive::run_interactive(machine).map_err(|e| Error::Io(e, PathBuf::from(image_path)))?;
        Ok(())
    } else {
        machine.run()?;
        log::info!("executed {} instructions", machine.instructions_executed());
        Ok(())
    }
}

fn main() {
    env_logger::init();

    let matches = App::new("vm")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs a Toy VM image")
        .arg(
            Arg::with_name("input")
                .short("i")
                .long("input")
                .takes_value(true)
                .required(true)
                .value_name("IMAGE")
                .help("Image file to execute"),
        )
        .arg(
            Arg::with_name("trace")
                .short("t")
                .long("trace")
                .help("Log every instruction as it executes"),
        )
        .arg(
            Arg::with_name("interactive")
                .short("I")
                .long("interactive")
                .help("Drop into the interactive driver instead of running to completion"),
        )
        .get_matches();

    let result = run(
        matches.value_of("input").expect("-i is required"),
        matches.is_present("trace"),
        matches.is_present("interactive"),
    );

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
