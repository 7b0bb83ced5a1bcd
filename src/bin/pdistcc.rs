//! `pdistcc`: intercepts a compiler invocation and runs it, in whole or
//! in part, on a remote worker.

extern crate clap;
extern crate env_logger;
extern crate pdistcc;

use std::process;

use clap::{App, AppSettings, Arg};

use pdistcc::client;
use pdistcc::command::RealRunner;
use pdistcc::compiler::{self, RawInvocation};
use pdistcc::config::ClientConfig;

fn main() {
    env_logger::init();

    let matches = App::new("pdistcc")
        .about("distcc-compatible distributed compiler wrapper")
        .setting(AppSettings::TrailingVarArg)
        .arg(
            Arg::with_name("host")
                .long("host")
                .value_name("HOST:PORT/WEIGHT")
                .multiple(true)
                .number_of_values(1)
                .help("a remote worker to consider (repeatable)"),
        )
        .arg(
            Arg::with_name("compiler_invocation")
                .multiple(true)
                .required(true)
                .help("the compiler command line to distribute"),
        )
        .get_matches();

    let config = ClientConfig::load();

    let hosts = if let Some(values) = matches.values_of("host") {
        values
            .filter_map(|s| match s.parse() {
                Ok(h) => Some(h),
                Err(e) => {
                    eprintln!("pdistcc: ignoring invalid --host {:?}: {}", s, e);
                    None
                }
            })
            .collect()
    } else {
        config.hosts()
    };

    let original: Vec<String> = matches
        .values_of("compiler_invocation")
        .expect("compiler_invocation is required")
        .map(str::to_owned)
        .collect();

    let settings = config.compiler_settings();
    let invocation = RawInvocation {
        executable: original[0].clone(),
        args: original[1..].to_vec(),
    };

    let model = match compiler::identify(invocation, &settings) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("pdistcc: {}, running locally", e);
            run_locally(&original)
        }
    };

    let runner = RealRunner;
    match client::run_invocation(model, &original, &hosts, &runner) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("pdistcc: {}", e);
            process::exit(1);
        }
    }
}

fn run_locally(original: &[String]) -> ! {
    let status = process::Command::new(&original[0])
        .args(&original[1..])
        .status();
    match status {
        Ok(s) => process::exit(s.code().unwrap_or(1)),
        Err(e) => {
            eprintln!("pdistcc: failed to run {}: {}", original[0], e);
            process::exit(1);
        }
    }
}
