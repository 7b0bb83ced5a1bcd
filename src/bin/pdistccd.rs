//! `pdistccd`: accepts distcc-protocol connections and compiles on their
//! behalf.

extern crate clap;
extern crate ctrlc;
extern crate env_logger;
extern crate log;
extern crate num_cpus;
extern crate pdistcc;

use std::process;
use std::sync::atomic::Ordering;

use clap::{App, Arg};

use pdistcc::config::ServerConfig;
use pdistcc::server::Listener;

fn main() {
    env_logger::init();

    let default_jobs = format!("{}", num_cpus::get() + 1);
    let matches = App::new("pdistccd")
        .about("distcc-compatible compilation daemon")
        .arg(
            Arg::with_name("host")
                .long("host")
                .takes_value(true)
                .help("bind address (default from server.json, else 127.0.0.1)"),
        )
        .arg(
            Arg::with_name("port")
                .long("port")
                .takes_value(true)
                .help("bind port (default from server.json, else 3632)"),
        )
        .arg(
            Arg::with_name("jobs")
                .long("jobs")
                .takes_value(true)
                .default_value(&default_jobs)
                .help("accept-queue size hint"),
        )
        .get_matches();

    let config = ServerConfig::load();
    let host = matches.value_of("host").unwrap_or(&config.host).to_owned();
    let port = matches
        .value_of("port")
        .map(|p| p.parse().unwrap_or(config.port))
        .unwrap_or(config.port);

    let jobs: usize = matches
        .value_of("jobs")
        .and_then(|j| j.parse().ok())
        .unwrap_or_else(|| num_cpus::get() + 1);
    log::info!("accept-queue size hint: {} (not enforced as a hard cap)", jobs);

    let listener = match Listener::bind(&host, port) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("pdistccd: {}", e);
            process::exit(1);
        }
    };

    let shutdown = listener.shutdown_handle();
    ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::SeqCst);
    })
    .expect("failed to install SIGINT handler");

    let settings = pdistcc::compiler::Settings::default();
    if let Err(e) = listener.serve(settings) {
        eprintln!("pdistccd: {}", e);
        process::exit(1);
    }
}
