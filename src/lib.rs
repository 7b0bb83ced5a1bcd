//! A distcc-compatible distributed C/C++ compilation client and daemon:
//! intercept a compiler invocation, preprocess locally, ship the
//! translation unit to a remote worker, and retrieve the resulting
//! object file, stdout, and stderr.

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;
extern crate directories;
extern crate log;
extern crate regex;
extern crate serde;
extern crate serde_derive;
extern crate serde_json;
extern crate tempfile;

pub mod client;
pub mod command;
pub mod compiler;
pub mod config;
pub mod errors;
pub mod fileops;
pub mod net;
pub mod sched;
pub mod server;
