//! The client session: ship a preprocessed translation unit to a remote
//! worker and write back the object file, stdout, and stderr it returns.

use std::io::{self, Write};
use std::net::TcpStream;
use std::path::Path;

use log::{debug, info, trace};

use command::CommandRunner;
use compiler::CompilerModel;
use errors::*;
use fileops::FileOps;
use net;
use sched::{self, HostSpec};

/// A single outbound session: connect, send the request, read back the
/// response. Created fresh for each compiler invocation and discarded
/// after; there is no session reuse across invocations. File I/O goes
/// through `FileOps` rather than `std::fs` directly, the same interface
/// `ServerSession`'s cleanup set is built on (see SPEC_FULL §9).
pub struct ClientSession<'a> {
    stream: TcpStream,
    ops: &'a dyn FileOps,
}

impl<'a> ClientSession<'a> {
    pub fn connect(host: &str, port: u16, ops: &'a dyn FileOps) -> Result<ClientSession<'a>> {
        let stream = TcpStream::connect((host, port))
            .chain_err(|| format!("failed to connect to {}:{}", host, port))?;
        Ok(ClientSession { stream, ops })
    }

    /// Sends `DIST(1) ARGC(n) (ARGV(k) bytes)×n DOTI(size) bytes` where
    /// `bytes` is the full contents of `preproc_path`. Arguments are
    /// required to be valid UTF-8 — the protocol carries no other
    /// encoding.
    pub fn request(&mut self, args: &[String], preproc_path: &Path) -> Result<()> {
        trace!("sending DIST/ARGC/{} ARGV tokens", args.len());
        net::write_token(&mut self.stream, b"DIST", net::PROTOCOL_VERSION)?;
        net::write_token(&mut self.stream, b"ARGC", args.len() as u32)?;
        for arg in args {
            let bytes = arg.as_bytes();
            net::write_token(&mut self.stream, b"ARGV", bytes.len() as u32)?;
            self.stream.write_all(bytes)?;
        }

        let size = self
            .ops
            .size(preproc_path)
            .chain_err(|| format!("failed to stat {}", preproc_path.display()))?;
        let mut file = self
            .ops
            .open_read(preproc_path)
            .chain_err(|| format!("failed to open {}", preproc_path.display()))?;
        net::write_token(&mut self.stream, b"DOTI", size as u32)?;
        net::chunked_copy_out(&mut file, &mut self.stream, size)?;
        Ok(())
    }

    /// Reads `DONE STAT SERR SOUT [DOTO]` and writes the object bytes
    /// (when present) to `obj_path`. Returns the exit status the server
    /// reported for the remote compiler.
    pub fn handle_response(&mut self, obj_path: &Path) -> Result<i32> {
        let version = net::expect(&mut self.stream, b"DONE")?;
        if version != net::PROTOCOL_VERSION {
            bail!(ErrorKind::ProtocolError(format!(
                "server speaks protocol version {}, expected {}",
                version,
                net::PROTOCOL_VERSION
            )));
        }
        let status = net::expect(&mut self.stream, b"STAT")? as i32;
        debug!("remote compile exited with status {}", status);

        let serr_len = net::expect(&mut self.stream, b"SERR")?;
        let mut stderr = io::stderr();
        net::chunked_copy_in(&mut self.stream, &mut stderr, u64::from(serr_len))?;

        let sout_len = net::expect(&mut self.stream, b"SOUT")?;
        let mut stdout = io::stdout();
        net::chunked_copy_in(&mut self.stream, &mut stdout, u64::from(sout_len))?;

        if status != 0 {
            return Ok(status);
        }

        let doto_len = net::expect(&mut self.stream, b"DOTO")?;
        let mut obj = self
            .ops
            .create(obj_path)
            .chain_err(|| format!("failed to create {}", obj_path.display()))?;
        net::chunked_copy_in(&mut self.stream, &mut obj, u64::from(doto_len))?;
        obj.flush()?;
        Ok(status)
    }
}

/// Drives a full compiler invocation through to its exit code: locally
/// preprocess, pick a worker, ship the request, write back the result.
/// Falls back to a fully local compile when the invocation only asked
/// for preprocessing, or when the scheduler hands back the `localhost`
/// sentinel.
pub fn run_invocation(
    mut model: CompilerModel,
    original: &[String],
    hosts: &[HostSpec],
    runner: &dyn CommandRunner,
) -> Result<i32> {
    if model.called_for_preprocessing() {
        info!("invocation is preprocessing-only, running locally");
        return run_local(runner, original.split_first());
    }

    if let Err(e) = model.classify() {
        match e.0 {
            ErrorKind::UnsupportedCompilationMode(ref reason) => {
                info!("invocation not distributable ({}), running locally", reason);
                return run_local(runner, original.split_first());
            }
            _ => return Err(e),
        }
    }
    model.rewrite_local_args(runner)?;
    let preproc_cmd = model.preprocessor_cmd();
    info!("preprocessing locally: {} ...", preproc_cmd.program);
    let output = runner.run(&preproc_cmd.program, &preproc_cmd.args)?;
    if !output.status.success() {
        bail!(ErrorKind::PreprocessorFailed(output));
    }

    let key = original.join(" ");
    let host = sched::pick(hosts, &key);
    if host.is_localhost_sentinel() {
        info!("scheduler selected localhost, compiling locally");
        let cmd = model.compiler_cmd();
        let local_args: Vec<String> = std::iter::once(cmd.program.clone())
            .chain(cmd.args.iter().cloned())
            .collect();
        return run_local(runner, local_args.split_first());
    }

    info!("shipping compile to {}:{}", host.host, host.port);
    let ops = ::fileops::RealFileOps;
    let mut session = ClientSession::connect(&host.host, host.port, &ops)?;
    let cmd = model.compiler_cmd();
    let mut argv = vec![cmd.program.clone()];
    argv.extend(cmd.args.clone());
    let preproc_path = model
        .preprocessed_file()
        .ok_or_else(|| Error::from("preprocessed file path unknown after preprocessor_cmd()"))?;
    session.request(&argv, Path::new(&preproc_path))?;
    let obj_path = model
        .object_file()
        .ok_or_else(|| Error::from("object file path unknown"))?
        .to_owned();
    session.handle_response(Path::new(&obj_path))
}

fn run_local(runner: &dyn CommandRunner, split: Option<(&String, &[String])>) -> Result<i32> {
    let (program, args) = split.ok_or_else(|| Error::from("empty compiler invocation"))?;
    let output = runner.run(program, args)?;
    io::stdout().write_all(&output.stdout)?;
    io::stderr().write_all(&output.stderr)?;
    Ok(output.status.code().unwrap_or(1))
}
