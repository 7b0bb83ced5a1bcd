//! The server session state machine and the listener that dispatches
//! accepted connections to one session each.

use std::fs;
use std::io;
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{debug, error, info, trace, warn};
use tempfile::Builder as TempBuilder;

use command::CommandRunner;
use compiler::{self, RawInvocation, Settings};
use errors::*;
use fileops::{CleanupGuard, FileOps};
use net;

/// One accepted connection, driven through `ReadRequest` → `Classify` →
/// `ReadDOTI` → `Compile` → `Reply` → `Cleanup`. Temporary files created
/// along the way are unlinked when the session's `CleanupGuard` drops,
/// regardless of which step failed.
pub struct ServerSession<'a> {
    stream: TcpStream,
    settings: &'a Settings,
    runner: &'a dyn CommandRunner,
    ops: &'a dyn FileOps,
}

impl<'a> ServerSession<'a> {
    pub fn new(
        stream: TcpStream,
        settings: &'a Settings,
        runner: &'a dyn CommandRunner,
        ops: &'a dyn FileOps,
    ) -> ServerSession<'a> {
        ServerSession {
            stream,
            settings,
            runner,
            ops,
        }
    }

    /// Runs the whole session to completion. Framing violations and
    /// premature disconnects are logged and swallowed here — by
    /// contract (§4.5) they end the session without propagating further.
    pub fn run(&mut self) {
        if let Err(e) = self.run_inner() {
            match e.0 {
                ErrorKind::Disconnected => info!("client disconnected mid-session"),
                ErrorKind::ProtocolError(ref msg) => warn!("protocol error: {}", msg),
                ErrorKind::InvalidToken(..) => warn!("invalid token: {}", e),
                other => error!("session failed: {:?}", other),
            }
        }
    }

    fn run_inner(&mut self) -> Result<()> {
        let mut cleanup = CleanupGuard::new(self.ops);

        let (executable, args) = self.read_request()?;
        trace!("request: {} {:?}", executable, args);

        let model = compiler::identify(
            RawInvocation {
                executable,
                args: args.clone(),
            },
            self.settings,
        )
        .and_then(|mut m| m.classify().map(|()| m));

        let preproc_path = self.read_doti(&mut cleanup)?;

        let mut model = match model {
            Ok(m) => m,
            Err(e) => {
                debug!("classification failed: {}", e);
                return self.reply_error(&e.to_string());
            }
        };

        model.set_preprocessed_file(preproc_path.to_string_lossy().as_ref());
        let obj_ext = model
            .object_file()
            .and_then(|o| Path::new(o).extension())
            .and_then(|e| e.to_str())
            .unwrap_or("o")
            .to_owned();
        let obj_path = PathBuf::from(format!("{}.{}", preproc_path.display(), obj_ext));
        model.set_object_file(obj_path.to_string_lossy().as_ref());
        cleanup.track(obj_path.clone());

        let cmd = model.compiler_cmd();
        info!("compiling: {} {:?}", cmd.program, cmd.args);
        let output = self
            .runner
            .run(&cmd.program, &cmd.args)
            .chain_err(|| "failed to spawn compiler")?;

        self.reply_compiled(output.status.code().unwrap_or(1), &output.stderr, &output.stdout, &obj_path)
    }

    /// `DIST(v) ARGC(n) (ARGV(k) bytes)×n`, interpreting the first
    /// argument as the compiler executable and the rest as its
    /// arguments.
    fn read_request(&mut self) -> Result<(String, Vec<String>)> {
        let version = net::expect(&mut self.stream, b"DIST")?;
        if version != net::PROTOCOL_VERSION {
            bail!(ErrorKind::ProtocolError(format!(
                "client speaks protocol version {}, expected {}",
                version,
                net::PROTOCOL_VERSION
            )));
        }
        let argc = net::expect(&mut self.stream, b"ARGC")?;
        let mut argv = Vec::with_capacity(argc as usize);
        for _ in 0..argc {
            let len = net::expect(&mut self.stream, b"ARGV")?;
            let mut buf = Vec::with_capacity(len as usize);
            net::chunked_copy_in(&mut self.stream, &mut buf, u64::from(len))?;
            let arg = String::from_utf8(buf)
                .map_err(|_| Error::from(ErrorKind::ProtocolError("argument is not UTF-8".to_owned())))?;
            argv.push(arg);
        }
        if argv.is_empty() {
            bail!(ErrorKind::ProtocolError("empty argument vector".to_owned()));
        }
        let executable = argv.remove(0);
        Ok((executable, argv))
    }

    /// `DOTI(len) bytes`, streamed into a fresh `.ii` temp file whose
    /// path is both returned and added to the session's cleanup set.
    fn read_doti(&mut self, cleanup: &mut CleanupGuard) -> Result<PathBuf> {
        let len = net::expect(&mut self.stream, b"DOTI")?;
        let tmp = TempBuilder::new()
            .suffix(".ii")
            .tempfile()
            .chain_err(|| "failed to create temp file for DOTI payload")?;
        let (mut file, path) = tmp.keep().chain_err(|| "failed to persist temp file")?;
        net::chunked_copy_in(&mut self.stream, &mut file, u64::from(len))?;
        cleanup.track(path.clone());
        Ok(path)
    }

    fn reply_error(&mut self, message: &str) -> Result<()> {
        net::write_token(&mut self.stream, b"DONE", net::PROTOCOL_VERSION)?;
        net::write_token(&mut self.stream, b"STAT", 1)?;
        let stderr = message.as_bytes();
        net::write_token(&mut self.stream, b"SERR", stderr.len() as u32)?;
        io::Write::write_all(&mut self.stream, stderr)?;
        net::write_token(&mut self.stream, b"SOUT", 0)?;
        net::write_token(&mut self.stream, b"DOTO", 0)?;
        Ok(())
    }

    fn reply_compiled(&mut self, status: i32, stderr: &[u8], stdout: &[u8], obj_path: &Path) -> Result<()> {
        net::write_token(&mut self.stream, b"DONE", net::PROTOCOL_VERSION)?;
        net::write_token(&mut self.stream, b"STAT", status as u32)?;
        net::write_token(&mut self.stream, b"SERR", stderr.len() as u32)?;
        io::Write::write_all(&mut self.stream, stderr)?;
        net::write_token(&mut self.stream, b"SOUT", stdout.len() as u32)?;
        io::Write::write_all(&mut self.stream, stdout)?;

        match self.ops.size(obj_path) {
            Ok(len) => {
                net::write_token(&mut self.stream, b"DOTO", len as u32)?;
                let mut obj = self
                    .ops
                    .open_read(obj_path)
                    .chain_err(|| format!("failed to open {}", obj_path.display()))?;
                net::chunked_copy_out(&mut obj, &mut self.stream, len)?;
            }
            Err(_) if status != 0 => {
                net::write_token(&mut self.stream, b"DOTO", 0)?;
            }
            Err(_) => {
                bail!(ErrorKind::CompilerProducedNothing);
            }
        }
        Ok(())
    }
}

/// Binds `host:port` with address reuse and accepts in a loop, handing
/// each connection to its own OS thread (§5: threads, processes, and
/// lightweight tasks are all acceptable; this crate picks threads). A
/// `Ctrl-C`/`SIGINT` stops the accept loop; in-flight sessions run to
/// completion on their own threads.
pub struct Listener {
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
}

impl Listener {
    pub fn bind(host: &str, port: u16) -> Result<Listener> {
        let listener = TcpListener::bind((host, port))
            .chain_err(|| format!("failed to bind {}:{}", host, port))?;
        info!("listening on {}:{}", host, port);
        Ok(Listener {
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn listener_addr(&self) -> ::std::net::SocketAddr {
        self.listener
            .local_addr()
            .expect("a bound TcpListener always has a local address")
    }

    /// Accepts connections until `shutdown_handle()` is set, spawning a
    /// thread per connection that builds its own `ServerSession` from
    /// `settings` and a real `CommandRunner`.
    pub fn serve(&self, settings: Settings) -> Result<()> {
        self.listener
            .set_nonblocking(true)
            .chain_err(|| "failed to set listener non-blocking")?;
        let settings = Arc::new(settings);
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!("accepted connection from {}", peer);
                    let settings = settings.clone();
                    thread::spawn(move || {
                        let runner = ::command::RealRunner;
                        let ops = ::fileops::RealFileOps;
                        let mut session = ServerSession::new(stream, &settings, &runner, &ops);
                        session.run();
                    });
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(::std::time::Duration::from_millis(50));
                }
                Err(e) => {
                    warn!("accept() failed: {}", e);
                }
            }
        }
        info!("shutting down listener");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use command::test::ScriptedRunner;
    use std::io::Write as IoWrite;
    use std::net::TcpListener as StdTcpListener;
    use std::os::unix::process::ExitStatusExt;

    fn settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn test_full_session_happy_path() {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = thread::spawn(move || {
            let mut sock = TcpStream::connect(addr).unwrap();
            let args = ["g++", "-c", "-o", "foo.o", "foo.cpp"];
            net::write_token(&mut sock, b"DIST", 1).unwrap();
            net::write_token(&mut sock, b"ARGC", args.len() as u32).unwrap();
            for a in &args {
                net::write_token(&mut sock, b"ARGV", a.len() as u32).unwrap();
                sock.write_all(a.as_bytes()).unwrap();
            }
            let body = b"int main(){}";
            net::write_token(&mut sock, b"DOTI", body.len() as u32).unwrap();
            sock.write_all(body).unwrap();

            let version = net::expect(&mut sock, b"DONE").unwrap();
            assert_eq!(version, 1);
            let status = net::expect(&mut sock, b"STAT").unwrap();
            assert_eq!(status, 0);
            let serr_len = net::expect(&mut sock, b"SERR").unwrap();
            assert_eq!(serr_len, 0);
            let sout_len = net::expect(&mut sock, b"SOUT").unwrap();
            assert_eq!(sout_len, 0);
            let doto_len = net::expect(&mut sock, b"DOTO").unwrap();
            assert_eq!(doto_len, 7);
        });

        let (stream, _) = listener.accept().unwrap();
        let settings = settings();
        // `ScriptedRunner` only fakes `Output`, not filesystem writes, so
        // the compile step needs a runner that actually drops the object
        // file where the rewritten `-o` argument points.
        struct WritesObject;
        impl CommandRunner for WritesObject {
            fn run(&self, _program: &str, args: &[String]) -> Result<::std::process::Output> {
                let obj = args
                    .iter()
                    .find(|a| a.ends_with(".o"))
                    .cloned()
                    .unwrap_or_default();
                fs::write(&obj, b"FAKEELF").unwrap();
                Ok(::std::process::Output {
                    status: ::std::process::ExitStatus::from_raw(0),
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                })
            }
        }
        let runner = WritesObject;
        let ops = ::fileops::RealFileOps;
        let mut session = ServerSession::new(stream, &settings, &runner, &ops);
        session.run();
        client.join().unwrap();
    }

    #[test]
    fn test_classify_failure_sends_error_reply() {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = thread::spawn(move || {
            let mut sock = TcpStream::connect(addr).unwrap();
            let args = ["barf", "-c", "-o", "foo.o", "foo.cpp"];
            net::write_token(&mut sock, b"DIST", 1).unwrap();
            net::write_token(&mut sock, b"ARGC", args.len() as u32).unwrap();
            for a in &args {
                net::write_token(&mut sock, b"ARGV", a.len() as u32).unwrap();
                sock.write_all(a.as_bytes()).unwrap();
            }
            net::write_token(&mut sock, b"DOTI", 0).unwrap();

            net::expect(&mut sock, b"DONE").unwrap();
            let status = net::expect(&mut sock, b"STAT").unwrap();
            assert_eq!(status, 1);
        });

        let (stream, _) = listener.accept().unwrap();
        let settings = settings();
        let runner = ScriptedRunner::new(vec![]);
        let ops = ::fileops::RealFileOps;
        let mut session = ServerSession::new(stream, &settings, &runner, &ops);
        session.run();
        client.join().unwrap();
    }
}
