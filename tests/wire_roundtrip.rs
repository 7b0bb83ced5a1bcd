//! End-to-end round trip: a real server `Listener` accepting on an
//! ephemeral port, and a real client session shipping an actual
//! preprocessed translation unit (from a real compiler, located via the
//! `cc` crate) across it.

extern crate cc;
extern crate pdistcc;
extern crate tempfile;

use std::fs;
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use pdistcc::command::RealRunner;
use pdistcc::compiler::{self, RawInvocation, Settings};
use pdistcc::server::Listener;

fn compiler_path() -> Option<std::path::PathBuf> {
    let build = cc::Build::new();
    let tool = build.try_get_compiler().ok()?;
    Some(tool.path().to_owned())
}

#[test]
fn test_round_trip_through_real_listener() {
    let Some(compiler) = compiler_path() else {
        eprintln!("no C compiler available, skipping");
        return;
    };
    let basename = compiler
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    if compiler::identify(
        RawInvocation {
            executable: basename.to_owned(),
            args: Vec::new(),
        },
        &Settings::default(),
    )
    .is_err()
    {
        // `cc` sometimes resolves to a bare `cc`, which this crate's
        // classifier doesn't recognize as GCC-family; nothing to round
        // trip in that case.
        eprintln!("resolved compiler {:?} isn't GCC/MSVC family, skipping", basename);
        return;
    }

    let listener = Listener::bind("127.0.0.1", 0).unwrap();
    let addr = listener.listener_addr();
    let shutdown = listener.shutdown_handle();

    let server_thread = thread::spawn(move || {
        listener.serve(Settings::default()).unwrap();
    });

    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("hello.c");
    fs::write(&src, "int main(void) { return 0; }\n").unwrap();
    let obj = dir.path().join("hello.o");

    let original = vec![
        basename.to_owned(),
        "-c".to_owned(),
        "-o".to_owned(),
        obj.to_string_lossy().into_owned(),
        src.to_string_lossy().into_owned(),
    ];
    let invocation = RawInvocation {
        executable: basename.to_owned(),
        args: original[1..].to_vec(),
    };
    let model = compiler::identify(invocation, &Settings::default()).unwrap();

    let hosts = vec![format!("{}:{}/1", addr.ip(), addr.port()).parse().unwrap()];
    let runner = RealRunner;
    let status = pdistcc::client::run_invocation(model, &original, &hosts, &runner).unwrap();

    shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
    // Give the accept loop a moment to notice the shutdown flag and
    // return, rather than leaking the thread past the test.
    let _ = TcpStream::connect(addr);
    thread::sleep(Duration::from_millis(100));
    let _ = server_thread;

    assert_eq!(status, 0);
    assert!(obj.exists());
    assert!(fs::metadata(&obj).unwrap().len() > 0);
}
