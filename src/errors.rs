//! Crate-wide error types.
//!
//! Built with `error_chain!`: a single `Error`/`ErrorKind` pair threads
//! through preprocessing, classification, and the wire protocol rather
//! than a separate error enum per module.

use std::process;

error_chain! {
    foreign_links {
        Io(::std::io::Error);
        ParseInt(::std::num::ParseIntError);
        Json(::serde_json::Error);
    }

    errors {
        /// A 12-byte token header didn't match the tag we expected, or
        /// wasn't exactly 12 bytes to begin with.
        InvalidToken(expected: String, got: String) {
            description("invalid protocol token")
            display("invalid token: expected {:?}, got {:?}", expected, got)
        }
        /// Framing violation: short read, bad version, peer hung up
        /// mid-token.
        ProtocolError(msg: String) {
            description("protocol error")
            display("protocol error: {}", msg)
        }
        /// The compiler executable's basename isn't one this crate
        /// knows how to drive (neither GCC nor MSVC family).
        UnsupportedCompiler(name: String) {
            description("unsupported compiler")
            display("unsupported compiler: {}", name)
        }
        /// The command line isn't a single-source, object-producing
        /// compile this crate can split into preprocess + remote-compile.
        UnsupportedCompilationMode(reason: String) {
            description("unsupported compilation mode")
            display("unsupported compilation mode: {}", reason)
        }
        /// The local preprocessor invocation exited non-zero.
        PreprocessorFailed(output: process::Output) {
            description("preprocessor failed")
            display("preprocessor exited with {:?}", output.status.code())
        }
        /// The remote compiler exited zero but produced no object file.
        CompilerProducedNothing {
            description("compiler produced nothing")
            display("compiler exited successfully but produced no object file")
        }
        /// Peer closed the connection before the request or response
        /// was fully read.
        Disconnected {
            description("peer disconnected")
            display("peer disconnected")
        }
    }
}
