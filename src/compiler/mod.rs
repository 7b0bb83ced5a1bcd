//! The compiler command model: classifying a compiler invocation and
//! deriving the local preprocessing command and the remote compilation
//! command from it.
//!
//! The donor project modeled this as a class hierarchy
//! (`CompilerWrapper` with GCC/MSVC subclasses implementing virtual
//! methods). There are exactly two families and dispatch never grows a
//! third at runtime, so here it's a tagged variant over a shared
//! capability set instead, with dispatch resolved statically by `match`.

pub mod gcc;
pub mod msvc;

use std::path::{Path, PathBuf};

use regex::Regex;

use errors::*;

/// The source language of a translation unit. The donor compiler model
/// also distinguishes Objective-C/Objective-C++, but this protocol only
/// ever negotiates C or C++ (see GLOSSARY: "Classify").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    C,
    Cxx,
}

impl Language {
    pub fn as_gcc_lang_flag(&self) -> &'static str {
        match *self {
            Language::C => "c",
            Language::Cxx => "c++",
        }
    }
}

/// Recognized configuration knobs, gathered from `client.json` /
/// `server.json` (see the crate's `config` module) rather than passed
/// around as a loose string-keyed map the way the donor project's
/// `settings` dict was.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding the real `gcc`/`g++` binary, when the
    /// configured compiler should be resolved relative to it rather
    /// than via `$PATH`.
    pub gcc_compiler_dir: Option<PathBuf>,
    /// Rewrite `/c` to `-c` and drop `/Fo...` so a distcc-compatible
    /// remote wrapper can supply the output path itself.
    pub msvc_distcc_compat: bool,
    /// Compile MSVC-family invocations with clang-cl on the remote
    /// side instead of real MSVC.
    pub msvc_use_clang: bool,
    /// Path (or bare name resolved via `$PATH`) of the clang-cl binary
    /// to substitute when `msvc_use_clang` is set.
    pub msvc_clang_path: String,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            gcc_compiler_dir: None,
            msvc_distcc_compat: false,
            msvc_use_clang: cfg!(not(windows)),
            msvc_clang_path: "clang-cl".to_owned(),
        }
    }
}

/// A compiler invocation not yet known to match either supported
/// family.
#[derive(Debug, Clone)]
pub struct RawInvocation {
    pub executable: String,
    pub args: Vec<String>,
}

/// The tagged variant mentioned above: either a GCC-family model or an
/// MSVC-family one, selected once by [`identify`] and never re-decided.
#[derive(Debug, Clone)]
pub enum CompilerModel {
    Gcc(gcc::GccModel),
    Msvc(msvc::MsvcModel),
}

lazy_static! {
    static ref GCC_TRIPLET: Regex = Regex::new(r"^.*-gcc(-[0-9.]+)?$").unwrap();
    static ref GXX_TRIPLET: Regex = Regex::new(r"^.*-g\+\+(-[0-9.]+)?$").unwrap();
}

fn basename(executable: &str) -> &str {
    Path::new(executable)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(executable)
}

/// Decide which family an executable's basename belongs to, and build
/// the matching model. Anything else is [`ErrorKind::UnsupportedCompiler`].
pub fn identify(invocation: RawInvocation, settings: &Settings) -> Result<CompilerModel> {
    let name = basename(&invocation.executable);
    if name == "gcc" || name == "g++" || name == "c++" {
        Ok(CompilerModel::Gcc(gcc::GccModel::new(invocation, settings)))
    } else if GCC_TRIPLET.is_match(name) || GXX_TRIPLET.is_match(name) {
        Ok(CompilerModel::Gcc(gcc::GccModel::new(invocation, settings)))
    } else if matches!(name, "cl" | "clang-cl" | "cl.exe" | "clang-cl.exe") {
        Ok(CompilerModel::Msvc(msvc::MsvcModel::new(invocation, settings)))
    } else {
        Err(ErrorKind::UnsupportedCompiler(name.to_owned()).into())
    }
}

/// A fully-formed shell-style command: a program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
}

impl CompilerModel {
    /// Confirm this is a single-source, object-producing compile and
    /// populate the derived source/object/language fields. Must be
    /// called, and must succeed, before any other method below.
    pub fn classify(&mut self) -> Result<()> {
        match *self {
            CompilerModel::Gcc(ref mut m) => m.classify(),
            CompilerModel::Msvc(ref mut m) => m.classify(),
        }
    }

    pub fn preprocessor_cmd(&mut self) -> Command {
        match *self {
            CompilerModel::Gcc(ref mut m) => m.preprocessor_cmd(),
            CompilerModel::Msvc(ref mut m) => m.preprocessor_cmd(),
        }
    }

    pub fn compiler_cmd(&self) -> Command {
        match *self {
            CompilerModel::Gcc(ref m) => m.compiler_cmd(),
            CompilerModel::Msvc(ref m) => m.compiler_cmd(),
        }
    }

    pub fn source_file(&self) -> Option<&str> {
        match *self {
            CompilerModel::Gcc(ref m) => m.source_file(),
            CompilerModel::Msvc(ref m) => m.source_file(),
        }
    }

    pub fn object_file(&self) -> Option<&str> {
        match *self {
            CompilerModel::Gcc(ref m) => m.object_file(),
            CompilerModel::Msvc(ref m) => m.object_file(),
        }
    }

    pub fn preprocessed_file(&mut self) -> Option<String> {
        match *self {
            CompilerModel::Gcc(ref m) => m.preprocessed_file(),
            CompilerModel::Msvc(ref mut m) => Some(m.preprocessed_file()),
        }
    }

    pub fn language(&self) -> Option<Language> {
        match *self {
            CompilerModel::Gcc(ref m) => m.language(),
            CompilerModel::Msvc(ref m) => m.language(),
        }
    }

    pub fn set_source_file(&mut self, path: &str) {
        match *self {
            CompilerModel::Gcc(ref mut m) => m.set_source_file(path),
            CompilerModel::Msvc(ref mut m) => m.set_source_file(path),
        }
    }

    pub fn set_object_file(&mut self, path: &str) {
        match *self {
            CompilerModel::Gcc(ref mut m) => m.set_object_file(path),
            CompilerModel::Msvc(ref mut m) => m.set_object_file(path),
        }
    }

    pub fn set_preprocessed_file(&mut self, path: &str) {
        match *self {
            CompilerModel::Gcc(ref mut m) => m.set_preprocessed_file(path),
            CompilerModel::Msvc(ref mut m) => m.set_preprocessed_file(path),
        }
    }

    /// Only ever true for GCC-family invocations explicitly given `-E`.
    pub fn called_for_preprocessing(&self) -> bool {
        match *self {
            CompilerModel::Gcc(ref m) => m.called_for_preprocessing(),
            CompilerModel::Msvc(_) => false,
        }
    }

    /// Resolve any `-march=native`/`-mcpu=native`/`-mtune` to their
    /// concrete values on the client before the invocation is shipped.
    /// A no-op for MSVC-family invocations, which have no equivalent.
    pub fn rewrite_local_args(&mut self, runner: &dyn ::command::CommandRunner) -> Result<()> {
        match *self {
            CompilerModel::Gcc(ref mut m) => m.rewrite_local_args(runner),
            CompilerModel::Msvc(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn invocation(cmdline: &str) -> RawInvocation {
        let mut parts = cmdline.split_whitespace().map(str::to_owned);
        let executable = parts.next().unwrap();
        RawInvocation {
            executable,
            args: parts.collect(),
        }
    }

    #[test]
    fn test_identify_gcc() {
        let model = identify(invocation("gcc -c -o foo.o foo.c"), &Settings::default()).unwrap();
        assert!(matches!(model, CompilerModel::Gcc(_)));
    }

    #[test]
    fn test_identify_gxx_triplet() {
        let model = identify(
            invocation("x86_64-linux-gnu-g++-11 -c -o foo.o foo.cpp"),
            &Settings::default(),
        )
        .unwrap();
        assert!(matches!(model, CompilerModel::Gcc(_)));
    }

    #[test]
    fn test_identify_msvc() {
        let model = identify(
            invocation("cl.exe /c /Fofoo.obj foo.cpp"),
            &Settings::default(),
        )
        .unwrap();
        assert!(matches!(model, CompilerModel::Msvc(_)));
    }

    #[test]
    fn test_identify_unsupported() {
        let err = identify(invocation("barf foo buzz"), &Settings::default()).unwrap_err();
        match err.0 {
            ErrorKind::UnsupportedCompiler(ref name) => assert_eq!(name, "barf"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
