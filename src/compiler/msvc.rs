//! The MSVC-family compiler model: `cl.exe` and `clang-cl` invocations.
//!
//! MSVC's command line syntax differs enough from GCC's (`/c` instead of
//! `-c`, `/Fo<path>` glued with no separating space, no `-E`-style
//! preprocess-to-stdout convention) that this is a genuinely separate
//! model rather than a thin variant of [`super::gcc::GccModel`].

use super::{Command, Language, RawInvocation, Settings};
use errors::*;

const SOURCE_EXTENSIONS: &[&str] = &["cpp", "cxx", "cc", "c", "i", "ii"];

/// Flags dropped before a command is shipped anywhere: `/Zi`/`/ZI`
/// (debug info in a PDB), `/FS` (serialize PDB writes), `/Fd<path>`
/// (PDB output path).
fn is_pdb_flag(arg: &str) -> bool {
    arg == "/Zi" || arg == "/ZI" || arg == "/FS" || arg.starts_with("/Fd")
}

/// Preprocessor-only flags, stripped from the remote compile command:
/// macro definitions and include paths.
fn is_preprocessor_flag(arg: &str) -> bool {
    arg.starts_with("/D") || arg.starts_with("/I")
}

fn extension_of(arg: &str) -> String {
    arg.rsplit('.').next().unwrap_or("").to_lowercase()
}

fn is_source_file(arg: &str) -> bool {
    !arg.starts_with('/') && !arg.starts_with('-') && SOURCE_EXTENSIONS.contains(&extension_of(arg).as_str())
}

fn swap_extension(path: &str, new_ext: &str) -> String {
    let mut parts: Vec<&str> = path.split('.').collect();
    if parts.len() > 1 {
        parts.pop();
    } else {
        parts.clear();
    }
    parts.push(new_ext);
    parts.join(".")
}

#[derive(Debug, Clone)]
pub struct MsvcModel {
    compiler: String,
    args: Vec<String>,
    settings: Settings,
    srcfile: Option<String>,
    objfile: Option<String>,
    preprocessed_file: Option<String>,
}

impl MsvcModel {
    pub fn new(invocation: RawInvocation, settings: &Settings) -> MsvcModel {
        MsvcModel {
            compiler: invocation.executable,
            args: invocation.args,
            settings: settings.clone(),
            srcfile: None,
            objfile: None,
            preprocessed_file: None,
        }
    }

    pub fn language(&self) -> Option<Language> {
        self.srcfile.as_ref().map(|src| {
            if extension_of(src) == "c" || extension_of(src) == "i" {
                Language::C
            } else {
                Language::Cxx
            }
        })
    }

    /// Confirm this is a single-source `/c` (or `-c`) compile naming its
    /// object file with `/Fo`, and reject anything a remote worker can't
    /// usefully execute: response files (`@file`), PDB generation, and
    /// `/MP`.
    pub fn classify(&mut self) -> Result<()> {
        let mut source_count = 0;
        let mut is_object_compilation = false;

        for arg in &self.args {
            if arg.starts_with('@') {
                bail!(ErrorKind::UnsupportedCompilationMode(
                    "response files are not supported".to_owned()
                ));
            }
            if arg == "/Zi" || arg == "/ZI" {
                bail!(ErrorKind::UnsupportedCompilationMode(
                    "PDB generation is not supported".to_owned()
                ));
            }
            if arg.starts_with("/MP") {
                bail!(ErrorKind::UnsupportedCompilationMode(
                    "/MP is meaningless under a distributing wrapper".to_owned()
                ));
            }
            if arg == "/c" || arg == "-c" {
                is_object_compilation = true;
            } else if let Some(obj) = arg.strip_prefix("/Fo") {
                self.objfile = Some(obj.to_owned());
            } else if is_source_file(arg) {
                source_count += 1;
                self.srcfile = Some(arg.clone());
            }
        }

        if source_count == 0 {
            bail!(ErrorKind::UnsupportedCompilationMode(
                "no source files".to_owned()
            ));
        }
        if source_count > 1 {
            bail!(ErrorKind::UnsupportedCompilationMode(
                "multiple sources".to_owned()
            ));
        }
        if !is_object_compilation {
            bail!(ErrorKind::UnsupportedCompilationMode("linking".to_owned()));
        }
        if self.objfile.is_none() {
            bail!(ErrorKind::UnsupportedCompilationMode(
                "output object not specified (/Fo)".to_owned()
            ));
        }
        Ok(())
    }

    /// Builds the local `/P /Fi<preproc>` invocation. Strips `/c`/`-c`/
    /// `/E` and any PDB-related flag, and replaces `/Fo<obj>` with the
    /// `/P /Fi<preproc>` pair, where `preproc` is the object path with
    /// its extension replaced by `i`.
    pub fn preprocessor_cmd(&mut self) -> Command {
        let objfile = self
            .objfile
            .clone()
            .expect("preprocessor_cmd() called before classify()");
        let preprocessed = swap_extension(&objfile, "i");
        self.preprocessed_file = Some(preprocessed.clone());

        let mut cmd = vec![self.compiler.clone()];
        for arg in &self.args {
            if is_pdb_flag(arg) {
                continue;
            }
            if arg == "/c" || arg == "-c" || arg == "/E" {
                continue;
            }
            if arg.starts_with("/Fo") {
                continue;
            }
            cmd.push(arg.clone());
        }
        cmd.push("/P".to_owned());
        cmd.push(format!("/Fi{}", preprocessed));
        Command {
            program: cmd.remove(0),
            args: cmd,
        }
    }

    /// Builds the command the remote worker executes: preprocessor
    /// flags and PDB flags are omitted, `distcc_compat` optionally
    /// rewrites `/c` to `-c` and drops `/Fo…` entirely, and the source
    /// argument is replaced by `/TC`/`/TP` (whichever isn't already
    /// present) followed by the preprocessed file. Under `use_clang`
    /// only the program name changes — clang-cl accepts the same
    /// `/TC`/`/TP`/`/Fo` flags natively.
    pub fn compiler_cmd(&self) -> Command {
        let preprocessed = self
            .preprocessed_file
            .as_ref()
            .expect("compiler_cmd() called before the preprocessed file path was known");
        let srcfile = self.srcfile.as_deref();
        let has_tc_tp = self.args.iter().any(|a| a == "/TC" || a == "/TP");
        let tc_tp = match self.language() {
            Some(Language::C) => "/TC",
            _ => "/TP",
        };

        let program = if self.settings.msvc_use_clang {
            self.settings.msvc_clang_path.clone()
        } else {
            self.compiler.clone()
        };

        let mut cmd = vec![program];
        for arg in &self.args {
            if is_preprocessor_flag(arg) || is_pdb_flag(arg) {
                continue;
            }
            if arg == "/c" {
                cmd.push(if self.settings.msvc_distcc_compat {
                    "-c".to_owned()
                } else {
                    arg.clone()
                });
            } else if arg.starts_with("/Fo") {
                if !self.settings.msvc_distcc_compat {
                    cmd.push(arg.clone());
                }
            } else if Some(arg.as_str()) == srcfile {
                if !has_tc_tp {
                    cmd.push(tc_tp.to_owned());
                }
                cmd.push(preprocessed.clone());
            } else {
                cmd.push(arg.clone());
            }
        }
        Command {
            program: cmd.remove(0),
            args: cmd,
        }
    }

    pub fn source_file(&self) -> Option<&str> {
        self.srcfile.as_deref()
    }

    pub fn object_file(&self) -> Option<&str> {
        self.objfile.as_deref()
    }

    /// Lazily derives the preprocessed filename from the object file if
    /// `preprocessor_cmd()` hasn't already fixed it (the server side
    /// sets it explicitly once it has chosen a temp path instead).
    pub fn preprocessed_file(&mut self) -> String {
        if let Some(ref p) = self.preprocessed_file {
            return p.clone();
        }
        let derived = swap_extension(self.objfile.as_deref().unwrap_or("out"), "i");
        self.preprocessed_file = Some(derived.clone());
        derived
    }

    pub fn set_source_file(&mut self, path: &str) {
        if self.srcfile.as_deref() == Some(path) {
            return;
        }
        let old = self.srcfile.clone();
        self.args = self
            .args
            .iter()
            .map(|a| {
                if Some(a.as_str()) == old.as_deref() {
                    path.to_owned()
                } else {
                    a.clone()
                }
            })
            .collect();
        self.srcfile = Some(path.to_owned());
    }

    pub fn set_object_file(&mut self, path: &str) {
        if self.objfile.as_deref() == Some(path) {
            return;
        }
        let old_flag = self.objfile.as_ref().map(|o| format!("/Fo{}", o));
        self.args = self
            .args
            .iter()
            .map(|a| {
                if Some(a) == old_flag.as_ref() {
                    format!("/Fo{}", path)
                } else {
                    a.clone()
                }
            })
            .collect();
        self.objfile = Some(path.to_owned());
    }

    pub fn set_preprocessed_file(&mut self, path: &str) {
        self.preprocessed_file = Some(path.to_owned());
    }
}
