//! The GCC/G++ compiler model: `gcc`, `g++`, `c++`, and triplet-prefixed
//! variants such as `x86_64-linux-gnu-g++-11`.

use std::path::PathBuf;
use std::process::Output;

use command::CommandRunner;
use errors::*;

use super::{Command, Language, RawInvocation, Settings};

const SOURCE_EXTENSIONS: &[&str] = &["cpp", "cxx", "cc", "c", "i", "ii"];

fn extension_of(arg: &str) -> String {
    arg.rsplit('.').next().unwrap_or("").to_lowercase()
}

fn is_source_file(arg: &str) -> bool {
    SOURCE_EXTENSIONS.contains(&extension_of(arg).as_str())
}

/// Replace the final `.ext` of `path` with `new_ext`, following the
/// donor's own splitting rule exactly: a path with no dot at all
/// becomes just `new_ext` (no leading separator), rather than having
/// an extension appended.
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

/// `(is_preprocessor_flag, takes_a_separate_argument)` for one GCC
/// command-line argument. Both `-I<path>` (glued) and `-I <path>`
/// (separate) are treated as preprocessor flags — the more permissive
/// of the two behaviors the donor project's revisions disagreed on
/// (see SPEC_FULL §9).
fn classify_flag(arg: &str) -> (bool, bool) {
    if arg.starts_with("-D") {
        (true, false)
    } else if arg == "-I" {
        (true, true)
    } else if arg.starts_with("-I") {
        (true, false)
    } else if arg.starts_with("-Wp,") {
        (true, false)
    } else if arg == "-Xpreprocessor" {
        (true, true)
    } else if matches!(arg, "-MD" | "-M" | "-nostdinc") {
        (true, false)
    } else if matches!(arg, "-MT" | "-MF") {
        (true, true)
    } else if matches!(arg, "-include" | "-imacro" | "-iquote" | "-isystem") {
        (true, true)
    } else {
        (false, false)
    }
}

#[derive(Debug, Clone)]
pub struct GccModel {
    compiler: String,
    args: Vec<String>,
    srcfile: Option<String>,
    objfile: Option<String>,
    preprocessed_file: Option<String>,
}

impl GccModel {
    pub fn new(invocation: RawInvocation, settings: &Settings) -> GccModel {
        let compiler = match &settings.gcc_compiler_dir {
            Some(dir) => {
                let name = PathBuf::from(&invocation.executable);
                let basename = name
                    .file_name()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| invocation.executable.clone());
                dir.join(basename).to_string_lossy().into_owned()
            }
            None => invocation.executable,
        };
        GccModel {
            compiler,
            args: invocation.args,
            srcfile: None,
            objfile: None,
            preprocessed_file: None,
        }
    }

    fn language(&self) -> Option<Language> {
        self.srcfile.as_ref().map(|src| {
            if extension_of(src) == "c" {
                Language::C
            } else {
                Language::Cxx
            }
        })
    }

    fn preprocessed_filename(&self, obj: &str) -> String {
        let suffix = match self.language() {
            Some(Language::C) => "i",
            _ => "ii",
        };
        swap_extension(obj, suffix)
    }

    pub fn classify(&mut self) -> Result<()> {
        let mut source_count = 0;
        let mut is_object_compilation = false;
        let mut has_object_file = false;

        let mut skip_next = false;
        let args = self.args.clone();
        for (n, arg) in args.iter().enumerate() {
            if skip_next {
                skip_next = false;
                continue;
            }
            if arg == "-c" {
                is_object_compilation = true;
            } else if arg == "-x" {
                skip_next = true;
            } else if is_source_file(arg) {
                source_count += 1;
                self.srcfile = Some(arg.clone());
            } else if arg == "-o" {
                skip_next = true;
                if let Some(obj) = args.get(n + 1) {
                    self.objfile = Some(obj.clone());
                    has_object_file = true;
                }
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
        if !has_object_file {
            bail!(ErrorKind::UnsupportedCompilationMode(
                "output object not specified".to_owned()
            ));
        }
        Ok(())
    }

    pub fn preprocessor_cmd(&mut self) -> Command {
        let mut cmd = vec![self.compiler.clone()];
        let mut next_is_object = false;

        for arg in &self.args {
            let mut skip = false;
            if arg == "-c" {
                cmd.push("-E".to_owned());
                skip = true;
            } else if next_is_object {
                self.objfile = Some(arg.clone());
                let preproc = self.preprocessed_filename(arg);
                self.preprocessed_file = Some(preproc.clone());
                cmd.push(preproc);
                next_is_object = false;
                skip = true;
            } else if arg == "-o" {
                next_is_object = true;
            }
            if !skip {
                cmd.push(arg.clone());
            }
        }
        Command {
            program: cmd.remove(0),
            args: cmd,
        }
    }

    /// Builds the command the remote server will execute. Requires
    /// `preprocessed_file` to already be known, either because
    /// `preprocessor_cmd()` was called first or `set_preprocessed_file`
    /// was called with the server's temporary path.
    pub fn compiler_cmd(&self) -> Command {
        let preprocessed = self
            .preprocessed_file
            .as_ref()
            .expect("compiler_cmd() called before the preprocessed file path was known");
        let srcfile = self.srcfile.as_deref();
        let mut cmd = vec![self.compiler.clone()];
        let mut skip_next = false;
        for arg in &self.args {
            if skip_next {
                skip_next = false;
                continue;
            }
            let (skip, takes_arg) = classify_flag(arg);
            skip_next = takes_arg;
            if skip {
                continue;
            }
            if Some(arg.as_str()) == srcfile {
                if !self.args.iter().any(|a| a == "-x") {
                    cmd.push("-x".to_owned());
                    cmd.push(self.language().unwrap_or(Language::Cxx).as_gcc_lang_flag().to_owned());
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

    pub fn preprocessed_file(&self) -> Option<String> {
        self.preprocessed_file.clone()
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
        let old = self.objfile.clone();
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
        self.objfile = Some(path.to_owned());
    }

    pub fn set_preprocessed_file(&mut self, path: &str) {
        self.preprocessed_file = Some(path.to_owned());
    }

    pub fn called_for_preprocessing(&self) -> bool {
        self.args.iter().any(|a| a == "-E")
    }

    /// Resolve `-march=native`/`-mcpu=native`/`-mtune=native` (actually
    /// bare `-mtune`, matching the donor's own — possibly incomplete —
    /// handling) to their concrete values before the command line is
    /// shipped anywhere.
    pub fn rewrite_local_args(&mut self, runner: &dyn CommandRunner) -> Result<()> {
        let mut rewritten = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            let new_arg = if arg == "-march=native" || arg == "-mcpu=native" {
                resolve_native_flag(runner, &self.compiler, "-march")?
            } else if arg == "-mtune" {
                resolve_native_flag(runner, &self.compiler, "-mtune")?
            } else {
                arg.clone()
            };
            rewritten.push(new_arg);
        }
        self.args = rewritten;
        Ok(())
    }
}

fn resolve_native_flag(runner: &dyn CommandRunner, compiler: &str, flag: &str) -> Result<String> {
    let args = vec![
        format!("{}=native", flag),
        "-Q".to_owned(),
        "--help=target".to_owned(),
    ];
    let output = run_and_check(runner, compiler, &args)?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let prefix = format!("{}=", flag);
    for line in stdout.lines() {
        let line = line.trim();
        if line.starts_with(&prefix) {
            return Ok(line.split_whitespace().collect());
        }
    }
    Err(format!("failed to resolve {}=native", flag).into())
}

fn run_and_check(runner: &dyn CommandRunner, program: &str, args: &[String]) -> Result<Output> {
    let output = runner.run(program, args)?;
    if !output.status.success() {
        bail!(ErrorKind::PreprocessorFailed(output));
    }
    Ok(output)
}

#[cfg(test)]
mod test {
    use super::*;
    use command::test::ScriptedRunner;

    fn model(cmdline: &str) -> GccModel {
        let mut parts = cmdline.split_whitespace().map(str::to_owned);
        let executable = parts.next().unwrap();
        GccModel::new(
            RawInvocation {
                executable,
                args: parts.collect(),
            },
            &Settings::default(),
        )
    }

    fn to_words(cmd: &Command) -> Vec<String> {
        let mut v = vec![cmd.program.clone()];
        v.extend(cmd.args.clone());
        v
    }

    #[test]
    fn test_accepts_single_compile() {
        let mut m = model("g++ -c -o foo.o foo.cpp");
        m.classify().unwrap();
        m.preprocessor_cmd();
        assert_eq!(
            to_words(&m.compiler_cmd()),
            "g++ -c -o foo.o -x c++ foo.ii".split(' ').collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_handles_c() {
        let mut m = model("gcc -c -o foo.o foo.c");
        m.classify().unwrap();
        m.preprocessor_cmd();
        assert_eq!(
            to_words(&m.compiler_cmd()),
            "gcc -c -o foo.o -x c foo.i".split(' ').collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_handles_x_cxx() {
        let mut m = model("g++ -c -o foo.o -x c++ foo.cpp");
        m.classify().unwrap();
        m.preprocessor_cmd();
        assert_eq!(
            to_words(&m.compiler_cmd()),
            "g++ -c -o foo.o -x c++ foo.ii".split(' ').collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_omits_preprocessor_args() {
        for arg in ["-DFOO", "-Ibar", "-M", "-MD"] {
            let mut m = model(&format!("g++ -O2 -c {} -o foo.o foo.cpp", arg));
            m.classify().unwrap();
            m.preprocessor_cmd();
            assert!(!to_words(&m.compiler_cmd()).contains(&arg.to_owned()));
        }
    }

    #[test]
    fn test_separate_dash_i_is_stripped() {
        let mut m = model("g++ -c -I /usr/include/foo -o foo.o foo.cpp");
        m.classify().unwrap();
        m.preprocessor_cmd();
        let words = to_words(&m.compiler_cmd());
        assert!(!words.contains(&"-I".to_owned()));
        assert!(!words.contains(&"/usr/include/foo".to_owned()));
    }

    #[test]
    fn test_rejects_linking() {
        let mut m = model("/usr/bin/g++ -O2 -o foo foo.cpp");
        assert!(m.classify().is_err());
    }

    #[test]
    fn test_rejects_multiple_sources() {
        let mut m = model("/usr/bin/g++ -O2 -c bar.cpp foo.cpp");
        assert!(m.classify().is_err());
    }

    #[test]
    fn test_no_sources() {
        let mut m = model("gcc -c -o foo.o");
        assert!(m.classify().is_err());
    }

    #[test]
    fn test_skips_includes_remote() {
        let mut m = model("g++ -c -DFOO -o foo.o foo.cpp");
        m.classify().unwrap();
        m.set_preprocessed_file("foo.ii");
        assert_eq!(m.preprocessed_file().as_deref(), Some("foo.ii"));
        assert_eq!(
            to_words(&m.compiler_cmd()),
            "g++ -c -o foo.o -x c++ foo.ii".split(' ').collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_skips_mt_remote() {
        let mut m = model("g++ -c -MT foo.o -o foo.o foo.cpp");
        m.classify().unwrap();
        m.set_preprocessed_file("foo.ii");
        assert_eq!(
            to_words(&m.compiler_cmd()),
            "g++ -c -o foo.o -x c++ foo.ii".split(' ').collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_compiler_dir() {
        let settings = Settings {
            gcc_compiler_dir: Some(PathBuf::from("/opt/rh/bin")),
            ..Settings::default()
        };
        let mut parts = "gcc -c -o foo.o foo.c".split_whitespace().map(str::to_owned);
        let executable = parts.next().unwrap();
        let mut m = GccModel::new(
            RawInvocation {
                executable,
                args: parts.collect(),
            },
            &settings,
        );
        m.classify().unwrap();
        assert_eq!(
            to_words(&m.preprocessor_cmd()),
            "/opt/rh/bin/gcc -E -o foo.i foo.c".split(' ').collect::<Vec<_>>()
        );
        assert_eq!(
            to_words(&m.compiler_cmd()),
            "/opt/rh/bin/gcc -c -o foo.o -x c foo.i".split(' ').collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_called_for_preprocessing() {
        let m = model("gcc -E -o foo.i foo.c");
        assert!(m.called_for_preprocessing());
        let m = model("gcc -c -o foo.o foo.c");
        assert!(!m.called_for_preprocessing());
    }

    #[test]
    fn test_rewrite_march_native() {
        let mut m = model("gcc -c -march=native -o foo.o foo.c");
        let runner = ScriptedRunner::new(vec![(
            "-march=native -Q --help=target".to_owned(),
            "-march=znver3\n".to_owned(),
        )]);
        m.rewrite_local_args(&runner).unwrap();
        assert!(m.args.contains(&"-march=znver3".to_owned()));
        assert!(!m.args.contains(&"-march=native".to_owned()));
    }
}
