//! Compiles Java snippets with the system `javac` and hands back the class
//! files, for differential tests against real compiler output.
//!
//! Tests using this module should be `#[ignore]`d and skip themselves when
//! [`javac_available`] is false.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

#[derive(Debug, Clone)]
pub struct JavacOptions {
    /// Maps to `javac --release`.
    pub release: Option<u32>,
    /// Emit `LocalVariableTable` (`-g`). Defaults to `true`.
    pub debug_info: bool,
    /// Extra command-line args appended after the defaults.
    pub extra_args: Vec<String>,
}

impl Default for JavacOptions {
    fn default() -> Self {
        Self {
            release: None,
            debug_info: true,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct CompiledClasses {
    pub status: std::process::ExitStatus,
    pub stderr: String,
    /// Class files keyed by internal name (`com/example/Foo$1`).
    pub classes: BTreeMap<String, Vec<u8>>,
}

impl CompiledClasses {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn class(&self, internal_name: &str) -> Option<&[u8]> {
        self.classes.get(internal_name).map(Vec::as_slice)
    }
}

/// Compiles a single `Test.java`.
pub fn compile_snippet(source: &str) -> io::Result<CompiledClasses> {
    compile_files_with_options(&[("Test.java", source)], &JavacOptions::default())
}

/// Compiles several files in one temporary directory.
pub fn compile_files_with_options(
    files: &[(&str, &str)],
    opts: &JavacOptions,
) -> io::Result<CompiledClasses> {
    let dir = TempDir::new()?;
    for (name, src) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, src)?;
    }

    let out_dir = dir.path().join("out");
    let mut cmd = Command::new("javac");
    cmd.current_dir(dir.path());
    cmd.args(["-encoding", "UTF-8", "-classpath", "."]);
    if let Some(release) = opts.release {
        cmd.arg("--release");
        cmd.arg(release.to_string());
    }
    if opts.debug_info {
        cmd.arg("-g");
    }
    cmd.args(&opts.extra_args);
    cmd.arg("-d");
    cmd.arg(&out_dir);
    for (name, _) in files {
        cmd.arg(name);
    }

    let out = cmd.output()?;
    let mut classes = BTreeMap::new();
    if out.status.success() {
        collect_classes(&out_dir, &out_dir, &mut classes)?;
    }
    tracing::debug!(
        target: "pointcut.test_utils",
        files = files.len(),
        classes = classes.len(),
        success = out.status.success(),
        "ran javac"
    );
    Ok(CompiledClasses {
        status: out.status,
        stderr: String::from_utf8_lossy(&out.stderr).to_string(),
        classes,
    })
}

fn collect_classes(
    root: &Path,
    dir: &Path,
    out: &mut BTreeMap<String, Vec<u8>>,
) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_classes(root, &path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "class") {
            let relative: PathBuf = path
                .strip_prefix(root)
                .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?
                .with_extension("");
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            out.insert(name, std::fs::read(&path)?);
        }
    }
    Ok(())
}

/// Whether `javac` can be run at all.
pub fn javac_available() -> bool {
    Command::new("javac")
        .arg("-version")
        .output()
        .is_ok_and(|out| out.status.success())
}
