//! Entry Point Dispatch
//!
//! Decides whether a module was launched directly by the process or merely
//! loaded by someone else, and starts the server only in the first case.
//! The comparison is done on canonical `file://` URLs: the script path found
//! in the argument vector is resolved against the working directory and
//! converted to a URL, then compared with the identifier of the module that
//! is currently running.
//!
//! The `llm-delegator` binary has its own entry unit and starts the server
//! from `main` directly. `run_cli` is meant for launchers that receive a
//! runtime-style argument vector (`[runtime, script, args...]`).

use std::ffi::OsString;
use std::future::Future;
use std::path::{Component, Path, PathBuf};

use url::Url;

/// Canonical identifier of the invoked script, or an empty string when the
/// argument vector carries no usable script path.
pub fn entry_url(argv: &[OsString]) -> String {
    let Some(script) = argv.get(1).filter(|s| !s.is_empty()) else {
        return String::new();
    };
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::debug!("cannot read working directory: {}", e);
            return String::new();
        }
    };
    file_url(&resolve(&cwd, Path::new(script)))
}

/// Identifier of the running executable in the same URL form as `entry_url`.
pub fn current_module_url() -> String {
    std::env::current_exe()
        .map(|exe| file_url(&exe))
        .unwrap_or_default()
}

/// Run `start` once if `module_url` names the script the process was
/// invoked with. Errors from `start` are returned untouched.
pub async fn run_cli<F, Fut, E>(argv: &[OsString], module_url: &str, start: F) -> Result<(), E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let entry = entry_url(argv);
    if !entry.is_empty() && module_url == entry {
        tracing::debug!(entry = %entry, "module invoked directly, starting server");
        start().await?;
    } else {
        tracing::debug!(entry = %entry, module = %module_url, "module not invoked directly");
    }
    Ok(())
}

/// Join `path` onto `base` when relative and fold `.`/`..` lexically.
fn resolve(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn file_url(path: &Path) -> String {
    Url::from_file_path(path)
        .map(String::from)
        .unwrap_or_default()
}
