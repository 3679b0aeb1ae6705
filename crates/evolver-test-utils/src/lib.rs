//! Shared test utilities for evolver tests.
//!
//! The agent is only reachable as a subprocess, so tests stand in for the
//! `claude` binary with small `/bin/sh` scripts written into a temp
//! directory. The scripts receive the exact argument vector the client
//! builds and print whatever JSON the test needs.

use std::path::{Path, PathBuf};

/// Write an executable shell script named `name` into `dir`.
///
/// `body` is everything after the `#!/bin/sh` line.
pub fn fake_agent(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}"))
        .unwrap_or_else(|e| panic!("failed to write fake agent {}: {e}", path.display()));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .unwrap_or_else(|e| panic!("failed to chmod fake agent {}: {e}", path.display()));
    }

    path
}

/// Shell snippet that prints each of `lines` verbatim on its own line.
///
/// Uses a quoted heredoc, so JSON needs no shell escaping.
pub fn print_lines(lines: &[&str]) -> String {
    format!("cat <<'EVOLVER_EOF'\n{}\nEVOLVER_EOF\n", lines.join("\n"))
}

/// Shell snippet that records the script's argv, one argument per line,
/// into `file`.
pub fn record_args(file: &Path) -> String {
    format!("printf '%s\\n' \"$@\" > '{}'\n", file.display())
}

/// Build a single-shot reply object as the `json` output format emits it.
pub fn json_reply(result: &str, session_id: &str) -> String {
    serde_json::json!({
        "type": "result",
        "result": result,
        "session_id": session_id,
        "usage": {"input_tokens": 1, "output_tokens": 1},
    })
    .to_string()
}

/// Whether `pid` no longer names a live process (gone or a zombie).
#[cfg(target_os = "linux")]
pub fn process_exited(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // The state field follows the parenthesised command name.
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_none_or(|state| state == "Z" || state == "X"),
        Err(_) => true,
    }
}

/// Create a temp directory, panicking with context on failure.
pub fn tempdir() -> tempfile::TempDir {
    tempfile::tempdir().expect("failed to create temp dir")
}
