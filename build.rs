//! Build script for Narrator
//!
//! Embeds git revision, build timestamp, target and compiler version so
//! `narrator version` can report exactly what is running.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let git_hash = run("git", &["rev-parse", "--short=8", "HEAD"]);
    let git_branch = run("git", &["rev-parse", "--abbrev-ref", "HEAD"]);
    let git_dirty = match Command::new("git").args(["status", "--porcelain"]).output() {
        Ok(out) if out.status.success() => (!out.stdout.is_empty()).to_string(),
        _ => "unknown".to_string(),
    };

    let vars = [
        ("NARRATOR_GIT_HASH", git_hash),
        ("NARRATOR_GIT_BRANCH", git_branch),
        ("NARRATOR_GIT_DIRTY", git_dirty),
        (
            "NARRATOR_BUILD_TIMESTAMP",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ),
        ("NARRATOR_TARGET", env_or_unknown("TARGET")),
        ("NARRATOR_PROFILE", env_or_unknown("PROFILE")),
        ("NARRATOR_HOST", env_or_unknown("HOST")),
        ("NARRATOR_RUSTC_VERSION", run("rustc", &["--version"])),
    ];

    for (key, value) in vars {
        println!("cargo:rustc-env={}={}", key, value);
    }
}

fn env_or_unknown(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| "unknown".to_string())
}

/// Run a command and return its trimmed stdout, or "unknown" on any failure
fn run(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
