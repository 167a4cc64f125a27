//! What `narrator version` prints, and the user agent the provider sees.
//!
//! Every value is stamped into the binary by `build.rs`.

use std::fmt;

#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub git_hash: &'static str,
    pub git_branch: &'static str,
    dirty: &'static str,
    pub built_at: &'static str,
    pub target: &'static str,
    pub host: &'static str,
    pub profile: &'static str,
    pub rustc: &'static str,
}

const BUILD: BuildInfo = BuildInfo {
    name: env!("CARGO_PKG_NAME"),
    version: env!("CARGO_PKG_VERSION"),
    git_hash: env!("NARRATOR_GIT_HASH"),
    git_branch: env!("NARRATOR_GIT_BRANCH"),
    dirty: env!("NARRATOR_GIT_DIRTY"),
    built_at: env!("NARRATOR_BUILD_TIMESTAMP"),
    target: env!("NARRATOR_TARGET"),
    host: env!("NARRATOR_HOST"),
    profile: env!("NARRATOR_PROFILE"),
    rustc: env!("NARRATOR_RUSTC_VERSION"),
};

impl BuildInfo {
    /// `0.1.0-abc1234`, with `-dirty` appended for uncommitted builds
    pub fn full_version(&self) -> String {
        let suffix = if self.dirty == "true" { "-dirty" } else { "" };
        format!("{}-{}{}", self.version, self.git_hash, suffix)
    }

    pub fn user_agent(&self) -> String {
        format!("{}/{} ({})", self.name, self.full_version(), self.target)
    }

    fn rows(&self) -> [(&'static str, &'static str); 8] {
        [
            ("Version", self.version),
            ("Git Hash", self.git_hash),
            ("Git Branch", self.git_branch),
            ("Built", self.built_at),
            ("Profile", self.profile),
            ("Target", self.target),
            ("Host", self.host),
            ("Compiler", self.rustc),
        ]
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}\n", self.name, self.full_version())?;
        for (label, value) in self.rows() {
            writeln!(f, "  {:<11} {}", format!("{}:", label), value)?;
        }
        Ok(())
    }
}

pub fn build_info() -> BuildInfo {
    BUILD
}

pub fn print_version() {
    print!("{}", BUILD);
}
