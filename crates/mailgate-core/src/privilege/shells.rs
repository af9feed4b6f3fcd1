//! Login shell allow-list, read the way `getusershell(3)` reads it

use std::path::{Path, PathBuf};
use tracing::debug;

/// Shells used when the allow-list file cannot be read
const FALLBACK_SHELLS: [&str; 2] = ["/bin/sh", "/bin/csh"];

/// The set of shells that mark an account as able to log in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellList {
    shells: Vec<PathBuf>,
}

impl ShellList {
    /// Read the allow-list at `path`
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Shell list unreadable, using built-in list");
                Self::fallback()
            }
        }
    }

    /// Parse allow-list content.
    ///
    /// An entry starts at the first `/` of a line and runs to whitespace or
    /// `#`. Lines whose first `/` is preceded by `#` are comments.
    pub fn parse(content: &str) -> Self {
        let shells = content
            .lines()
            .filter_map(|line| {
                let start = line.find(&['#', '/'][..])?;
                let rest = &line[start..];
                if rest.starts_with('#') || rest.len() == 1 {
                    return None;
                }
                let end = rest
                    .find(|c: char| c.is_whitespace() || c == '#')
                    .unwrap_or(rest.len());
                Some(PathBuf::from(&rest[..end]))
            })
            .collect();

        Self { shells }
    }

    fn fallback() -> Self {
        Self {
            shells: FALLBACK_SHELLS.iter().map(PathBuf::from).collect(),
        }
    }

    /// Whether `shell` is an allowed login shell
    pub fn contains(&self, shell: &Path) -> bool {
        self.shells.iter().any(|s| s == shell)
    }
}
