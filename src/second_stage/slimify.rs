// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Pattern-driven filesystem slimming.

Walks a root filesystem and removes paths matching a `.dockerignore`-style
pattern set: one pattern per line, `#` comments, `!` negation with
last-match-wins, and "matches or any parent matches" semantics so the
contents of a matched directory match too. A matched directory is only
removed once nothing but directories remains beneath it.
*/

use {
    crate::error::{Result, RootfsError},
    glob::{MatchOptions, Pattern},
    std::path::Path,
    tracing::{debug, warn},
};

/// The built-in pattern set for slimming a freshly assembled image.
pub const DEFAULT_PATTERNS: &str = include_str!("slimify.defaults");

/// Directories never descended into.
const EXCLUDED_DIRS: &[&str] = &["dev", "proc", "sys", "tmp"];

struct SlimPattern {
    pattern: Pattern,
    negated: bool,
}

/// A compiled `.dockerignore`-style pattern set.
pub struct PatternSet {
    patterns: Vec<SlimPattern>,
}

impl PatternSet {
    /// Parse a pattern set from text, one pattern per line.
    pub fn parse(text: &str) -> Result<Self> {
        let mut patterns = vec![];

        for line in text.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (raw, negated) = match line.strip_prefix('!') {
                Some(rest) => (rest, true),
                None => (line, false),
            };

            let raw = raw.trim_start_matches('/').trim_end_matches('/');

            patterns.push(SlimPattern {
                pattern: Pattern::new(raw)
                    .map_err(|e| RootfsError::BadPattern(line.to_string(), e))?,
                negated,
            });
        }

        Ok(Self { patterns })
    }

    /// The built-in slim pattern set.
    pub fn built_in() -> Self {
        Self::parse(DEFAULT_PATTERNS).expect("built-in patterns should parse")
    }

    /// Whether `path` (relative, no leading slash) or any of its parents
    /// matches the set. Later patterns override earlier ones, so a negated
    /// pattern can carve exceptions out of a broad match.
    pub fn matches(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/');

        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::default()
        };

        let mut matched = false;

        for slim in &self.patterns {
            if candidates(path).any(|candidate| slim.pattern.matches_with(candidate, options)) {
                matched = !slim.negated;
            }
        }

        matched
    }
}

/// The path itself plus each of its parents.
fn candidates(path: &str) -> impl Iterator<Item = &str> {
    path.char_indices()
        .filter_map(move |(i, c)| (c == '/').then(|| &path[..i]))
        .chain([path])
}

/// Remove everything beneath `root` matching the pattern set.
///
/// Permission errors during the walk are logged and skipped; removal
/// failures are fatal.
pub fn slimify(root: &Path, patterns: &PatternSet) -> Result<()> {
    let excluded = EXCLUDED_DIRS
        .iter()
        .map(|dir| root.join(dir))
        .collect::<Vec<_>>();

    let mut paths_to_remove = vec![];

    let walker = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| !excluded.iter().any(|dir| entry.path() == dir));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if e.io_error()
                    .map(|io| io.kind() == std::io::ErrorKind::PermissionDenied)
                    .unwrap_or(false)
                {
                    warn!(error = %e, "skipping unreadable path");
                    continue;
                }

                return Err(RootfsError::IoPath(
                    e.path().map(|p| p.display().to_string()).unwrap_or_default(),
                    e.into(),
                ));
            }
        };

        let relative = match entry.path().strip_prefix(root) {
            Ok(relative) if !relative.as_os_str().is_empty() => relative,
            _ => continue,
        };

        if patterns.matches(&relative.to_string_lossy()) {
            paths_to_remove.push(entry.into_path());
        }
    }

    // Longest paths first, so files go before the directories holding them.
    paths_to_remove.sort_by_key(|path| std::cmp::Reverse(path.as_os_str().len()));

    for path in paths_to_remove {
        let io_err = |e: std::io::Error| RootfsError::IoPath(path.display().to_string(), e);

        let metadata = std::fs::symlink_metadata(&path).map_err(io_err)?;

        if metadata.is_dir() {
            // A directory still holding real content is retained; negated
            // patterns may have kept files beneath it.
            if !is_dir_contentless(&path)? {
                continue;
            }

            debug!(path = %path.display(), "removing");
            std::fs::remove_dir_all(&path).map_err(io_err)?;
        } else {
            debug!(path = %path.display(), "removing");
            std::fs::remove_file(&path).map_err(io_err)?;
        }
    }

    Ok(())
}

/// Whether a directory holds nothing but (possibly nested) directories.
fn is_dir_contentless(path: &Path) -> Result<bool> {
    for entry in walkdir::WalkDir::new(path) {
        let entry =
            entry.map_err(|e| RootfsError::IoPath(path.display().to_string(), e.into()))?;

        if !entry.file_type().is_dir() {
            return Ok(false);
        }
    }

    Ok(true)
}
