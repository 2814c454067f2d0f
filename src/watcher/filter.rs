//! Project file filter
//!
//! Decides whether a path under the project root may be indexed: gitignore
//! rules first, then binary sniffing of the file head.

use std::path::{Component, Path, PathBuf};

use globset::GlobBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::debug;

use super::sniff;

/// Version control metadata directory, always excluded
pub const VCS_DIR: &str = ".git";

/// Ignore file read from the project root
pub const IGNORE_FILE: &str = ".gitignore";

/// Result of filtering a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    /// Path should be included
    Include,
    /// Path should be excluded
    Exclude(FilterReason),
}

impl FilterResult {
    pub fn is_included(&self) -> bool {
        matches!(self, FilterResult::Include)
    }
}

/// Reason for excluding a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    /// Inside the `.git` directory
    VcsMetadata,
    /// Matched by an ignore pattern
    Ignored,
    /// Outside the project root
    OutsideRoot,
    /// Starts with a known binary signature
    Binary,
    /// Could not be stat-ed or read
    Unreadable,
}

/// Gitignore rules anchored at a project root
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    root: PathBuf,
    matcher: Gitignore,
}

impl IgnoreRules {
    /// Rules that ignore nothing but `.git`
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            matcher: Gitignore::empty(),
            root,
        }
    }

    /// Load `<root>/.gitignore`; a missing file yields empty rules
    pub fn load(root: &Path) -> Result<Self, ignore::Error> {
        let path = root.join(IGNORE_FILE);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No {} in {:?}", IGNORE_FILE, root);
                return Ok(Self::empty(root));
            }
            Err(e) => {
                return Err(ignore::Error::WithPath {
                    path,
                    err: Box::new(ignore::Error::Io(e)),
                })
            }
        };
        Self::parse(root, Some(&path), &contents)
    }

    /// Build rules from gitignore-formatted text; any bad pattern fails
    pub fn parse(root: &Path, source: Option<&Path>, contents: &str) -> Result<Self, ignore::Error> {
        let mut builder = GitignoreBuilder::new(root);
        for (n, line) in contents.lines().enumerate() {
            if let Err(err) = validate_pattern(line) {
                let err = ignore::Error::WithLineNumber {
                    line: n as u64 + 1,
                    err: Box::new(err),
                };
                return Err(match source {
                    Some(path) => ignore::Error::WithPath {
                        path: path.to_path_buf(),
                        err: Box::new(err),
                    },
                    None => err,
                });
            }
            builder.add_line(source.map(Path::to_path_buf), line)?;
        }
        Ok(Self {
            root: root.to_path_buf(),
            matcher: builder.build()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of patterns loaded
    pub fn len(&self) -> usize {
        self.matcher.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matcher.is_empty()
    }

    /// Evaluate `path` relative to the root
    pub fn check(&self, path: &Path, is_dir: bool) -> FilterResult {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return FilterResult::Exclude(FilterReason::OutsideRoot);
        };

        if is_vcs_metadata(relative) {
            return FilterResult::Exclude(FilterReason::VcsMetadata);
        }

        if relative.as_os_str().is_empty() {
            return FilterResult::Include;
        }

        if self.matcher.matched_path_or_any_parents(relative, is_dir).is_ignore() {
            FilterResult::Exclude(FilterReason::Ignored)
        } else {
            FilterResult::Include
        }
    }

    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        !self.check(path, is_dir).is_included()
    }
}

/// Compile the glob of one gitignore line; blank lines and comments pass
///
/// `GitignoreBuilder` tolerates some malformed globs (an unclosed `[`), so
/// each pattern is compiled on its own first.
fn validate_pattern(line: &str) -> Result<(), ignore::Error> {
    let mut pattern = line.trim_end_matches('\r');
    while (pattern.ends_with(' ') || pattern.ends_with('\t')) && !pattern.ends_with("\\ ") {
        pattern = &pattern[..pattern.len() - 1];
    }
    if pattern.is_empty() || pattern.starts_with('#') {
        return Ok(());
    }

    let pattern = pattern.strip_prefix('!').unwrap_or(pattern);
    let pattern = pattern.strip_prefix('\\').unwrap_or(pattern);
    let pattern = pattern.trim_start_matches('/').trim_end_matches('/');
    if pattern.is_empty() {
        return Ok(());
    }

    GlobBuilder::new(pattern)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map(|_| ())
        .map_err(|e| ignore::Error::Glob {
            glob: Some(line.to_string()),
            err: e.to_string(),
        })
}

/// Whether any component of `relative` is the `.git` directory
pub fn is_vcs_metadata(relative: &Path) -> bool {
    relative
        .components()
        .any(|c| matches!(c, Component::Normal(name) if name == VCS_DIR))
}

/// Eligibility policy for project files
#[derive(Debug, Clone)]
pub struct ProjectFilter {
    rules: IgnoreRules,
}

impl ProjectFilter {
    pub fn new(rules: IgnoreRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &IgnoreRules {
        &self.rules
    }

    /// Whether a directory should be descended into and watched
    pub fn should_enter(&self, dir: &Path) -> bool {
        self.rules.check(dir, true).is_included()
    }

    /// Full eligibility check for a file: ignore rules, then content sniffing
    pub fn should_filter(&self, path: &Path) -> FilterResult {
        let result = self.rules.check(path, false);
        if !result.is_included() {
            return result;
        }

        match sniff::sniff_file(path) {
            Ok(true) => FilterResult::Exclude(FilterReason::Binary),
            Ok(false) => FilterResult::Include,
            Err(e) => {
                debug!("Cannot sniff {:?}: {}", path, e);
                FilterResult::Exclude(FilterReason::Unreadable)
            }
        }
    }

    /// Whether `path` may be indexed
    pub fn can_index(&self, path: &Path) -> bool {
        self.should_filter(path).is_included()
    }
}
