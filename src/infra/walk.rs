//! Filepath: src/infra/walk.rs
//! Revision tree walker.
//! - Prunes blocklisted directory names (images, VCS, caches) early
//! - Extra ignore globs (early prune + late filter)
//! - Extension filtering for `.tex` candidate discovery
//! - Deterministic ordering for stable ranking and tests
//!
//! Backed by ripgrep's `ignore` crate and `globset`. Git ignore rules are
//! deliberately off: revision folders are raw source drops, and a stray
//! `.gitignore` in an upload must not hide the files a paper compiles from.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};

/// Walker over one revision's source tree.
#[derive(Clone)]
pub struct FileWalker
{
    /// Directory names pruned wherever they appear
    blocked_dirs: HashSet<String>,

    /// Compiled set of additional ignore patterns
    ignore_patterns: GlobSet,

    /// Follow symbolic links; default false
    follow_symlinks: bool,
}

impl Default for FileWalker
{
    fn default() -> Self
    {
        let blocked = crate::infra::config::Config::default().blocked_dirs;
        Self {
            blocked_dirs: blocked
                .into_iter()
                .collect(),
            ignore_patterns: GlobSet::empty(),
            follow_symlinks: false,
        }
    }
}

impl FileWalker
{
    /// Build a walker pruning `blocked_dirs` by name and filtering
    /// `additional_ignores` globs on revision-relative paths.
    pub fn new(
        blocked_dirs: &[String],
        additional_ignores: &[String],
    ) -> Result<Self>
    {
        let mut builder = GlobSetBuilder::new();

        for pattern in additional_ignores
        {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self {
            blocked_dirs: blocked_dirs
                .iter()
                .cloned()
                .collect(),
            ignore_patterns: builder.build()?,
            follow_symlinks: false,
        })
    }

    /// Convenience constructor from the loaded configuration.
    pub fn from_config(config: &crate::infra::config::Config) -> Result<Self>
    {
        Ok(Self::new(&config.blocked_dirs, &config.ignore_patterns)?
            .with_follow_symlinks(config.follow_symlinks))
    }

    /// (Optional) Follow or skip symbolic links (default false).
    pub fn with_follow_symlinks(
        mut self,
        follow: bool,
    ) -> Self
    {
        self.follow_symlinks = follow;
        self
    }

    /// Internal: construct a configured WalkBuilder for `root`.
    fn build_walk(
        &self,
        root: &Path,
    ) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(root);

        // Raw source drops: no ignore files, keep dotfiles
        b.standard_filters(false);
        b.follow_links(self.follow_symlinks);

        let blocked = self
            .blocked_dirs
            .clone();
        let extra = self
            .ignore_patterns
            .clone();
        b.filter_entry(move |ent: &DirEntry| {
            let is_dir = ent
                .file_type()
                .map(|ft| ft.is_dir())
                .unwrap_or(false);

            // The walk root itself is never pruned
            if !is_dir || ent.depth() == 0
            {
                return true;
            }

            let name = ent
                .file_name()
                .to_string_lossy();
            !blocked.contains(name.as_ref()) && !extra.is_match(ent.path())
        });

        b
    }

    /// Traverse files under `root`, pruning blocked directories.
    /// Returns a **sorted** list of file paths for determinism.
    pub fn walk_files<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Vec<PathBuf>
    {
        let root_path = root.as_ref();
        let walker = self
            .build_walk(root_path)
            .build();

        let mut out: Vec<PathBuf> = walker
            // Unreadable entries are skipped; the caller only sees what it can read
            .filter_map(|res| res.ok())
            .filter(|entry| {
                entry
                    .file_type()
                    .is_some_and(|ft| ft.is_file())
            })
            .map(|entry| entry.into_path())
            // Late file-level extra ignore filtering using RELATIVE path
            .filter(|abs| {
                let rel = abs
                    .strip_prefix(root_path)
                    .unwrap_or(abs);
                !self
                    .ignore_patterns
                    .is_match(rel)
            })
            .collect();

        out.sort();

        out
    }

    /// Files whose extension equals `ext`, compared case-insensitively.
    pub fn walk_with_extension<P: AsRef<Path>>(
        &self,
        root: P,
        ext: &str,
    ) -> Vec<PathBuf>
    {
        self.walk_files(root)
            .into_iter()
            .filter(|p| has_extension(p, ext))
            .collect()
    }
}

/// Case-insensitive extension check (`Main.TEX` counts as `.tex`).
pub fn has_extension(
    path: &Path,
    ext: &str,
) -> bool
{
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}
