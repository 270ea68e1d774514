//! Inclusion graph of one revision: which `.tex` files include which.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::infra::{io::read_text_lossy, walk::FileWalker};

static INCLUDE_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(?:input|include|subfile)(?:\[.*?\])?\{([^}]+)\}")
        .expect("valid include directive pattern")
});

/// `child → [parent, ...]` over absolute paths within one source tree.
#[derive(Debug, Default, Clone)]
pub struct DependencyMap
{
    parents: HashMap<PathBuf, Vec<PathBuf>>,
}

impl DependencyMap
{
    /// How many include directives resolve to `path`.
    pub fn inbound_count(
        &self,
        path: &Path,
    ) -> usize
    {
        self.parents
            .get(path)
            .map_or(0, Vec::len)
    }

    pub fn parents(
        &self,
        path: &Path,
    ) -> &[PathBuf]
    {
        self.parents
            .get(path)
            .map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize
    {
        self.parents
            .len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.parents
            .is_empty()
    }

    fn record(
        &mut self,
        child: PathBuf,
        parent: PathBuf,
    )
    {
        self.parents
            .entry(child)
            .or_default()
            .push(parent);
    }
}

/// Scan every `.tex` file under `root` and map included files to their includers.
///
/// Targets are matched by basename only, so `\input{sections/intro}` resolves
/// to any `intro.tex` in the tree. Unresolvable targets and unreadable files
/// are skipped.
pub fn build_dependency_map(
    root: &Path,
    walker: &FileWalker,
) -> DependencyMap
{
    let tex_files = walker.walk_with_extension(root, "tex");

    let by_name: HashMap<String, PathBuf> = tex_files
        .iter()
        .filter_map(|p| {
            p.file_name()
                .map(|n| (n.to_string_lossy().into_owned(), p.clone()))
        })
        .collect();

    let mut map = DependencyMap::default();

    for parent in &tex_files
    {
        let Ok(content) = read_text_lossy(parent)
        else
        {
            debug!(file = %parent.display(), "skipping unreadable file");
            continue;
        };

        for cap in INCLUDE_DIRECTIVE.captures_iter(&content)
        {
            let target = cap[1].trim();
            let mut name = Path::new(target)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| target.to_string());
            if !name
                .to_lowercase()
                .ends_with(".tex")
            {
                name.push_str(".tex");
            }

            if let Some(child) = by_name.get(&name)
            {
                map.record(child.clone(), parent.clone());
            }
        }
    }

    debug!(root = %root.display(), included = map.len(), "dependency map built");
    map
}

#[cfg(test)]
mod tests
{
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn records_includers_by_basename() -> anyhow::Result<()>
    {
        let dir = TempDir::new()?;
        let root = dir.path();
        fs::create_dir_all(root.join("sections"))?;
        fs::write(root.join("main.tex"), r"\input{sections/intro}\include{body.tex}\input{gone}")?;
        fs::write(root.join("other.tex"), r"\subfile[opt]{intro}")?;
        fs::write(root.join("sections/intro.tex"), "Intro")?;
        fs::write(root.join("body.tex"), "Body")?;

        let map = build_dependency_map(root, &FileWalker::default());

        let intro = root.join("sections/intro.tex");
        assert_eq!(map.inbound_count(&intro), 2);
        assert_eq!(map.inbound_count(&root.join("body.tex")), 1);
        assert_eq!(map.inbound_count(&root.join("main.tex")), 0);
        assert!(
            map.parents(&root.join("body.tex"))
                .contains(&root.join("main.tex"))
        );
        assert_eq!(map.len(), 2);
        Ok(())
    }

    #[test]
    fn blocked_directories_are_not_scanned() -> anyhow::Result<()>
    {
        let dir = TempDir::new()?;
        let root = dir.path();
        fs::create_dir_all(root.join("figures"))?;
        fs::write(root.join("figures/wrapper.tex"), r"\input{plot}")?;
        fs::write(root.join("plot.tex"), "plot")?;

        let map = build_dependency_map(root, &FileWalker::default());
        assert!(map.is_empty());
        Ok(())
    }
}
