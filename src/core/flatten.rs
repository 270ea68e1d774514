//! Include resolution: inline every `\input`/`\include`/`\subfile` target
//! into one logical document, with boundary markers around each file.

use std::{
    collections::HashSet,
    path::{Component, Path, PathBuf},
};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use owo_colors::OwoColorize;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{
    cli::{AppContext, FlattenArgs},
    core::{clean::Comments, root::RootResolver},
    infra::{config::load_config, io::read_text_lossy, walk::FileWalker},
};

/// How re-inclusion of an already visited file is treated.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum VisitPolicy
{
    /// Only files on the current inclusion path count as visited, so a
    /// diamond (`A→B→D`, `A→C→D`) inlines `D` twice
    #[default]
    PerBranch,
    /// Any file seen earlier anywhere in the walk counts as a cycle
    Global,
}

static INCLUDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(?:input|include|subfile)(?:\s*\{([^}]+)\}|\s+([^\s%{}\\][^\s%{}]*))")
        .expect("valid include pattern")
});

static BIBLIOGRAPHY_CMD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\bibliography\{[^}]+\}").expect("valid bibliography pattern"));

static THEBIBLIOGRAPHY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\\begin\{thebibliography\}.*?\\end\{thebibliography\}")
        .expect("valid thebibliography pattern")
});

/// Flattened document plus what went into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlattenResult
{
    pub root_file: PathBuf,
    /// Root-relative paths of files read, root first
    pub merged_files: Vec<String>,
    /// Root-relative paths of include targets that could not be read
    pub missing_files: Vec<String>,
    pub strip_bibliography: bool,
    pub content: String,
}

impl FlattenResult
{
    /// Length of the flattened content in characters.
    pub fn total_length(&self) -> usize
    {
        self.content
            .chars()
            .count()
    }

    pub fn merged_count(&self) -> usize
    {
        self.merged_files
            .len()
    }
}

pub struct Flattener
{
    root: PathBuf,
    strip_bibliography: bool,
    visit_policy: VisitPolicy,
}

impl Flattener
{
    pub fn new(root: impl Into<PathBuf>) -> Self
    {
        Self { root: root.into(), strip_bibliography: false, visit_policy: VisitPolicy::default() }
    }

    pub fn strip_bibliography(
        mut self,
        strip: bool,
    ) -> Self
    {
        self.strip_bibliography = strip;
        self
    }

    pub fn visit_policy(
        mut self,
        policy: VisitPolicy,
    ) -> Self
    {
        self.visit_policy = policy;
        self
    }

    /// Flatten starting at the root file. Fails only when the root itself
    /// cannot be read; missing or circular includes become markers.
    #[instrument(skip(self), fields(root = %self.root.display(), strip = self.strip_bibliography))]
    pub fn flatten(&self) -> Result<FlattenResult>
    {
        let root_file = dunce::canonicalize(&self.root)
            .with_context(|| format!("Failed to resolve root file {}", self.root.display()))?;
        let root_text = read_text_lossy(&root_file)
            .with_context(|| format!("Failed to read root file {}", root_file.display()))?;
        let root_dir = root_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut walk = Walk {
            root_dir: &root_dir,
            strip_bibliography: self.strip_bibliography,
            policy: self.visit_policy,
            visited: HashSet::new(),
            merged_files: Vec::new(),
            missing_files: Vec::new(),
        };

        let root_rel = walk.relative(&root_file);
        walk.visited
            .insert(root_file.clone());
        walk.merged_files
            .push(root_rel);
        let content = walk.expand(&root_file, &root_text);

        debug!(
            merged = walk.merged_files.len(),
            missing = walk.missing_files.len(),
            "flatten complete"
        );

        Ok(FlattenResult {
            root_file,
            merged_files: walk.merged_files,
            missing_files: walk.missing_files,
            strip_bibliography: self.strip_bibliography,
            content,
        })
    }
}

/// Mutable state of one flatten walk.
struct Walk<'a>
{
    root_dir: &'a Path,
    strip_bibliography: bool,
    policy: VisitPolicy,
    visited: HashSet<PathBuf>,
    merged_files: Vec<String>,
    missing_files: Vec<String>,
}

impl Walk<'_>
{
    /// Clean `raw` (the text of `current`) and splice in every include.
    fn expand(
        &mut self,
        current: &Path,
        raw: &str,
    ) -> String
    {
        let mut text = Comments::strip(raw).into_owned();
        if self.strip_bibliography
        {
            text = remove_bibliography(&text);
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for cap in INCLUDE.captures_iter(&text)
        {
            let Some(whole) = cap.get(0)
            else
            {
                continue;
            };
            out.push_str(&text[last..whole.start()]);
            last = whole.end();

            let Some(target) = cap
                .get(1)
                .or_else(|| cap.get(2))
                .map(|m| {
                    m.as_str()
                        .trim()
                })
                .filter(|t| !t.is_empty())
            else
            {
                continue;
            };

            let mut name = target.to_string();
            if !name
                .to_lowercase()
                .ends_with(".tex")
            {
                name.push_str(".tex");
            }

            let child = self.inline(current, &name);
            out.push_str(&format!("\n% <BEGIN_FILE: {name}>\n{child}\n% <END_FILE: {name}>\n"));
        }

        out.push_str(&text[last..]);
        out
    }

    /// Resolve and expand one include target named in `current`.
    fn inline(
        &mut self,
        current: &Path,
        name: &str,
    ) -> String
    {
        let mut child = normalize(&self.root_dir.join(name));
        if !child.exists()
            && let Some(dir) = current.parent()
        {
            child = normalize(&dir.join(name));
        }
        let child = dunce::canonicalize(&child).unwrap_or(child);
        let rel = self.relative(&child);

        if !self
            .visited
            .insert(child.clone())
        {
            debug!(file = %rel, "circular include");
            return format!("\n% <WARNING: Circular dependency detected for {rel}>\n");
        }

        let body = match read_text_lossy(&child)
        {
            Ok(raw) =>
            {
                self.merged_files
                    .push(rel);
                self.expand(&child, &raw)
            }
            Err(_) =>
            {
                warn!(file = %rel, "included file not found");
                let marker = format!("\n% <WARNING: File not found: {rel}>\n");
                self.missing_files
                    .push(rel);
                marker
            }
        };

        if self.policy == VisitPolicy::PerBranch
        {
            self.visited
                .remove(&child);
        }

        body
    }

    /// Root-relative display path with forward slashes.
    fn relative(
        &self,
        path: &Path,
    ) -> String
    {
        let rel = path
            .strip_prefix(self.root_dir)
            .unwrap_or(path);
        rel.to_string_lossy()
            .replace('\\', "/")
    }
}

/// Remove `\bibliography{..}`, `\printbibliography` and `thebibliography`
/// environments.
pub fn remove_bibliography(text: &str) -> String
{
    let text = BIBLIOGRAPHY_CMD.replace_all(text, "");
    let text = text.replace(r"\printbibliography", "");
    THEBIBLIOGRAPHY
        .replace_all(&text, "")
        .into_owned()
}

/// Lexically resolve `.` and `..` so a missing file still gets a stable identity.
fn normalize(path: &Path) -> PathBuf
{
    let mut out = PathBuf::new();
    for component in path.components()
    {
        match component
        {
            Component::CurDir =>
            {}
            Component::ParentDir =>
            {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub fn run(
    args: FlattenArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config = load_config().unwrap_or_default();

    let root_file = if args
        .path
        .is_dir()
    {
        let walker =
            FileWalker::from_config(&config).context("Invalid ignore patterns in config")?;
        RootResolver::new(config.root, walker)
            .find_root(&args.path)
            .with_context(|| format!("No root .tex file found in {}", args.path.display()))?
    }
    else
    {
        args.path
            .clone()
    };

    let policy = args
        .visit_policy
        .unwrap_or(config.flatten.visit_policy);
    let result = Flattener::new(&root_file)
        .strip_bibliography(!args.keep_bibliography)
        .visit_policy(policy)
        .flatten()?;

    let rendered = if args.json
    {
        serde_json::to_string_pretty(&result).context("Failed to serialize flatten result")?
    }
    else
    {
        result
            .content
            .clone()
    };

    match &args.output
    {
        Some(out) if ctx.dry_run =>
        {
            if !ctx.quiet
            {
                println!(
                    "{}",
                    format!("DRY RUN: would write {} bytes to {}", rendered.len(), out.display())
                        .yellow()
                );
            }
        }
        Some(out) =>
        {
            std::fs::write(out, &rendered)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            if !ctx.quiet
            {
                println!(
                    "{} Flattened {} files ({} missing) into {}",
                    "✓".green(),
                    result.merged_count(),
                    result
                        .missing_files
                        .len(),
                    out.display()
                );
            }
        }
        None => println!("{rendered}"),
    }

    Ok(())
}
