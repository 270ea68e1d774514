//! Root file discovery: score every `.tex` candidate in a revision and pick
//! the document's entry point.
//!
//! Signals come in three groups:
//! - structure: `\documentclass`, `\begin{document}`, title/abstract markers
//! - forensics: build artefacts next to the file (`.bbl`, `.bib`, `.log`)
//!   and how often other files include it
//! - naming: canonical names up, templates and reviewer letters down

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use aho_corasick::AhoCorasick;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use owo_colors::OwoColorize;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tabled::{Table, Tabled};
use tracing::{debug, instrument};

use crate::{
    cli::{AppContext, RootArgs},
    core::{
        clean::Comments,
        deps::{DependencyMap, build_dependency_map},
    },
    infra::{
        config::load_config,
        io::read_text_lossy,
        walk::{FileWalker, has_extension},
    },
};

/// Every number the scorer uses. Serialized under `[root.weights]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootWeights
{
    /// Score for a file without `\documentclass`
    pub rejected: i32,
    /// Candidates at or below this score are never chosen
    pub discard_at_or_below: i32,

    pub documentclass: i32,
    pub begin_document: i32,
    pub per_inbound_reference: i32,

    pub same_stem_bbl: i32,
    pub same_stem_bib: i32,
    pub same_stem_log: i32,

    pub bibliography_marker: i32,
    pub maketitle: i32,
    pub abstract_env: i32,
    pub per_include: i32,
    pub include_cap: i32,

    pub canonical_name: i32,
    pub template_name: i32,
    /// The template penalty only applies below this running score
    pub template_guard: i32,
    pub response_name: i32,

    pub beamer_class: i32,
    pub standalone_class: i32,
    pub letter_class: i32,

    /// Top two closer than this are a tie
    pub tie_margin: i32,
    /// A tied runner-up this much longer wins
    pub tie_length_ratio: f64,
}

impl Default for RootWeights
{
    fn default() -> Self
    {
        Self {
            rejected: -1000,
            discard_at_or_below: -100,
            documentclass: 20,
            begin_document: 20,
            per_inbound_reference: -50,
            same_stem_bbl: 60,
            same_stem_bib: 20,
            same_stem_log: 30,
            bibliography_marker: 15,
            maketitle: 10,
            abstract_env: 10,
            per_include: 3,
            include_cap: 30,
            canonical_name: 10,
            template_name: -10,
            template_guard: 60,
            response_name: -50,
            beamer_class: -50,
            standalone_class: -20,
            letter_class: -50,
            tie_margin: 5,
            tie_length_ratio: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RootConfig
{
    /// Lowercase file names preferred as entry points
    pub canonical_names: Vec<String>,
    pub weights: RootWeights,
}

impl Default for RootConfig
{
    fn default() -> Self
    {
        Self {
            canonical_names: ["main.tex", "ms.tex", "paper.tex", "article.tex"]
                .into_iter()
                .map(String::from)
                .collect(),
            weights: RootWeights::default(),
        }
    }
}

impl RootConfig
{
    pub fn is_canonical(
        &self,
        file_name: &str,
    ) -> bool
    {
        let lower = file_name.to_lowercase();
        self.canonical_names
            .iter()
            .any(|n| n.eq_ignore_ascii_case(&lower))
    }
}

/// Markers looked up in one overlapping pass; order matches `Marker`.
const MARKERS: [&str; 9] = [
    r"\documentclass",
    r"\begin{document}",
    r"\bibliography",
    r"\begin{thebibliography}",
    r"\maketitle",
    r"\begin{abstract}",
    r"\documentclass{beamer}",
    r"\documentclass{standalone}",
    r"\documentclass{letter}",
];

#[derive(Clone, Copy)]
enum Marker
{
    DocumentClass,
    BeginDocument,
    Bibliography,
    TheBibliography,
    MakeTitle,
    Abstract,
    Beamer,
    Standalone,
    Letter,
}

static MARKER_SCAN: Lazy<AhoCorasick> =
    Lazy::new(|| AhoCorasick::new(MARKERS).expect("valid root marker set"));

static OUTGOING_INCLUDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(input|include|subfile)\{").expect("valid outgoing include pattern")
});

struct MarkerSet([bool; MARKERS.len()]);

impl MarkerSet
{
    fn scan(text: &str) -> Self
    {
        let mut seen = [false; MARKERS.len()];
        for m in MARKER_SCAN.find_overlapping_iter(text)
        {
            seen[m
                .pattern()
                .as_usize()] = true;
        }
        Self(seen)
    }

    fn has(
        &self,
        marker: Marker,
    ) -> bool
    {
        self.0[marker as usize]
    }
}

/// Score one candidate. Comments are stripped before any marker check.
pub fn score_candidate(
    path: &Path,
    content: &str,
    sibling_names: &HashSet<String>,
    deps: &DependencyMap,
    config: &RootConfig,
) -> i32
{
    let w = &config.weights;
    let text = Comments::strip(content);
    let markers = MarkerSet::scan(&text);

    if !markers.has(Marker::DocumentClass)
    {
        return w.rejected;
    }

    let mut score = w.documentclass;

    if markers.has(Marker::BeginDocument)
    {
        score += w.begin_document;
    }

    score += w.per_inbound_reference * deps.inbound_count(path) as i32;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    for (ext, weight) in [("bbl", w.same_stem_bbl), ("bib", w.same_stem_bib), ("log", w.same_stem_log)]
    {
        if sibling_names.contains(&format!("{stem}.{ext}"))
        {
            score += weight;
        }
    }

    if markers.has(Marker::Bibliography) || markers.has(Marker::TheBibliography)
    {
        score += w.bibliography_marker;
    }
    if markers.has(Marker::MakeTitle)
    {
        score += w.maketitle;
    }
    if markers.has(Marker::Abstract)
    {
        score += w.abstract_env;
    }

    let includes = OUTGOING_INCLUDE
        .find_iter(&text)
        .count() as i32;
    score += (includes * w.per_include).min(w.include_cap);

    let name = path
        .file_name()
        .map(|n| {
            n.to_string_lossy()
                .to_lowercase()
        })
        .unwrap_or_default();

    if config.is_canonical(&name)
    {
        score += w.canonical_name;
    }
    if ["template", "sample", "example"]
        .iter()
        .any(|t| name.contains(t))
        && score < w.template_guard
    {
        score += w.template_name;
    }
    if ["response", "reply", "letter"]
        .iter()
        .any(|t| name.contains(t))
    {
        score += w.response_name;
    }

    if markers.has(Marker::Beamer)
    {
        score += w.beamer_class;
    }
    if markers.has(Marker::Standalone)
    {
        score += w.standalone_class;
    }
    if markers.has(Marker::Letter)
    {
        score += w.letter_class;
    }

    score
}

#[derive(Debug, Clone)]
pub struct RootCandidate
{
    pub path: PathBuf,
    pub name: String,
    pub score: i32,
    /// Content length in characters
    pub length: usize,
}

pub struct RootResolver
{
    config: RootConfig,
    walker: FileWalker,
}

impl Default for RootResolver
{
    fn default() -> Self
    {
        Self::new(RootConfig::default(), FileWalker::default())
    }
}

impl RootResolver
{
    pub fn new(
        config: RootConfig,
        walker: FileWalker,
    ) -> Self
    {
        Self { config, walker }
    }

    /// Every readable `.tex` file under `dir`, scored and sorted by
    /// `(score desc, length desc)`. Rejected files are included.
    #[instrument(skip(self), fields(dir = %dir.display()))]
    pub fn rank_candidates(
        &self,
        dir: &Path,
    ) -> Vec<RootCandidate>
    {
        let deps = build_dependency_map(dir, &self.walker);
        let files = self
            .walker
            .walk_files(dir);

        let sibling_names: HashSet<String> = files
            .iter()
            .filter_map(|p| {
                p.file_name()
                    .map(|n| {
                        n.to_string_lossy()
                            .into_owned()
                    })
            })
            .collect();

        let mut ranked: Vec<RootCandidate> = files
            .iter()
            .filter(|p| has_extension(p, "tex"))
            .filter_map(|path| {
                let content = read_text_lossy(path).ok()?;
                let score = score_candidate(path, &content, &sibling_names, &deps, &self.config);
                Some(RootCandidate {
                    path: path.clone(),
                    name: path
                        .file_name()
                        .map(|n| {
                            n.to_string_lossy()
                                .into_owned()
                        })
                        .unwrap_or_default(),
                    score,
                    length: content
                        .chars()
                        .count(),
                })
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(b.length.cmp(&a.length))
        });

        debug!(candidates = ranked.len(), "ranked root candidates");
        ranked
    }

    /// Choose from an already ranked list, applying the tie-break rules.
    pub fn pick<'a>(
        &self,
        ranked: &'a [RootCandidate],
    ) -> Option<&'a RootCandidate>
    {
        let w = &self
            .config
            .weights;
        let mut survivors = ranked
            .iter()
            .filter(|c| c.score > w.discard_at_or_below);

        let top1 = survivors.next()?;
        let Some(top2) = survivors.next()
        else
        {
            return Some(top1);
        };

        if top1.score - top2.score < w.tie_margin
        {
            if !self
                .config
                .is_canonical(&top1.name)
                && self
                    .config
                    .is_canonical(&top2.name)
            {
                return Some(top2);
            }

            if top2.length as f64 > top1.length as f64 * w.tie_length_ratio
            {
                return Some(top2);
            }
        }

        Some(top1)
    }

    pub fn find_root(
        &self,
        dir: &Path,
    ) -> Option<PathBuf>
    {
        let ranked = self.rank_candidates(dir);
        self.pick(&ranked)
            .map(|c| {
                c.path
                    .clone()
            })
    }
}

/// Root file of the revision at `dir` with default weights and walker.
/// `None` when there are no `.tex` files or all of them are rejected.
pub fn find_root_tex_file(dir: &Path) -> Option<PathBuf>
{
    RootResolver::default().find_root(dir)
}

#[derive(Tabled)]
struct CandidateRow
{
    rank: usize,
    file: String,
    score: i32,
    chars: usize,
    status: String,
}

pub fn run(
    args: RootArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config = load_config().unwrap_or_default();
    let walker = FileWalker::from_config(&config).context("Invalid ignore patterns in config")?;
    let resolver = RootResolver::new(config.root, walker);

    let ranked = resolver.rank_candidates(&args.dir);
    let chosen = resolver
        .pick(&ranked)
        .map(|c| {
            c.path
                .clone()
        });

    if args.explain && !ctx.quiet
    {
        let discard = resolver
            .config
            .weights
            .discard_at_or_below;
        let rows: Vec<CandidateRow> = ranked
            .iter()
            .enumerate()
            .map(|(i, c)| CandidateRow {
                rank: i + 1,
                file: c
                    .path
                    .strip_prefix(&args.dir)
                    .unwrap_or(&c.path)
                    .display()
                    .to_string(),
                score: c.score,
                chars: c.length,
                status: if Some(&c.path) == chosen.as_ref()
                {
                    "root".to_string()
                }
                else if c.score <= discard
                {
                    "discarded".to_string()
                }
                else
                {
                    String::new()
                },
            })
            .collect();
        println!("{}", Table::new(rows));
    }

    let Some(root) = chosen
    else
    {
        anyhow::bail!("No root .tex file found in {}", args.dir.display());
    };

    if ctx.quiet
    {
        return Ok(());
    }

    if ctx.no_color
    {
        println!("{}", root.display());
    }
    else
    {
        println!("{}", root.display().green());
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn names(list: &[&str]) -> HashSet<String>
    {
        list.iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn score(
        name: &str,
        content: &str,
        siblings: &[&str],
    ) -> i32
    {
        score_candidate(
            Path::new(name),
            content,
            &names(siblings),
            &DependencyMap::default(),
            &RootConfig::default(),
        )
    }

    #[test]
    fn missing_documentclass_is_rejected()
    {
        assert_eq!(score("main.tex", r"\section{Intro}", &[]), -1000);
        // A commented-out class line does not count
        assert_eq!(score("main.tex", "% \\documentclass{article}\n", &[]), -1000);
    }

    #[test]
    fn structural_and_forensic_signals_add_up()
    {
        let content = r"\documentclass{article}\begin{document}\maketitle\begin{abstract}x\end{abstract}\bibliography{refs}\end{document}";
        // 20 + 20 + 60 (bbl) + 20 (bib) + 15 + 10 + 10 + 10 (canonical)
        assert_eq!(score("main.tex", content, &["main.bbl", "main.bib"]), 165);
        assert_eq!(score("draft.tex", content, &["main.bbl"]), 75);
    }

    #[test]
    fn include_bonus_is_capped()
    {
        let many = format!(r"\documentclass{{article}}{}", r"\input{x}".repeat(20));
        let few = format!(r"\documentclass{{article}}{}", r"\input{x}".repeat(2));

        assert_eq!(score("a.tex", &many, &[]), 20 + 30);
        assert_eq!(score("a.tex", &few, &[]), 20 + 6);
    }

    #[test]
    fn naming_and_class_penalties()
    {
        let base = r"\documentclass{article}";
        assert_eq!(score("template.tex", base, &[]), 10);
        assert_eq!(score("response_letter.tex", base, &[]), -30);
        assert_eq!(score("slides.tex", r"\documentclass{beamer}", &[]), -30);
        assert_eq!(score("fig.tex", r"\documentclass{standalone}", &[]), 0);
    }

    #[test]
    fn inbound_references_penalize_children() -> Result<()>
    {
        let dir = TempDir::new()?;
        let root = dir.path();
        fs::write(root.join("paper.tex"), "\\documentclass{article}\n\\begin{document}\\input{child}\\end{document}")?;
        fs::write(root.join("child.tex"), "\\documentclass{article}\n\\begin{document}child\\end{document}")?;

        let resolver = RootResolver::default();
        let ranked = resolver.rank_candidates(root);
        let child = ranked
            .iter()
            .find(|c| c.name == "child.tex")
            .unwrap();

        assert_eq!(child.score, 40 - 50);
        assert_eq!(resolver.find_root(root), Some(root.join("paper.tex")));
        Ok(())
    }

    fn candidate(
        name: &str,
        score: i32,
        length: usize,
    ) -> RootCandidate
    {
        RootCandidate { path: PathBuf::from(name), name: name.to_string(), score, length }
    }

    #[test]
    fn tie_prefers_canonical_runner_up()
    {
        let resolver = RootResolver::default();
        let ranked = vec![candidate("thesis.tex", 42, 900), candidate("main.tex", 40, 100)];
        assert_eq!(resolver.pick(&ranked).unwrap().name, "main.tex");
    }

    #[test]
    fn tie_prefers_much_longer_runner_up()
    {
        let resolver = RootResolver::default();
        let ranked = vec![candidate("a.tex", 42, 100), candidate("b.tex", 40, 151)];
        assert_eq!(resolver.pick(&ranked).unwrap().name, "b.tex");

        let ranked = vec![candidate("a.tex", 42, 100), candidate("b.tex", 40, 150)];
        assert_eq!(resolver.pick(&ranked).unwrap().name, "a.tex");

        let ranked = vec![candidate("a.tex", 50, 100), candidate("b.tex", 40, 1000)];
        assert_eq!(resolver.pick(&ranked).unwrap().name, "a.tex");
    }

    #[test]
    fn all_rejected_yields_none() -> Result<()>
    {
        let dir = TempDir::new()?;
        fs::write(
            dir.path()
                .join("notes.tex"),
            "plain text",
        )?;

        assert_eq!(find_root_tex_file(dir.path()), None);

        let empty = TempDir::new()?;
        assert_eq!(find_root_tex_file(empty.path()), None);
        Ok(())
    }
}
