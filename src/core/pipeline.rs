//! Batch orchestration over `data_raw/<paper_id>/tex/<version_label>/`.
//!
//! Papers run in parallel on a bounded rayon pool; the revisions of one
//! paper run sequentially inside its worker, in sorted label order, since
//! the first revision to produce a fingerprint owns the canonical id.
//!
//! Per paper:
//! 1. resolve the root and flatten each revision twice (with and without
//!    bibliography); the collaborator observes the first
//! 2. rewrite citations, build and segment the tree, merge into the dedup
//!    context
//! 3. write `hierarchy.json` and copy paper metadata

use std::{
    fs,
    panic::{AssertUnwindSafe, catch_unwind},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::{
    cli::{AppContext, ProcessArgs},
    core::{
        citations::{NoReferences, ReferenceCollaborator, rewrite_citations},
        dedup::DedupContext,
        error::{Phase, PipelineError},
        flatten::{Flattener, VisitPolicy},
        node::{RevisionId, StructureNode},
        root::RootResolver,
        segment::ContentSegmenter,
        sentence::SentenceSplitter,
        structure::StructureBuilder,
    },
    infra::{
        config::{Config, load_config},
        walk::FileWalker,
    },
};

/// Files copied verbatim from a paper folder into its output folder.
const METADATA_FILES: [&str; 2] = ["metadata.json", "references.json"];

/// What happened to one paper.
#[derive(Debug)]
pub struct PaperOutcome
{
    pub paper_id: String,
    /// Revisions merged into the hierarchy
    pub revisions: usize,
    /// No `tex/` folder; nothing attempted
    pub skipped: bool,
    pub output: Option<PathBuf>,
    pub errors: Vec<PipelineError>,
}

impl PaperOutcome
{
    fn new(paper_id: &str) -> Self
    {
        Self {
            paper_id: paper_id.to_string(),
            revisions: 0,
            skipped: false,
            output: None,
            errors: Vec::new(),
        }
    }

    fn record(
        &mut self,
        error: PipelineError,
    )
    {
        warn!(paper = %self.paper_id, error = %describe(&error), "isolated failure");
        self.errors
            .push(error);
    }
}

/// Batch summary.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessReport
{
    pub papers: usize,
    pub skipped_papers: usize,
    pub revisions: usize,
    pub failed_revisions: usize,
    pub failed_exports: usize,
    pub errors: Vec<String>,
}

impl ProcessReport
{
    pub fn from_outcomes(outcomes: &[PaperOutcome]) -> Self
    {
        let mut report = Self::default();

        for outcome in outcomes
        {
            if outcome.skipped
            {
                report.skipped_papers += 1;
                continue;
            }

            report.papers += 1;
            report.revisions += outcome.revisions;

            for error in &outcome.errors
            {
                match error
                {
                    PipelineError::ExportFailure { .. } => report.failed_exports += 1,
                    _ => report.failed_revisions += 1,
                }
                report
                    .errors
                    .push(describe(error));
            }
        }

        report
    }

    pub fn is_clean(&self) -> bool
    {
        self.errors
            .is_empty()
    }
}

/// `error: cause: cause ...` on one line.
fn describe(error: &PipelineError) -> String
{
    let mut text = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source
    {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Batch driver. `F` builds one reference collaborator per paper.
pub struct Pipeline<F = fn() -> NoReferences>
{
    resolver: RootResolver,
    visit_policy: VisitPolicy,
    splitter: SentenceSplitter,
    output_file: String,
    workers: Option<usize>,
    collaborators: F,
}

impl Pipeline
{
    pub fn from_config(config: &Config) -> Result<Self>
    {
        let walker = FileWalker::from_config(config).context("Invalid ignore patterns in config")?;

        Ok(Self {
            resolver: RootResolver::new(config.root.clone(), walker),
            visit_policy: config
                .flatten
                .visit_policy,
            splitter: SentenceSplitter::new().with_custom_abbreviations(
                &config
                    .segment
                    .abbreviations,
            ),
            output_file: config
                .pipeline
                .output_file
                .clone(),
            workers: config
                .pipeline
                .workers,
            collaborators: || NoReferences,
        })
    }
}

impl<F, C> Pipeline<F>
where
    F: Fn() -> C + Sync,
    C: ReferenceCollaborator,
{
    /// Swap in a different collaborator factory.
    pub fn with_collaborators<G, D>(
        self,
        factory: G,
    ) -> Pipeline<G>
    where
        G: Fn() -> D + Sync,
        D: ReferenceCollaborator,
    {
        Pipeline {
            resolver: self.resolver,
            visit_policy: self.visit_policy,
            splitter: self.splitter,
            output_file: self.output_file,
            workers: self.workers,
            collaborators: factory,
        }
    }

    pub fn workers(
        mut self,
        workers: Option<usize>,
    ) -> Self
    {
        self.workers = workers;
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

    /// Process every paper under `data_raw` (or only `only`, when non-empty).
    #[instrument(skip(self, only, progress), fields(input = %data_raw.display()))]
    pub fn run(
        &self,
        data_raw: &Path,
        data_output: &Path,
        only: &[String],
        progress: &ProgressBar,
    ) -> Result<ProcessReport>
    {
        let papers = select(discover_papers(data_raw)?, only);

        fs::create_dir_all(data_output)
            .with_context(|| format!("Failed to create output dir {}", data_output.display()))?;

        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n) = self.workers
        {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .context("Failed to build worker pool")?;

        progress.set_length(papers.len() as u64);
        info!(papers = papers.len(), "processing batch");

        let outcomes: Vec<PaperOutcome> = pool.install(|| {
            papers
                .par_iter()
                .map(|paper| {
                    let outcome = self.process_paper(paper, &data_raw.join(paper), data_output);
                    progress.inc(1);
                    progress.set_message(paper.clone());
                    outcome
                })
                .collect()
        });

        progress.finish_with_message("done");
        Ok(ProcessReport::from_outcomes(&outcomes))
    }

    /// Run all phases for one paper. Never fails as a whole; every failure
    /// is recorded on the outcome at revision or paper granularity.
    #[instrument(skip(self, paper_dir, output_root))]
    pub fn process_paper(
        &self,
        paper_id: &str,
        paper_dir: &Path,
        output_root: &Path,
    ) -> PaperOutcome
    {
        let mut outcome = PaperOutcome::new(paper_id);

        let tex_dir = paper_dir.join("tex");
        if !tex_dir.is_dir()
        {
            debug!("no tex directory, skipping");
            outcome.skipped = true;
            return outcome;
        }

        let mut collaborator = (self.collaborators)();

        let mut prepared = Vec::new();
        for label in subdirectories(&tex_dir)
        {
            let revision = RevisionId::new(paper_id, label.as_str());
            match self.prepare_revision(&revision, &tex_dir.join(&label), &mut collaborator)
            {
                Ok(text) => prepared.push((revision, text)),
                Err(e) => outcome.record(e),
            }
        }

        let mut dedup = DedupContext::new();
        for (revision, text) in &prepared
        {
            match self.structure_revision(revision, text, &collaborator)
            {
                Ok(root) =>
                {
                    dedup.process_revision(&revision.version_label, &root);
                    outcome.revisions += 1;
                }
                Err(e) => outcome.record(e),
            }
        }

        match self.export(&dedup, paper_dir, &output_root.join(paper_id))
        {
            Ok(path) => outcome.output = Some(path),
            Err(source) => outcome.record(PipelineError::ExportFailure {
                paper: paper_id.to_string(),
                source,
            }),
        }

        outcome
    }

    /// Phase 1: root, both flattenings, collaborator observation.
    /// Returns the bibliography-stripped text.
    fn prepare_revision(
        &self,
        revision: &RevisionId,
        dir: &Path,
        collaborator: &mut C,
    ) -> Result<String, PipelineError>
    {
        let root = self
            .resolver
            .find_root(dir)
            .ok_or_else(|| PipelineError::MissingRootFile { revision: revision.clone() })?;
        debug!(%revision, root = %root.display(), "root resolved");

        let with_bibliography = Flattener::new(&root)
            .strip_bibliography(false)
            .visit_policy(self.visit_policy)
            .flatten()
            .map_err(|e| PipelineError::phase(revision, Phase::Flatten, e))?;

        collaborator
            .observe(revision, &with_bibliography)
            .map_err(|e| PipelineError::phase(revision, Phase::References, e))?;

        let stripped = Flattener::new(&root)
            .strip_bibliography(true)
            .visit_policy(self.visit_policy)
            .flatten()
            .map_err(|e| PipelineError::phase(revision, Phase::Flatten, e))?;

        debug!(
            %revision,
            merged = stripped.merged_count(),
            missing = stripped.missing_files.len(),
            "revision flattened"
        );
        Ok(stripped.content)
    }

    /// Phase 2: citation rewrite, coarse tree, segmentation.
    fn structure_revision(
        &self,
        revision: &RevisionId,
        text: &str,
        collaborator: &C,
    ) -> Result<StructureNode, PipelineError>
    {
        let replacements = collaborator
            .replacements(revision)
            .map_err(|e| PipelineError::phase(revision, Phase::References, e))?;
        let text = rewrite_citations(text, &replacements);

        catch_unwind(AssertUnwindSafe(|| {
            let mut root = StructureBuilder::new(revision).build(&text);
            ContentSegmenter::new(revision)
                .with_splitter(
                    self.splitter
                        .clone(),
                )
                .process_tree(&mut root);
            root
        }))
        .map_err(|_| {
            PipelineError::phase(revision, Phase::Structure, anyhow::anyhow!("segmentation panicked"))
        })
    }

    /// Phase 3: hierarchy artifact plus metadata copies.
    fn export(
        &self,
        dedup: &DedupContext,
        paper_dir: &Path,
        out_dir: &Path,
    ) -> Result<PathBuf>
    {
        let path = out_dir.join(&self.output_file);
        dedup
            .export()
            .write_json(&path)?;

        for name in METADATA_FILES
        {
            let src = paper_dir.join(name);
            if src.is_file()
            {
                fs::copy(&src, out_dir.join(name))
                    .with_context(|| format!("Failed to copy {}", src.display()))?;
            }
        }

        debug!(output = %path.display(), elements = dedup.elements().len(), "hierarchy written");
        Ok(path)
    }

    /// Revisions and their resolved roots, without processing anything.
    pub fn plan(
        &self,
        data_raw: &Path,
        only: &[String],
    ) -> Result<Vec<(String, Vec<(String, Option<PathBuf>)>)>>
    {
        let papers = select(discover_papers(data_raw)?, only);

        Ok(papers
            .into_iter()
            .map(|paper| {
                let tex_dir = data_raw
                    .join(&paper)
                    .join("tex");
                let revisions = subdirectories(&tex_dir)
                    .into_iter()
                    .map(|label| {
                        let root = self
                            .resolver
                            .find_root(&tex_dir.join(&label));
                        (label, root)
                    })
                    .collect();
                (paper, revisions)
            })
            .collect())
    }
}

/// Paper folder names under `data_raw`, sorted.
pub fn discover_papers(data_raw: &Path) -> Result<Vec<String>>
{
    if !data_raw.is_dir()
    {
        anyhow::bail!("Input directory not found: {}", data_raw.display());
    }
    Ok(subdirectories(data_raw))
}

fn select(
    papers: Vec<String>,
    only: &[String],
) -> Vec<String>
{
    if only.is_empty()
    {
        return papers;
    }
    papers
        .into_iter()
        .filter(|p| only.contains(p))
        .collect()
}

/// Sorted names of the immediate subdirectories of `dir`.
fn subdirectories(dir: &Path) -> Vec<String>
{
    let Ok(entries) = fs::read_dir(dir)
    else
    {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type()
                .is_ok_and(|t| t.is_dir())
        })
        .map(|e| {
            e.file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

pub fn run(
    args: ProcessArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config = load_config().unwrap_or_default();

    let data_raw = args
        .input
        .unwrap_or_else(|| {
            config
                .pipeline
                .data_raw
                .clone()
        });
    let data_output = args
        .output
        .unwrap_or_else(|| {
            config
                .pipeline
                .data_output
                .clone()
        });

    let pipeline = Pipeline::from_config(&config)?
        .workers(
            args.workers
                .or(config
                    .pipeline
                    .workers),
        )
        .visit_policy(
            args.visit_policy
                .unwrap_or(config.flatten.visit_policy),
        );

    if ctx.dry_run
    {
        let plan = pipeline.plan(&data_raw, &args.papers)?;
        if !ctx.quiet
        {
            println!("{}", "DRY RUN: would process:".yellow());
            for (paper, revisions) in &plan
            {
                println!("  {paper}");
                for (label, root) in revisions
                {
                    match root
                    {
                        Some(root) => println!("    {label}: {}", root.display()),
                        None => println!("    {label}: (no root file)"),
                    }
                }
            }
        }
        return Ok(());
    }

    let progress = if ctx.quiet
    {
        ProgressBar::hidden()
    }
    else
    {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .context("Invalid progress template")?
                .progress_chars("#>-"),
        );
        pb
    };

    let report = pipeline.run(&data_raw, &data_output, &args.papers, &progress)?;

    if !ctx.quiet
    {
        let summary = format!(
            "Processed {} papers ({} revisions) into {}",
            report.papers,
            report.revisions,
            data_output.display()
        );
        if ctx.no_color
        {
            println!("{summary}");
        }
        else
        {
            println!("{} {}", "✓".green(), summary);
        }

        if report.skipped_papers > 0
        {
            println!("  skipped {} papers without a tex/ folder", report.skipped_papers);
        }
        for error in &report.errors
        {
            if ctx.no_color
            {
                println!("  {error}");
            }
            else
            {
                println!("  {}", error.red());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests
{
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use tempfile::TempDir;

    use super::*;
    use crate::core::{citations::CitationMap, dedup::HierarchyDocument, flatten::FlattenResult};

    fn write(
        dir: &Path,
        rel: &str,
        text: &str,
    )
    {
        let path = dir.join(rel);
        fs::create_dir_all(
            path.parent()
                .unwrap(),
        )
        .unwrap();
        fs::write(path, text).unwrap();
    }

    fn pipeline() -> Pipeline
    {
        Pipeline::from_config(&Config::default())
            .unwrap()
            .workers(Some(2))
    }

    #[test]
    fn missing_root_skips_only_that_revision()
    {
        let raw = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(raw.path(), "p1/tex/v1/notes.tex", "no class here");
        write(
            raw.path(),
            "p1/tex/v2/main.tex",
            "\\documentclass{article}\\begin{document}\\section{Intro}Kept sentence.\\end{document}",
        );

        let outcome = pipeline().process_paper("p1", &raw.path().join("p1"), out.path());

        assert_eq!(outcome.revisions, 1);
        assert_eq!(
            outcome
                .errors
                .len(),
            1
        );
        assert!(matches!(outcome.errors[0], PipelineError::MissingRootFile { .. }));

        let doc = HierarchyDocument::read_json(&out.path().join("p1/hierarchy.json")).unwrap();
        assert!(
            doc.hierarchy
                .contains_key("2")
        );
        assert!(
            !doc.hierarchy
                .contains_key("1")
        );
    }

    #[test]
    fn papers_without_tex_are_skipped_and_metadata_copied()
    {
        let raw = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(raw.path(), "empty/readme.txt", "x");
        write(raw.path(), "full/metadata.json", "{\"title\": \"T\"}");
        write(raw.path(), "full/tex/v1/main.tex", "\\documentclass{article}\\section{A}One.");

        let report = pipeline()
            .run(raw.path(), out.path(), &[], &ProgressBar::hidden())
            .unwrap();

        assert_eq!(report.papers, 1);
        assert_eq!(report.skipped_papers, 1);
        assert_eq!(report.revisions, 1);
        assert!(report.is_clean());
        assert!(
            out.path()
                .join("full/metadata.json")
                .is_file()
        );
    }

    #[test]
    fn paper_filter_limits_the_batch()
    {
        let raw = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(raw.path(), "a/tex/v1/main.tex", "\\documentclass{article}\\section{A}One.");
        write(raw.path(), "b/tex/v1/main.tex", "\\documentclass{article}\\section{B}Two.");

        let report = pipeline()
            .run(raw.path(), out.path(), &["b".to_string()], &ProgressBar::hidden())
            .unwrap();

        assert_eq!(report.papers, 1);
        assert!(
            !out.path()
                .join("a")
                .exists()
        );
        assert!(
            out.path()
                .join("b/hierarchy.json")
                .is_file()
        );
    }

    /// Renames every key it sees in `\bibitem{..}` to `ref_N`, shared across revisions.
    #[derive(Default)]
    struct BibitemRenamer
    {
        keys: HashMap<String, String>,
        observed: Arc<Mutex<Vec<bool>>>,
    }

    impl ReferenceCollaborator for BibitemRenamer
    {
        fn observe(
            &mut self,
            _revision: &RevisionId,
            flattened: &FlattenResult,
        ) -> Result<()>
        {
            self.observed
                .lock()
                .unwrap()
                .push(flattened.strip_bibliography);
            for piece in flattened
                .content
                .split("\\bibitem{")
                .skip(1)
            {
                let key = piece
                    .split('}')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                let next = format!("ref_{}", self.keys.len());
                self.keys
                    .entry(key)
                    .or_insert(next);
            }
            Ok(())
        }

        fn replacements(
            &self,
            _revision: &RevisionId,
        ) -> Result<CitationMap>
        {
            Ok(self
                .keys
                .clone()
                .into_iter()
                .collect())
        }
    }

    #[test]
    fn collaborator_sees_bibliography_and_rewrites_citations()
    {
        let raw = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(
            raw.path(),
            "p/tex/v1/main.tex",
            "\\documentclass{article}\\begin{document}\\section{Intro}As shown \\cite{knuth84}.\n\\begin{thebibliography}{1}\\bibitem{knuth84} Knuth.\\end{thebibliography}\\end{document}",
        );

        let observed = Arc::new(Mutex::new(Vec::new()));
        let seen = observed.clone();
        let pipeline = pipeline().with_collaborators(move || BibitemRenamer {
            keys: HashMap::new(),
            observed: seen.clone(),
        });

        let outcome = pipeline.process_paper("p", &raw.path().join("p"), out.path());
        assert!(
            outcome
                .errors
                .is_empty()
        );
        assert_eq!(*observed.lock().unwrap(), vec![false]);

        let doc = HierarchyDocument::read_json(&out.path().join("p/hierarchy.json")).unwrap();
        assert!(
            doc.elements
                .values()
                .any(|v| v == "As shown \\cite{ref_0}.")
        );
        assert!(
            !doc.elements
                .values()
                .any(|v| v.contains("Knuth."))
        );
    }

    #[test]
    fn missing_input_dir_is_an_error()
    {
        let out = TempDir::new().unwrap();
        let result = pipeline().run(
            &out.path()
                .join("nope"),
            out.path(),
            &[],
            &ProgressBar::hidden(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn export_failure_spares_the_other_papers()
    {
        let raw = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(raw.path(), "bad/tex/v1/main.tex", "\\documentclass{article}\\section{A}One.");
        write(raw.path(), "good/tex/v1/main.tex", "\\documentclass{article}\\section{B}Two.");
        // A plain file where the paper's output folder should go
        write(out.path(), "bad", "occupied");

        let report = pipeline()
            .run(raw.path(), out.path(), &[], &ProgressBar::hidden())
            .unwrap();

        assert_eq!(report.papers, 2);
        assert_eq!(report.revisions, 2);
        assert_eq!(report.failed_exports, 1);
        assert_eq!(report.failed_revisions, 0);
        assert!(report.errors[0].contains("failed to export hierarchy for paper bad"));
        assert!(
            out.path()
                .join("good/hierarchy.json")
                .is_file()
        );
    }

    /// Refuses to supply replacements for one version label.
    struct RefusesLabel(&'static str);

    impl ReferenceCollaborator for RefusesLabel
    {
        fn observe(
            &mut self,
            _revision: &RevisionId,
            _flattened: &FlattenResult,
        ) -> Result<()>
        {
            Ok(())
        }

        fn replacements(
            &self,
            revision: &RevisionId,
        ) -> Result<CitationMap>
        {
            if revision.version_label == self.0
            {
                anyhow::bail!("reference table unavailable");
            }
            Ok(CitationMap::new())
        }
    }

    #[test]
    fn failing_replacements_skip_only_that_revision()
    {
        let raw = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(raw.path(), "p/tex/v1/main.tex", "\\documentclass{article}\\section{A}First.");
        write(raw.path(), "p/tex/v2/main.tex", "\\documentclass{article}\\section{A}Second.");

        let outcome = pipeline()
            .with_collaborators(|| RefusesLabel("v1"))
            .process_paper("p", &raw.path().join("p"), out.path());

        assert_eq!(outcome.revisions, 1);
        assert_eq!(
            outcome
                .errors
                .len(),
            1
        );
        assert!(matches!(
            &outcome.errors[0],
            PipelineError::PhaseFailure { phase: Phase::References, revision, .. }
                if revision.version_label == "v1"
        ));

        let doc = HierarchyDocument::read_json(&out.path().join("p/hierarchy.json")).unwrap();
        assert!(
            doc.hierarchy
                .contains_key("2")
        );
        assert!(
            !doc.hierarchy
                .contains_key("1")
        );
    }

    #[test]
    fn configured_abbreviations_reach_the_splitter()
    {
        let raw = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(
            raw.path(),
            "p/tex/v1/main.tex",
            "\\documentclass{article}\\section{A}By Lem. Two the claim holds.",
        );

        let mut config = Config::default();
        config
            .segment
            .abbreviations = vec!["Lem.".to_string()];
        let outcome = Pipeline::from_config(&config)
            .unwrap()
            .process_paper("p", &raw.path().join("p"), out.path());
        assert!(
            outcome
                .errors
                .is_empty()
        );

        let doc = HierarchyDocument::read_json(&out.path().join("p/hierarchy.json")).unwrap();
        assert!(
            doc.elements
                .values()
                .any(|v| v == "By Lem. Two the claim holds.")
        );
    }
}
