//! **texweave** - Turn successive LaTeX revisions of a paper into one deduplicated hierarchy
//!
//! Per revision: pick the root file, inline its includes, split on sectioning commands,
//! segment prose into typed nodes. Per paper: merge all revisions into a content-addressed
//! element pool with one child→parent map per version.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Core processing pipeline - root resolution through cross-revision dedup
pub mod core {
    /// Revision ids and the typed structure node
    pub mod node;
    pub use node::{NodeKind, RevisionId, StructureNode};

    /// Brace/argument/environment scanning helpers
    pub mod scan;

    /// LaTeX noise removal for node text
    pub mod clean;

    /// Abbreviation-aware sentence splitting
    pub mod sentence;

    /// Which .tex files include which
    pub mod deps;

    /// Heuristic root-file selection
    pub mod root;
    pub use root::{RootResolver, find_root_tex_file, run as root_run};

    /// Recursive include inlining
    pub mod flatten;
    pub use flatten::{FlattenResult, Flattener, VisitPolicy, run as flatten_run};

    /// Section hierarchy from a flattened document
    pub mod structure;
    pub use structure::StructureBuilder;

    /// Metadata, equations, floats, lists and sentences
    pub mod segment;
    pub use segment::ContentSegmenter;

    /// Citation-key rewriting and the reference collaborator seam
    pub mod citations;
    pub use citations::{ReferenceCollaborator, rewrite_citations};

    /// Content-addressed cross-revision merging
    pub mod dedup;
    pub use dedup::{DedupContext, HierarchyDocument};

    /// Pipeline failure taxonomy
    pub mod error;
    pub use error::PipelineError;

    /// Batch driver over papers and revisions with a rayon worker pool
    pub mod pipeline;
    pub use pipeline::{Pipeline, ProcessReport, run as process_run};

    /// Single-revision tree view
    pub mod tree;
    pub use tree::run as tree_run;
}

/// Infrastructure - Configuration, I/O, and directory walking
pub mod infra {
    /// Configuration management with TOML support
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Lossy text reads with memory mapping for large files, atomic JSON writes
    pub mod io;
    pub use io::{FileContent, read_file_smart};

    /// Directory walking with a name blocklist and glob ignores; ignore files are not read
    pub mod walk;
    pub use walk::FileWalker;
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use core::{flatten_run, process_run, root_run, tree_run};
pub use infra::{Config, FileWalker, load_config};

// Core types for external consumers
pub use core::{DedupContext, HierarchyDocument, Pipeline, RevisionId, StructureNode};
