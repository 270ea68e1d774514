//! Shared test utilities for integration tests
//!
//! Builds `data_raw/<paper>/tex/<version>/` trees on disk so the
//! pipeline and the binary can be exercised end to end.

#![allow(dead_code)]

use assert_fs::prelude::*;

pub const MAIN_V1: &str = "\\documentclass{article}\n\
\\title{Sparse Graphs}\n\
\\author{Ada Lovelace}\n\
\\begin{document}\n\
\\maketitle\n\
\\begin{abstract}\n\
We study sparse graphs.\n\
\\end{abstract}\n\
\\input{sections/intro}\n\
\\bibliography{refs}\n\
\\end{document}\n";

pub const INTRO_V1: &str = "\\section{Introduction}\n\
Graphs are everywhere. Sparse ones are common.\n";

pub const INTRO_V2: &str = "\\section{Introduction}\n\
Graphs are everywhere. Sparse ones are common. We add a new result.\n";

/// A cover letter that must never be picked as the root.
pub const RESPONSE: &str =
    "\\documentclass{letter}\n\\begin{document}\nDear editor, thank you.\n\\end{document}\n";

/// Write one revision of `paper` under `raw`.
pub fn write_revision(
    raw: &assert_fs::fixture::ChildPath,
    paper: &str,
    version: &str,
    intro: &str,
)
{
    let dir = raw
        .child(paper)
        .child("tex")
        .child(version);

    dir.child("main.tex")
        .write_str(MAIN_V1)
        .expect("write main");
    dir.child("sections/intro.tex")
        .write_str(intro)
        .expect("write intro");
}

/// `data_raw/2401.00001` with v1 only.
pub fn single_revision_fixture() -> assert_fs::TempDir
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    let raw = tmp.child("data_raw");
    write_revision(&raw, "2401.00001", "v1", INTRO_V1);
    tmp.child("data_raw/2401.00001/metadata.json")
        .write_str("{\"title\": \"Sparse Graphs\"}")
        .expect("write metadata");
    tmp
}

/// `data_raw/2401.00001` with v1 and v2; v2 adds one sentence and a decoy letter.
pub fn two_revision_fixture() -> assert_fs::TempDir
{
    let tmp = single_revision_fixture();
    let raw = tmp.child("data_raw");
    write_revision(&raw, "2401.00001", "v2", INTRO_V2);
    raw.child("2401.00001/tex/v2/response.tex")
        .write_str(RESPONSE)
        .expect("write response");
    tmp
}
