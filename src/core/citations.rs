//! Citation-key rewriting and the seam for bibliography processing.
//!
//! Reference extraction lives outside this crate. A `ReferenceCollaborator`
//! sees each revision's bibliography-preserving text and later hands back a
//! key replacement map, which is applied inside `\cite*{..}` argument lists
//! before the document is structured.

use std::{borrow::Cow, collections::HashMap};

use anyhow::Result;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::core::{flatten::FlattenResult, node::RevisionId};

/// Old citation key → replacement key.
pub type CitationMap = HashMap<String, String>;

pub trait ReferenceCollaborator
{
    /// Called once per revision, in sorted label order, with the flattened
    /// text that still carries its bibliography.
    fn observe(
        &mut self,
        revision: &RevisionId,
        flattened: &FlattenResult,
    ) -> Result<()>;

    /// Replacements to apply to the bibliography-stripped text of `revision`.
    /// Only called after every revision of the paper has been observed.
    fn replacements(
        &self,
        revision: &RevisionId,
    ) -> Result<CitationMap>;
}

/// Collaborator that leaves every citation untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReferences;

impl ReferenceCollaborator for NoReferences
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
        _revision: &RevisionId,
    ) -> Result<CitationMap>
    {
        Ok(CitationMap::new())
    }
}

static CITE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\\cite[a-z]*\s*(?:\[[^\]]*\])?\s*\{)([^}]+)(\})").expect("valid cite pattern")
});

/// Replace keys inside every `\cite`, `\citep`, `\citet`, ... argument list.
/// Keys are trimmed and rejoined with `", "`; unknown keys are kept.
pub fn rewrite_citations<'t>(
    text: &'t str,
    map: &CitationMap,
) -> Cow<'t, str>
{
    if map.is_empty()
    {
        return Cow::Borrowed(text);
    }

    CITE.replace_all(text, |caps: &Captures| {
        let keys = caps[2]
            .split(',')
            .map(|k| {
                let k = k.trim();
                map.get(k)
                    .map_or(k, String::as_str)
            })
            .join(", ");
        format!("{}{}{}", &caps[1], keys, &caps[3])
    })
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> CitationMap
    {
        pairs
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn rewrites_keys_in_all_cite_forms()
    {
        let m = map(&[("smith20", "ref_0"), ("doe19", "ref_1")]);
        let text = r"See \cite{smith20} and \citep[p.~3]{doe19,smith20} or \Citet {other}.";

        assert_eq!(
            rewrite_citations(text, &m),
            r"See \cite{ref_0} and \citep[p.~3]{ref_1, ref_0} or \Citet {other}."
        );
    }

    #[test]
    fn empty_map_borrows_input()
    {
        let text = r"\cite{a}";
        assert!(matches!(rewrite_citations(text, &CitationMap::new()), Cow::Borrowed(_)));
    }

    #[test]
    fn non_citation_braces_are_untouched()
    {
        let m = map(&[("a", "b")]);
        assert_eq!(rewrite_citations(r"\ref{a} \label{a}", &m), r"\ref{a} \label{a}");
    }

    #[test]
    fn no_references_is_a_no_op() -> Result<()>
    {
        let rev = RevisionId::new("p", "v1");
        let mut collab = NoReferences;
        let flat = FlattenResult {
            root_file: "main.tex".into(),
            merged_files: vec!["main.tex".into()],
            missing_files: Vec::new(),
            strip_bibliography: false,
            content: String::new(),
        };

        collab.observe(&rev, &flat)?;
        assert!(
            collab
                .replacements(&rev)?
                .is_empty()
        );
        Ok(())
    }
}
