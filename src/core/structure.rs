//! Coarse hierarchy: split a flattened document on sectioning commands.
//!
//! Text between two headings lands in `raw_content` of whichever node is
//! open at that point; the segmenter turns it into leaves later.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument};

use crate::core::{
    clean::LatexCleaner,
    node::{NodeKind, RevisionId, SectionKind, StructureNode},
    scan::extract_balanced,
};

static SECTION_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\\(part|chapter|section|subsection|subsubsection|paragraph|subparagraph)(\*?)\s*(?:\[[^\]]*\]\s*)?\{")
        .expect("valid section pattern")
});

pub struct StructureBuilder<'a>
{
    revision: &'a RevisionId,
}

impl<'a> StructureBuilder<'a>
{
    pub fn new(revision: &'a RevisionId) -> Self
    {
        Self { revision }
    }

    /// Build the section tree of `content`, rooted at a fresh document node.
    #[instrument(skip_all, fields(revision = %self.revision))]
    pub fn build(
        &self,
        content: &str,
    ) -> StructureNode
    {
        // Bottom entry is the document root and is never popped inside the loop
        let mut stack = vec![StructureNode::document(self.revision)];
        let mut cursor = 0usize;
        let mut headings = 0usize;

        for caps in SECTION_START.captures_iter(content)
        {
            let Some(whole) = caps.get(0)
            else
            {
                continue;
            };

            // Inside a title we already consumed
            if whole.start() < cursor
            {
                continue;
            }

            let Some(kind) = SectionKind::from_command(&caps[1])
            else
            {
                continue;
            };
            let is_starred = &caps[2] == "*";

            let (raw_title, next) = extract_balanced(content, whole.end());
            let title = LatexCleaner::clean_latex(raw_title, true)
                .trim()
                .to_string();

            append_raw(&mut stack, &content[cursor..whole.start()]);

            while stack.len() > 1
                && stack
                    .last()
                    .is_some_and(|top| top.level() >= kind.level())
            {
                close_top(&mut stack);
            }

            stack.push(StructureNode::new(self.revision, NodeKind::Section { kind, title, is_starred }));
            headings += 1;
            cursor = next;
        }

        append_raw(&mut stack, &content[cursor.min(content.len())..]);

        while stack.len() > 1
        {
            close_top(&mut stack);
        }

        debug!(headings, "structure built");
        stack
            .pop()
            .unwrap_or_else(|| StructureNode::document(self.revision))
    }
}

/// Add non-blank `segment` to the open node's pending text.
fn append_raw(
    stack: &mut [StructureNode],
    segment: &str,
)
{
    if segment
        .trim()
        .is_empty()
    {
        return;
    }
    if let Some(top) = stack.last_mut()
    {
        top.raw_content
            .get_or_insert_with(String::new)
            .push_str(segment);
    }
}

/// Pop the open node and attach it to its parent.
fn close_top(stack: &mut Vec<StructureNode>)
{
    if let Some(done) = stack.pop()
        && let Some(parent) = stack.last_mut()
    {
        parent
            .children
            .push(done);
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn build(content: &str) -> StructureNode
    {
        let rev = RevisionId::new("p", "v1");
        StructureBuilder::new(&rev).build(content)
    }

    fn raw(node: &StructureNode) -> &str
    {
        node.raw_content
            .as_deref()
            .unwrap_or("")
    }

    #[test]
    fn sibling_sections_close_subsections()
    {
        let root = build(r"\section{A}x\subsection{B}y\section{C}z");

        assert_eq!(root.type_name(), "document");
        assert_eq!(
            root.children
                .len(),
            2
        );

        let a = &root.children[0];
        let c = &root.children[1];
        assert_eq!(a.title(), "A");
        assert_eq!(raw(a), "x");
        assert_eq!(
            a.children
                .len(),
            1
        );
        assert_eq!(a.children[0].title(), "B");
        assert_eq!(a.children[0].type_name(), "subsection");
        assert_eq!(raw(&a.children[0]), "y");
        assert_eq!(c.title(), "C");
        assert_eq!(raw(c), "z");
        assert!(
            c.children
                .is_empty()
        );
    }

    #[test]
    fn preamble_stays_on_the_root()
    {
        let root = build("\\title{T}\n\\begin{document}\n\\section*{Intro}\nBody.");

        assert_eq!(raw(&root), "\\title{T}\n\\begin{document}\n");
        let intro = &root.children[0];
        assert!(intro.is_starred());
        assert_eq!(raw(intro), "\nBody.");
    }

    #[test]
    fn titles_are_balanced_and_cleaned()
    {
        let root = build(r"\section{The \textbf{Bold} \emph{Way}}text");

        assert_eq!(root.children[0].title(), "The Bold Way");
        assert_eq!(raw(&root.children[0]), "text");
    }

    #[test]
    fn headings_nested_in_titles_are_skipped()
    {
        let root = build(r"\section{Outer \paragraph{inner}}after");

        assert_eq!(
            root.children
                .len(),
            1
        );
        assert!(
            root.children[0]
                .children
                .is_empty()
        );
    }

    #[test]
    fn deeper_jumps_and_case_insensitive_commands()
    {
        let root = build(r"\CHAPTER{One}\subsubsection{Deep}\section{Two}");

        let one = &root.children[0];
        assert_eq!(one.type_name(), "chapter");
        assert_eq!(one.children[0].type_name(), "subsubsection");
        assert_eq!(one.children[1].type_name(), "section");
        assert!(raw(&root).is_empty());
    }

    #[test]
    fn short_titles_in_brackets_are_skipped()
    {
        let root = build(r"\section[Short]{The Long Title}Body.\subsection*[s] {Sub}More.");

        assert_eq!(
            root.children
                .len(),
            1
        );
        let section = &root.children[0];
        assert_eq!(section.title(), "The Long Title");
        assert_eq!(raw(section), "Body.");
        assert_eq!(section.children[0].title(), "Sub");
        assert!(section.children[0].is_starred());
        assert_eq!(raw(&section.children[0]), "More.");
    }

    #[test]
    fn no_headings_leaves_everything_on_root()
    {
        let root = build("Just text.");
        assert_eq!(raw(&root), "Just text.");
        assert!(
            root.children
                .is_empty()
        );
    }
}
