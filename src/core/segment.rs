//! Fine-grained segmentation of the coarse tree.
//!
//! Pending `raw_content` on each node becomes typed children:
//! - the document root yields title, author and abstract metadata
//! - every other node yields equations, floats, lists and sentences
//!
//! New children are placed before existing section children, since a
//! section's own text always precedes its subsections.

use once_cell::sync::Lazy;
use regex::{Match, Regex};
use tracing::trace;

use crate::core::{
    clean::{Comments, LatexCleaner},
    node::{ListKind, NodeKind, RevisionId, StructureNode},
    scan::{command_arguments, environment_end, skip_optional_argument},
    sentence::SentenceSplitter,
};

static MATH_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\\begin\{equation\*?\}.*?\\end\{equation\*?\}|\\\[.*?\\\]|\$\$.*?\$\$")
        .expect("valid math block pattern")
});

static FLOAT_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\\begin\{(?:figure|table)\*?\}.*?\\end\{(?:figure|table)\*?\}")
        .expect("valid float pattern")
});

static LIST_BEGIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\\begin\{(itemize|enumerate)\}").expect("valid list pattern")
});

static LIST_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\\item\b|\\begin\{(itemize|enumerate)\}").expect("valid list token pattern")
});

static ABSTRACT_ENV: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\\begin\s*\{abstract\}(.*?)\\end\s*\{abstract\}")
        .expect("valid abstract pattern")
});

/// A block found in prose, by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum BlockKind
{
    Math,
    Float,
    List,
}

pub struct ContentSegmenter<'a>
{
    revision: &'a RevisionId,
    splitter: SentenceSplitter,
}

impl<'a> ContentSegmenter<'a>
{
    pub fn new(revision: &'a RevisionId) -> Self
    {
        Self { revision, splitter: SentenceSplitter::new() }
    }

    pub fn with_splitter(
        mut self,
        splitter: SentenceSplitter,
    ) -> Self
    {
        self.splitter = splitter;
        self
    }

    /// Consume pending raw content throughout the tree.
    pub fn process_tree(
        &self,
        node: &mut StructureNode,
    )
    {
        if let Some(raw) = node
            .raw_content
            .take()
            && !raw
                .trim()
                .is_empty()
        {
            let mut produced = match node.kind
            {
                NodeKind::Document => self.preamble_nodes(&raw),
                _ => self.parse_content_blocks(&raw),
            };
            trace!(node = %node.id, produced = produced.len(), "segmented");
            produced.append(&mut node.children);
            node.children = produced;
        }

        for child in &mut node.children
        {
            if child
                .kind
                .is_section()
                || matches!(child.kind, NodeKind::Abstract)
            {
                self.process_tree(child);
            }
        }
    }

    /// Title, author and abstract nodes from the text before the first heading.
    pub fn preamble_nodes(
        &self,
        preamble: &str,
    ) -> Vec<StructureNode>
    {
        let preamble = Comments::strip(preamble);
        let mut nodes = Vec::new();

        if let Some(raw_title) = command_arguments(&preamble, "title").first()
        {
            let text = LatexCleaner::clean_latex(raw_title, true);
            if !text.is_empty()
            {
                nodes.push(self.node(NodeKind::Title { text }));
            }
        }

        let authors: Vec<String> = command_arguments(&preamble, "author")
            .into_iter()
            .map(|a| LatexCleaner::clean_latex(a, true))
            .filter(|a| !a.is_empty())
            .collect();
        if !authors.is_empty()
        {
            nodes.push(self.node(NodeKind::Author { text: authors.join(", ") }));
        }

        let raw_abstract = ABSTRACT_ENV
            .captures(&preamble)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .or_else(|| {
                command_arguments(&preamble, "abstract")
                    .first()
                    .copied()
            });
        if let Some(raw_abstract) = raw_abstract
        {
            let mut abstract_node = self.node(NodeKind::Abstract);
            abstract_node.children = self.parse_content_blocks(raw_abstract);
            nodes.push(abstract_node);
        }

        nodes
    }

    /// Split mixed text into equation, float, list and sentence nodes, in
    /// document order.
    pub fn parse_content_blocks(
        &self,
        text: &str,
    ) -> Vec<StructureNode>
    {
        let mut out = Vec::new();
        let mut prose_start = 0usize;
        let mut search_from = 0usize;

        while let Some((kind, start, end)) = next_block(text, search_from)
        {
            let Some(end) = end
            else
            {
                // Unclosed list: leave it to the prose around it
                search_from = start + 1;
                continue;
            };

            self.push_sentences(&text[prose_start..start], &mut out);

            let block = &text[start..end];
            match kind
            {
                BlockKind::Math =>
                {
                    let body = LatexCleaner::clean_equation(block);
                    if !body.is_empty()
                    {
                        out.push(self.node(NodeKind::Equation { body }));
                    }
                }
                BlockKind::Float =>
                {
                    let body = LatexCleaner::clean_figure_table(block);
                    if !body.is_empty()
                    {
                        out.push(self.node(NodeKind::Figure { body }));
                    }
                }
                BlockKind::List => out.push(self.list_node(block)),
            }

            prose_start = end;
            search_from = end;
        }

        self.push_sentences(&text[prose_start..], &mut out);
        out
    }

    /// A `list` node from a complete `\begin{itemize|enumerate}...\end{..}` block.
    fn list_node(
        &self,
        block: &str,
    ) -> StructureNode
    {
        let name = LIST_BEGIN
            .captures(block)
            .and_then(|c| c.get(1))
            .map_or("itemize", |m| m.as_str());
        let kind = ListKind::from_env(name);
        let mut list = self.node(NodeKind::List { kind });

        let inner = unwrap_environment(block, name);
        for item in split_items(inner)
        {
            if let Some(item_node) = self.item_node(item)
            {
                list.children
                    .push(item_node);
            }
        }

        list
    }

    /// One `list_item`; nested lists become its children.
    fn item_node(
        &self,
        item: &str,
    ) -> Option<StructureNode>
    {
        let mut own_text = String::new();
        let mut nested = Vec::new();
        let mut last = 0usize;
        let mut search_from = 0usize;

        while let Some(m) = LIST_BEGIN.find_at(item, search_from)
        {
            let name = m
                .as_str()
                .trim_start_matches("\\begin{")
                .trim_end_matches('}');
            match environment_end(item, m.start(), name)
            {
                Some(end) =>
                {
                    own_text.push_str(&item[last..m.start()]);
                    nested.push(self.list_node(&item[m.start()..end]));
                    last = end;
                    search_from = end;
                }
                None => search_from = m.end(),
            }
        }
        own_text.push_str(&item[last..]);

        let text = LatexCleaner::clean_latex(&Comments::strip(&own_text), false);
        if text.is_empty() && nested.is_empty()
        {
            return None;
        }

        let mut node = self.node(NodeKind::ListItem { text });
        node.children = nested;
        Some(node)
    }

    fn push_sentences(
        &self,
        prose: &str,
        out: &mut Vec<StructureNode>,
    )
    {
        let prose = Comments::strip(prose);
        if prose
            .trim()
            .is_empty()
        {
            return;
        }

        for sentence in self
            .splitter
            .split(&prose)
        {
            let text = LatexCleaner::clean_latex(&sentence, false);
            if !text.is_empty()
            {
                out.push(self.node(NodeKind::Sentence { text }));
            }
        }
    }

    fn node(
        &self,
        kind: NodeKind,
    ) -> StructureNode
    {
        StructureNode::new(self.revision, kind)
    }
}

/// Earliest block starting at or after `from`. Ties go to the higher
/// priority kind. `end` is `None` for a list that never closes.
fn next_block(
    text: &str,
    from: usize,
) -> Option<(BlockKind, usize, Option<usize>)>
{
    let span = |m: Match<'_>| (m.start(), Some(m.end()));

    let candidates = [
        MATH_BLOCK
            .find_at(text, from)
            .map(|m| (BlockKind::Math, span(m))),
        FLOAT_BLOCK
            .find_at(text, from)
            .map(|m| (BlockKind::Float, span(m))),
        LIST_BEGIN
            .captures_at(text, from)
            .and_then(|c| {
                let whole = c.get(0)?;
                let name = c.get(1)?;
                Some((BlockKind::List, (whole.start(), environment_end(text, whole.start(), name.as_str()))))
            }),
    ];

    candidates
        .into_iter()
        .flatten()
        .min_by_key(|(kind, (start, _))| (*start, *kind))
        .map(|(kind, (start, end))| (kind, start, end))
}

/// Strip the opening tag (and its `[..]` options) and the closing tag.
fn unwrap_environment<'t>(
    block: &'t str,
    name: &str,
) -> &'t str
{
    let open = format!("\\begin{{{name}}}");
    let body_start = if block.starts_with(&open)
    {
        skip_optional_argument(block, open.len())
    }
    else
    {
        0
    };

    let close = format!("\\end{{{name}}}");
    let body = &block[body_start..];
    body.trim_end()
        .strip_suffix(&close)
        .unwrap_or(body)
}

/// Split list content at top-level `\item`s, skipping nested lists and any
/// `[label]` right after the item command. Text before the first item is dropped.
fn split_items(inner: &str) -> Vec<&str>
{
    let mut starts = Vec::new();
    let mut from = 0usize;

    while let Some(caps) = LIST_TOKEN.captures_at(inner, from)
    {
        let Some(whole) = caps.get(0)
        else
        {
            break;
        };

        if let Some(name) = caps.get(1)
        {
            from = environment_end(inner, whole.start(), name.as_str()).unwrap_or(whole.end());
            continue;
        }

        starts.push((whole.start(), skip_optional_argument(inner, whole.end())));
        from = whole.end();
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &(_, body_start))| {
            let end = starts
                .get(i + 1)
                .map_or(inner.len(), |&(next, _)| next);
            &inner[body_start.min(end)..end]
        })
        .collect()
}
