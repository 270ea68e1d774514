//! Typed structure tree shared by the builder, segmenter and deduplicator.
//!
//! Each node variant carries only the fields that make sense for it; the
//! string `type_name()` is what lands in ids and fingerprints.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One revision of one paper: `(paper_id, version_label)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionId
{
    pub paper_id: String,
    pub version_label: String,
}

impl RevisionId
{
    pub fn new(
        paper_id: impl Into<String>,
        version_label: impl Into<String>,
    ) -> Self
    {
        Self { paper_id: paper_id.into(), version_label: version_label.into() }
    }

    /// Fresh node id: `{paper}-{version}-{type}-{uuid}`. Unique per call.
    pub fn mint_id(
        &self,
        type_name: &str,
    ) -> String
    {
        format!(
            "{}-{}-{}-{}",
            self.paper_id,
            self.version_label,
            type_name,
            uuid::Uuid::new_v4()
        )
    }
}

impl fmt::Display for RevisionId
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        write!(f, "{}/{}", self.paper_id, self.version_label)
    }
}

/// Sectioning commands, ordered by hierarchy rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind
{
    Part,
    Chapter,
    Section,
    Subsection,
    Subsubsection,
    Paragraph,
    Subparagraph,
}

impl SectionKind
{
    pub const ALL: [SectionKind; 7] = [
        SectionKind::Part,
        SectionKind::Chapter,
        SectionKind::Section,
        SectionKind::Subsection,
        SectionKind::Subsubsection,
        SectionKind::Paragraph,
        SectionKind::Subparagraph,
    ];

    /// Parse a command name without the backslash, ignoring ASCII case.
    pub fn from_command(name: &str) -> Option<Self>
    {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(name))
    }

    pub fn as_str(self) -> &'static str
    {
        match self
        {
            SectionKind::Part => "part",
            SectionKind::Chapter => "chapter",
            SectionKind::Section => "section",
            SectionKind::Subsection => "subsection",
            SectionKind::Subsubsection => "subsubsection",
            SectionKind::Paragraph => "paragraph",
            SectionKind::Subparagraph => "subparagraph",
        }
    }

    /// 1 (part) through 7 (subparagraph); the document root is 0.
    pub fn level(self) -> u8
    {
        self as u8 + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind
{
    Itemize,
    Enumerate,
}

impl ListKind
{
    pub fn from_env(name: &str) -> Self
    {
        if name.eq_ignore_ascii_case("enumerate")
        {
            ListKind::Enumerate
        }
        else
        {
            ListKind::Itemize
        }
    }

    pub fn as_str(self) -> &'static str
    {
        match self
        {
            ListKind::Itemize => "itemize",
            ListKind::Enumerate => "enumerate",
        }
    }
}

/// Level used by every non-sectioning node.
pub const LEAF_LEVEL: u8 = 99;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind
{
    Document,
    Section
    {
        kind: SectionKind,
        title: String,
        is_starred: bool,
    },
    Title
    {
        text: String,
    },
    Author
    {
        text: String,
    },
    Abstract,
    Equation
    {
        body: String,
    },
    Figure
    {
        body: String,
    },
    List
    {
        kind: ListKind,
    },
    ListItem
    {
        text: String,
    },
    Sentence
    {
        text: String,
    },
}

impl NodeKind
{
    pub fn type_name(&self) -> &'static str
    {
        match self
        {
            NodeKind::Document => "document",
            NodeKind::Section { kind, .. } => kind.as_str(),
            NodeKind::Title { .. } => "title",
            NodeKind::Author { .. } => "author",
            NodeKind::Abstract => "abstract",
            NodeKind::Equation { .. } => "equation",
            NodeKind::Figure { .. } => "figure",
            NodeKind::List { .. } => "list",
            NodeKind::ListItem { .. } => "list_item",
            NodeKind::Sentence { .. } => "sentence",
        }
    }

    pub fn is_section(&self) -> bool
    {
        matches!(self, NodeKind::Section { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureNode
{
    pub id: String,

    #[serde(flatten)]
    pub kind: NodeKind,

    /// Unsegmented text; present between structure building and segmentation only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,

    #[serde(default)]
    pub children: Vec<StructureNode>,
}

impl StructureNode
{
    pub fn new(
        revision: &RevisionId,
        kind: NodeKind,
    ) -> Self
    {
        Self { id: revision.mint_id(kind.type_name()), kind, raw_content: None, children: Vec::new() }
    }

    pub fn document(revision: &RevisionId) -> Self
    {
        Self::new(revision, NodeKind::Document)
    }

    pub fn type_name(&self) -> &'static str
    {
        self.kind
            .type_name()
    }

    pub fn level(&self) -> u8
    {
        match &self.kind
        {
            NodeKind::Document => 0,
            NodeKind::Section { kind, .. } => kind.level(),
            _ => LEAF_LEVEL,
        }
    }

    pub fn is_starred(&self) -> bool
    {
        matches!(self.kind, NodeKind::Section { is_starred: true, .. })
    }

    /// Display title. Leaf variants get a fixed label or a short preview.
    pub fn title(&self) -> String
    {
        match &self.kind
        {
            NodeKind::Document => "Root Document".to_string(),
            NodeKind::Section { title, .. } => title.clone(),
            NodeKind::Title { text } | NodeKind::Author { text } => text.clone(),
            NodeKind::Abstract => "Abstract".to_string(),
            NodeKind::Equation { .. } => "Equation Block".to_string(),
            NodeKind::Figure { .. } => "Figure/Table".to_string(),
            NodeKind::List { kind } => format!("List ({})", kind.as_str()),
            NodeKind::ListItem { .. } => "List Item".to_string(),
            NodeKind::Sentence { text } => preview(text, 30),
        }
    }

    /// Text that identifies this node for deduplication.
    ///
    /// Sectioning nodes are identified by their heading and the abstract by
    /// its fixed label, so they stay stable across revisions. The document
    /// root and list containers carry no content of their own.
    pub fn content(&self) -> &str
    {
        match &self.kind
        {
            NodeKind::Document | NodeKind::List { .. } => "",
            NodeKind::Section { title, .. } => title,
            NodeKind::Abstract => "Abstract",
            NodeKind::Title { text }
            | NodeKind::Author { text }
            | NodeKind::ListItem { text }
            | NodeKind::Sentence { text } => text,
            NodeKind::Equation { body } | NodeKind::Figure { body } => body,
        }
    }

    /// Pre-order traversal including `self`.
    pub fn descendants(&self) -> Vec<&StructureNode>
    {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop()
        {
            out.push(node);
            stack.extend(
                node.children
                    .iter()
                    .rev(),
            );
        }
        out
    }

    /// Count nodes of the given type anywhere under (and including) `self`.
    pub fn count_type(
        &self,
        type_name: &str,
    ) -> usize
    {
        self.descendants()
            .into_iter()
            .filter(|n| n.type_name() == type_name)
            .count()
    }
}

/// First `max_chars` characters followed by an ellipsis.
fn preview(
    text: &str,
    max_chars: usize,
) -> String
{
    let head: String = text
        .chars()
        .take(max_chars)
        .collect();
    format!("{head}...")
}
