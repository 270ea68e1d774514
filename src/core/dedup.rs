//! Content-addressed merging of revisions into one per-paper hierarchy.
//!
//! Every node is reduced to a canonical id. The first node to produce a
//! fingerprint owns it; later revisions reuse that id, so unchanged content
//! keeps the same identity across versions and the per-version maps can be
//! compared directly.

use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    core::node::StructureNode,
    infra::io::{read_text_lossy, write_json_atomic},
};

/// Lowercase, then keep alphanumerics only.
pub fn normalize(content: &str) -> String
{
    content
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Hash of `(type, normalized content)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint
{
    pub fn of(
        type_name: &str,
        content: &str,
    ) -> Self
    {
        let mut hasher = blake3::Hasher::new();
        hasher.update(type_name.as_bytes());
        hasher.update(b":");
        hasher.update(
            normalize(content)
                .as_bytes(),
        );
        Self(*hasher
            .finalize()
            .as_bytes())
    }

    pub fn to_hex(&self) -> String
    {
        blake3::Hash::from(self.0)
            .to_hex()
            .to_string()
    }
}

/// Maps a revision folder label to the version key used in the hierarchy.
pub trait VersionNormalizer
{
    fn version_number(
        &self,
        label: &str,
    ) -> String;
}

/// `v2` → `2`, `paper/v10` → `10`. Labels with no `v`, or nothing after
/// the last one, are returned unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct SplitOnLastV;

impl VersionNormalizer for SplitOnLastV
{
    fn version_number(
        &self,
        label: &str,
    ) -> String
    {
        match label.rsplit_once('v')
        {
            Some((_, rest)) if !rest.is_empty() => rest.to_string(),
            _ => label.to_string(),
        }
    }
}

/// The exported artifact: element pool plus one child→parent map per version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyDocument
{
    pub elements: IndexMap<String, String>,
    pub hierarchy: IndexMap<String, IndexMap<String, String>>,
}

impl HierarchyDocument
{
    pub fn write_json(
        &self,
        path: &Path,
    ) -> Result<()>
    {
        write_json_atomic(path, self)
    }

    pub fn read_json(path: &Path) -> Result<Self>
    {
        let text = read_text_lossy(path)?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse hierarchy {}", path.display()))
    }
}

/// Per-paper dedup state, fed one revision at a time in sorted order.
pub struct DedupContext<N = SplitOnLastV>
{
    elements: IndexMap<String, String>,
    index: HashMap<Fingerprint, String>,
    hierarchy: IndexMap<String, IndexMap<String, String>>,
    /// Canonical id shared by the document root of every revision
    root_id: Option<String>,
    normalizer: N,
}

impl Default for DedupContext<SplitOnLastV>
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl DedupContext<SplitOnLastV>
{
    pub fn new() -> Self
    {
        Self::with_normalizer(SplitOnLastV)
    }
}

impl<N: VersionNormalizer> DedupContext<N>
{
    pub fn with_normalizer(normalizer: N) -> Self
    {
        Self {
            elements: IndexMap::new(),
            index: HashMap::new(),
            hierarchy: IndexMap::new(),
            root_id: None,
            normalizer,
        }
    }

    /// Canonical id for `node`.
    ///
    /// A node without content is recorded by title under its own id and
    /// never matched against others.
    pub fn register(
        &mut self,
        node: &StructureNode,
    ) -> String
    {
        let content = node.content();

        if content
            .trim()
            .is_empty()
        {
            let title = node.title();
            if !title.is_empty()
            {
                self.elements
                    .insert(node.id.clone(), title);
            }
            return node
                .id
                .clone();
        }

        let fingerprint = Fingerprint::of(node.type_name(), content);
        if let Some(existing) = self
            .index
            .get(&fingerprint)
        {
            return existing.clone();
        }

        self.elements
            .insert(node.id.clone(), content.to_string());
        self.index
            .insert(fingerprint, node.id.clone());
        node.id
            .clone()
    }

    /// Register every node of one revision and record its child→parent map.
    /// The document root of every revision maps to the first root's id,
    /// stored in the pool under its title.
    #[instrument(skip(self, root), fields(nodes = tracing::field::Empty))]
    pub fn process_revision(
        &mut self,
        version_label: &str,
        root: &StructureNode,
    )
    {
        let version = self
            .normalizer
            .version_number(version_label);
        let root_id = self
            .root_id
            .get_or_insert_with(|| {
                root.id
                    .clone()
            })
            .clone();
        self.elements
            .entry(root_id.clone())
            .or_insert_with(|| root.title());

        let mut map = IndexMap::new();
        for child in &root.children
        {
            self.visit(child, &root_id, &mut map);
        }

        tracing::Span::current().record("nodes", map.len());
        debug!(version = %version, pool = self.elements.len(), "revision merged");
        self.hierarchy
            .insert(version, map);
    }

    fn visit(
        &mut self,
        node: &StructureNode,
        parent: &str,
        map: &mut IndexMap<String, String>,
    )
    {
        let id = self.register(node);
        map.insert(id.clone(), parent.to_string());
        for child in &node.children
        {
            self.visit(child, &id, map);
        }
    }

    pub fn elements(&self) -> &IndexMap<String, String>
    {
        &self.elements
    }

    pub fn version_map(
        &self,
        version: &str,
    ) -> Option<&IndexMap<String, String>>
    {
        self.hierarchy
            .get(version)
    }

    pub fn export(&self) -> HierarchyDocument
    {
        HierarchyDocument { elements: self.elements.clone(), hierarchy: self.hierarchy.clone() }
    }
}
