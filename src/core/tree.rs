//! Single-revision inspection: flatten, structure and segment one revision,
//! then print the resulting node tree (ptree) or one of its renderings
//! (JSON, Markdown, standalone HTML, cleaned LaTeX).

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use ptree::TreeBuilder;
use std::path::Path;

use crate::cli::{AppContext, TreeArgs};
use crate::core::{
    flatten::{Flattener, VisitPolicy},
    node::{ListKind, NodeKind, RevisionId, StructureNode},
    root::RootResolver,
    segment::ContentSegmenter,
    sentence::SentenceSplitter,
    structure::StructureBuilder,
};
use crate::infra::config::load_config;
use crate::infra::walk::FileWalker;

pub fn run(args: TreeArgs, ctx: &AppContext) -> Result<()> {
    let config = load_config().unwrap_or_default();

    let root_file = if args.path.is_dir() {
        let walker = FileWalker::from_config(&config).context("Invalid ignore patterns in config")?;
        RootResolver::new(config.root.clone(), walker)
            .find_root(&args.path)
            .with_context(|| format!("No root .tex file found in {}", args.path.display()))?
    } else {
        args.path.clone()
    };

    if ctx.dry_run {
        if !ctx.quiet {
            println!("{}", "DRY RUN: Would parse:".yellow());
            println!("  Root: {}", root_file.display());
            println!("  Revision: {}/{}", args.paper_id, args.version);
        }
        return Ok(());
    }

    let revision = RevisionId::new(args.paper_id.as_str(), args.version.as_str());
    let policy = args.visit_policy.unwrap_or(config.flatten.visit_policy);
    let splitter =
        SentenceSplitter::new().with_custom_abbreviations(&config.segment.abbreviations);
    let tree = parse_revision(&root_file, &revision, policy, splitter)?;

    if args.json {
        let json = serde_json::to_string_pretty(&tree).context("Failed to serialize tree")?;
        println!("{json}");
    } else if args.markdown {
        print!("{}", render_markdown(&tree));
    } else if args.html {
        print!("{}", render_html(&tree, &revision));
    } else if args.cleaned {
        println!("{}", render_cleaned(&tree));
    } else if !ctx.quiet {
        print_tree(&tree, args.depth, !ctx.no_color)?;
    }

    Ok(())
}

/// Flatten `root_file` without its bibliography and build the segmented tree.
pub fn parse_revision(
    root_file: &Path,
    revision: &RevisionId,
    policy: VisitPolicy,
    splitter: SentenceSplitter,
) -> Result<StructureNode> {
    let flat = Flattener::new(root_file)
        .strip_bibliography(true)
        .visit_policy(policy)
        .flatten()?;

    let mut tree = StructureBuilder::new(revision).build(&flat.content);
    ContentSegmenter::new(revision).with_splitter(splitter).process_tree(&mut tree);
    Ok(tree)
}

fn print_tree(root: &StructureNode, depth: Option<usize>, color: bool) -> Result<()> {
    let mut builder = TreeBuilder::new(format_node_label(root, color));
    add_children_to_builder(&mut builder, &root.children, depth, 1, color);
    let tree = builder.build();

    ptree::print_tree(&tree)?;

    Ok(())
}

fn add_children_to_builder(
    builder: &mut TreeBuilder,
    children: &[StructureNode],
    max_depth: Option<usize>,
    depth: usize,
    color: bool,
) {
    for child in children {
        let expand = max_depth.is_none_or(|max| depth < max);
        if child.children.is_empty() || !expand {
            builder.add_empty_child(format_node_label(child, color));
        } else {
            builder.begin_child(format_node_label(child, color));
            add_children_to_builder(builder, &child.children, max_depth, depth + 1, color);
            builder.end_child();
        }
    }
}

/// `[type] title`, colored by node family.
fn format_node_label(node: &StructureNode, color: bool) -> String {
    let tag = format!("[{}]", node.type_name());
    let title = node.title();
    if !color {
        return format!("{tag} {title}");
    }

    let tag = match node.kind {
        NodeKind::Document => tag.bold().to_string(),
        NodeKind::Section { .. } => tag.blue().to_string(),
        NodeKind::Title { .. } | NodeKind::Author { .. } | NodeKind::Abstract => tag.magenta().to_string(),
        NodeKind::Equation { .. } | NodeKind::Figure { .. } => tag.yellow().to_string(),
        NodeKind::List { .. } | NodeKind::ListItem { .. } => tag.cyan().to_string(),
        NodeKind::Sentence { .. } => tag.dimmed().to_string(),
    };
    format!("{tag} {title}")
}

/// Readable Markdown view of a segmented tree.
pub fn render_markdown(root: &StructureNode) -> String {
    let mut out = String::new();
    write_markdown(root, 0, &mut out);
    out
}

fn write_markdown(node: &StructureNode, list_depth: usize, out: &mut String) {
    match &node.kind {
        NodeKind::Document => {}
        NodeKind::Title { text } => out.push_str(&format!("# {text}\n\n")),
        NodeKind::Author { text } => out.push_str(&format!("**Authors:** {text}\n\n")),
        NodeKind::Abstract => out.push_str("## Abstract\n\n"),
        NodeKind::Section { title, .. } => {
            // part and chapter share `#`; section is `##`
            let hashes = "#".repeat(node.level().saturating_sub(1).clamp(1, 6) as usize);
            out.push_str(&format!("\n{hashes} {title}\n\n"));
        }
        NodeKind::Equation { body } => out.push_str(&format!("$$\n{}\n$$\n\n", body.trim())),
        NodeKind::Figure { body } => {
            out.push_str(&format!("> **[{}]**\n> {}\n\n", node.title(), body.trim()))
        }
        NodeKind::List { .. } => out.push('\n'),
        NodeKind::ListItem { text } => {
            let indent = "  ".repeat(list_depth.saturating_sub(1));
            out.push_str(&format!("{indent}- {}\n", text.trim()));
        }
        NodeKind::Sentence { text } => out.push_str(&format!("{text}\n\n")),
    }

    let child_depth = match node.kind {
        NodeKind::List { .. } => list_depth + 1,
        _ => list_depth,
    };
    for child in &node.children {
        write_markdown(child, child_depth, out);
    }
}

const HTML_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<script src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js"></script>
<style>
body { max-width: 50em; margin: 2em auto; font-family: serif; line-height: 1.5; }
.paper-title { text-align: center; }
.authors, .abstract { margin: 1em 0; }
.equation { margin: 1em 0; text-align: center; }
figure blockquote { font-family: monospace; white-space: pre-wrap; }
</style>
</head>
<body>
"#;

/// Standalone HTML page for one revision, with MathJax for the math.
pub fn render_html(root: &StructureNode, revision: &RevisionId) -> String {
    let title = format!("{} - {}", revision.paper_id, revision.version_label);
    let mut out = HTML_HEAD.replace("{title}", &escape_html(&title));
    write_html(root, &mut out);
    out.push_str("</body>\n</html>\n");
    out
}

fn write_html(node: &StructureNode, out: &mut String) {
    let close = match &node.kind {
        NodeKind::Document => None,
        NodeKind::Title { text } => {
            out.push_str(&format!("<h1 class='paper-title'>{}</h1>\n", escape_html(text)));
            None
        }
        NodeKind::Author { text } => {
            out.push_str(&format!(
                "<div class='authors'><strong>Authors:</strong> {}</div>\n",
                escape_html(text)
            ));
            None
        }
        NodeKind::Abstract => {
            out.push_str("<section class='abstract'>\n<h2>Abstract</h2>\n");
            Some("</section>\n")
        }
        NodeKind::Section { title, .. } => {
            let h = node.level().saturating_sub(1).clamp(1, 6);
            out.push_str(&format!("<h{h}>{}</h{h}>\n", escape_html(title)));
            None
        }
        NodeKind::Equation { body } => {
            out.push_str(&format!(
                "<div class=\"equation\">\n$$\n{}\n$$\n</div>\n",
                escape_html(body.trim())
            ));
            None
        }
        NodeKind::Figure { body } => {
            out.push_str(&format!(
                "<figure>\n<figcaption>{}</figcaption>\n<blockquote>{}</blockquote>\n</figure>\n",
                escape_html(&node.title()),
                escape_html(body.trim())
            ));
            None
        }
        NodeKind::List { kind } => match kind {
            ListKind::Enumerate => {
                out.push_str("<ol>\n");
                Some("</ol>\n")
            }
            ListKind::Itemize => {
                out.push_str("<ul>\n");
                Some("</ul>\n")
            }
        },
        NodeKind::ListItem { text } => {
            out.push_str(&format!("<li>{}", escape_html(text.trim())));
            Some("</li>\n")
        }
        NodeKind::Sentence { text } => {
            out.push_str(&format!("<p>{}</p>\n", escape_html(text)));
            None
        }
    };

    for child in &node.children {
        write_html(child, out);
    }
    if let Some(tag) = close {
        out.push_str(tag);
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Cleaned LaTeX source: sectioning commands, math and floats, lists and
/// one paragraph per sentence, with every comment and include marker gone.
pub fn render_cleaned(root: &StructureNode) -> String {
    let mut out = String::new();
    write_cleaned(root, &mut out);
    out.trim().to_string()
}

fn write_cleaned(node: &StructureNode, out: &mut String) {
    match &node.kind {
        NodeKind::Document => {}
        NodeKind::Title { text } => out.push_str(&format!("\\title{{{text}}}\n\n")),
        NodeKind::Author { text } => out.push_str(&format!("\\author{{{text}}}\n\n")),
        NodeKind::Abstract => out.push_str("\\begin{abstract}\n"),
        NodeKind::Section { kind, title, is_starred } => {
            let star = if *is_starred { "*" } else { "" };
            out.push_str(&format!("\n\\{}{star}{{{title}}}\n\n", kind.as_str()));
        }
        NodeKind::Equation { body } | NodeKind::Figure { body } => {
            out.push_str(&format!("\n{}\n\n", body.trim()))
        }
        NodeKind::List { kind } => out.push_str(&format!("\\begin{{{}}}\n", kind.as_str())),
        NodeKind::ListItem { text } => out.push_str(&format!("\\item {}\n", text.trim())),
        NodeKind::Sentence { text } => out.push_str(&format!("{text}\n\n")),
    }

    for child in &node.children {
        write_cleaned(child, out);
    }

    match &node.kind {
        NodeKind::Abstract => out.push_str("\\end{abstract}\n\n"),
        NodeKind::List { kind } => out.push_str(&format!("\\end{{{}}}\n\n", kind.as_str())),
        _ => {}
    }
}
