//! Filepath: src/core/clean.rs
//! Text normalization for produced nodes. Helpers are grouped on small
//! unit structs with associated fns, like the rest of the crate's utilities.

use std::borrow::Cow;

use memchr::memchr_iter;
use once_cell::sync::Lazy;
use regex::Regex;

/// Commands removed together with their (single, flat) argument.
const DELETE_WITH_ARGUMENT: &[&str] = &[
    "footnote",
    "todo",
    "comment",
    "note",
    "thanks",
    "label",
    "ref",
    "eqref",
    "bibliographystyle",
    "input",
    "include",
    "bibliography",
    "acknowledgments",
];

/// Formatting commands replaced by their argument.
const UNWRAP: &[&str] = &[
    "textbf",
    "textit",
    "emph",
    "textsc",
    "text",
    "mathrm",
    "mathbf",
    "section",
    "subsection",
    "subsubsection",
    "paragraph",
    "subparagraph",
];

/// Argument-less layout commands.
const LAYOUT: &[&str] = &[
    "centering",
    "newpage",
    "clearpage",
    "tableofcontents",
    "noindent",
    "hfill",
    "vfill",
    "break",
    "pagebreak",
    "FloatBarrier",
    "newline",
    "maketitle",
    "nocite",
    "hbadness",
    "preprint",
];

/// One level of brace nesting inside an argument.
const NESTED_ARG: &str = r"((?:[^{}]|\{[^{}]*\})*)";

static INLINE_MATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\$[^$]+\$|\\\([^)]+\\\))").expect("inline math pattern"));

static DELETE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\\({})(\[[^\]]*\])?\{{[^}}]*\}}", DELETE_WITH_ARGUMENT.join("|")))
        .expect("delete block pattern")
});

static DELETE_LAYOUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\\({})\b", LAYOUT.join("|"))).expect("layout pattern")
});

static TEXORPDFSTRING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\\texorpdfstring\s*\{{{NESTED_ARG}\}}\s*\{{{NESTED_ARG}\}}"))
        .expect("texorpdfstring pattern")
});

static UNWRAP_CMD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\\({})(\[[^\]]*\])?\{{{NESTED_ARG}\}}", UNWRAP.join("|")))
        .expect("unwrap pattern")
});

static ABSTRACT_TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(begin|end)\{abstract\}").expect("abstract tag pattern"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

static FLOAT_OPTIONS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\\begin\{(?:figure|table)\*?\})(\[[^\]]*\])?").expect("float option pattern")
});

static FLOAT_LAYOUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(centering|hfill|vfill|noindent)").expect("float layout pattern"));

static NESTED_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\\label\{{{NESTED_ARG}\}}")).expect("label pattern"));

static CAPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(\\caption)(\[[^\]]*\])?\{{{NESTED_ARG}\}}")).expect("caption pattern")
});

static EQUATION_ENV: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\\begin\{equation\*?\}(.*?)\\end\{equation\*?\}").expect("equation pattern")
});

static FLAT_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\label\{[^}]*\}").expect("label pattern"));

static EQ_NUMBERING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(nonumber|notag)").expect("numbering pattern"));

/// Comment stripping shared by the flattener and the segmenter.
pub struct Comments;

impl Comments
{
    /// Drop every unescaped `%` and the rest of its line. Newlines are kept.
    pub fn strip(text: &str) -> Cow<'_, str>
    {
        if !text.contains('%')
        {
            return Cow::Borrowed(text);
        }

        let mut out = String::with_capacity(text.len());

        for line in text.split_inclusive('\n')
        {
            match first_unescaped_percent(line)
            {
                Some(pos) =>
                {
                    out.push_str(&line[..pos]);
                    if line.ends_with('\n')
                    {
                        out.push('\n');
                    }
                }
                None => out.push_str(line),
            }
        }

        Cow::Owned(out)
    }
}

/// Byte index of the first `%` preceded by an even number of backslashes.
fn first_unescaped_percent(line: &str) -> Option<usize>
{
    let bytes = line.as_bytes();

    memchr_iter(b'%', bytes).find(|&pos| {
        let slashes = bytes[..pos]
            .iter()
            .rev()
            .take_while(|&&b| b == b'\\')
            .count();
        slashes % 2 == 0
    })
}

/// Cleaning passes for prose, equations and floats.
pub struct LatexCleaner;

impl LatexCleaner
{
    /// Clean prose: drop noise commands, unwrap formatting, collapse whitespace.
    ///
    /// Unless `preamble_safe`, anything before `\begin{document}` is cut first.
    /// Inline math is shielded so its macros survive untouched.
    pub fn clean_latex(
        text: &str,
        preamble_safe: bool,
    ) -> String
    {
        if text.is_empty()
        {
            return String::new();
        }

        let mut text: &str = text;
        if !preamble_safe && let Some(pos) = text.find(r"\begin{document}")
        {
            text = &text[pos + r"\begin{document}".len()..];
        }

        let text = text.replace(r"\end{document}", "");
        let text = Comments::strip(&text).into_owned();

        // Shield inline math behind private-use placeholders
        let mut shielded: Vec<String> = Vec::new();
        let mut text = INLINE_MATH
            .replace_all(&text, |caps: &regex::Captures| {
                shielded.push(caps[0].to_string());
                format!("\u{E000}{}\u{E001}", shielded.len() - 1)
            })
            .into_owned();

        for _ in 0..3
        {
            text = TEXORPDFSTRING
                .replace_all(&text, "${1}")
                .into_owned();
        }

        text = DELETE_BLOCK
            .replace_all(&text, "")
            .into_owned();
        text = DELETE_LAYOUT
            .replace_all(&text, "")
            .into_owned();
        text = ABSTRACT_TAGS
            .replace_all(&text, "")
            .into_owned();

        // Peel nested formatting: \textbf{\textit{x}} -> \textit{x} -> x
        for _ in 0..5
        {
            let next = UNWRAP_CMD.replace_all(&text, "${3}");
            if next == text
            {
                break;
            }
            text = next.into_owned();
        }

        for (i, original) in shielded
            .iter()
            .enumerate()
        {
            text = text.replace(&format!("\u{E000}{i}\u{E001}"), original);
        }

        WHITESPACE
            .replace_all(&text, " ")
            .trim()
            .to_string()
    }

    /// Keep a float's body; strip placement options, layout noise and labels,
    /// and clean caption text.
    pub fn clean_figure_table(raw_block: &str) -> String
    {
        let block = FLOAT_OPTIONS.replace_all(raw_block, "${1}");
        let block = FLOAT_LAYOUT.replace_all(&block, "");
        let block = NESTED_LABEL.replace_all(&block, "");
        let block = CAPTION.replace_all(&block, |caps: &regex::Captures| {
            let opt = caps
                .get(2)
                .map_or("", |m| m.as_str());
            let cleaned = Self::clean_latex(&caps[3], true);
            format!("{}{}{{{}}}", &caps[1], opt, cleaned)
        });

        block
            .trim()
            .to_string()
    }

    /// Canonicalize display math to `\begin{equation}...\end{equation}`.
    /// Unknown shapes are returned trimmed and otherwise untouched.
    pub fn clean_equation(raw_block: &str) -> String
    {
        let content = raw_block.trim();

        let inner = if let Some(inner) = content
            .strip_prefix("$$")
            .and_then(|s| s.strip_suffix("$$"))
        {
            inner.to_string()
        }
        else if let Some(inner) = content
            .strip_prefix(r"\[")
            .and_then(|s| s.strip_suffix(r"\]"))
        {
            inner.to_string()
        }
        else if content.starts_with(r"\begin{equation")
        {
            EQUATION_ENV
                .captures(content)
                .map_or_else(|| content.to_string(), |c| c[1].to_string())
        }
        else
        {
            return content.to_string();
        };

        let inner = FLAT_LABEL.replace_all(&inner, "");
        let inner = EQ_NUMBERING.replace_all(&inner, "");

        format!("\\begin{{equation}}{}\\end{{equation}}", inner.trim())
    }
}
