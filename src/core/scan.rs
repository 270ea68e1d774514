//! Brace and environment scanning over raw LaTeX text.
//!
//! All delimiters scanned here are ASCII, so byte offsets returned are always
//! valid `str` boundaries.

use once_cell::sync::Lazy;
use regex::Regex;

/// Scan from `start` (the index just after an opening `{`) to the matching
/// closing brace. Returns the enclosed text and the index just past the `}`.
///
/// Escaped braces (`\{`, `\}`) do not change the nesting depth. Unterminated
/// input yields the remainder of `text` and `text.len()`.
pub fn extract_balanced(
    text: &str,
    start: usize,
) -> (&str, usize)
{
    let bytes = text.as_bytes();
    let mut depth = 1usize;
    let mut i = start.min(bytes.len());

    while i < bytes.len()
    {
        match bytes[i]
        {
            b'\\' =>
            {
                // Skip the escaped character, whatever it is
                i += 2;
                continue;
            }
            b'{' => depth += 1,
            b'}' =>
            {
                depth -= 1;
                if depth == 0
                {
                    return (&text[start..i], i + 1);
                }
            }
            _ =>
            {}
        }
        i += 1;
    }

    let start = start.min(text.len());
    (&text[start..], text.len())
}

/// Skip whitespace and an optional `[...]` argument starting at `from`.
/// Returns the index of the next significant byte.
pub fn skip_optional_argument(
    text: &str,
    from: usize,
) -> usize
{
    let bytes = text.as_bytes();
    let mut i = skip_ws(bytes, from);

    if bytes.get(i) == Some(&b'[')
    {
        let mut depth = 0usize;
        while i < bytes.len()
        {
            match bytes[i]
            {
                b'[' => depth += 1,
                b']' =>
                {
                    depth -= 1;
                    if depth == 0
                    {
                        return skip_ws(bytes, i + 1);
                    }
                }
                _ =>
                {}
            }
            i += 1;
        }
    }

    i
}

fn skip_ws(
    bytes: &[u8],
    mut i: usize,
) -> usize
{
    while i < bytes.len() && bytes[i].is_ascii_whitespace()
    {
        i += 1;
    }
    i
}

/// First brace group of every occurrence of `\command` in `text`, with an
/// optional `[...]` argument allowed in between. Nested braces are kept.
pub fn command_arguments<'a>(
    text: &'a str,
    command: &str,
) -> Vec<&'a str>
{
    let needle = format!("\\{command}");
    let mut out = Vec::new();
    let mut from = 0;

    while let Some(found) = text[from..].find(&needle)
    {
        let after_name = from + found + needle.len();
        from = after_name;

        // `\title` must not match `\titlepage`
        if text[after_name..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
        {
            continue;
        }

        let open = skip_optional_argument(text, after_name);
        if text.as_bytes().get(open) != Some(&b'{')
        {
            continue;
        }

        let (inner, next) = extract_balanced(text, open + 1);
        out.push(inner);
        from = next;
    }

    out
}

static ENV_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(begin|end)\s*\{([A-Za-z]+\*?)\}").expect("valid environment token pattern")
});

/// Given the index of a `\begin{name}` token, return the index just past its
/// matching `\end{name}`, honoring nested environments of the same name.
/// Returns `None` when the environment is never closed.
pub fn environment_end(
    text: &str,
    begin_at: usize,
    name: &str,
) -> Option<usize>
{
    let mut depth = 0usize;

    for cap in ENV_TOKEN.captures_iter(&text[begin_at..])
    {
        if !cap[2].eq_ignore_ascii_case(name)
        {
            continue;
        }

        if &cap[1] == "begin"
        {
            depth += 1;
        }
        else
        {
            depth = depth.saturating_sub(1);
            if depth == 0
            {
                let whole = cap
                    .get(0)
                    .expect("group 0 always present");
                return Some(begin_at + whole.end());
            }
        }
    }

    None
}

#[cfg(test)]
mod tests
{
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn extracts_nested_title()
    {
        let text = r"\section{A \textbf{bold} title}rest";
        let start = text
            .find('{')
            .unwrap()
            + 1;
        let (title, next) = extract_balanced(text, start);

        assert_eq!(title, r"A \textbf{bold} title");
        assert_eq!(&text[next..], "rest");
    }

    #[test]
    fn escaped_braces_do_not_nest()
    {
        let text = r"{a \} b}tail";
        let (inner, next) = extract_balanced(text, 1);

        assert_eq!(inner, r"a \} b");
        assert_eq!(&text[next..], "tail");
    }

    #[test]
    fn unterminated_returns_remainder()
    {
        let text = "{never {closed}";
        let (inner, next) = extract_balanced(text, 1);

        assert_eq!(inner, "never {closed}");
        assert_eq!(next, text.len());
    }

    #[test]
    fn command_arguments_skip_options_and_prefixes()
    {
        let text = r"\titlepage \title[short]{Long {Nested} Title} \author{A} \author {B}";

        assert_eq!(command_arguments(text, "title"), vec!["Long {Nested} Title"]);
        assert_eq!(command_arguments(text, "author"), vec!["A", "B"]);
    }

    #[test]
    fn environment_end_honors_nesting()
    {
        let text = r"\begin{itemize}\item a \begin{itemize}\item b\end{itemize}\end{itemize} after";
        let end = environment_end(text, 0, "itemize").unwrap();

        assert_eq!(&text[end..], " after");
        assert!(environment_end(r"\begin{itemize} open", 0, "itemize").is_none());
    }

    proptest! {
        #[test]
        fn balanced_scan_never_panics(s in "[{}a-z\\\\ ]{0,40}") {
            let (inner, next) = extract_balanced(&s, 0);
            prop_assert!(next <= s.len());
            prop_assert!(inner.len() <= s.len());
        }

        #[test]
        fn wrapped_text_round_trips(s in "[a-z ]{0,30}") {
            let wrapped = format!("{{{s}}}tail");
            let (inner, next) = extract_balanced(&wrapped, 1);
            prop_assert_eq!(inner, s.as_str());
            prop_assert_eq!(&wrapped[next..], "tail");
        }
    }
}
