//! Best-effort sentence splitting for academic prose.
//!
//! A boundary is a `.`, `?` or `!` followed by whitespace and then an
//! uppercase letter or `(`. Periods that close a known abbreviation
//! ("et al.", "Fig."), a dotted token ("e.g.", "U.S."), a Title-case pair
//! ("Mr.") or a lone capital initial ("U. S.", "J. Smith") never split.

use std::collections::HashSet;

/// Abbreviations common in papers, lowercase and without the final period.
const ACADEMIC_ABBREVIATIONS: &[&str] = &[
    "fig", "figs", "eq", "eqs", "tab", "sec", "ref", "refs", "vol", "no", "ch", "dr", "prof",
    "ph.d", "et al", "i.e", "e.g", "vs", "cf", "etc", "approx", "ca", "viz", "resp", "mr", "mrs",
    "ms",
];

#[derive(Debug, Clone)]
pub struct SentenceSplitter
{
    abbreviations: HashSet<String>,
}

impl Default for SentenceSplitter
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl SentenceSplitter
{
    pub fn new() -> Self
    {
        Self {
            abbreviations: ACADEMIC_ABBREVIATIONS
                .iter()
                .map(|a| a.to_string())
                .collect(),
        }
    }

    pub fn with_custom_abbreviations<S: AsRef<str>>(
        mut self,
        abbreviations: &[S],
    ) -> Self
    {
        for abbrev in abbreviations
        {
            self.abbreviations
                .insert(
                    abbrev
                        .as_ref()
                        .trim_end_matches('.')
                        .to_lowercase(),
                );
        }
        self
    }

    /// Collapse whitespace, then split on sentence boundaries.
    /// Returned sentences are trimmed and never empty.
    pub fn split(
        &self,
        text: &str,
    ) -> Vec<String>
    {
        let text = text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        let chars: Vec<(usize, char)> = text
            .char_indices()
            .collect();
        let mut sentences = Vec::new();
        let mut start = 0usize;

        for (i, &(pos, c)) in chars
            .iter()
            .enumerate()
        {
            if !matches!(c, '.' | '?' | '!')
            {
                continue;
            }

            // Whitespace is collapsed, so a boundary is exactly "<punct> <Upper|(>"
            let next_is_space = chars
                .get(i + 1)
                .is_some_and(|&(_, n)| n == ' ');
            let opens_sentence = chars
                .get(i + 2)
                .is_some_and(|&(_, n)| n.is_uppercase() || n == '(');
            if !next_is_space || !opens_sentence
            {
                continue;
            }

            if c == '.' && self.suppressed(&text[start..pos])
            {
                continue;
            }

            let end = pos + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty()
            {
                sentences.push(sentence.to_string());
            }
            start = end;
        }

        let tail = text[start..].trim();
        if !tail.is_empty()
        {
            sentences.push(tail.to_string());
        }

        sentences
    }

    /// Whether a period ending `before` closes an abbreviation or initial.
    fn suppressed(
        &self,
        before: &str,
    ) -> bool
    {
        let token = before
            .rsplit(' ')
            .next()
            .unwrap_or("")
            .trim_start_matches(|c: char| !c.is_alphanumeric());

        if token.is_empty()
        {
            return false;
        }

        // "U.S", "e.g", "Ph.D"
        if token.contains('.')
        {
            return true;
        }

        let mut letters = token.chars();
        let first = letters
            .next()
            .unwrap_or(' ');
        let rest: Vec<char> = letters.collect();

        // Capital initial: "J. Smith", "U. S."
        if rest.is_empty() && first.is_uppercase()
        {
            return true;
        }

        // Title-case pair: "Mr.", "Dr.", "St."
        if rest.len() == 1 && first.is_uppercase() && rest[0].is_lowercase()
        {
            return true;
        }

        let lower = before.to_lowercase();
        self.abbreviations
            .iter()
            .any(|abbr| ends_with_word(&lower, abbr))
    }
}

/// `haystack` ends with `word`, and `word` starts at a word boundary.
fn ends_with_word(
    haystack: &str,
    word: &str,
) -> bool
{
    haystack
        .strip_suffix(word)
        .is_some_and(|head| {
            head.chars()
                .next_back()
                .is_none_or(|c| !c.is_alphanumeric())
        })
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn split(text: &str) -> Vec<String>
    {
        SentenceSplitter::new().split(text)
    }

    #[test]
    fn splits_on_terminal_punctuation()
    {
        assert_eq!(
            split("First one.  Second one?\nThird!   (Fourth) here."),
            vec!["First one.", "Second one?", "Third!", "(Fourth) here."]
        );
    }

    #[test]
    fn lowercase_continuation_does_not_split()
    {
        assert_eq!(split("Value is 3. and more. Next"), vec!["Value is 3. and more.", "Next"]);
    }

    #[test]
    fn academic_abbreviations_do_not_split()
    {
        assert_eq!(
            split("As Smith et al. Showed in Fig. 3 and Eq. 2, results hold. Then we stop."),
            vec!["As Smith et al. Showed in Fig. 3 and Eq. 2, results hold.", "Then we stop."]
        );
    }

    #[test]
    fn dotted_tokens_and_initials_do_not_split()
    {
        assert_eq!(
            split("Data from the U. S. Census and e.g. Canada. Work by J. Smith was cited. Done."),
            vec![
                "Data from the U. S. Census and e.g. Canada.",
                "Work by J. Smith was cited.",
                "Done."
            ]
        );
    }

    #[test]
    fn lowercase_single_letter_still_splits()
    {
        assert_eq!(split("Let the size be n. Then it grows."), vec![
            "Let the size be n.",
            "Then it grows."
        ]);
    }

    #[test]
    fn custom_abbreviations_extend_the_table()
    {
        let splitter = SentenceSplitter::new().with_custom_abbreviations(&["Thm."]);
        assert_eq!(splitter.split("See Thm. Four for details."), vec!["See Thm. Four for details."]);
    }

    #[test]
    fn empty_and_whitespace_yield_nothing()
    {
        assert!(split("").is_empty());
        assert!(split("   \n\t ").is_empty());
    }
}
