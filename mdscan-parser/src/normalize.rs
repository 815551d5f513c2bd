//! Text normalization
//!
//! Every line offset in the system is computed against the output of [`normalize`]. The
//! tokenizer must never see raw input: a stray `\r` shifts comrak's line numbers and every
//! section boundary after it.

use unicode_normalization::UnicodeNormalization;

const BOM: char = '\u{feff}';

/// Produce canonical text: leading BOM stripped, CRLF and lone CR folded to LF, NFC.
pub fn normalize(input: &str) -> String {
    let input = input.strip_prefix(BOM).unwrap_or(input);

    let mut unified = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            unified.push('\n');
        } else {
            unified.push(ch);
        }
    }

    unified.nfc().collect()
}

/// Number of lines in normalized text. A trailing newline does not open a new line.
pub fn line_count(normalized: &str) -> usize {
    normalized.lines().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;
    use rstest::rstest;

    #[rstest]
    #[case::crlf("a\r\nb\r\n", "a\nb\n")]
    #[case::lone_cr("a\rb\r", "a\nb\n")]
    #[case::mixed("a\r\r\nb\n", "a\n\nb\n")]
    #[case::bom("\u{feff}# Title\n", "# Title\n")]
    #[case::untouched("plain\n", "plain\n")]
    fn folds_line_endings_and_bom(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input), expected);
    }

    #[test]
    fn composes_to_nfc() {
        // "e" + combining acute accent
        let decomposed = "caf\u{0065}\u{0301}";
        assert_snapshot!(normalize(decomposed), @"café");
        assert_eq!(normalize(decomposed).chars().count(), 4);
    }

    #[test]
    fn only_a_leading_bom_is_stripped() {
        let text = normalize("a\u{feff}b");
        assert_eq!(text, "a\u{feff}b");
    }

    #[test]
    fn counts_lines_of_normalized_text() {
        assert_eq!(line_count(""), 0);
        assert_eq!(line_count("one"), 1);
        assert_eq!(line_count("one\n"), 1);
        assert_eq!(line_count(&normalize("one\r\ntwo\rthree")), 3);
    }
}
