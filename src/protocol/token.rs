//! Token extraction: one line of sensor text → validated 16-bit words.
//!
//! The sensor prints every word as `0x` followed by four hex digits, separated
//! by commas and/or whitespace. Anything else on the line (partial words,
//! banners, corrupted bytes) is dropped without comment.

use std::sync::OnceLock;

use regex::Regex;

use super::assembler::TokenBuffer;

fn separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"[,\s]+").expect("separator pattern compiles"))
}

fn word_pattern() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"^0[xX][0-9A-Fa-f]{4}$").expect("word pattern compiles"))
}

/// Parse a single substring, `None` unless it is exactly `0x` + four hex digits.
pub fn parse_token(s: &str) -> Option<u16> {
    if !word_pattern().is_match(s) {
        return None;
    }
    u16::from_str_radix(&s[2..], 16).ok()
}

/// Valid words of `line`, left to right.
pub fn tokens(line: &str) -> impl Iterator<Item = u16> + '_ {
    separator().split(line).filter_map(parse_token)
}

/// Append the valid words of `line` to `buffer`.
///
/// Returns how many were appended; rejected substrings are not counted.
pub fn extract_into(line: &str, buffer: &mut TokenBuffer) -> usize {
    let before = buffer.len();
    buffer.extend(tokens(line));
    buffer.len() - before
}

/// Render words the way the sensor prints them, `per_line` words per line.
pub fn encode_lines(words: &[u16], per_line: usize) -> Vec<String> {
    words
        .chunks(per_line.max(1))
        .map(|chunk| {
            chunk
                .iter()
                .map(|w| format!("0x{w:04X}"))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_both_prefix_cases_and_mixed_digits() {
        assert_eq!(parse_token("0x0000"), Some(0));
        assert_eq!(parse_token("0XFFFF"), Some(65535));
        assert_eq!(parse_token("0xaBcD"), Some(0xABCD));
        assert_eq!(parse_token("0x1a2B"), Some(0x1A2B));
    }

    #[test]
    fn rejects_malformed_words() {
        for bad in ["0xZZZZ", "123", "0x12", "0x12345", "", "0x", "x1234", "00x1234", "0x12 4", "+0x1234"] {
            assert_eq!(parse_token(bad), None, "{bad:?} should be rejected");
        }
    }

    #[test]
    fn splits_on_commas_and_whitespace_runs() {
        let words: Vec<u16> = tokens("0x0001,0x0002 ,\t 0x0003\r\n").collect();
        assert_eq!(words, vec![1, 2, 3]);
    }

    #[test]
    fn drops_noise_around_valid_words() {
        let words: Vec<u16> = tokens("frame: 0x0010, 0xZZ01, 0x0020; 0x0030 0x00").collect();
        // "0x0020;" is not a clean word, so only the first and fourth survive.
        assert_eq!(words, vec![0x10, 0x30]);
    }

    #[test]
    fn extract_into_reports_appended_count() {
        let mut buffer = TokenBuffer::default();
        assert_eq!(extract_into("", &mut buffer), 0);
        assert_eq!(extract_into("junk", &mut buffer), 0);
        assert_eq!(extract_into("0x0001, 0x0002, bad", &mut buffer), 2);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn encode_lines_matches_sensor_format() {
        let lines = encode_lines(&[1, 0xABCD, 65535], 2);
        assert_eq!(lines, vec!["0x0001, 0xABCD".to_string(), "0xFFFF".to_string()]);
    }

    proptest! {
        #[test]
        fn every_valid_word_parses_to_its_value(
            v in any::<u16>(),
            upper_prefix in any::<bool>(),
            lower_digits in any::<bool>(),
        ) {
            let digits = if lower_digits { format!("{v:04x}") } else { format!("{v:04X}") };
            let prefix = if upper_prefix { "0X" } else { "0x" };
            prop_assert_eq!(parse_token(&format!("{prefix}{digits}")), Some(v));
        }

        #[test]
        fn wrong_width_is_always_rejected(v in any::<u32>(), width in 0usize..9) {
            prop_assume!(width != 4);
            let digits = format!("{v:08x}");
            let s = format!("0x{}", &digits[8 - width..]);
            prop_assert_eq!(parse_token(&s), None);
        }

        #[test]
        fn splitting_a_line_does_not_change_the_buffer(
            words in proptest::collection::vec(any::<u16>(), 0..64),
            per_line in 1usize..20,
        ) {
            let single = encode_lines(&words, words.len().max(1)).join(", ");
            let mut whole = TokenBuffer::default();
            extract_into(&single, &mut whole);

            let mut pieces = TokenBuffer::default();
            for line in encode_lines(&words, per_line) {
                extract_into(&line, &mut pieces);
            }

            prop_assert_eq!(whole.to_vec(), words.clone());
            prop_assert_eq!(pieces.to_vec(), words);
        }
    }
}
