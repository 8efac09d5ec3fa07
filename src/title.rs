//! Title normalization: split a mixed-script catalog title into a machine
//! search keyword and a human display name.
//!
//! Pure functions, no I/O. Catalog titles look like
//! `文明6 | 豪华版 | Sid Meier's Civilization VI` — native-script segments
//! up front, a latin-script core somewhere near the end, all separated by
//! `|`. The keyword drives the shared-session re-search, so it gets
//! aggressive cleanup; the display name stays human.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::NormalizedTitle;

static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]").unwrap());
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const ROMAN: &[(&str, &str)] = &[
    ("I", "1"),
    ("II", "2"),
    ("III", "3"),
    ("IV", "4"),
    ("V", "5"),
    ("VI", "6"),
    ("VII", "7"),
    ("VIII", "8"),
    ("IX", "9"),
    ("X", "10"),
    ("XI", "11"),
    ("XII", "12"),
    ("XIII", "13"),
    ("XIV", "14"),
    ("XV", "15"),
    ("XVI", "16"),
    ("XVII", "17"),
    ("XVIII", "18"),
    ("XIX", "19"),
    ("XX", "20"),
];

const NUMBER_WORDS: &[(&str, &str)] = &[
    ("one", "1"),
    ("two", "2"),
    ("three", "3"),
    ("four", "4"),
    ("five", "5"),
    ("six", "6"),
    ("seven", "7"),
    ("eight", "8"),
    ("nine", "9"),
    ("ten", "10"),
    ("eleven", "11"),
    ("twelve", "12"),
    ("thirteen", "13"),
    ("fourteen", "14"),
    ("fifteen", "15"),
    ("sixteen", "16"),
    ("seventeen", "17"),
    ("eighteen", "18"),
    ("nineteen", "19"),
    ("twenty", "20"),
];

fn latin_count(segment: &str) -> usize {
    segment.chars().filter(|c| c.is_ascii_alphabetic()).count()
}

fn cjk_count(segment: &str) -> usize {
    segment
        .chars()
        .filter(|c| ('\u{4e00}'..='\u{9fff}').contains(c))
        .count()
}

fn latin_dominant(segment: &str) -> bool {
    latin_count(segment) > cjk_count(segment)
}

/// Convert Roman numerals I–XX and English number words one–twenty to
/// digits. Only whole whitespace-delimited tokens convert: `X-Men` stays
/// `X-Men`, `Civilization X` becomes `Civilization 10`. Case-insensitive.
pub fn convert_numerals(text: &str) -> String {
    text.split(' ')
        .map(|token| {
            let upper = token.to_ascii_uppercase();
            if let Some((_, digits)) = ROMAN.iter().find(|(roman, _)| *roman == upper) {
                return (*digits).to_string();
            }
            let lower = token.to_ascii_lowercase();
            if let Some((_, digits)) = NUMBER_WORDS.iter().find(|(name, _)| *name == lower) {
                return (*digits).to_string();
            }
            token.to_string()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fold text for fuzzy containment checks: ASCII punctuation to spaces,
/// lowercase, whitespace collapsed. Both sides of a match go through this.
pub fn fold_for_match(text: &str) -> String {
    let replaced: String = text
        .chars()
        .map(|c| if c.is_ascii_punctuation() { ' ' } else { c })
        .collect();
    replaced
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a raw catalog title into search keyword and display name.
pub fn normalize(raw_title: &str) -> NormalizedTitle {
    let segments: Vec<&str> = raw_title.split('|').map(str::trim).collect();

    // Keyword segment: scanning from the end, the first segment with more
    // latin letters than native-script characters. Last segment if none.
    let keyword_segment = segments
        .iter()
        .rev()
        .find(|segment| latin_dominant(segment))
        .copied()
        .unwrap_or_else(|| segments.last().copied().unwrap_or(raw_title));

    // Display segments: everything before the first latin-dominant segment.
    let display_segments: Vec<&str> = segments
        .iter()
        .take_while(|segment| !latin_dominant(segment))
        .copied()
        .collect();
    let display_name = if display_segments.is_empty() {
        segments.first().copied().unwrap_or(raw_title).to_string()
    } else {
        display_segments.join(" | ")
    };

    let mut keyword = PARENTHETICAL.replace_all(keyword_segment, "").into_owned();
    keyword = keyword.split('/').next().unwrap_or("").to_string();
    keyword = NON_WORD.replace_all(&keyword, " ").into_owned();
    keyword = WHITESPACE.replace_all(keyword.trim(), " ").into_owned();
    keyword = keyword
        .split(' ')
        .filter(|word| !word.is_empty())
        .take(4)
        .collect::<Vec<_>>()
        .join(" ");
    keyword = convert_numerals(&keyword);

    NormalizedTitle {
        keyword: keyword.trim().to_string(),
        display_name: display_name.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_keyword_and_display_name() {
        let n = normalize("文明6 | 豪华版 | Sid Meiers Civilization VI");
        assert_eq!(n.keyword, "Sid Meiers Civilization 6");
        assert_eq!(n.display_name, "文明6 | 豪华版");
    }

    #[test]
    fn all_latin_title_uses_first_segment_for_display() {
        let n = normalize("Stardew Valley");
        assert_eq!(n.keyword, "Stardew Valley");
        assert_eq!(n.display_name, "Stardew Valley");
    }

    #[test]
    fn no_latin_segment_falls_back_to_last() {
        let n = normalize("饥荒联机版 | 全中文");
        // No latin-dominant segment: keyword comes from the last segment.
        assert_eq!(n.keyword, "全中文");
        assert_eq!(n.display_name, "饥荒联机版 | 全中文");
    }

    #[test]
    fn keyword_strips_annotations_and_caps_words() {
        let n = normalize("泰拉瑞亚 | Terraria (v1.4.4.9) [All DLC] / Terraria Redux");
        assert_eq!(n.keyword, "Terraria");

        let n = normalize("某游戏 | Alpha Beta Gamma Delta Epsilon");
        assert_eq!(n.keyword, "Alpha Beta Gamma Delta");
    }

    #[test]
    fn roman_numerals_convert_whole_word_only() {
        assert_eq!(convert_numerals("Civilization X"), "Civilization 10");
        assert_eq!(convert_numerals("X-Men"), "X-Men");
        assert_eq!(convert_numerals("Grand Theft Auto v"), "Grand Theft Auto 5");
        assert_eq!(convert_numerals("Final Fantasy XVI"), "Final Fantasy 16");
        // Hyphenated tokens are single words, never converted in part.
        assert_eq!(convert_numerals("Mega-X Drive II"), "Mega-X Drive 2");
        assert_eq!(convert_numerals("one-two punch"), "one-two punch");
    }

    #[test]
    fn number_words_convert_whole_word_only() {
        assert_eq!(convert_numerals("Left four Dead two"), "Left 4 Dead 2");
        assert_eq!(convert_numerals("Someone"), "Someone");
        assert_eq!(convert_numerals("twenty"), "20");
    }

    #[test]
    fn normalize_is_pure_and_idempotent_on_keyword() {
        let raw = "哈迪斯II | Hades II (Early Access)";
        let first = normalize(raw);
        let second = normalize(raw);
        assert_eq!(first, second);

        let renormalized = normalize(&first.keyword);
        assert_eq!(renormalized.keyword, first.keyword);
    }

    #[test]
    fn fold_for_match_ignores_punctuation_and_case() {
        assert_eq!(fold_for_match("Sid Meier's Civilization VI"), "sid meier s civilization vi");
        assert!(fold_for_match("Grand Theft Auto V: Premium").contains(&fold_for_match("grand theft auto v")));
    }

    #[test]
    fn empty_input_yields_empty_parts() {
        let n = normalize("");
        assert_eq!(n.keyword, "");
        assert_eq!(n.display_name, "");
    }
}
