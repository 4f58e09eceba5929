use serde::Serialize;

use crate::db::models::WordDraft;

const MAX_FIELDS: usize = 7;
const FIELD_DELIMITERS: [&str; 3] = ["\t", "｜", "|"];
const FALLBACK_SEPARATORS: [char; 5] = ['-', '–', '—', ':', '：'];
const EXAMPLE_SEPARATORS: [char; 4] = ['\n', '；', ';', '、'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
pub struct ParsedWordList {
    pub drafts: Vec<WordDraft>,
    pub skipped: usize,
}

/// Parses a plain-text word list, one word per non-blank line.
pub fn parse_word_list(content: &str) -> ParsedWordList {
    let mut parsed = ParsedWordList::default();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(draft) => parsed.drafts.push(draft),
            None => parsed.skipped += 1,
        }
    }
    parsed
}

fn parse_line(line: &str) -> Option<WordDraft> {
    let mut fields = split_fields(line);
    // Numbered lists carry the row number as a leading column.
    if fields.len() >= 2 && is_row_number(fields[0]) {
        fields.remove(0);
    }

    let field = |idx: usize| fields.get(idx).copied().unwrap_or("").to_string();
    let term = field(0);
    if term.is_empty() {
        return None;
    }

    let mut draft = WordDraft::new(term, field(1));
    if fields.len() <= 3 {
        draft.example = Some(field(2));
    } else {
        let examples = field(3);
        draft.example = examples
            .split(EXAMPLE_SEPARATORS)
            .next()
            .map(|first| first.trim().to_string());
        draft.meanings = Some(field(2));
        draft.examples = Some(examples);
        draft.word_root = Some(field(4));
        draft.similar_words = Some(field(5));
        draft.exam_tag = Some(field(6));
    }
    Some(draft.normalized())
}

fn split_fields(line: &str) -> Vec<&str> {
    let pieces: Vec<&str> = match FIELD_DELIMITERS.iter().find(|d| line.contains(**d)) {
        Some(delimiter) => line.splitn(MAX_FIELDS, *delimiter).collect(),
        None => line.splitn(MAX_FIELDS, FALLBACK_SEPARATORS).collect(),
    };
    pieces.into_iter().map(str::trim).collect()
}

fn is_row_number(field: &str) -> bool {
    !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tab_separated_line_with_example() {
        let parsed = parse_word_list("apple\t苹果\tAn apple a day.");
        assert_eq!(parsed.skipped, 0);
        let draft = &parsed.drafts[0];
        assert_eq!(draft.term, "apple");
        assert_eq!(draft.definition, "苹果");
        assert_eq!(draft.example.as_deref(), Some("An apple a day."));
        assert_eq!(draft.meanings, None);
    }

    #[test]
    fn test_fullwidth_bar_and_row_number() {
        let parsed = parse_word_list("12｜song｜歌曲");
        let draft = &parsed.drafts[0];
        assert_eq!(draft.term, "song");
        assert_eq!(draft.definition, "歌曲");
        assert_eq!(draft.example, None);
    }

    #[test]
    fn test_dash_and_colon_fallback() {
        let parsed = parse_word_list("run - 跑\nwalk：走");
        assert_eq!(parsed.drafts.len(), 2);
        assert_eq!(parsed.drafts[0].term, "run");
        assert_eq!(parsed.drafts[0].definition, "跑");
        assert_eq!(parsed.drafts[1].term, "walk");
        assert_eq!(parsed.drafts[1].definition, "走");
    }

    #[test]
    fn test_rich_line_fills_extended_fields() {
        let line = "song\tn. 歌曲\t多义\tsing a song；a love song\tsong-\tsing\tCET4";
        let parsed = parse_word_list(line);
        let draft = &parsed.drafts[0];
        assert_eq!(draft.term, "song");
        assert_eq!(draft.definition, "n. 歌曲");
        assert_eq!(draft.meanings.as_deref(), Some("多义"));
        assert_eq!(draft.examples.as_deref(), Some("sing a song；a love song"));
        assert_eq!(draft.example.as_deref(), Some("sing a song"));
        assert_eq!(draft.word_root.as_deref(), Some("song-"));
        assert_eq!(draft.similar_words.as_deref(), Some("sing"));
        assert_eq!(draft.exam_tag.as_deref(), Some("CET4"));
    }

    #[test]
    fn test_field_limit_applies_before_row_number_is_dropped() {
        let parsed = parse_word_list("1\ta\tb\tc\td\te\tf\tg");
        let draft = &parsed.drafts[0];
        assert_eq!(draft.term, "a");
        assert_eq!(draft.exam_tag, None);
        assert_eq!(draft.similar_words.as_deref(), Some("f\tg"));
    }

    #[test]
    fn test_blank_lines_ignored_and_empty_terms_skipped() {
        let parsed = parse_word_list("\n  \n|释义\nword|词\n");
        assert_eq!(parsed.drafts.len(), 1);
        assert_eq!(parsed.skipped, 1);
    }

    #[test]
    fn test_term_only_line_is_kept() {
        let parsed = parse_word_list("serendipity");
        assert_eq!(parsed.drafts[0].term, "serendipity");
        assert_eq!(parsed.drafts[0].definition, "");
    }
}
