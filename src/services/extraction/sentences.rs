//! 句子切分
//!
//! `.` / `!` / `?` 后跟空白、再跟大写字母或数字时断句；换行总是断句。
//! 常见缩写（Fig.、et al.、e.g. 等）后不断句。

use std::collections::HashSet;

/// 不作为句末的缩写（小写，含句点）
const ABBREVIATIONS: &[&str] = &[
    "fig.", "figs.", "al.", "e.g.", "i.e.", "eq.", "eqs.", "ref.", "refs.", "approx.", "vs.", "no.",
    "nos.", "ca.", "cf.", "resp.", "ver.", "vol.",
];

/// 一个句子及其在原文中的字节偏移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentence<'a> {
    pub text: &'a str,
    pub offset: usize,
}

fn ends_with_abbreviation(prefix: &str) -> bool {
    let token = prefix
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or(prefix)
        .trim_start_matches(['(', '[', '"'])
        .to_lowercase();
    ABBREVIATIONS.contains(&token.as_str())
}

fn push_trimmed<'a>(text: &'a str, from: usize, to: usize, out: &mut Vec<Sentence<'a>>) {
    let raw = &text[from..to];
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    let leading = raw.len() - raw.trim_start().len();
    out.push(Sentence {
        text: trimmed,
        offset: from + leading,
    });
}

/// 切分句子，空句丢弃
pub fn split_sentences(text: &str) -> Vec<Sentence<'_>> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0;

    for (i, &(pos, c)) in chars.iter().enumerate() {
        if c == '\n' {
            push_trimmed(text, start, pos, &mut sentences);
            start = pos + c.len_utf8();
            continue;
        }
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }

        let mut j = i + 1;
        if j >= chars.len() || !chars[j].1.is_whitespace() || chars[j].1 == '\n' {
            continue;
        }
        while j < chars.len() && chars[j].1.is_whitespace() && chars[j].1 != '\n' {
            j += 1;
        }
        let Some(&(_, next)) = chars.get(j) else {
            continue;
        };
        if !(next.is_uppercase() || next.is_ascii_digit()) {
            continue;
        }
        let end = pos + c.len_utf8();
        if c == '.' && ends_with_abbreviation(&text[start..end]) {
            continue;
        }
        push_trimmed(text, start, end, &mut sentences);
        start = end;
    }
    push_trimmed(text, start, text.len(), &mut sentences);

    sentences
}

/// 切分并跳过去除首尾空白后重复的句子
pub fn unique_sentences(text: &str) -> Vec<Sentence<'_>> {
    let mut seen = HashSet::new();
    split_sentences(text)
        .into_iter()
        .filter(|s| seen.insert(s.text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(text: &str) -> Vec<&str> {
        split_sentences(text).into_iter().map(|s| s.text).collect()
    }

    #[test]
    fn splits_on_terminal_punctuation() {
        assert_eq!(
            texts("We used GROMACS. The system was neutral! Was it stable? 3 replicas were run."),
            vec![
                "We used GROMACS.",
                "The system was neutral!",
                "Was it stable?",
                "3 replicas were run."
            ]
        );
    }

    #[test]
    fn abbreviations_do_not_split() {
        assert_eq!(
            texts("As shown in Fig. 3K the RMSD converged. Smith et al. Reported it."),
            vec!["As shown in Fig. 3K the RMSD converged.", "Smith et al. Reported it."]
        );
    }

    #[test]
    fn newlines_always_split_and_decimals_do_not() {
        assert_eq!(
            texts("Methods\nSimulations ran at 310.15 K. pH was 7.4\n\n"),
            vec!["Methods", "Simulations ran at 310.15 K. pH was 7.4"]
        );
    }

    #[test]
    fn offsets_point_into_source() {
        let text = "  First one. Second one.";
        for sentence in split_sentences(text) {
            assert_eq!(&text[sentence.offset..sentence.offset + sentence.text.len()], sentence.text);
        }
    }

    #[test]
    fn duplicates_are_skipped() {
        let unique = unique_sentences("Same sentence.\n  Same sentence.  \nOther.");
        assert_eq!(unique.len(), 2);
    }
}
