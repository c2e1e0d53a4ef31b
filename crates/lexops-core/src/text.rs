//! Text helpers shared by the stages: sentence splitting, Malay/English
//! language detection, numbered-paragraph parsing, and pulling JSON out of
//! generated text.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use lingua::{Language, LanguageDetector, LanguageDetectorBuilder};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Compile a regex once per call site. Evaluates to `Option<&'static Regex>`.
macro_rules! cached_regex {
    ($pattern:expr) => {{
        static RE: std::sync::OnceLock<Option<regex::Regex>> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($pattern).ok()).as_ref()
    }};
}
pub(crate) use cached_regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Ms,
    En,
    Mixed,
    #[default]
    Unknown,
}

impl Lang {
    pub fn code(&self) -> &'static str {
        match self {
            Lang::Ms => "ms",
            Lang::En => "en",
            Lang::Mixed => "mixed",
            Lang::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Below this the detector is torn between the two languages.
const MIXED_BELOW: f64 = 0.6;

fn detector() -> &'static LanguageDetector {
    static DETECTOR: OnceLock<LanguageDetector> = OnceLock::new();
    DETECTOR.get_or_init(|| {
        LanguageDetectorBuilder::from_languages(&[Language::English, Language::Malay]).build()
    })
}

/// Classify `text` as Malay or English. Returns the language and the
/// detector's confidence in `[0, 1]`; text without letters is `Unknown`.
pub fn detect_language(text: &str) -> (Lang, f64) {
    if !text.chars().any(char::is_alphabetic) {
        return (Lang::Unknown, 0.5);
    }
    let values = detector().compute_language_confidence_values(text);
    let Some(&(language, confidence)) = values.first() else {
        return (Lang::Unknown, 0.5);
    };
    if confidence <= 0.0 {
        return (Lang::Unknown, 0.5);
    }
    if confidence < MIXED_BELOW {
        return (Lang::Mixed, confidence);
    }
    let lang = match language {
        Language::Malay => Lang::Ms,
        _ => Lang::En,
    };
    (lang, confidence.min(1.0))
}

/// Split on newlines and full stops; fragments shorter than three
/// characters are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .flat_map(|line| line.split('.'))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| format!("{}.", part))
        .filter(|s| s.chars().count() >= 3)
        .collect()
}

/// A numbered paragraph (`"3. The DEFENDANT ..."`) with its continuation lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedParagraph {
    pub number: String,
    pub text: String,
}

/// Parse `N. text` paragraphs. Following lines belong to the paragraph
/// until a blank line or the next numbered line.
pub fn numbered_paragraphs(text: &str) -> Vec<NumberedParagraph> {
    let mut out: Vec<NumberedParagraph> = Vec::new();
    let mut open = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            open = false;
            continue;
        }
        if let Some((number, rest)) = paragraph_start(trimmed) {
            out.push(NumberedParagraph {
                number: number.to_string(),
                text: rest.trim().to_string(),
            });
            open = true;
        } else if open {
            if let Some(last) = out.last_mut() {
                last.text.push(' ');
                last.text.push_str(trimmed);
            }
        }
    }
    out
}

fn paragraph_start(line: &str) -> Option<(&str, &str)> {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    let body = rest.strip_prefix('.')?;
    if !body.starts_with(char::is_whitespace) || body.trim().is_empty() {
        return None;
    }
    Some((&line[..digits], body))
}

/// Distinct numbers in `text`, thousands separators removed.
pub fn numbers(text: &str) -> BTreeSet<String> {
    let Some(re) = cached_regex!(r"\b\d+(?:[.,]\d+)*\b") else {
        return BTreeSet::new();
    };
    re.find_iter(text).map(|m| m.as_str().replace(',', "")).collect()
}

/// Count whole-word, case-sensitive occurrences of `term`.
pub fn count_term(text: &str, term: &str) -> usize {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| *w == term)
        .count()
}

/// Replace every case-insensitive whole-word occurrence of `word` with `upper`.
pub fn uppercase_term(text: &str, word: &str, upper: &str) -> String {
    let pattern = format!(r"(?i)\b{}\b", regex::escape(word));
    match regex::Regex::new(&pattern) {
        Ok(re) => re.replace_all(text, upper).into_owned(),
        Err(_) => text.to_string(),
    }
}

/// First `{...}` span in generated text parsed as JSON.
pub fn extract_json_object(text: &str) -> Option<Value> {
    extract_between(text, '{', '}').filter(Value::is_object)
}

/// First `[...]` span in generated text parsed as JSON.
pub fn extract_json_array(text: &str) -> Option<Value> {
    extract_between(text, '[', ']').filter(Value::is_array)
}

fn extract_between(text: &str, open: char, close: char) -> Option<Value> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return serde_json::from_str(text.trim()).ok();
    }
    serde_json::from_str(&text[start..=end])
        .ok()
        .or_else(|| serde_json::from_str(text.trim()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_malay_and_english() {
        let (lang, conf) = detect_language(
            "Plaintif telah membuat perjanjian dengan defendan bahawa bayaran akan dibuat sebelum tarikh itu.",
        );
        assert_eq!(lang, Lang::Ms);
        assert!(conf >= 0.6 && conf <= 1.0, "{conf}");

        let (lang, conf) = detect_language(
            "The plaintiff entered into a written agreement with the defendant for the supply of goods.",
        );
        assert_eq!(lang, Lang::En);
        assert!(conf >= 0.6 && conf <= 1.0, "{conf}");

        assert_eq!(detect_language("12345 / 678.").0, Lang::Unknown);
    }

    #[test]
    fn test_split_sentences() {
        let s = split_sentences("First point. Second point.\n\nThird\nab");
        assert_eq!(s, vec!["First point.", "Second point.", "Third.", "ab."]);
        assert!(split_sentences(". .\n").is_empty());
    }

    #[test]
    fn test_numbered_paragraphs_with_continuations() {
        let text = "HEADER\n1. The PLAINTIFF is a company.\ncontinued here\n2. The DEFENDANT owes RM 5,000.\n\nMAKA\n3.5 is not a paragraph";
        let paras = numbered_paragraphs(text);
        assert_eq!(paras.len(), 2);
        assert_eq!(paras[0].number, "1");
        assert_eq!(paras[0].text, "The PLAINTIFF is a company. continued here");
        assert_eq!(paras[1].text, "The DEFENDANT owes RM 5,000.");
    }

    #[test]
    fn test_numbers_normalise_separators() {
        let n = numbers("RM 50,000.00 on 12/3/2024");
        assert!(n.contains("50000.00"));
        assert!(n.contains("2024"));
    }

    #[test]
    fn test_terms() {
        assert_eq!(uppercase_term("the plaintif and Plaintif", "plaintif", "PLAINTIF"), "the PLAINTIF and PLAINTIF");
        assert_eq!(count_term("PLAINTIFF, PLAINTIFFS and PLAINTIFF.", "PLAINTIFF"), 2);
    }

    #[test]
    fn test_extract_json_from_chatter() {
        let v = extract_json_object("Sure! Here you go:\n```json\n{\"title\": \"A v B\"}\n```").unwrap();
        assert_eq!(v["title"], "A v B");
        let a = extract_json_array("result: [{\"q\": 1}] done").unwrap();
        assert_eq!(a.as_array().unwrap().len(), 1);
        assert!(extract_json_object("no json here").is_none());
    }
}
