//! Entity-name normalization into canonical comparison keys.
//!
//! Steps, in order: transliterate to ASCII, lower-case, `&` -> `and`, replace
//! every character that is not `[a-z0-9 ]` with a space, drop whole-word
//! legal suffixes, collapse whitespace. The output contains only lowercase
//! letters, digits and single spaces, and `normalize` is idempotent.

use crate::model::Value;

#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Suffix phrases as token sequences, longest first.
    suffixes: Vec<Vec<String>>,
}

impl Normalizer {
    pub fn new<S: AsRef<str>>(suffixes: &[S]) -> Self {
        let mut phrases: Vec<Vec<String>> = suffixes
            .iter()
            .map(|s| tokens(&clean(s.as_ref())))
            .filter(|t| !t.is_empty())
            .collect();
        phrases.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        phrases.dedup();
        Self { suffixes: phrases }
    }

    pub fn normalize(&self, raw: &str) -> String {
        let mut toks = tokens(&clean(raw));
        // Removing one phrase can splice a new one together ("sp ltd z o o"),
        // so repeat until nothing changes.
        while self.strip_suffixes(&mut toks) {}
        toks.join(" ")
    }

    /// Null and blank values normalize to the empty key.
    pub fn normalize_value(&self, value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            other => self.normalize(&other.as_text()),
        }
    }

    fn strip_suffixes(&self, toks: &mut Vec<String>) -> bool {
        let mut changed = false;
        let mut i = 0;
        while i < toks.len() {
            let hit = self
                .suffixes
                .iter()
                .find(|phrase| toks[i..].starts_with(phrase.as_slice()));
            match hit {
                Some(phrase) => {
                    toks.drain(i..i + phrase.len());
                    changed = true;
                }
                None => i += 1,
            }
        }
        changed
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SUFFIXES)
    }
}

/// Steps 1-4: transliterate, lower-case, expand `&`, blank out the rest.
fn clean(raw: &str) -> String {
    let ascii = deunicode::deunicode(raw).to_ascii_lowercase();
    ascii
        .replace('&', " and ")
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { ' ' })
        .collect()
}

fn tokens(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}
