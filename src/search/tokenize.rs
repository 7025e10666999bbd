// search/tokenize.rs
// Text normalization and stemming shared by indexing and querying

use rust_stemmers::{Algorithm, Stemmer};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

static STEMMER: LazyLock<Stemmer> = LazyLock::new(|| Stemmer::create(Algorithm::English));

/// Split text into normalized, stemmed tokens, in order of appearance.
///
/// Pipeline: case fold, NFKD, drop combining marks, split on anything that
/// is not alphanumeric, stem. "Café au lait" yields `cafe`, `au`, `lait`.
pub fn tokenize(text: &str) -> Vec<String> {
    let folded: String = caseless::default_case_fold_str(text)
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| STEMMER.stem(word).into_owned())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Term frequencies for every distinct token in `text`
pub fn term_frequencies(text: &str) -> BTreeMap<String, u32> {
    let mut tf = BTreeMap::new();
    for token in tokenize(text) {
        *tf.entry(token).or_insert(0) += 1;
    }
    tf
}

/// Distinct query tokens, first occurrence order preserved
pub fn query_tokens(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
