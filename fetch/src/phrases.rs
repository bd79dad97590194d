//! Phrase comparison and frequency scoring used to find like alerts.

use indexmap::{IndexMap, IndexSet};

/// Case-insensitive equality of two phrases.
pub fn equal_fold(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Whether the shorter phrase appears as a contiguous run of words in the
/// longer one. Phrases with the same number of words never partially match.
pub fn partial_match(a: &str, b: &str) -> bool {
    let a_len = a.split_whitespace().count();
    let b_len = b.split_whitespace().count();

    match a_len.cmp(&b_len) {
        std::cmp::Ordering::Equal => false,
        std::cmp::Ordering::Greater => phrases_match(b, a),
        std::cmp::Ordering::Less => phrases_match(a, b),
    }
}

/// Checks if `partial` is any of the word windows of `whole`. A trailing
/// possessive `'s` on a window is ignored.
pub fn phrases_match(partial: &str, whole: &str) -> bool {
    let words: Vec<&str> = whole.split_whitespace().collect();
    let partials: Vec<&str> = partial.split_whitespace().collect();
    if partials.is_empty() || partials.len() > words.len() {
        return false;
    }
    let partial = partials.join(" ");

    words.windows(partials.len()).any(|window| {
        let sliding = window.join(" ");
        if equal_fold(&sliding, &partial) {
            return true;
        }
        sliding
            .strip_suffix("'s")
            .is_some_and(|trimmed| equal_fold(trimmed, &partial))
    })
}

/// Builds the phrase frequency table around a subject alert's tags.
///
/// Every subject tag starts at 1. Each candidate tag bumps the first seed it
/// equals, or every entry it partially matches; partially matching candidate
/// tags are counted as well and enter the table when missing.
pub fn build_phrase_counts<'a, I, T>(subject_tags: &[String], candidates: I) -> IndexMap<String, usize>
where
    I: IntoIterator<Item = T>,
    T: IntoIterator<Item = &'a String>,
{
    let mut counts: IndexMap<String, usize> =
        subject_tags.iter().map(|tag| (tag.clone(), 1)).collect();

    for candidate in candidates {
        for phrase in candidate {
            let mut to_increment: IndexSet<&str> = IndexSet::new();
            for existing in counts.keys() {
                if equal_fold(existing, phrase) {
                    to_increment.insert(existing);
                    break;
                }
                if partial_match(existing, phrase) {
                    to_increment.insert(existing);
                    to_increment.insert(phrase);
                }
            }

            let to_increment: Vec<String> =
                to_increment.into_iter().map(str::to_string).collect();
            for tag in to_increment {
                *counts.entry(tag).or_insert(0) += 1;
            }
        }
    }

    counts
}

/// Looks up a tag's frequency ignoring case.
pub fn lookup_count(counts: &IndexMap<String, usize>, tag: &str) -> Option<usize> {
    counts
        .get(tag)
        .copied()
        .or_else(|| {
            counts
                .iter()
                .find(|(existing, _)| equal_fold(existing, tag))
                .map(|(_, count)| *count)
        })
}
