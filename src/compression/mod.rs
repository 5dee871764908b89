//! Dictionary substitution compression for large tool outputs.
//!
//! Finds frequently repeated patterns in text and replaces them with
//! single-character markers drawn from a reserved symbol range, shrinking the
//! stored size of a message without losing information. The compressed form
//! lives only in stored history; it is always reversed before the text
//! reaches the model or the user.
//!
//! Invariant: `decompress(compress(t)) == t` for every input, including
//! inputs with no repetition. When the compressor cannot guarantee that, it
//! returns the input unchanged.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Minimum pattern length in characters worth a dictionary entry.
const MIN_PATTERN_CHARS: usize = 10;

/// Number of words in a word-run candidate.
const WORD_RUN_LEN: usize = 10;

/// Fixed cost charged per dictionary entry when scoring savings.
const DICT_ENTRY_OVERHEAD: usize = 8;

/// Marker code-point ranges, tried in order. Each range must have
/// `max_entries` consecutive code points absent from the input; if none
/// qualifies, compression is skipped for that input.
const MARKER_RANGES: [u32; 3] = [0xE000, 0xF0000, 0x100000];

static PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:[/\w.-]+/){2,}[\w.-]+").expect("path regex"));
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s]+").expect("url regex"));
static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w+(?:[._:]\w+){2,}\b").expect("identifier regex"));

/// Thresholds and limits for one compression attempt.
#[derive(Debug, Clone)]
pub struct CompressionOptions {
    /// Inputs shorter than this many characters are returned unchanged.
    pub min_chars: usize,
    /// Inputs estimated below this many tokens are returned unchanged.
    pub min_tokens: usize,
    /// Hard cap on dictionary entries.
    pub max_entries: usize,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            min_chars: 5000,
            min_tokens: 1000,
            max_entries: 100,
        }
    }
}

/// Marker -> original pattern mapping attached to a compressed message.
///
/// Scoped to the message it decorates; discarded when that message is
/// summarized away.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionDictionary {
    entries: BTreeMap<String, String>,
}

impl CompressionDictionary {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the dictionary carries no substitutions.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Original pattern for a marker, if present.
    pub fn get(&self, marker: &str) -> Option<&str> {
        self.entries.get(marker).map(String::as_str)
    }

    fn insert(&mut self, marker: String, pattern: String) {
        self.entries.insert(marker, pattern);
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.entries.iter()
    }
}

/// Check whether text is large enough to attempt compression.
pub fn should_compress(text: &str, opts: &CompressionOptions) -> bool {
    let chars = text.chars().count();
    chars >= opts.min_chars && estimate_tokens(text) >= opts.min_tokens
}

/// Rough token estimate (~4 characters per token).
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Compress text by dictionary substitution.
///
/// Returns the compressed text and the dictionary needed to reverse it.
/// Below the configured thresholds, or when no safe marker range or no
/// profitable pattern exists, returns the input unchanged with an empty
/// dictionary.
pub fn compress(text: &str, opts: &CompressionOptions) -> (String, CompressionDictionary) {
    let unchanged = || (text.to_string(), CompressionDictionary::default());

    if !should_compress(text, opts) {
        return unchanged();
    }

    let Some(marker_base) = find_marker_base(text, opts.max_entries) else {
        log::debug!("no reserved marker range free, skipping compression");
        return unchanged();
    };

    let selected = select_patterns(text, opts.max_entries);
    if selected.is_empty() {
        return unchanged();
    }

    // Assign markers in selection order, substitute longest patterns first
    // so no pattern can partially match inside an already-replaced region.
    let mut dict = CompressionDictionary::default();
    let mut ordered: Vec<(String, String)> = Vec::with_capacity(selected.len());
    for (idx, pattern) in selected.iter().enumerate() {
        let marker = char::from_u32(marker_base + idx as u32)
            .expect("marker range is valid scalar values")
            .to_string();
        dict.insert(marker.clone(), pattern.clone());
        ordered.push((marker, pattern.clone()));
    }
    ordered.sort_by(|a, b| b.1.chars().count().cmp(&a.1.chars().count()));

    let mut compressed = text.to_string();
    for (marker, pattern) in &ordered {
        compressed = compressed.replace(pattern.as_str(), marker);
    }

    // The round trip must hold unconditionally; prefer the unmodified input
    // over any risk of lossy output.
    if decompress(&compressed, &dict) != text {
        log::warn!("compression round trip failed, storing uncompressed text");
        return unchanged();
    }

    (compressed, dict)
}

/// Reverse a dictionary substitution. Total and pure: an empty dictionary
/// returns the input unchanged.
pub fn decompress(compressed: &str, dict: &CompressionDictionary) -> String {
    if dict.is_empty() {
        return compressed.to_string();
    }
    let mut text = compressed.to_string();
    for (marker, pattern) in dict.iter() {
        text = text.replace(marker.as_str(), pattern);
    }
    text
}

/// Find the first marker range with `count` consecutive code points absent
/// from the input.
fn find_marker_base(text: &str, count: usize) -> Option<u32> {
    'ranges: for base in MARKER_RANGES {
        let end = base + count as u32;
        for c in text.chars() {
            let cp = c as u32;
            if cp >= base && cp < end {
                continue 'ranges;
            }
        }
        return Some(base);
    }
    None
}

/// Candidate patterns: word runs, paths, URLs and dotted identifiers that
/// occur at least twice.
fn find_candidates(text: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    // Word runs taken as exact substrings (byte ranges of the original text,
    // so occurrence counting always finds them).
    let words: Vec<(usize, &str)> = text
        .split_whitespace()
        .map(|w| (w.as_ptr() as usize - text.as_ptr() as usize, w))
        .collect();
    if words.len() >= WORD_RUN_LEN {
        for window in words.windows(WORD_RUN_LEN) {
            let (start, _) = window[0];
            let (last_start, last_word) = window[WORD_RUN_LEN - 1];
            let run = &text[start..last_start + last_word.len()];
            if run.chars().count() >= MIN_PATTERN_CHARS {
                candidates.push(run.to_string());
            }
        }
    }

    for re in [&*PATH_RE, &*URL_RE, &*IDENT_RE] {
        for m in re.find_iter(text) {
            if m.as_str().chars().count() >= MIN_PATTERN_CHARS {
                candidates.push(m.as_str().to_string());
            }
        }
    }

    candidates.sort();
    candidates.dedup();
    candidates
}

/// Score candidates by net savings and greedily select non-overlapping ones.
///
/// Savings = (pattern_len - marker_len) * occurrences - overhead; candidates
/// that do not pay for their dictionary entry are dropped. A candidate whose
/// occurrences overlap a range already claimed by a higher-savings selection
/// is skipped outright, so substitution stays unambiguous.
fn select_patterns(text: &str, max_entries: usize) -> Vec<String> {
    let mut scored: Vec<(String, Vec<(usize, usize)>, i64)> = Vec::new();

    for candidate in find_candidates(text) {
        let spans: Vec<(usize, usize)> = text
            .match_indices(candidate.as_str())
            .map(|(pos, m)| (pos, pos + m.len()))
            .collect();
        if spans.len() < 2 {
            continue;
        }
        let pattern_chars = candidate.chars().count() as i64;
        let savings =
            (pattern_chars - 1) * spans.len() as i64 - (pattern_chars + DICT_ENTRY_OVERHEAD as i64);
        if savings > 0 {
            scored.push((candidate, spans, savings));
        }
    }

    // Descending savings; ties broken by length then text for determinism.
    scored.sort_by(|a, b| {
        b.2.cmp(&a.2)
            .then_with(|| b.0.len().cmp(&a.0.len()))
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut claimed: Vec<(usize, usize)> = Vec::new();
    let mut selected: Vec<String> = Vec::new();

    for (pattern, spans, _) in scored {
        if selected.len() >= max_entries {
            break;
        }
        let overlaps = spans
            .iter()
            .any(|&(s, e)| claimed.iter().any(|&(cs, ce)| s < ce && cs < e));
        if overlaps {
            continue;
        }
        claimed.extend(spans);
        selected.push(pattern);
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_opts() -> CompressionOptions {
        // Low thresholds so short fixtures still exercise the algorithm
        CompressionOptions {
            min_chars: 1,
            min_tokens: 0,
            max_entries: 100,
        }
    }

    #[test]
    fn test_round_trip_empty_input() {
        let (compressed, dict) = compress("", &small_opts());
        assert_eq!(decompress(&compressed, &dict), "");
    }

    #[test]
    fn test_round_trip_no_repeats() {
        let text = "a quick brown fox jumps over one lazy dog tonight";
        let (compressed, dict) = compress(text, &small_opts());
        assert_eq!(decompress(&compressed, &dict), text);
    }

    #[test]
    fn test_round_trip_full_tiling_repeats() {
        let text = "ERROR connection refused while polling upstream gateway endpoint retry "
            .repeat(50);
        let (compressed, dict) = compress(&text, &small_opts());
        assert_eq!(decompress(&compressed, &dict), text);
        assert!(compressed.chars().count() < text.chars().count());
    }

    #[test]
    fn test_round_trip_with_reserved_marker_chars_in_input() {
        // Input already uses private-use characters; compressor must pick a
        // different range or skip, never corrupt.
        let line = "status \u{E000}\u{E001} worker /srv/app/logs/worker.log restarted cleanly after crash ";
        let text = line.repeat(40);
        let (compressed, dict) = compress(&text, &small_opts());
        assert_eq!(decompress(&compressed, &dict), text);
    }

    #[test]
    fn test_below_thresholds_is_noop() {
        let text = "short but repeated text, short but repeated text";
        let opts = CompressionOptions::default();
        let (compressed, dict) = compress(text, &opts);
        assert_eq!(compressed, text);
        assert!(dict.is_empty());
    }

    #[test]
    fn test_should_compress_thresholds() {
        let opts = CompressionOptions {
            min_chars: 100,
            min_tokens: 10,
            max_entries: 100,
        };
        assert!(!should_compress(&"x".repeat(99), &opts));
        assert!(should_compress(&"x".repeat(100), &opts));
    }

    #[test]
    fn test_large_log_compresses_below_half() {
        // ~20k chars: one log line repeated 200 times
        let line = "2024-01-01T00:00:00 WARN retry connecting to https://internal.service.example.com/api/v2/health timed out\n";
        let text = line.repeat(200);
        assert!(text.len() >= 20_000);

        let opts = CompressionOptions::default();
        let (compressed, dict) = compress(&text, &opts);

        assert!(!dict.is_empty());
        assert!(compressed.chars().count() < text.chars().count() / 2);
        assert_eq!(decompress(&compressed, &dict), text);
    }

    #[test]
    fn test_decompress_with_empty_dictionary() {
        let dict = CompressionDictionary::default();
        assert_eq!(decompress("anything at all", &dict), "anything at all");
    }

    #[test]
    fn test_markers_absent_from_original_text() {
        let text = "repeated /var/log/app/service.log entry shows timeout here again soon "
            .repeat(30);
        let (compressed, dict) = compress(&text, &small_opts());
        for (marker, _) in dict.entries.iter() {
            assert!(!text.contains(marker.as_str()));
            assert!(compressed.contains(marker.as_str()));
        }
    }

    #[test]
    fn test_dictionary_capped_at_max_entries() {
        // Many distinct repeated identifiers, tiny cap
        let mut text = String::new();
        for i in 0..50 {
            let ident = format!("module.submodule.function_number_{i:03}");
            for _ in 0..4 {
                text.push_str(&ident);
                text.push_str(" filler words here ");
            }
        }
        let opts = CompressionOptions {
            min_chars: 1,
            min_tokens: 0,
            max_entries: 5,
        };
        let (compressed, dict) = compress(&text, &opts);
        assert!(dict.len() <= 5);
        assert_eq!(decompress(&compressed, &dict), text);
    }

    #[test]
    fn test_candidates_include_paths_urls_identifiers() {
        let text = "see /usr/local/share/data.txt and https://example.com/page and alpha.beta.gamma.delta";
        let candidates = find_candidates(text);
        assert!(candidates.iter().any(|c| c.contains("/usr/local/share")));
        assert!(candidates.iter().any(|c| c.starts_with("https://")));
        assert!(candidates.iter().any(|c| c.contains("alpha.beta.gamma.delta")));
    }

    #[test]
    fn test_single_occurrence_not_selected() {
        let text = "unique /opt/tools/bin/processor path appears only once in this text";
        let selected = select_patterns(text, 100);
        assert!(selected.is_empty());
    }

    #[test]
    fn test_find_marker_base_skips_occupied_range() {
        let text = "\u{E000}\u{E005}";
        let base = find_marker_base(text, 100).unwrap();
        assert_eq!(base, 0xF0000);
    }

    #[test]
    fn test_find_marker_base_all_ranges_occupied() {
        let text = "\u{E000}\u{F0000}\u{100000}";
        assert!(find_marker_base(text, 100).is_none());
    }
}
