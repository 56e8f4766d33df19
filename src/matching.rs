//! Free-form answer normalization and fuzzy matching.
//!
//! All scoring decisions in text mode and host-side verification in buzzer
//! mode go through this module, so the rules here are deliberately small and
//! fully unit-tested.

use std::collections::HashMap;

/// Overlap ratio a token-set comparison must reach in the unified rule.
const TOKEN_OVERLAP_THRESHOLD: f64 = 0.7;
/// Dice similarity the unified rule accepts.
const UNIFIED_DICE_THRESHOLD: f64 = 0.65;
/// Dice similarity the detailed (per-side) rule accepts.
const DETAILED_DICE_THRESHOLD: f64 = 0.7;
/// Minimum token length (in code points) considered by the overlap rule.
const MIN_TOKEN_LEN: usize = 3;

/// Filler phrases that carry no identifying information. Longest first so a
/// phrase is never shadowed by one of its prefixes.
const NOISE_PHRASES: &[&str] = &[
    "official video",
    "produced by",
    "remastered",
    "remaster",
    "lyrics",
    "lyric",
    "audio",
    "feat.",
    "prod.",
    "feat",
    "prod",
    "ft.",
    "ft",
    "hd",
    "hq",
    "mv",
];

/// Per-side verdict of the detailed matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailedMatch {
    pub artist_correct: bool,
    pub title_correct: bool,
}

/// Reduce a free-form string to its canonical comparable form.
///
/// Bracketed segments and noise phrases are dropped, the remainder is case
/// folded, every code point that is not a Unicode letter, number, or
/// whitespace becomes a space, and runs of whitespace collapse to one.
pub fn normalize(input: &str) -> String {
    let stripped = strip_bracketed(input);
    let folded = stripped.to_lowercase();
    let denoised = remove_noise(&folded);
    let filtered: String = denoised
        .chars()
        .map(|c| {
            if c.is_alphabetic() || c.is_numeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace every balanced `(…)`, `[…]`, `{…}` with a space, non-greedy, in a
/// single left-to-right pass. Unbalanced openers are kept as-is and fall to
/// the punctuation filter.
fn strip_bracketed(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        let closer = match chars[i] {
            '(' => Some(')'),
            '[' => Some(']'),
            '{' => Some('}'),
            _ => None,
        };
        match closer {
            Some(closer) => match chars[i + 1..].iter().position(|&c| c == closer) {
                Some(offset) => {
                    out.push(' ');
                    i += offset + 2;
                }
                None => {
                    out.push(chars[i]);
                    i += 1;
                }
            },
            None => {
                out.push(chars[i]);
                i += 1;
            }
        }
    }
    out
}

/// Drop word-bounded noise phrases from an already case-folded string.
fn remove_noise(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        let at_word_start = i == 0 || !chars[i - 1].is_alphanumeric();
        if at_word_start {
            if let Some(len) = match_noise_at(&chars, i) {
                out.push(' ');
                i += len;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Length in code points of a noise phrase starting at `pos`, if any.
fn match_noise_at(chars: &[char], pos: usize) -> Option<usize> {
    for phrase in NOISE_PHRASES {
        let phrase_chars: Vec<char> = phrase.chars().collect();
        let end = pos + phrase_chars.len();
        if end > chars.len() || chars[pos..end] != phrase_chars[..] {
            continue;
        }
        // A trailing dot closes the word by itself; otherwise the next code
        // point must not continue it.
        let closed = phrase.ends_with('.')
            || end == chars.len()
            || !chars[end].is_alphanumeric();
        if closed {
            return Some(phrase_chars.len());
        }
    }
    None
}

/// Unified text-mode match of a guess against a (title, artist) target.
pub fn unified_match(guess: &str, title: &str, artist: &str) -> bool {
    let guess = normalize(guess);
    if guess.is_empty() {
        return false;
    }

    let targets = [normalize(title), normalize(artist)];
    targets
        .iter()
        .map(String::as_str)
        .filter(|target| !target.is_empty())
        .any(|target| {
            substring_either(&guess, target)
                || token_overlap(&guess, target) >= TOKEN_OVERLAP_THRESHOLD
                || dice_similarity(&guess, target) >= UNIFIED_DICE_THRESHOLD
        })
}

/// Detailed per-side match used by buzzer-mode host verification and scoring.
///
/// Each side is matched against its own target with the opposite guess string
/// as fallback, so a single combined guess can satisfy both sides. When the
/// target title textually contains the artist, the title stripped of the
/// artist is accepted as an alternative title target.
pub fn detailed_match(
    guess_artist: &str,
    guess_title: &str,
    target_artist: &str,
    target_title: &str,
) -> DetailedMatch {
    let guess_artist = normalize(guess_artist);
    let guess_title = normalize(guess_title);
    let artist = normalize(target_artist);
    let title = normalize(target_title);

    let mut title_targets = vec![title.clone()];
    if !artist.is_empty() && title.contains(&artist) {
        let stripped = title
            .replace(&artist, " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if !stripped.is_empty() {
            title_targets.push(stripped);
        }
    }

    let artist_correct =
        side_matches(&guess_artist, &artist) || side_matches(&guess_title, &artist);
    let title_correct = title_targets
        .iter()
        .any(|target| side_matches(&guess_title, target) || side_matches(&guess_artist, target));

    DetailedMatch {
        artist_correct,
        title_correct,
    }
}

/// Single-side comparison of two already-normalized strings.
fn side_matches(guess: &str, target: &str) -> bool {
    if guess.is_empty() || target.is_empty() {
        return false;
    }
    guess == target
        || substring_either(guess, target)
        || token_overlap(guess, target) >= TOKEN_OVERLAP_THRESHOLD
        || dice_similarity(guess, target) >= DETAILED_DICE_THRESHOLD
}

fn substring_either(a: &str, b: &str) -> bool {
    a.contains(b) || b.contains(a)
}

/// Ratio of shared tokens (length > 2) against either side's cardinality.
fn token_overlap(a: &str, b: &str) -> f64 {
    let tokens_a = significant_tokens(a);
    let tokens_b = significant_tokens(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let shared = tokens_a
        .iter()
        .filter(|token| tokens_b.contains(token))
        .count() as f64;
    let ratio_a = shared / tokens_a.len() as f64;
    let ratio_b = shared / tokens_b.len() as f64;
    ratio_a.max(ratio_b)
}

fn significant_tokens(s: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = s
        .split_whitespace()
        .filter(|token| token.chars().count() >= MIN_TOKEN_LEN)
        .collect();
    tokens.sort_unstable();
    tokens.dedup();
    tokens
}

/// Dice coefficient over character-bigram multisets.
///
/// Bigrams are taken per whitespace token so word boundaries never form a
/// bigram.
pub fn dice_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }

    let bigrams_a = bigram_counts(a);
    let bigrams_b = bigram_counts(b);
    let total = bigrams_a.values().sum::<usize>() + bigrams_b.values().sum::<usize>();
    if total == 0 {
        return 0.0;
    }

    let shared: usize = bigrams_a
        .iter()
        .map(|(bigram, count)| count.min(bigrams_b.get(bigram).unwrap_or(&0)))
        .sum();

    (2 * shared) as f64 / total as f64
}

fn bigram_counts(s: &str) -> HashMap<(char, char), usize> {
    let mut counts = HashMap::new();
    for token in s.split_whitespace() {
        let chars: Vec<char> = token.chars().collect();
        for pair in chars.windows(2) {
            *counts.entry((pair[0], pair[1])).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_brackets_noise_and_punctuation() {
        assert_eq!(
            normalize("(Official Video) Deszcz na betonie!"),
            "deszcz na betonie"
        );
        assert_eq!(normalize("Song [Remastered] {HQ} lyrics"), "song");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn normalization_is_idempotent() {
        for sample in [
            "(prod. Rumak) Deszcz na betonie",
            "Taco Hemingway — Następna stacja [Official Video]",
            "ÁÉÍ feat. somebody",
        ] {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn noise_tokens_are_word_bounded() {
        // "audio" inside a longer word must survive.
        assert_eq!(normalize("audiophile"), "audiophile");
        assert_eq!(normalize("audio file"), "file");
        assert_eq!(normalize("shift happens"), "shift happens");
    }

    #[test]
    fn unbalanced_brackets_fall_through_to_punctuation_filter() {
        assert_eq!(normalize("broken (bracket"), "broken bracket");
    }

    #[test]
    fn unicode_letters_survive_the_filter() {
        assert_eq!(normalize("Żółć 1999!"), "żółć 1999");
    }

    #[test]
    fn title_and_artist_always_match_themselves() {
        let cases = [
            ("Deszcz na betonie", "Taco Hemingway"),
            ("HUMBLE.", "Kendrick Lamar"),
            ("99 Luftballons", "Nena"),
        ];
        for (title, artist) in cases {
            assert!(unified_match(title, title, artist));
            assert!(unified_match(artist, title, artist));
        }
    }

    #[test]
    fn guess_with_producer_tag_matches() {
        assert!(unified_match(
            "Deszcz na betonie!",
            "(prod. Rumak) Deszcz na betonie",
            "Taco Hemingway"
        ));
    }

    #[test]
    fn matching_survives_case_and_punctuation_changes() {
        assert!(unified_match("dESZCZ NA BETONIE", "Deszcz na betonie", "Taco Hemingway"));
        assert!(unified_match("deszcz, na - betonie?!", "Deszcz na betonie", "Taco Hemingway"));
    }

    #[test]
    fn empty_guess_never_matches() {
        assert!(!unified_match("", "Deszcz na betonie", "Taco Hemingway"));
        assert!(!unified_match("()!?", "Deszcz na betonie", "Taco Hemingway"));
    }

    #[test]
    fn token_overlap_accepts_partial_recall() {
        // 2 of 2 significant guess tokens hit a 3-token title.
        assert!(unified_match(
            "szare eminencje",
            "Szare eminencje osiedla",
            "Paktofonika"
        ));
    }

    #[test]
    fn dice_similarity_known_values() {
        assert_eq!(dice_similarity("night", "night"), 1.0);
        assert_eq!(dice_similarity("abc", "xyz"), 0.0);
        let close = dice_similarity("nacht", "night");
        assert!(close > 0.0 && close < 0.5);
    }

    #[test]
    fn detailed_match_scores_sides_independently() {
        let both = detailed_match("", "Taco Hemingway Deszcz na betonie", "Taco Hemingway", "Deszcz na betonie");
        assert!(both.artist_correct);
        assert!(both.title_correct);

        let title_only = detailed_match("", "deszcz na betonie", "Taco Hemingway", "Deszcz na betonie");
        assert!(!title_only.artist_correct);
        assert!(title_only.title_correct);

        let neither = detailed_match("", "bohemian rhapsody", "Taco Hemingway", "Deszcz na betonie");
        assert!(!neither.artist_correct);
        assert!(!neither.title_correct);
    }

    #[test]
    fn stripped_title_is_an_alternative_target() {
        // The title embeds the artist; guessing only the remainder counts.
        let verdict = detailed_match(
            "Vixen",
            "Barbar",
            "Vixen",
            "Vixen Barbar",
        );
        assert!(verdict.artist_correct);
        assert!(verdict.title_correct);
    }
}
