//! EntropyScorer (spec.md §4.9).
//!
//! Pure, deterministic proxy for response quality: Shannon entropy over the
//! token-frequency distribution of a response's text, normalized into
//! `[0, 1]`. No model call, no I/O — same "pure function over a string"
//! shape as `intent::classify`.

/// Scores `text` by the normalized Shannon entropy of its whitespace
/// tokens. Empty text, or text with a single repeated token, scores `0.0`
/// (no information content); a response using its vocabulary evenly scores
/// close to `1.0`.
pub fn score(text: &str) -> f64 {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() < 2 {
        return 0.0;
    }

    let mut counts = std::collections::HashMap::new();
    for token in &tokens {
        *counts.entry(*token).or_insert(0u32) += 1;
    }

    if counts.len() < 2 {
        return 0.0;
    }

    let total = tokens.len() as f64;
    let entropy: f64 = counts
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum();

    let max_entropy = (counts.len() as f64).log2();
    if max_entropy <= 0.0 {
        0.0
    } else {
        (entropy / max_entropy).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_scores_zero() {
        assert_eq!(score(""), 0.0);
    }

    #[test]
    fn single_repeated_token_scores_zero() {
        assert_eq!(score("same same same same"), 0.0);
    }

    #[test]
    fn fully_even_vocabulary_scores_near_one() {
        let s = score("alpha beta gamma delta");
        assert!(s > 0.95, "expected near-maximal entropy, got {s}");
    }

    #[test]
    fn score_is_bounded() {
        let s = score("the quick brown fox the quick brown the quick the");
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn score_is_deterministic() {
        let text = "one two three two one";
        assert_eq!(score(text), score(text));
    }
}
