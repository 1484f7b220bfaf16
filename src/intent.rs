//! IntentClassifier (spec.md §4.2).
//!
//! Pure, deterministic, keyword-lexicon classification. No I/O, no
//! randomness, no async — matching the spec's "MUST NOT perform I/O".

use std::collections::HashSet;

use crate::model::{Capability, Intent};

/// An alternate intent guess with its confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Alternate {
    pub intent: Intent,
    pub confidence: f64,
}

/// Result of classifying a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f64,
    pub required_capabilities: HashSet<Capability>,
    pub alternates: Vec<Alternate>,
}

/// Per-intent keyword/phrase lexicon, checked in lowercase.
fn lexicon(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::CodeGeneration => &[
            "function",
            "code",
            "python",
            "rust",
            "javascript",
            "typescript",
            "compile",
            "refactor",
            "bug",
            "implement",
            "class",
            "algorithm",
        ],
        Intent::ReasoningLogic => &[
            "why",
            "explain",
            "reason",
            "logic",
            "infer",
            "deduce",
            "because",
            "step by step",
            "analyze",
        ],
        Intent::CreativeTasks => &[
            "story",
            "poem",
            "write a",
            "creative",
            "imagine",
            "fiction",
            "lyrics",
            "brainstorm",
        ],
        Intent::SecurityAnalysis => &[
            "vulnerability",
            "exploit",
            "cve",
            "security",
            "penetration",
            "malware",
            "attack surface",
            "threat model",
        ],
        Intent::MathematicalProofs => &[
            "prove",
            "theorem",
            "lemma",
            "integral",
            "derivative",
            "equation",
            "mathematical",
            "proof",
        ],
        Intent::MultiModal => &[
            "image",
            "picture",
            "photo",
            "video",
            "audio",
            "diagram",
            "screenshot",
        ],
        Intent::General => &[],
    }
}

/// Required-capability table derived from intent (spec.md §4.2).
fn required_capabilities_for(intent: Intent) -> HashSet<Capability> {
    let caps: &[Capability] = match intent {
        Intent::CodeGeneration => &[Capability::CodeGeneration],
        Intent::ReasoningLogic => &[Capability::Reasoning],
        Intent::CreativeTasks => &[],
        Intent::SecurityAnalysis => &[Capability::Reasoning],
        Intent::MathematicalProofs => &[Capability::Reasoning],
        Intent::MultiModal => &[Capability::Vision],
        Intent::General => &[],
    };
    caps.iter().copied().collect()
}

/// Classifies a prompt into an intent, confidence, required capabilities,
/// and up to three alternates.
pub fn classify(prompt: &str) -> Classification {
    let lowered = prompt.to_lowercase();

    let mut scored: Vec<(Intent, usize)> = Intent::DECLARED_ORDER
        .iter()
        .map(|&intent| {
            let matches = lexicon(intent)
                .iter()
                .filter(|phrase| lowered.contains(*phrase))
                .count();
            (intent, matches)
        })
        .filter(|(intent, _)| *intent != Intent::General)
        .collect();

    // Stable sort by match count desc; ties keep declared order (input order).
    scored.sort_by(|a, b| b.1.cmp(&a.1));

    let best = scored.iter().find(|(_, matches)| *matches > 0).copied();

    let (primary_intent, primary_matches) = best.unwrap_or((Intent::General, 0));
    let confidence = if primary_matches == 0 {
        0.5
    } else {
        (0.5 + 0.1 * primary_matches as f64).min(1.0)
    };

    let alternates = scored
        .into_iter()
        .filter(|(intent, matches)| *intent != primary_intent && *matches > 0)
        .take(3)
        .map(|(intent, matches)| Alternate {
            intent,
            confidence: (0.5 + 0.1 * matches as f64).min(1.0),
        })
        .collect();

    Classification {
        intent: primary_intent,
        confidence,
        required_capabilities: required_capabilities_for(primary_intent),
        alternates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_generation_prompt_classifies_correctly() {
        let c = classify("Please write a Python function to sort a list");
        assert_eq!(c.intent, Intent::CodeGeneration);
        assert!(c.required_capabilities.contains(&Capability::CodeGeneration));
    }

    #[test]
    fn no_lexicon_hit_defaults_to_general() {
        let c = classify("hello there");
        assert_eq!(c.intent, Intent::General);
        assert_eq!(c.confidence, 0.5);
        assert!(c.required_capabilities.is_empty());
    }

    #[test]
    fn multi_modal_requires_vision() {
        let c = classify("describe this photo for me");
        assert_eq!(c.intent, Intent::MultiModal);
        assert!(c.required_capabilities.contains(&Capability::Vision));
    }

    #[test]
    fn classification_is_deterministic() {
        let prompt = "explain step by step why this proof of a theorem works";
        let a = classify(prompt);
        let b = classify(prompt);
        assert_eq!(a, b);
    }

    #[test]
    fn confidence_is_bounded_by_one() {
        let prompt = "function code python rust javascript typescript compile refactor bug implement class algorithm";
        let c = classify(prompt);
        assert!(c.confidence <= 1.0);
    }

    #[test]
    fn alternates_capped_at_three() {
        let prompt = "explain why step by step, write a creative story, security vulnerability, prove this theorem";
        let c = classify(prompt);
        assert!(c.alternates.len() <= 3);
    }
}
