//! Vocabulary/grammar annotations and the filter that keeps them honest.
//!
//! The teaching model is asked to annotate only words and patterns it
//! actually used, but it does not always comply.  [`filter_annotations`]
//! drops every item whose surface form is absent from the reply.  It is pure
//! and deterministic.

use serde::{Deserialize, Serialize};

/// A vocabulary item attached to an assistant reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabItem {
    /// The word exactly as it appears in the reply.
    pub surface_form: String,
    /// Meaning in the explanation language.
    pub meaning: String,
    pub pronunciation: Option<String>,
    pub example: Option<String>,
}

/// A grammar pattern attached to an assistant reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarItem {
    /// Pattern notation, e.g. `"-고 있어요"` or `"은/는"`.
    pub pattern: String,
    pub explanation: String,
    pub usage: Option<String>,
    pub examples: Vec<String>,
}

impl GrammarItem {
    /// Surface keys the pattern can appear as in a reply: `/`-separated
    /// alternatives with affix markers (`-`, `~`) and outer whitespace
    /// dropped and inner whitespace collapsed.  Keys shorter than two
    /// characters are left out; a lone particle like `는` also occurs inside
    /// unrelated words.
    ///
    /// ```
    /// use voice_tutor::tutor::GrammarItem;
    ///
    /// let g = GrammarItem {
    ///     pattern: "-고 있어요/-고 있다".into(),
    ///     explanation: String::new(),
    ///     usage: None,
    ///     examples: vec![],
    /// };
    /// assert_eq!(g.surface_keys(), vec!["고 있어요", "고 있다"]);
    ///
    /// let particle = GrammarItem { pattern: "-은/는".into(), ..g };
    /// assert!(particle.surface_keys().is_empty());
    /// ```
    pub fn surface_keys(&self) -> Vec<String> {
        self.pattern
            .split('/')
            .map(|alt| {
                alt.trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '~' | '～'))
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|key| key.chars().count() >= MIN_KEY_CHARS)
            .collect()
    }
}

/// Shortest grammar key that is matched against a reply.
const MIN_KEY_CHARS: usize = 2;

/// Keep only the annotations whose surface form occurs in `reply`.
///
/// A vocabulary item survives when its word is a substring of the reply; a
/// grammar item when one of its [`surface_keys`](GrammarItem::surface_keys)
/// is.  Order is preserved.  The reply itself is never touched.
pub fn filter_annotations(
    reply: &str,
    vocabulary: Vec<VocabItem>,
    grammar: Vec<GrammarItem>,
) -> (Vec<VocabItem>, Vec<GrammarItem>) {
    let vocabulary: Vec<VocabItem> = vocabulary
        .into_iter()
        .filter(|v| {
            let word = v.surface_form.trim();
            !word.is_empty() && reply.contains(word)
        })
        .collect();

    let grammar: Vec<GrammarItem> = grammar
        .into_iter()
        .filter(|g| g.surface_keys().iter().any(|key| reply.contains(key.as_str())))
        .collect();

    (vocabulary, grammar)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(word: &str) -> VocabItem {
        VocabItem {
            surface_form: word.into(),
            meaning: "nghĩa".into(),
            pronunciation: None,
            example: None,
        }
    }

    fn grammar(pattern: &str) -> GrammarItem {
        GrammarItem {
            pattern: pattern.into(),
            explanation: "giải thích".into(),
            usage: None,
            examples: vec![],
        }
    }

    const REPLY: &str = "저는 지금 밥을 먹고 있어요, 친구와 같이 가요.";

    #[test]
    fn keeps_words_present_in_reply() {
        let (v, _) = filter_annotations(REPLY, vec![vocab("밥"), vocab("친구")], vec![]);
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn drops_words_absent_from_reply() {
        let (v, _) = filter_annotations(
            REPLY,
            vec![vocab("밥"), vocab("학교"), vocab("커피")],
            vec![],
        );
        assert_eq!(v, vec![vocab("밥")]);
    }

    #[test]
    fn drops_empty_surface_forms() {
        let (v, g) = filter_annotations(REPLY, vec![vocab("  ")], vec![grammar(" - ")]);
        assert!(v.is_empty());
        assert!(g.is_empty());
    }

    #[test]
    fn grammar_matches_with_affix_marker_and_spacing() {
        let (_, g) = filter_annotations(
            REPLY,
            vec![],
            vec![grammar("-고 있어요"), grammar("~와 같이"), grammar("-려고 하다")],
        );
        let kept: Vec<_> = g.iter().map(|g| g.pattern.as_str()).collect();
        assert_eq!(kept, vec!["-고 있어요", "~와 같이"]);
    }

    #[test]
    fn grammar_alternatives_match_any() {
        let (_, g) = filter_annotations(
            REPLY,
            vec![],
            vec![grammar("-아요/-고 있어요"), grammar("에서/에게")],
        );
        let kept: Vec<_> = g.iter().map(|g| g.pattern.as_str()).collect();
        assert_eq!(kept, vec!["-아요/-고 있어요"]);
    }

    #[test]
    fn spacing_must_match_the_reply() {
        let reply = "어디 가는 거예요? 같이 가요.";
        let (v, g) = filter_annotations(
            reply,
            vec![vocab("같이가요"), vocab("같이 가요")],
            vec![grammar("-은/는"), grammar("-고 있어요")],
        );
        let kept: Vec<_> = v.iter().map(|v| v.surface_form.as_str()).collect();
        assert_eq!(kept, vec!["같이 가요"]);
        // `는` inside `가는` is not the topic particle.
        assert!(g.is_empty());
    }

    #[test]
    fn preserves_order() {
        let (v, _) = filter_annotations(REPLY, vec![vocab("친구"), vocab("없음"), vocab("밥")], vec![]);
        let kept: Vec<_> = v.iter().map(|v| v.surface_form.as_str()).collect();
        assert_eq!(kept, vec!["친구", "밥"]);
    }

    /// Every surviving item is a literal substring of the reply.
    #[test]
    fn survivors_always_occur_in_reply() {
        let replies = [REPLY, "어디 가는 거예요? 같이 가요.", "네,, 좋아요.."];
        let candidates = ["밥", "먹고", "있어요", "학교", "같이 가요", "같이가요", "가다", "저는", "는", ""];
        let patterns = ["-고 있어요", "-고있어요", "-는데", "와", "-았/었-", "-은/는", "~와 같이", "좋아요"];

        for reply in replies {
            let (v, g) = filter_annotations(
                reply,
                candidates.iter().map(|w| vocab(w)).collect(),
                patterns.iter().map(|p| grammar(p)).collect(),
            );

            for item in &v {
                assert!(
                    reply.contains(item.surface_form.as_str()),
                    "{:?} not in {reply:?}",
                    item.surface_form
                );
            }
            for item in &g {
                let keys = item.surface_keys();
                assert!(
                    keys.iter().any(|k| k.chars().count() >= 2 && reply.contains(k.as_str())),
                    "{:?} not in {reply:?}",
                    item.pattern
                );
            }
        }
    }
}
