//! Structured-response extraction from free-form model output.
//!
//! The model is told to answer with a single JSON object, but replies arrive
//! wrapped in code fences, prefixed with commentary, truncated, or as plain
//! prose.  Extraction degrades in three tiers and never fails:
//!
//! 1. strip wrapping markers (```` ```json ```` fences);
//! 2. parse the span from the first `{` to the last `}`;
//! 3. salvage the target-script text runs as a bare reply with no
//!    annotations.
//!
//! The result is an [`Extraction`] so callers always see which tier won.

use serde::{Deserialize, Serialize};

use super::annotation::{GrammarItem, VocabItem};
use super::model::Verdict;

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

/// Writing system of the target language, used when salvaging prose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Script {
    /// Korean syllables and jamo.
    Hangul,
    /// Basic and extended Latin letters.
    Latin,
    /// Any alphabetic character.
    Any,
}

impl Script {
    pub fn contains(&self, c: char) -> bool {
        match self {
            Script::Hangul => matches!(c,
                '\u{AC00}'..='\u{D7A3}' | '\u{1100}'..='\u{11FF}' | '\u{3130}'..='\u{318F}'),
            Script::Latin => c.is_ascii_alphabetic() || matches!(c, '\u{00C0}'..='\u{024F}'),
            Script::Any => c.is_alphabetic(),
        }
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Outcome of an extraction: either the object the model meant to send, or
/// a best-effort fallback built from whatever arrived.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction<T> {
    Parsed(T),
    Degraded(T),
}

impl<T> Extraction<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Extraction::Degraded(_))
    }

    pub fn value(&self) -> &T {
        match self {
            Extraction::Parsed(v) | Extraction::Degraded(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Extraction::Parsed(v) | Extraction::Degraded(v) => v,
        }
    }
}

// ---------------------------------------------------------------------------
// TeachingReply
// ---------------------------------------------------------------------------

/// Stage-2 payload: the tutor's reply plus candidate annotations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeachingReply {
    pub reply: String,
    pub vocabulary: Vec<VocabItem>,
    pub grammar: Vec<GrammarItem>,
}

impl TeachingReply {
    /// A reply with no annotations.
    pub fn bare(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            vocabulary: Vec::new(),
            grammar: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire shapes (lenient)
// ---------------------------------------------------------------------------

/// Every field is read as a bare `Value`; a field of the wrong type is
/// treated as missing instead of failing the whole object.
#[derive(Deserialize)]
struct RawReply {
    #[serde(default)]
    reply: serde_json::Value,
    #[serde(default)]
    response: serde_json::Value,
    #[serde(default)]
    vocabulary: serde_json::Value,
    #[serde(default)]
    grammar: serde_json::Value,
}

fn text_field(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => non_blank(Some(s)),
        _ => None,
    }
}

fn list_field(value: serde_json::Value) -> Vec<serde_json::Value> {
    match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Null => Vec::new(),
        other => {
            log::debug!("extract: ignoring non-list annotation field: {other}");
            Vec::new()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVocab {
    Bare(String),
    Entry {
        #[serde(default)]
        word: Option<String>,
        #[serde(default, rename = "surfaceForm")]
        surface_form: Option<String>,
        #[serde(default)]
        meaning: Option<String>,
        #[serde(default)]
        pronunciation: Option<String>,
        #[serde(default)]
        example: Option<String>,
    },
}

impl RawVocab {
    fn into_item(self) -> Option<VocabItem> {
        let item = match self {
            RawVocab::Bare(word) => VocabItem {
                surface_form: word,
                meaning: String::new(),
                pronunciation: None,
                example: None,
            },
            RawVocab::Entry {
                word,
                surface_form,
                meaning,
                pronunciation,
                example,
            } => VocabItem {
                surface_form: surface_form.or(word)?,
                meaning: meaning.unwrap_or_default(),
                pronunciation: non_blank(pronunciation),
                example: non_blank(example),
            },
        };
        (!item.surface_form.trim().is_empty()).then_some(item)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawGrammar {
    Bare(String),
    Entry {
        #[serde(default)]
        pattern: Option<String>,
        #[serde(default)]
        structure: Option<String>,
        #[serde(default)]
        explanation: Option<String>,
        #[serde(default)]
        meaning: Option<String>,
        #[serde(default)]
        usage: Option<String>,
        #[serde(default)]
        example: Option<String>,
        #[serde(default)]
        examples: Option<Vec<String>>,
    },
}

impl RawGrammar {
    fn into_item(self) -> Option<GrammarItem> {
        let item = match self {
            RawGrammar::Bare(pattern) => GrammarItem {
                pattern,
                explanation: String::new(),
                usage: None,
                examples: Vec::new(),
            },
            RawGrammar::Entry {
                pattern,
                structure,
                explanation,
                meaning,
                usage,
                example,
                examples,
            } => {
                let mut all_examples = examples.unwrap_or_default();
                if let Some(example) = non_blank(example) {
                    all_examples.insert(0, example);
                }
                GrammarItem {
                    pattern: pattern.or(structure)?,
                    explanation: explanation.or(meaning).unwrap_or_default(),
                    usage: non_blank(usage),
                    examples: all_examples,
                }
            }
        };
        (!item.pattern.trim().is_empty()).then_some(item)
    }
}

#[derive(Deserialize)]
struct RawVerdict {
    #[serde(default, rename = "isCorrect", alias = "is_correct")]
    is_correct: Option<bool>,
    #[serde(default)]
    corrected: Option<String>,
    #[serde(default, rename = "errorType", alias = "error_type")]
    error_type: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Tiers
// ---------------------------------------------------------------------------

/// Tier 1: remove code-fence markers.
fn strip_wrapping(raw: &str) -> String {
    raw.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
}

/// Tier 2: the first `{ ... }` span, parsed as a JSON object.
pub fn json_object(raw: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let text = strip_wrapping(raw);
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(&text[start..=end]) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Tier 3: join the runs of `script` text (with their spacing and sentence
/// punctuation) found anywhere in `raw`.
pub fn salvage_text(raw: &str, script: Script) -> Option<String> {
    let mut runs: Vec<String> = Vec::new();
    let mut current = String::new();

    let flush = |current: &mut String, runs: &mut Vec<String>| {
        // A run starts at its first script character.
        let run = current.trim_start_matches(|c: char| !script.contains(c)).trim_end();
        if !run.is_empty() {
            runs.push(run.to_string());
        }
        current.clear();
    };

    for c in raw.chars() {
        if script.contains(c) || c == ' ' || matches!(c, '.' | ',' | '!' | '?') {
            current.push(c);
        } else {
            flush(&mut current, &mut runs);
        }
    }
    flush(&mut current, &mut runs);

    let joined = runs.join(" ");
    (!joined.is_empty()).then_some(joined)
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Extract a [`TeachingReply`] from raw model output.
///
/// Never fails.  Missing annotation lists become empty lists; a missing or
/// blank reply falls back to salvaged text, then to `fallback_reply`.
///
/// ```
/// use voice_tutor::tutor::{extract_teaching_reply, Script};
///
/// let out = extract_teaching_reply("```json\n{\"response\": \"안녕하세요!\"}\n```", Script::Hangul, "죄송합니다.");
/// assert!(!out.is_degraded());
/// assert_eq!(out.value().reply, "안녕하세요!");
/// assert!(out.value().vocabulary.is_empty());
/// ```
pub fn extract_teaching_reply(
    raw: &str,
    script: Script,
    fallback_reply: &str,
) -> Extraction<TeachingReply> {
    if let Some(map) = json_object(raw) {
        if let Ok(parsed) = serde_json::from_value::<RawReply>(serde_json::Value::Object(map)) {
            let reply = text_field(parsed.reply).or_else(|| text_field(parsed.response));
            if let Some(reply) = reply {
                let vocabulary = list_field(parsed.vocabulary)
                    .into_iter()
                    .filter_map(|v| serde_json::from_value::<RawVocab>(v).ok())
                    .filter_map(RawVocab::into_item)
                    .collect();
                let grammar = list_field(parsed.grammar)
                    .into_iter()
                    .filter_map(|g| serde_json::from_value::<RawGrammar>(g).ok())
                    .filter_map(RawGrammar::into_item)
                    .collect();
                return Extraction::Parsed(TeachingReply {
                    reply: reply.trim().to_string(),
                    vocabulary,
                    grammar,
                });
            }
            log::debug!("extract: JSON object had no reply field");
            return Extraction::Degraded(TeachingReply::bare(fallback_reply));
        }
    }

    log::debug!("extract: no parsable JSON object, salvaging {script:?} text");
    let reply = salvage_text(raw, script).unwrap_or_else(|| fallback_reply.to_string());
    Extraction::Degraded(TeachingReply::bare(reply))
}

/// Decode a stage-1 verdict.  `None` when no verdict can be read, which the
/// caller treats as acceptance.
///
/// `isCorrect` decides when present; otherwise an `errorType` other than
/// `"none"` means the utterance is rejected.
pub fn extract_verdict(raw: &str, original: &str) -> Option<Verdict> {
    let map = json_object(raw)?;
    let parsed: RawVerdict = serde_json::from_value(serde_json::Value::Object(map)).ok()?;

    let rejected = match (parsed.is_correct, parsed.error_type.as_deref()) {
        (Some(correct), _) => !correct,
        (None, Some(kind)) => {
            let kind = kind.trim();
            !kind.is_empty() && !kind.eq_ignore_ascii_case("none")
        }
        (None, None) => return None,
    };

    let corrected_text = non_blank(parsed.corrected)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| original.to_string());

    Some(if rejected {
        Verdict::Rejected {
            corrected_text,
            explanation: parsed.explanation.unwrap_or_default().trim().to_string(),
        }
    } else {
        Verdict::Accepted { corrected_text }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SORRY: &str = "죄송합니다.";

    fn extract(raw: &str) -> Extraction<TeachingReply> {
        extract_teaching_reply(raw, Script::Hangul, SORRY)
    }

    #[test]
    fn clean_json_is_parsed() {
        let raw = r#"{"response":"좋아요,, 저도 밥을 먹었어요.","vocabulary":[{"word":"밥","meaning":"cơm","pronunciation":"bap","example":"밥을 먹어요 - Tôi ăn cơm"}],"grammar":[{"structure":"-았/었어요","meaning":"thì quá khứ","usage":"kể chuyện đã xảy ra","example":"먹었어요 - đã ăn"}]}"#;
        let out = extract(raw);
        assert!(!out.is_degraded());
        let reply = out.into_inner();
        assert_eq!(reply.reply, "좋아요,, 저도 밥을 먹었어요.");
        assert_eq!(reply.vocabulary.len(), 1);
        assert_eq!(reply.vocabulary[0].surface_form, "밥");
        assert_eq!(reply.vocabulary[0].pronunciation.as_deref(), Some("bap"));
        assert_eq!(reply.grammar.len(), 1);
        assert_eq!(reply.grammar[0].pattern, "-았/었어요");
        assert_eq!(reply.grammar[0].explanation, "thì quá khứ");
        assert_eq!(reply.grammar[0].examples, vec!["먹었어요 - đã ăn".to_string()]);
    }

    #[test]
    fn fenced_json_with_commentary_is_parsed() {
        let raw = "Here you go:\n```json\n{\"reply\": \"네, 좋아요.\", \"grammar\": null}\n```\nHope it helps!";
        let out = extract(raw);
        assert!(!out.is_degraded());
        assert_eq!(out.value().reply, "네, 좋아요.");
        assert!(out.value().grammar.is_empty());
        assert!(out.value().vocabulary.is_empty());
    }

    #[test]
    fn wrongly_typed_annotation_fields_do_not_degrade_the_reply() {
        let raws = [
            r#"{"response":"좋아요,, 같이 가요.","vocabulary":{"word":"같이","meaning":"cùng"},"grammar":[]}"#,
            r#"{"response":"좋아요,, 같이 가요.","vocabulary":"같이","grammar":{}}"#,
            r#"{"response":"좋아요,, 같이 가요.","vocabulary":{},"grammar":42}"#,
        ];
        for raw in raws {
            let out = extract(raw);
            assert!(!out.is_degraded(), "{raw}");
            let reply = out.into_inner();
            assert_eq!(reply.reply, "좋아요,, 같이 가요.");
            assert!(reply.vocabulary.is_empty());
            assert!(reply.grammar.is_empty());
        }
    }

    #[test]
    fn non_string_reply_falls_back_to_response() {
        let raw = r#"{"reply":7,"response":"네, 좋아요."}"#;
        let out = extract(raw);
        assert!(!out.is_degraded());
        assert_eq!(out.value().reply, "네, 좋아요.");
    }

    #[test]
    fn bare_string_annotations_are_accepted() {
        let raw = r#"{"response":"학교에 가요.","vocabulary":["학교"],"grammar":["-에 가다"]}"#;
        let reply = extract(raw).into_inner();
        assert_eq!(reply.vocabulary[0].surface_form, "학교");
        assert_eq!(reply.grammar[0].pattern, "-에 가다");
    }

    #[test]
    fn malformed_items_are_skipped_not_fatal() {
        let raw = r#"{"response":"학교에 가요.","vocabulary":[42, {"meaning":"no word"}, {"word":"학교"}]}"#;
        let reply = extract(raw).into_inner();
        assert_eq!(reply.vocabulary.len(), 1);
        assert_eq!(reply.vocabulary[0].surface_form, "학교");
    }

    #[test]
    fn truncated_json_degrades_to_script_text() {
        let raw = r#"{"response":"오늘 날씨가 좋네요. 산책할까요?","vocabulary":[{"word":"날씨""#;
        let out = extract(raw);
        assert!(out.is_degraded());
        let reply = out.into_inner();
        assert!(reply.reply.contains("오늘 날씨가 좋네요."));
        assert!(reply.vocabulary.is_empty());
        assert!(reply.grammar.is_empty());
    }

    #[test]
    fn prose_without_braces_is_salvaged() {
        let out = extract("Sure! 안녕하세요, 반가워요. (Hello, nice to meet you.)");
        assert!(out.is_degraded());
        assert_eq!(out.value().reply, "안녕하세요, 반가워요.");
    }

    #[test]
    fn empty_input_falls_back_to_apology() {
        let out = extract("");
        assert!(out.is_degraded());
        assert_eq!(out.value().reply, SORRY);
        assert!(out.value().vocabulary.is_empty());
    }

    #[test]
    fn json_without_reply_falls_back() {
        let out = extract(r#"{"vocabulary":[{"word":"밥"}]}"#);
        assert!(out.is_degraded());
        assert_eq!(out.value().reply, SORRY);
        assert!(out.value().vocabulary.is_empty());
    }

    #[test]
    fn reversed_braces_do_not_panic() {
        let out = extract("} 안녕 {");
        assert!(out.is_degraded());
        assert_eq!(out.value().reply, "안녕");
    }

    #[test]
    fn awkward_inputs_never_panic() {
        let inputs = [
            "{", "}", "{}", "[]", "```", "```json", "{\"response\": 5}", "null",
            "\u{0}\u{FFFF}", "{\"response\": \"끝", "ㅋㅋㅋ", "    ",
        ];
        for raw in inputs {
            let reply = extract(raw).into_inner();
            assert!(!reply.reply.is_empty(), "empty reply for {raw:?}");
        }
    }

    #[test]
    fn latin_script_salvage() {
        let text = salvage_text("{{broken}} Hola, ¿qué tal? 123", Script::Latin).unwrap();
        assert!(text.contains("Hola,"));
        assert!(!text.contains("123"));
    }

    #[test]
    fn verdict_rejection_from_is_correct() {
        let raw = r#"{"isCorrect":false,"corrected":"밥을 먹었어요?","explanation":"Thiếu vị ngữ."}"#;
        assert_eq!(
            extract_verdict(raw, "밥"),
            Some(Verdict::Rejected {
                corrected_text: "밥을 먹었어요?".into(),
                explanation: "Thiếu vị ngữ.".into(),
            })
        );
    }

    #[test]
    fn verdict_acceptance_keeps_model_correction() {
        let raw = r#"{"isCorrect":true,"corrected":"안녕하세요.","errorType":"none","explanation":""}"#;
        assert_eq!(
            extract_verdict(raw, "안녕하세요"),
            Some(Verdict::Accepted {
                corrected_text: "안녕하세요.".into()
            })
        );
    }

    #[test]
    fn verdict_falls_back_to_error_type() {
        let raw = r#"{"corrected":"","errorType":"incomplete","explanation":"..."}"#;
        match extract_verdict(raw, "저는") {
            Some(Verdict::Rejected { corrected_text, .. }) => assert_eq!(corrected_text, "저는"),
            other => panic!("unexpected verdict: {other:?}"),
        }

        let raw = r#"{"corrected":"좋아요","errorType":"none"}"#;
        assert!(matches!(
            extract_verdict(raw, "좋아요"),
            Some(Verdict::Accepted { .. })
        ));
    }

    #[test]
    fn verdict_unreadable_is_none() {
        assert_eq!(extract_verdict("I think it's fine", "좋아요"), None);
        assert_eq!(extract_verdict(r#"{"corrected":"좋아요"}"#, "좋아요"), None);
        assert_eq!(extract_verdict(r#"{"isCorrect":"maybe"}"#, "좋아요"), None);
    }
}
