//! Prompt builder for the correction and teaching stages.
//!
//! [`PromptBuilder`] produces the chat messages for both stages:
//! * **Correction** — classification only: is the utterance acceptable, and
//!   if not, a corrected form plus an explanation with worked examples.
//! * **Teaching** — a short natural reply plus vocabulary and grammar
//!   annotations, as one JSON object.
//!
//! The target and explanation languages are chosen at construction time.

use crate::config::SessionSettings;

use super::context::ContextWindow;

/// Separator the teaching reply uses between sentences.  Kept in the spoken
/// text (it paces synthesis) and normalised away for display.
pub const SENTENCE_SEPARATOR: &str = ",,";

// ---------------------------------------------------------------------------
// PromptBuilder
// ---------------------------------------------------------------------------

/// Builds chat-completion messages for both pipeline stages.
///
/// # Example
/// ```rust
/// use voice_tutor::tutor::{ContextWindow, PromptBuilder};
///
/// let builder = PromptBuilder::new("Korean", "Vietnamese");
/// let messages = builder.correction_messages("밥", &ContextWindow::default());
/// assert_eq!(messages.len(), 2);
/// assert!(messages[0]["content"].as_str().unwrap().contains("isCorrect"));
/// ```
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    target_language: String,
    explanation_language: String,
}

impl PromptBuilder {
    pub fn new(target_language: &str, explanation_language: &str) -> Self {
        Self {
            target_language: target_language.to_string(),
            explanation_language: explanation_language.to_string(),
        }
    }

    /// System instruction for the correction stage.
    ///
    /// Subject omission is natural in many target languages and is never an
    /// error under this policy; only missing predicates, wrong particles,
    /// endings, or word order are.
    pub fn correction_system(&self) -> String {
        format!(
            "You are a {lang} grammar checker for language learners.\n\
             Decide only whether the learner's sentence is a grammatically complete, acceptable {lang} sentence.\n\
             Rules:\n\
             1. Subject omission is allowed and must NOT be marked as an error.\n\
             2. Missing punctuation alone is NOT an error.\n\
             3. A sentence without a predicate (e.g. a bare noun) IS an error of type \"incomplete\".\n\
             4. Wrong particles, verb endings, or word order are errors of type \"grammar\".\n\
             Return EXACT JSON only:\n\
             {{\"isCorrect\": true/false, \"corrected\": \"...\", \"errorType\": \"incomplete|grammar|none\", \"explanation\": \"...\"}}\n\
             When the sentence is correct: errorType is \"none\", explanation is \"\", corrected repeats the sentence.\n\
             When it is wrong: write the explanation in {expl} only, say what is wrong and why, \
             give the corrected sentence, and add two short worked examples ({lang} - {expl}).",
            lang = self.target_language,
            expl = self.explanation_language,
        )
    }

    /// `(system, user)` messages for the correction stage.
    pub fn correction_messages(
        &self,
        utterance: &str,
        context: &ContextWindow,
    ) -> Vec<serde_json::Value> {
        vec![
            serde_json::json!({ "role": "system", "content": self.correction_system() }),
            serde_json::json!({
                "role": "user",
                "content": format!("Context: {}\nAnalyze: \"{}\"", context.transcript(), utterance),
            }),
        ]
    }

    /// System instruction for the teaching stage, biased by what the learner
    /// already knows.
    pub fn teaching_system(&self, settings: &SessionSettings) -> String {
        let mut prompt = format!(
            "You are a friendly, precise {lang} teacher. Reply to the learner's (correct) sentence \
             and return EXACT JSON with three keys:\n\
             {{\n\
             \x20 \"response\": \"{lang} reply, 2-3 short sentences. Put \\\"{sep}\\\" between sentences.\",\n\
             \x20 \"vocabulary\": [{{\"word\": \"...\", \"meaning\": \"{expl} meaning\", \"pronunciation\": \"romanization\", \"example\": \"{lang} example - {expl} translation\"}}],\n\
             \x20 \"grammar\": [{{\"structure\": \"...\", \"meaning\": \"{expl} explanation\", \"usage\": \"when to use it\", \"example\": \"{lang} example - {expl} translation\"}}]\n\
             }}\n\
             CRITICAL RULES:\n\
             - Include ONLY words and grammar structures that literally APPEAR in \"response\", written exactly as they appear.\n\
             - For grammar, cover endings, particles, and connectors used in the response.\n\
             - Explanations and meanings are in {expl}.\n\
             - Return valid JSON only, no commentary.",
            lang = self.target_language,
            expl = self.explanation_language,
            sep = SENTENCE_SEPARATOR,
        );

        if !settings.known_grammar.is_empty() {
            let known = settings
                .known_grammar
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            prompt.push_str(&format!(
                "\nThe learner already knows: {known}. Build on these and introduce at most one new pattern."
            ));
        }

        prompt
    }

    /// Messages for the teaching stage: system, prior turns, then the
    /// corrected utterance.
    pub fn teaching_messages(
        &self,
        corrected: &str,
        context: &ContextWindow,
        settings: &SessionSettings,
    ) -> Vec<serde_json::Value> {
        let mut messages = Vec::with_capacity(context.len() + 2);
        messages.push(serde_json::json!({ "role": "system", "content": self.teaching_system(settings) }));
        messages.extend(context.chat_messages());
        messages.push(serde_json::json!({ "role": "user", "content": corrected }));
        messages
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
