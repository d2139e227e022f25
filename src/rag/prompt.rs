//! Guarded prompt construction.
//!
//! Builds the single prompt sent to the Generator from the question and the
//! retrieved passages. The prompt layers these guardrails:
//! - answer strictly from the supplied passages
//! - keep configured confusable entities apart when both were retrieved
//! - attribute configured titles to the right entity
//! - verify family relationships against the passage text
//! - reply with the fixed insufficiency sentence when the passages do not
//!   address the question
//!
//! Output is a pure function of the inputs.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::ranker::RankedPassage;
use crate::corpus::normalize_alias;

/// Two distinct people whose names are easily conflated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusablePair {
    pub first: String,
    pub second: String,
    /// Extra distinguishing fact repeated verbatim in the clause.
    #[serde(default)]
    pub note: Option<String>,
}

impl ConfusablePair {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// A title or honorific that belongs to exactly one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTitle {
    pub entity: String,
    pub title: String,
}

/// Fixed wording used around the retrieved context.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub persona: String,
    pub insufficient_message: String,
    pub entity_titles: Vec<EntityTitle>,
}

#[derive(Debug, Clone)]
pub struct GuardedPromptBuilder {
    template: PromptTemplate,
}

impl GuardedPromptBuilder {
    pub fn new(template: PromptTemplate) -> Self {
        Self { template }
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Assembles instructions, context and question into one prompt.
    pub fn build(
        &self,
        question: &str,
        passages: &[RankedPassage<'_>],
        confusable_pairs: &[ConfusablePair],
    ) -> String {
        let question = question.trim();
        let message = self.template.insufficient_message.trim();
        let mut prompt = String::new();

        let _ = writeln!(prompt, "{}", self.template.persona.trim());
        prompt.push('\n');

        if passages.is_empty() {
            let _ = writeln!(prompt, "NO CONTEXT AVAILABLE:");
            let _ = writeln!(
                prompt,
                "No source passages were found for this question. Do not answer from memory or general knowledge. Reply with exactly this sentence and nothing else: \"{}\"",
                message
            );
            prompt.push('\n');
            let _ = writeln!(prompt, "Question: {}", question);
            prompt.push('\n');
            prompt.push_str("Answer:");
            return prompt;
        }

        prompt.push_str("STRICT CONTEXT RULE:\n");
        prompt.push_str("Answer only from the numbered passages in the Context section. Do not add facts, names, dates or relationships that are not stated there. If the passages name a different person than the one asked about, do not transfer their facts.\n\n");

        let retrieved = retrieved_aliases(passages);

        let clauses = disambiguation_clauses(&retrieved, confusable_pairs);
        if !clauses.is_empty() {
            prompt.push_str("DISAMBIGUATION:\n");
            for clause in clauses {
                let _ = writeln!(prompt, "- {}", clause);
            }
            prompt.push('\n');
        }

        let titles = title_clauses(question, &retrieved, &self.template.entity_titles);
        if !titles.is_empty() {
            prompt.push_str("KNOWN TITLES:\n");
            for clause in titles {
                let _ = writeln!(prompt, "- {}", clause);
            }
            prompt.push('\n');
        }

        prompt.push_str("RELATIONSHIP CHECK:\n");
        prompt.push_str("When the question asks about a family relationship (father, mother, husband, spouse, son, daughter, child, brother, sister), find the exact relationship word in the passages and report only the name attached to it. Never confuse a father with a husband or a mother with a daughter. If the passages do not state the relationship, treat it as unknown.\n\n");

        prompt.push_str("INSUFFICIENT CONTEXT:\n");
        let _ = writeln!(
            prompt,
            "If the passages do not answer the question, reply with exactly this sentence and nothing else: \"{}\"",
            message
        );
        prompt.push('\n');

        prompt.push_str("Context:\n");
        for (position, passage) in passages.iter().enumerate() {
            let _ = writeln!(prompt, "[{}] {}", position + 1, passage_header(passage));
            let _ = writeln!(prompt, "{}", passage.record.text.trim());
            prompt.push('\n');
        }

        let _ = writeln!(prompt, "Question: {}", question);
        prompt.push('\n');
        prompt.push_str("Answer:");
        prompt
    }
}

fn passage_header(passage: &RankedPassage<'_>) -> String {
    let mut parts = Vec::new();
    if let Some(entity) = passage.record.entity.as_deref().filter(|e| !e.trim().is_empty()) {
        parts.push(format!("about: {}", entity.trim()));
    }
    if let Some(section) = passage.record.section.as_deref().filter(|s| !s.trim().is_empty()) {
        parts.push(format!("section: {}", section.trim()));
    }
    parts.push(format!("relevance: {:.2}", passage.score));
    format!("({})", parts.join(", "))
}

fn retrieved_aliases(passages: &[RankedPassage<'_>]) -> BTreeSet<String> {
    passages
        .iter()
        .flat_map(|passage| passage.record.alias_keys())
        .collect()
}

/// One clause per configured pair whose members were both retrieved.
fn disambiguation_clauses(retrieved: &BTreeSet<String>, pairs: &[ConfusablePair]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    pairs
        .iter()
        .filter(|pair| {
            retrieved.contains(&normalize_alias(&pair.first))
                && retrieved.contains(&normalize_alias(&pair.second))
        })
        .filter(|pair| {
            let mut key = [normalize_alias(&pair.first), normalize_alias(&pair.second)];
            key.sort();
            seen.insert(key)
        })
        .map(|pair| {
            let mut clause = format!(
                "\"{}\" and \"{}\" are two different people. Check the full name in the question and use only the facts stated for that person. Keep their lineage, marriages, children and titles separate and never merge their biographies.",
                pair.first.trim(),
                pair.second.trim()
            );
            if let Some(note) = pair.note.as_deref().filter(|n| !n.trim().is_empty()) {
                clause.push(' ');
                clause.push_str(note.trim());
            }
            clause
        })
        .collect()
}

fn title_clauses(question: &str, retrieved: &BTreeSet<String>, titles: &[EntityTitle]) -> Vec<String> {
    let question_key = normalize_alias(question);
    titles
        .iter()
        .filter(|entry| {
            retrieved.contains(&normalize_alias(&entry.entity))
                || question_key.contains(&normalize_alias(&entry.title))
        })
        .map(|entry| {
            format!(
                "The title \"{}\" refers to {}. Attribute anything asked about \"{}\" to {} only.",
                entry.title.trim(),
                entry.entity.trim(),
                entry.title.trim(),
                entry.entity.trim()
            )
        })
        .collect()
}
