//! Deterministic prompt assembly.
//!
//! The prompt is a pure function of the eligible drafts and the item's
//! context metadata: no hidden state, no randomness, no clock. Determinism is
//! required so any requested correction can be reproduced and audited later.

use serde_json::Value;

use pipeline::{ContentBlock, Prompt};

/// Context metadata carried into the prompt alongside the drafts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptContext {
    /// Vehicle the document is about (e.g. `"Chevrolet Onix 2025"`).
    pub vehicle: Option<String>,
    /// Category slug the item was selected under.
    pub category: Option<String>,
}

const INSTRUCTIONS: &str = "\
Você é um revisor de depoimentos de um portal automotivo.
Para cada depoimento abaixo, devolva UMA linha JSON com os campos
\"quote\", \"author\", \"vehicle\" e \"context\".
Corrija ortografia e pontuação sem alterar o sentido.
Não adicione comentários fora do JSON. Uma linha por depoimento, na mesma ordem.";

/// Builds the instruction payload for a set of eligible drafts.
///
/// Drafts are serialized in extraction order with their position, so the
/// response lines can be paired back positionally.
pub fn build(drafts: &[(usize, &ContentBlock)], context: &PromptContext) -> Prompt {
    let mut text = String::from(INSTRUCTIONS);
    text.push('\n');
    if let Some(vehicle) = &context.vehicle {
        text.push_str(&format!("\nVeículo: {vehicle}"));
    }
    if let Some(category) = &context.category {
        text.push_str(&format!("\nCategoria: {category}"));
    }
    text.push_str("\n\nDepoimentos:\n");
    for (index, block) in drafts {
        // Canonical JSON from serde_json is deterministic for a given Value.
        text.push_str(&format!("{index}: {}\n", block.content));
    }
    Prompt::new(text)
}

const GENERATION_INSTRUCTIONS: &str = "\
Você é um redator de um portal automotivo.
Escreva o conteúdo pedido no briefing abaixo como texto corrido, pronto para
publicação. Não adicione comentários fora do conteúdo.";

/// Builds the instruction payload for an input brief (the generation flow,
/// where the source document carries no block sequence).
///
/// Deterministic for the same brief and context, like [`build`].
pub fn build_generation(brief: &Value, context: &PromptContext) -> Prompt {
    let mut text = String::from(GENERATION_INSTRUCTIONS);
    text.push('\n');
    if let Some(vehicle) = &context.vehicle {
        text.push_str(&format!("\nVeículo: {vehicle}"));
    }
    if let Some(category) = &context.category {
        text.push_str(&format!("\nCategoria: {category}"));
    }
    text.push_str(&format!("\n\nBriefing:\n{brief}\n"));
    Prompt::new(text)
}
