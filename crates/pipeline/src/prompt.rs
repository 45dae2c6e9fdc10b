//! Prompt composition: system, context, history, question.

use smartseva_core::message::Message;
use smartseva_memory::Exchange;

/// The assistant's built-in identity and grounding rules.
pub const SYSTEM_PROMPT: &str = "\
You are SmartSeva, a helpful assistant designed to provide clear, reliable, and up-to-date \
information about Indian government services.

Your responsibilities:
- Answer user queries in a simple and natural way.
- Provide accurate information about government schemes and services, including eligibility \
criteria, required documents, application procedures, and processing times.
- Only respond when you have verified and accurate information. If the information is not \
available or unclear, politely say so.
- Do not guess, assume, or generate information. Never make up responses.
- Do not answer questions unrelated to Indian government services.

Important Guidelines:
- Use the provided context from documents to answer questions accurately
- If the context doesn't contain relevant information, clearly state that the information is \
not available in the knowledge base
- Maintain conversation continuity by referencing previous messages when relevant
- Always prioritize accuracy over completeness
- For follow-up questions, consider the full conversation history to provide contextually \
appropriate responses";

/// The four slots of a generation request.
#[derive(Debug, Clone)]
pub struct PromptSections<'a> {
    pub system: &'a str,
    pub context: &'a str,
    pub history: &'a [Exchange],
    pub question: &'a str,
}

impl PromptSections<'_> {
    /// Flatten into the message list sent to the provider.
    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() * 2 + 3);
        messages.push(Message::system(self.system));
        messages.push(Message::user(format!(
            "use this Context from official given documents to answer queries:\n{}",
            self.context
        )));
        for exchange in self.history {
            messages.push(Message::user(&exchange.input));
            messages.push(Message::assistant(&exchange.output));
        }
        messages.push(Message::user(format!("Current question: {}", self.question)));
        messages
    }
}
