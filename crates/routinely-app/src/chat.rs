// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::ids::BubbleId;
use crate::model::{ChatMessage, Product, Role};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful skincare expert. Only answer \
questions about skincare routines, products, and beauty advice. Use the full conversation \
history for context. If the user asks about something else, politely guide them back to \
skincare. When generating a routine, use the selected products and their categories as \
context and format each step as a short bullet point.";

pub const THINKING_MESSAGE: &str = "Thinking...";
pub const GENERATING_MESSAGE: &str = "Generating your personalized routine...";
pub const REPLY_FALLBACK: &str = "Unable to get response. Please try again.";
pub const ROUTINE_FALLBACK: &str = "Unable to generate routine. Please try again.";
pub const REPLY_ERROR: &str =
    "Error connecting to API. Make sure your network connection is working.";
pub const ROUTINE_ERROR: &str = "Error generating routine. Please check your network connection.";
pub const NO_SELECTION_MESSAGE: &str =
    "Please select at least one product before generating a routine!";
pub const UNRESOLVED_SELECTION_MESSAGE: &str = "Unable to load product data. Please try again.";

/// Messages sent to the completion endpoint. Starts with the system prompt
/// and only ever grows; every request carries all of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new(system_prompt: &str) -> Self {
        Self {
            messages: vec![ChatMessage::new(Role::System, system_prompt)],
        }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ChatMessage::new(role, content));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

}

impl Default for Transcript {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleKind {
    Message,
    Pending,
    Advisory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble {
    pub id: BubbleId,
    pub role: Role,
    pub text: String,
    pub kind: BubbleKind,
}

/// What the user sees in the chat pane. Diverges from the transcript: the
/// routine request shows a short label, and placeholders and advisories
/// never reach the endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatWindow {
    bubbles: Vec<Bubble>,
    next_id: u64,
}

impl ChatWindow {
    pub fn push(&mut self, role: Role, text: impl Into<String>, kind: BubbleKind) -> BubbleId {
        self.next_id += 1;
        let id = BubbleId::new(self.next_id);
        self.bubbles.push(Bubble {
            id,
            role,
            text: text.into(),
            kind,
        });
        id
    }

    pub fn remove(&mut self, id: BubbleId) -> bool {
        let before = self.bubbles.len();
        self.bubbles.retain(|bubble| bubble.id != id);
        self.bubbles.len() != before
    }

    pub fn bubbles(&self) -> &[Bubble] {
        &self.bubbles
    }

    pub fn is_empty(&self) -> bool {
        self.bubbles.is_empty()
    }
}

pub fn build_routine_prompt(products: &[&Product]) -> String {
    let listing = products
        .iter()
        .map(|product| {
            format!(
                "- {} ({}, {}): {}",
                product.name,
                product.brand,
                product.category,
                product.description.as_deref().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Based on these selected products, create a personalized skincare routine:\n\n\
         {listing}\n\n\
         Provide a clear, step-by-step routine with morning and evening steps as applicable."
    )
}

pub fn routine_request_label(count: usize) -> String {
    format!("Generate routine for {count} product(s)")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyBlock {
    List(Vec<String>),
    Paragraph(String),
    Break,
    /// Whole reply when it carries no bullets; one entry per source line.
    Lines(Vec<String>),
}

fn bullet_body(line: &str) -> Option<&str> {
    let rest = line.trim_start();
    let rest = rest.strip_prefix(['-', '*'])?;
    let mut chars = rest.chars();
    match chars.next() {
        Some(space) if space.is_whitespace() => Some(chars.as_str()),
        _ => None,
    }
}

/// Segments assistant text for display. Consecutive bullet lines form one
/// list, blank lines become breaks, anything else is a paragraph. Text
/// without any bullet line renders line-for-line.
pub fn format_reply(text: &str) -> Vec<ReplyBlock> {
    if !text.split('\n').any(|line| bullet_body(line).is_some()) {
        return vec![ReplyBlock::Lines(
            text.split('\n').map(str::to_owned).collect(),
        )];
    }

    let mut blocks = Vec::new();
    let mut items: Vec<String> = Vec::new();
    for line in text.split('\n') {
        if let Some(body) = bullet_body(line) {
            items.push(body.to_owned());
            continue;
        }
        if !items.is_empty() {
            blocks.push(ReplyBlock::List(std::mem::take(&mut items)));
        }
        if line.trim().is_empty() {
            blocks.push(ReplyBlock::Break);
        } else {
            blocks.push(ReplyBlock::Paragraph(line.to_owned()));
        }
    }
    if !items.is_empty() {
        blocks.push(ReplyBlock::List(items));
    }
    blocks
}
