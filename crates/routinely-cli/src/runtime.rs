// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use routinely_app::{ChatMessage, RequestId, Role, SelectionSet};
use routinely_db::Store;
use routinely_llm::{Client, Message};
use routinely_tui::InternalEvent;
use std::sync::mpsc::Sender;
use std::thread;

/// Backs the TUI with the SQLite store for selection persistence and the
/// chat-completion client for replies.
pub struct StoreRuntime<'a> {
    store: &'a Store,
    client: Client,
}

impl<'a> StoreRuntime<'a> {
    pub fn new(store: &'a Store, client: Client) -> Self {
        Self { store, client }
    }
}

fn to_llm_messages(messages: &[ChatMessage]) -> Vec<Message> {
    messages
        .iter()
        .map(|message| Message {
            role: match message.role {
                Role::System => routinely_llm::Role::System,
                Role::User => routinely_llm::Role::User,
                Role::Assistant => routinely_llm::Role::Assistant,
            },
            content: message.content.clone(),
        })
        .collect()
}

impl routinely_tui::AppRuntime for StoreRuntime<'_> {
    fn save_selection(&mut self, selection: &SelectionSet) -> Result<()> {
        self.store.save_selection(selection)
    }

    fn complete_chat(&mut self, messages: &[ChatMessage]) -> Result<Option<String>> {
        self.client.chat_complete(&to_llm_messages(messages))
    }

    fn spawn_chat(
        &mut self,
        request_id: RequestId,
        messages: &[ChatMessage],
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let client = self.client.clone();
        let messages = to_llm_messages(messages);
        thread::Builder::new()
            .name(format!("chat-{}", request_id.get()))
            .spawn(move || {
                let event = match client.chat_complete(&messages) {
                    Ok(content) => InternalEvent::ChatReply {
                        request_id,
                        content,
                    },
                    Err(error) => InternalEvent::ChatFailed {
                        request_id,
                        error: format!("{error:#}"),
                    },
                };
                let _ = tx.send(event);
            })
            .context("spawn chat request thread")?;
        Ok(())
    }
}
