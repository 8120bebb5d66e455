// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::chat::{
    BubbleKind, ChatWindow, GENERATING_MESSAGE, NO_SELECTION_MESSAGE, REPLY_ERROR, REPLY_FALLBACK,
    ROUTINE_ERROR, ROUTINE_FALLBACK, THINKING_MESSAGE, Transcript, UNRESOLVED_SELECTION_MESSAGE,
    build_routine_prompt, routine_request_label,
};
use crate::filter::ProductFilter;
use crate::ids::{BubbleId, ProductId, RequestId};
use crate::model::{Catalog, ChatMessage, Product, Role};
use crate::panel::{SelectionGroup, resolve_selection, selection_groups};
use crate::selection::SelectionSet;

pub const REQUEST_BUSY_STATUS: &str = "still waiting on the previous reply";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatFlow {
    Direct,
    Routine,
}

impl ChatFlow {
    const fn pending_text(self) -> &'static str {
        match self {
            Self::Direct => THINKING_MESSAGE,
            Self::Routine => GENERATING_MESSAGE,
        }
    }

    const fn fallback_text(self) -> &'static str {
        match self {
            Self::Direct => REPLY_FALLBACK,
            Self::Routine => ROUTINE_FALLBACK,
        }
    }

    const fn error_text(self) -> &'static str {
        match self {
            Self::Direct => REPLY_ERROR,
            Self::Routine => ROUTINE_ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub request_id: RequestId,
    pub placeholder: BubbleId,
    pub flow: ChatFlow,
}

/// One picker session: catalog, selection, filter, and conversation all live
/// here and change only through [`AppState::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    catalog: Catalog,
    selection: SelectionSet,
    filter: ProductFilter,
    transcript: Transcript,
    window: ChatWindow,
    in_flight: Option<InFlight>,
    next_request: u64,
    pub status_line: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    SetCategory(Option<String>),
    CycleCategory(isize),
    SetSearch(String),
    ToggleProduct(ProductId),
    RemoveSelected(ProductId),
    ClearSelection,
    SubmitMessage(String),
    GenerateRoutine,
    ReplyReceived {
        request_id: RequestId,
        content: Option<String>,
    },
    RequestFailed {
        request_id: RequestId,
        error: String,
    },
    SetStatus(String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    FilterChanged,
    ProductToggled { id: ProductId, selected: bool },
    SelectionRemoved(ProductId),
    SelectionCleared,
    /// The selection differs from what was last persisted.
    SelectionChanged,
    BubbleAdded(BubbleId),
    BubbleRemoved(BubbleId),
    RequestStarted(RequestId),
    RequestCompleted(RequestId),
    RequestFailed { request_id: RequestId, error: String },
    RequestRefused,
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn new(catalog: Catalog, selection: SelectionSet, system_prompt: &str) -> Self {
        Self {
            catalog,
            selection,
            filter: ProductFilter::default(),
            transcript: Transcript::new(system_prompt),
            window: ChatWindow::default(),
            in_flight: None,
            next_request: 0,
            status_line: None,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn filter(&self) -> &ProductFilter {
        &self.filter
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn window(&self) -> &ChatWindow {
        &self.window
    }

    pub fn in_flight(&self) -> Option<InFlight> {
        self.in_flight
    }

    pub fn visible_products(&self) -> Vec<&Product> {
        self.filter.apply(&self.catalog)
    }

    pub fn is_visible(&self, id: &ProductId) -> bool {
        self.catalog
            .get(id)
            .is_some_and(|product| self.filter.matches(product))
    }

    pub fn selection_groups(&self) -> Vec<SelectionGroup<'_>> {
        selection_groups(&self.catalog, &self.selection)
    }

    /// Messages for the request currently in flight.
    pub fn outbound_messages(&self) -> Vec<ChatMessage> {
        self.transcript.messages().to_vec()
    }

    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::SetCategory(category) => {
                self.filter.category = category.filter(|c| !c.is_empty());
                vec![AppEvent::FilterChanged]
            }
            AppCommand::CycleCategory(delta) => self.rotate_category(delta),
            AppCommand::SetSearch(search) => {
                self.filter.search = search;
                vec![AppEvent::FilterChanged]
            }
            AppCommand::ToggleProduct(id) => {
                let selected = self.selection.toggle(id.clone());
                vec![
                    AppEvent::ProductToggled { id, selected },
                    AppEvent::SelectionChanged,
                ]
            }
            AppCommand::RemoveSelected(id) => self.remove_selected(id),
            AppCommand::ClearSelection => {
                if self.selection.is_empty() {
                    return Vec::new();
                }
                self.selection.clear();
                vec![AppEvent::SelectionCleared, AppEvent::SelectionChanged]
            }
            AppCommand::SubmitMessage(text) => self.submit_message(text),
            AppCommand::GenerateRoutine => self.generate_routine(),
            AppCommand::ReplyReceived {
                request_id,
                content,
            } => self.resolve_reply(request_id, content),
            AppCommand::RequestFailed { request_id, error } => {
                self.fail_request(request_id, error)
            }
            AppCommand::SetStatus(message) => vec![self.set_status(&message)],
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    fn rotate_category(&mut self, delta: isize) -> Vec<AppEvent> {
        let mut options: Vec<Option<String>> = vec![None];
        options.extend(
            self.catalog
                .categories()
                .into_iter()
                .map(|category| Some(category.to_owned())),
        );
        let current = options
            .iter()
            .position(|option| *option == self.filter.category)
            .unwrap_or(0) as isize;
        let len = options.len() as isize;
        let next = (current + delta).rem_euclid(len) as usize;
        self.filter.category = options.swap_remove(next);
        vec![AppEvent::FilterChanged]
    }

    fn remove_selected(&mut self, id: ProductId) -> Vec<AppEvent> {
        if !self.selection.contains(&id) {
            return Vec::new();
        }
        if self.is_visible(&id) {
            // Same path as activating the card so the grid marker stays in sync.
            return self.dispatch(AppCommand::ToggleProduct(id));
        }
        self.selection.remove(&id);
        vec![AppEvent::SelectionRemoved(id), AppEvent::SelectionChanged]
    }

    fn submit_message(&mut self, text: String) -> Vec<AppEvent> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        if self.in_flight.is_some() {
            return vec![AppEvent::RequestRefused, self.set_status(REQUEST_BUSY_STATUS)];
        }

        let bubble = self.window.push(Role::User, text, BubbleKind::Message);
        self.transcript.push(Role::User, text);
        let mut events = vec![AppEvent::BubbleAdded(bubble)];
        events.extend(self.start_request(ChatFlow::Direct));
        events
    }

    fn generate_routine(&mut self) -> Vec<AppEvent> {
        if self.selection.is_empty() {
            return vec![self.advise(NO_SELECTION_MESSAGE)];
        }
        let products = resolve_selection(&self.catalog, &self.selection);
        if products.is_empty() {
            return vec![self.advise(UNRESOLVED_SELECTION_MESSAGE)];
        }
        if self.in_flight.is_some() {
            return vec![AppEvent::RequestRefused, self.set_status(REQUEST_BUSY_STATUS)];
        }

        let prompt = build_routine_prompt(&products);
        let label = routine_request_label(products.len());
        let bubble = self.window.push(Role::User, label, BubbleKind::Message);
        self.transcript.push(Role::User, prompt);
        let mut events = vec![AppEvent::BubbleAdded(bubble)];
        events.extend(self.start_request(ChatFlow::Routine));
        events
    }

    fn start_request(&mut self, flow: ChatFlow) -> Vec<AppEvent> {
        self.next_request += 1;
        let request_id = RequestId::new(self.next_request);
        let placeholder = self
            .window
            .push(Role::Assistant, flow.pending_text(), BubbleKind::Pending);
        self.in_flight = Some(InFlight {
            request_id,
            placeholder,
            flow,
        });
        vec![
            AppEvent::BubbleAdded(placeholder),
            AppEvent::RequestStarted(request_id),
        ]
    }

    fn take_in_flight(&mut self, request_id: RequestId) -> Option<InFlight> {
        match self.in_flight {
            Some(current) if current.request_id == request_id => self.in_flight.take(),
            _ => None,
        }
    }

    fn resolve_reply(&mut self, request_id: RequestId, content: Option<String>) -> Vec<AppEvent> {
        let Some(request) = self.take_in_flight(request_id) else {
            return Vec::new();
        };
        self.window.remove(request.placeholder);
        let reply = content.unwrap_or_else(|| request.flow.fallback_text().to_owned());
        let bubble = self
            .window
            .push(Role::Assistant, reply.clone(), BubbleKind::Message);
        self.transcript.push(Role::Assistant, reply);
        vec![
            AppEvent::BubbleRemoved(request.placeholder),
            AppEvent::BubbleAdded(bubble),
            AppEvent::RequestCompleted(request_id),
        ]
    }

    fn fail_request(&mut self, request_id: RequestId, error: String) -> Vec<AppEvent> {
        let Some(request) = self.take_in_flight(request_id) else {
            return Vec::new();
        };
        self.window.remove(request.placeholder);
        let bubble = self.window.push(
            Role::Assistant,
            request.flow.error_text(),
            BubbleKind::Advisory,
        );
        vec![
            AppEvent::BubbleRemoved(request.placeholder),
            AppEvent::BubbleAdded(bubble),
            AppEvent::RequestFailed { request_id, error },
        ]
    }

    fn advise(&mut self, message: &str) -> AppEvent {
        AppEvent::BubbleAdded(
            self.window
                .push(Role::Assistant, message, BubbleKind::Advisory),
        )
    }

    fn set_status(&mut self, message: &str) -> AppEvent {
        self.status_line = Some(message.to_owned());
        AppEvent::StatusUpdated(message.to_owned())
    }
}
