// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use routinely_app::{
    AppCommand, AppEvent, AppState, BubbleKind, ChatMessage, EMPTY_SELECTION_HINT,
    EMPTY_SELECTION_MESSAGE, Product, ProductId, ReplyBlock, RequestId, Role, SelectionSet,
    category_label, format_reply,
};
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

/// Length of the overlay exit styling.
pub const OVERLAY_TRANSITION: Duration = Duration::from_millis(300);
/// Delay between dismissing the detail overlay and removing it. Must outlast
/// [`OVERLAY_TRANSITION`].
pub const OVERLAY_CLOSE_DELAY: Duration = Duration::from_millis(350);

const _: () = assert!(OVERLAY_CLOSE_DELAY.as_millis() > OVERLAY_TRANSITION.as_millis());

const STATUS_CLEAR_DELAY: Duration = Duration::from_secs(4);
const PAGE_ROWS: isize = 10;
const SELECTED_MARK: &str = "[x]";
const UNSELECTED_MARK: &str = "[ ]";
const DETAILS_LABEL: &str = "[details]";
const CLOSE_LABEL: &str = "[x]";
const REMOVE_LABEL: &str = "[remove]";
const CLEAR_ALL_LABEL: &str = "[clear all]";
const NO_MATCHES_MESSAGE: &str = "No products match the current filter";
const CHAT_GREETING: &str =
    "Ask about skincare, or press ctrl+g to build a routine from your selection.";

pub trait AppRuntime {
    fn save_selection(&mut self, selection: &SelectionSet) -> Result<()>;
    fn complete_chat(&mut self, messages: &[ChatMessage]) -> Result<Option<String>>;
    /// Runs one chat request and reports the outcome on `tx`. The default
    /// blocks; runtimes backed by a network client should override it.
    fn spawn_chat(
        &mut self,
        request_id: RequestId,
        messages: &[ChatMessage],
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let event = match self.complete_chat(messages) {
            Ok(content) => InternalEvent::ChatReply {
                request_id,
                content,
            },
            Err(error) => InternalEvent::ChatFailed {
                request_id,
                error: format!("{error:#}"),
            },
        };
        tx.send(event)
            .map_err(|_| anyhow!("chat event channel closed"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    ClearStatus {
        token: u64,
    },
    ChatReply {
        request_id: RequestId,
        content: Option<String>,
    },
    ChatFailed {
        request_id: RequestId,
        error: String,
    },
    OverlayExpired {
        token: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Pane {
    Search,
    #[default]
    Products,
    Selection,
    Chat,
}

impl Pane {
    const ALL: [Self; 4] = [Self::Search, Self::Products, Self::Selection, Self::Chat];

    const fn label(self) -> &'static str {
        match self {
            Self::Search => "SEARCH",
            Self::Products => "PRODUCTS",
            Self::Selection => "SELECTION",
            Self::Chat => "CHAT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverlayPhase {
    Open,
    Closing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DetailOverlay {
    product_id: ProductId,
    phase: OverlayPhase,
    token: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PanelEntry {
    Remove(ProductId),
    ClearAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PanelLine {
    text: String,
    entry: Option<PanelEntry>,
}

/// Screen regions from the last layout pass. Drawing and mouse hit-testing
/// both read these so a click always lands where the user saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct ScreenAreas {
    category: Rect,
    search: Rect,
    grid: Rect,
    panel: Rect,
    chat: Rect,
    input: Rect,
    status: Rect,
    overlay: Rect,
    close: Rect,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ViewData {
    focus: Pane,
    grid_cursor: usize,
    panel_cursor: usize,
    chat_input: String,
    detail: Option<DetailOverlay>,
    help_visible: bool,
    areas: ScreenAreas,
    status_token: u64,
    overlay_token: u64,
}

pub fn run_app<R: AppRuntime>(state: &mut AppState, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen, EnableMouseCapture)
        .context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let result = event_loop(&mut terminal, state, runtime);

    disable_raw_mode().context("disable raw mode")?;
    execute!(
        io::stdout(),
        DisableMouseCapture,
        terminal::LeaveAlternateScreen
    )
    .context("leave alternate screen")?;
    result
}

fn event_loop<R: AppRuntime>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: &mut AppState,
    runtime: &mut R,
) -> Result<()> {
    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();

    loop {
        process_internal_events(state, runtime, &mut view_data, &internal_tx, &internal_rx);

        let size = terminal.size().context("read terminal size")?;
        view_data.areas = screen_areas(Rect::new(0, 0, size.width, size.height));
        terminal
            .draw(|frame| render(frame, state, &view_data))
            .context("draw frame")?;

        if !event::poll(Duration::from_millis(120)).context("poll event")? {
            continue;
        }
        match event::read().context("read event")? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                    return Ok(());
                }
            }
            Event::Mouse(mouse) => {
                handle_mouse_event(state, runtime, &mut view_data, &internal_tx, mouse);
            }
            _ => {}
        }
    }
}

fn process_internal_events<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        handle_internal_event(state, runtime, view_data, tx, event);
    }
}

fn handle_internal_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    event: InternalEvent,
) {
    match event {
        InternalEvent::ClearStatus { token } if token == view_data.status_token => {
            state.dispatch(AppCommand::ClearStatus);
        }
        InternalEvent::ClearStatus { .. } => {}
        InternalEvent::ChatReply {
            request_id,
            content,
        } => dispatch_and_apply(
            state,
            runtime,
            view_data,
            tx,
            AppCommand::ReplyReceived {
                request_id,
                content,
            },
        ),
        InternalEvent::ChatFailed { request_id, error } => dispatch_and_apply(
            state,
            runtime,
            view_data,
            tx,
            AppCommand::RequestFailed { request_id, error },
        ),
        InternalEvent::OverlayExpired { token } => {
            if view_data
                .detail
                .as_ref()
                .is_some_and(|detail| detail.token == token && detail.phase == OverlayPhase::Closing)
            {
                view_data.detail = None;
                tracing::trace!(token, "detail overlay removed");
            }
        }
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_DELAY);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn schedule_overlay_removal(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(OVERLAY_CLOSE_DELAY);
        let _ = sender.send(InternalEvent::OverlayExpired { token });
    });
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.dispatch(AppCommand::SetStatus(message.into()));
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn dispatch_and_apply<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    command: AppCommand,
) {
    let events = state.dispatch(command);
    apply_events(state, runtime, view_data, internal_tx, events);
}

fn apply_events<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    events: Vec<AppEvent>,
) {
    for event in events {
        match event {
            AppEvent::FilterChanged => clamp_grid_cursor(state, view_data),
            AppEvent::SelectionChanged => {
                clamp_panel_cursor(state, view_data);
                if let Err(error) = runtime.save_selection(state.selection()) {
                    tracing::error!(error = %format!("{error:#}"), "saving selection failed");
                    emit_status(
                        state,
                        view_data,
                        internal_tx,
                        format!("selection not saved: {error}; check the database path"),
                    );
                }
            }
            AppEvent::RequestStarted(request_id) => {
                tracing::debug!(request = request_id.get(), "chat request started");
                let messages = state.outbound_messages();
                if let Err(error) =
                    runtime.spawn_chat(request_id, &messages, internal_tx.clone())
                {
                    let events = state.dispatch(AppCommand::RequestFailed {
                        request_id,
                        error: format!("{error:#}"),
                    });
                    apply_events(state, runtime, view_data, internal_tx, events);
                }
            }
            AppEvent::RequestCompleted(request_id) => {
                tracing::debug!(request = request_id.get(), "chat request completed");
            }
            AppEvent::RequestFailed { request_id, error } => {
                tracing::error!(request = request_id.get(), %error, "chat request failed");
            }
            AppEvent::StatusUpdated(_) => {
                view_data.status_token = view_data.status_token.saturating_add(1);
                schedule_status_clear(internal_tx, view_data.status_token);
            }
            AppEvent::ProductToggled { .. }
            | AppEvent::SelectionRemoved(_)
            | AppEvent::SelectionCleared
            | AppEvent::BubbleAdded(_)
            | AppEvent::BubbleRemoved(_)
            | AppEvent::RequestRefused
            | AppEvent::StatusCleared => {}
        }
    }
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && key.code == KeyCode::Char('q') {
        return true;
    }

    if view_data.detail.is_some() {
        if matches!(
            key.code,
            KeyCode::Esc | KeyCode::Char('x') | KeyCode::Char('q')
        ) {
            dismiss_detail(view_data, internal_tx);
        }
        return false;
    }

    if view_data.help_visible {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?')) {
            view_data.help_visible = false;
        }
        return false;
    }

    if ctrl && key.code == KeyCode::Char('g') {
        dispatch_and_apply(
            state,
            runtime,
            view_data,
            internal_tx,
            AppCommand::GenerateRoutine,
        );
        return false;
    }

    match key.code {
        KeyCode::Tab => cycle_focus(view_data, 1),
        KeyCode::BackTab => cycle_focus(view_data, -1),
        _ => match view_data.focus {
            Pane::Products => handle_products_key(state, runtime, view_data, internal_tx, key),
            Pane::Search => handle_search_key(state, runtime, view_data, internal_tx, key),
            Pane::Selection => handle_selection_key(state, runtime, view_data, internal_tx, key),
            Pane::Chat => handle_chat_key(state, runtime, view_data, internal_tx, key),
        },
    }
    false
}

fn handle_products_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let command = match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            move_grid_cursor(state, view_data, 1);
            None
        }
        KeyCode::Char('k') | KeyCode::Up => {
            move_grid_cursor(state, view_data, -1);
            None
        }
        KeyCode::PageDown => {
            move_grid_cursor(state, view_data, PAGE_ROWS);
            None
        }
        KeyCode::PageUp => {
            move_grid_cursor(state, view_data, -PAGE_ROWS);
            None
        }
        KeyCode::Home => {
            view_data.grid_cursor = 0;
            None
        }
        KeyCode::End => {
            view_data.grid_cursor = state.visible_products().len().saturating_sub(1);
            None
        }
        KeyCode::Enter | KeyCode::Char(' ') => {
            cursor_product_id(state, view_data).map(AppCommand::ToggleProduct)
        }
        KeyCode::Char('i') => {
            if let Some(id) = cursor_product_id(state, view_data) {
                open_detail(view_data, id);
            }
            None
        }
        KeyCode::Char('c') => Some(AppCommand::CycleCategory(1)),
        KeyCode::Char('C') => Some(AppCommand::CycleCategory(-1)),
        KeyCode::Char('a') => Some(AppCommand::SetCategory(None)),
        KeyCode::Char('/') => {
            view_data.focus = Pane::Search;
            None
        }
        KeyCode::Char('g') => Some(AppCommand::GenerateRoutine),
        KeyCode::Char('?') => {
            view_data.help_visible = true;
            None
        }
        _ => None,
    };
    if let Some(command) = command {
        dispatch_and_apply(state, runtime, view_data, internal_tx, command);
    }
}

fn handle_search_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let mut search = state.filter().search.clone();
    match key.code {
        KeyCode::Esc | KeyCode::Enter | KeyCode::Down => {
            view_data.focus = Pane::Products;
            return;
        }
        KeyCode::Backspace => {
            if search.pop().is_none() {
                return;
            }
        }
        KeyCode::Char('u') if ctrl => search.clear(),
        KeyCode::Char(ch) if !ctrl => search.push(ch),
        _ => return,
    }
    dispatch_and_apply(
        state,
        runtime,
        view_data,
        internal_tx,
        AppCommand::SetSearch(search),
    );
}

fn handle_selection_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => move_panel_cursor(state, view_data, 1),
        KeyCode::Char('k') | KeyCode::Up => move_panel_cursor(state, view_data, -1),
        KeyCode::Enter | KeyCode::Char('x') | KeyCode::Char('d') | KeyCode::Delete => {
            if let Some(entry) = panel_entries(state).get(view_data.panel_cursor).cloned() {
                activate_panel_entry(state, runtime, view_data, internal_tx, entry);
            }
        }
        KeyCode::Char('X') => {
            if !state.selection_groups().is_empty() {
                activate_panel_entry(state, runtime, view_data, internal_tx, PanelEntry::ClearAll);
            }
        }
        KeyCode::Char('g') => dispatch_and_apply(
            state,
            runtime,
            view_data,
            internal_tx,
            AppCommand::GenerateRoutine,
        ),
        KeyCode::Char('?') => view_data.help_visible = true,
        KeyCode::Esc => view_data.focus = Pane::Products,
        _ => {}
    }
}

fn handle_chat_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => view_data.focus = Pane::Products,
        KeyCode::Enter => submit_chat_input(state, runtime, view_data, internal_tx),
        KeyCode::Backspace => {
            view_data.chat_input.pop();
        }
        KeyCode::Char('u') if ctrl => view_data.chat_input.clear(),
        KeyCode::Char(ch) if !ctrl => view_data.chat_input.push(ch),
        _ => {}
    }
}

fn submit_chat_input<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let events = state.dispatch(AppCommand::SubmitMessage(view_data.chat_input.clone()));
    // A refused submission keeps its text so it can be resent.
    if events
        .iter()
        .any(|event| matches!(event, AppEvent::RequestStarted(_)))
    {
        view_data.chat_input.clear();
    }
    apply_events(state, runtime, view_data, internal_tx, events);
}

fn activate_panel_entry<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    entry: PanelEntry,
) {
    let command = match entry {
        PanelEntry::Remove(id) => AppCommand::RemoveSelected(id),
        PanelEntry::ClearAll => AppCommand::ClearSelection,
    };
    dispatch_and_apply(state, runtime, view_data, internal_tx, command);
}

fn handle_mouse_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    mouse: MouseEvent,
) {
    let (column, row) = (mouse.column, mouse.row);
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            handle_click(state, runtime, view_data, internal_tx, column, row);
        }
        MouseEventKind::ScrollDown if view_data.detail.is_none() => {
            if hit(view_data.areas.grid, column, row) {
                move_grid_cursor(state, view_data, 1);
            } else if hit(view_data.areas.panel, column, row) {
                move_panel_cursor(state, view_data, 1);
            }
        }
        MouseEventKind::ScrollUp if view_data.detail.is_none() => {
            if hit(view_data.areas.grid, column, row) {
                move_grid_cursor(state, view_data, -1);
            } else if hit(view_data.areas.panel, column, row) {
                move_panel_cursor(state, view_data, -1);
            }
        }
        _ => {}
    }
}

fn handle_click<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    column: u16,
    row: u16,
) {
    let areas = view_data.areas;
    if view_data.detail.is_some() {
        if hit(areas.close, column, row) || !hit(areas.overlay, column, row) {
            dismiss_detail(view_data, internal_tx);
        }
        return;
    }
    if view_data.help_visible {
        view_data.help_visible = false;
        return;
    }

    if hit(areas.category, column, row) {
        dispatch_and_apply(
            state,
            runtime,
            view_data,
            internal_tx,
            AppCommand::CycleCategory(1),
        );
    } else if hit(areas.search, column, row) {
        view_data.focus = Pane::Search;
    } else if hit(areas.grid, column, row) {
        click_grid(state, runtime, view_data, internal_tx, column, row);
    } else if hit(areas.panel, column, row) {
        click_panel(state, runtime, view_data, internal_tx, column, row);
    } else if hit(areas.chat, column, row) || hit(areas.input, column, row) {
        view_data.focus = Pane::Chat;
    }
}

fn click_grid<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    column: u16,
    row: u16,
) {
    view_data.focus = Pane::Products;
    let grid = view_data.areas.grid;
    let first_row = grid.y.saturating_add(2);
    let last_row = grid.y.saturating_add(grid.height).saturating_sub(1);
    if row < first_row || row >= last_row {
        return;
    }

    let offset = scroll_offset(view_data.grid_cursor, grid_visible_rows(grid));
    let index = offset + usize::from(row - first_row);
    let Some(id) = state
        .visible_products()
        .get(index)
        .map(|product| product.id.clone())
    else {
        return;
    };
    view_data.grid_cursor = index;

    if column >= details_column_start(grid) {
        open_detail(view_data, id);
    } else {
        dispatch_and_apply(
            state,
            runtime,
            view_data,
            internal_tx,
            AppCommand::ToggleProduct(id),
        );
    }
}

fn click_panel<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    column: u16,
    row: u16,
) {
    view_data.focus = Pane::Selection;
    let panel = view_data.areas.panel;
    let first_row = panel.y.saturating_add(1);
    if row < first_row {
        return;
    }

    let lines = panel_lines(state);
    let offset = scroll_offset(
        panel_cursor_line(&lines, view_data.panel_cursor),
        panel_visible_rows(panel),
    );
    let index = offset + usize::from(row - first_row);
    let Some(line) = lines.get(index) else {
        return;
    };
    let Some(entry) = line.entry.clone() else {
        return;
    };
    if let Some(position) = lines[..=index]
        .iter()
        .filter(|line| line.entry.is_some())
        .count()
        .checked_sub(1)
    {
        view_data.panel_cursor = position;
    }

    let text_start = panel.x.saturating_add(1);
    let label = match entry {
        PanelEntry::Remove(_) => REMOVE_LABEL,
        PanelEntry::ClearAll => CLEAR_ALL_LABEL,
    };
    let line_width = line.text.chars().count() as u16;
    let label_start = text_start + line_width.saturating_sub(label.chars().count() as u16);
    if column >= label_start && column < text_start + line_width {
        activate_panel_entry(state, runtime, view_data, internal_tx, entry);
    }
}

fn hit(area: Rect, column: u16, row: u16) -> bool {
    column >= area.x
        && column < area.x.saturating_add(area.width)
        && row >= area.y
        && row < area.y.saturating_add(area.height)
}

fn open_detail(view_data: &mut ViewData, product_id: ProductId) {
    view_data.overlay_token = view_data.overlay_token.saturating_add(1);
    tracing::debug!(product = %product_id, token = view_data.overlay_token, "detail overlay opened");
    view_data.detail = Some(DetailOverlay {
        product_id,
        phase: OverlayPhase::Open,
        token: view_data.overlay_token,
    });
}

fn dismiss_detail(view_data: &mut ViewData, internal_tx: &Sender<InternalEvent>) {
    if let Some(detail) = view_data.detail.as_mut()
        && detail.phase == OverlayPhase::Open
    {
        detail.phase = OverlayPhase::Closing;
        schedule_overlay_removal(internal_tx, detail.token);
    }
}

fn cycle_focus(view_data: &mut ViewData, delta: isize) {
    let current = Pane::ALL
        .iter()
        .position(|pane| *pane == view_data.focus)
        .unwrap_or(0) as isize;
    let len = Pane::ALL.len() as isize;
    view_data.focus = Pane::ALL[(current + delta).rem_euclid(len) as usize];
}

fn cursor_product_id(state: &AppState, view_data: &ViewData) -> Option<ProductId> {
    state
        .visible_products()
        .get(view_data.grid_cursor)
        .map(|product| product.id.clone())
}

fn move_cursor(cursor: usize, len: usize, delta: isize) -> usize {
    if len == 0 {
        return 0;
    }
    let next = (cursor as isize).saturating_add(delta);
    next.clamp(0, len as isize - 1) as usize
}

fn move_grid_cursor(state: &AppState, view_data: &mut ViewData, delta: isize) {
    let len = state.visible_products().len();
    view_data.grid_cursor = move_cursor(view_data.grid_cursor, len, delta);
}

fn move_panel_cursor(state: &AppState, view_data: &mut ViewData, delta: isize) {
    let len = panel_entries(state).len();
    view_data.panel_cursor = move_cursor(view_data.panel_cursor, len, delta);
}

fn clamp_grid_cursor(state: &AppState, view_data: &mut ViewData) {
    move_grid_cursor(state, view_data, 0);
}

fn clamp_panel_cursor(state: &AppState, view_data: &mut ViewData) {
    move_panel_cursor(state, view_data, 0);
}

fn scroll_offset(cursor: usize, visible_rows: usize) -> usize {
    if visible_rows == 0 {
        return 0;
    }
    cursor.saturating_sub(visible_rows - 1)
}

fn screen_areas(area: Rect) -> ScreenAreas {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(12),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(area);
    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[0]);
    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(rows[1]);

    let overlay = centered_rect(60, 60, area);
    let close = Rect::new(
        overlay.x + overlay.width.saturating_sub(4),
        overlay.y,
        overlay.width.min(3),
        overlay.height.min(1),
    );

    ScreenAreas {
        category: top[0],
        search: top[1],
        grid: body[0],
        panel: body[1],
        chat: rows[2],
        input: rows[3],
        status: rows[4],
        overlay,
        close,
    }
}

fn grid_visible_rows(grid: Rect) -> usize {
    usize::from(grid.height.saturating_sub(3))
}

fn panel_visible_rows(panel: Rect) -> usize {
    usize::from(panel.height.saturating_sub(2))
}

fn details_column_start(grid: Rect) -> u16 {
    (grid.x + grid.width).saturating_sub(1 + DETAILS_LABEL.len() as u16)
}

struct GridColumns {
    name: usize,
    brand: usize,
    category: usize,
}

fn grid_columns(inner_width: usize) -> GridColumns {
    let fixed = SELECTED_MARK.len() + DETAILS_LABEL.len() + 4;
    let available = inner_width.saturating_sub(fixed);
    let name = available / 2;
    let brand = available / 4;
    GridColumns {
        name,
        brand,
        category: available - name - brand,
    }
}

fn grid_header_text(inner_width: usize) -> String {
    let columns = grid_columns(inner_width);
    format!(
        "{:<mark$} {:<name$} {:<brand$} {:<category$}",
        "",
        "name",
        "brand",
        "category",
        mark = SELECTED_MARK.len(),
        name = columns.name,
        brand = columns.brand,
        category = columns.category,
    )
}

fn grid_row_text(product: &Product, selected: bool, inner_width: usize) -> String {
    let columns = grid_columns(inner_width);
    let marker = if selected {
        SELECTED_MARK
    } else {
        UNSELECTED_MARK
    };
    format!(
        "{marker} {:<name$} {:<brand$} {:<category$} {DETAILS_LABEL}",
        fit(&product.name, columns.name),
        fit(&product.brand, columns.brand),
        fit(&category_label(&product.category), columns.category),
        name = columns.name,
        brand = columns.brand,
        category = columns.category,
    )
}

fn fit(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_owned()
    } else {
        truncate_label(value, width.saturating_sub(1))
    }
}

fn truncate_label(value: &str, max_chars: usize) -> String {
    let mut chars = value.chars();
    let truncated: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{truncated}…")
    } else {
        truncated
    }
}

fn panel_lines(state: &AppState) -> Vec<PanelLine> {
    let groups = state.selection_groups();
    if groups.is_empty() {
        return [EMPTY_SELECTION_MESSAGE, EMPTY_SELECTION_HINT]
            .into_iter()
            .map(|text| PanelLine {
                text: text.to_owned(),
                entry: None,
            })
            .collect();
    }

    let mut lines = Vec::new();
    for group in &groups {
        lines.push(PanelLine {
            text: category_label(group.category),
            entry: None,
        });
        for product in &group.products {
            lines.push(PanelLine {
                text: format!("  {} ({}) {REMOVE_LABEL}", product.name, product.brand),
                entry: Some(PanelEntry::Remove(product.id.clone())),
            });
        }
        lines.push(PanelLine {
            text: String::new(),
            entry: None,
        });
    }
    lines.push(PanelLine {
        text: CLEAR_ALL_LABEL.to_owned(),
        entry: Some(PanelEntry::ClearAll),
    });
    lines
}

fn panel_entries(state: &AppState) -> Vec<PanelEntry> {
    panel_lines(state)
        .into_iter()
        .filter_map(|line| line.entry)
        .collect()
}

fn panel_cursor_line(lines: &[PanelLine], cursor: usize) -> usize {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.entry.is_some())
        .nth(cursor)
        .map_or(0, |(index, _)| index)
}

fn reply_lines(text: &str) -> Vec<String> {
    format_reply(text)
        .into_iter()
        .flat_map(|block| match block {
            ReplyBlock::List(items) => items.into_iter().map(|item| format!("• {item}")).collect(),
            ReplyBlock::Paragraph(text) => vec![text],
            ReplyBlock::Break => vec![String::new()],
            ReplyBlock::Lines(lines) => lines,
        })
        .collect()
}

fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 || text.chars().count() <= width {
        return vec![text.to_owned()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
        while current.chars().count() > width {
            let head: String = current.chars().take(width).collect();
            let tail: String = current.chars().skip(width).collect();
            lines.push(head);
            current = tail;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn chat_lines(state: &AppState, width: usize) -> Vec<(String, Style)> {
    let mut lines = Vec::new();
    for bubble in state.window().bubbles() {
        let (label, style) = match (bubble.role, bubble.kind) {
            (_, BubbleKind::Pending) => (
                "assistant",
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            ),
            (_, BubbleKind::Advisory) => ("notice", Style::default().fg(Color::Yellow)),
            (Role::User, BubbleKind::Message) => ("you", Style::default().fg(Color::Cyan)),
            (_, BubbleKind::Message) => ("assistant", Style::default()),
        };
        lines.push((format!("{label}:"), style.add_modifier(Modifier::BOLD)));

        let body = if bubble.role == Role::Assistant && bubble.kind == BubbleKind::Message {
            reply_lines(&bubble.text)
        } else {
            bubble.text.split('\n').map(str::to_owned).collect()
        };
        for line in body {
            for wrapped in wrap_text(&line, width.saturating_sub(2)) {
                lines.push((format!("  {wrapped}"), style));
            }
        }
        lines.push((String::new(), Style::default()));
    }
    lines
}

fn focus_style(view_data: &ViewData, pane: Pane) -> Style {
    if view_data.focus == pane && view_data.detail.is_none() {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    }
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let areas = view_data.areas;

    let category = state
        .filter()
        .category
        .as_deref()
        .map_or_else(|| "All".to_owned(), category_label);
    let category_widget = Paragraph::new(format!("{category}  (c/C)")).block(
        Block::default()
            .title("category")
            .borders(Borders::ALL)
            .border_style(focus_style(view_data, Pane::Products)),
    );
    frame.render_widget(category_widget, areas.category);

    let mut search = state.filter().search.clone();
    if view_data.focus == Pane::Search {
        search.push('▏');
    }
    let search_widget = Paragraph::new(search).block(
        Block::default()
            .title("search")
            .borders(Borders::ALL)
            .border_style(focus_style(view_data, Pane::Search)),
    );
    frame.render_widget(search_widget, areas.search);

    render_grid(frame, areas.grid, state, view_data);
    render_panel(frame, areas.panel, state, view_data);
    render_chat(frame, areas.chat, state, view_data);

    let mut input = view_data.chat_input.clone();
    if view_data.focus == Pane::Chat {
        input.push('▏');
    }
    let input_widget = Paragraph::new(input).block(
        Block::default()
            .title("message (enter to send)")
            .borders(Borders::ALL)
            .border_style(focus_style(view_data, Pane::Chat)),
    );
    frame.render_widget(input_widget, areas.input);

    let status = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow));
    frame.render_widget(status, areas.status);

    if let Some(detail) = &view_data.detail {
        render_detail_overlay(frame, areas, state, detail);
    }

    if view_data.help_visible {
        let area = centered_rect(70, 50, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn render_grid(frame: &mut ratatui::Frame<'_>, area: Rect, state: &AppState, view_data: &ViewData) {
    let products = state.visible_products();
    let inner_width = usize::from(area.width.saturating_sub(2));
    let visible_rows = grid_visible_rows(area);
    let offset = scroll_offset(view_data.grid_cursor, visible_rows);

    let mut lines = vec![Line::styled(
        grid_header_text(inner_width),
        Style::default().add_modifier(Modifier::BOLD),
    )];
    if products.is_empty() {
        lines.push(Line::styled(
            NO_MATCHES_MESSAGE,
            Style::default().fg(Color::DarkGray),
        ));
    }
    for (index, product) in products
        .iter()
        .enumerate()
        .skip(offset)
        .take(visible_rows)
    {
        let selected = state.selection().contains(&product.id);
        let mut style = if selected {
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        if index == view_data.grid_cursor && view_data.focus == Pane::Products {
            style = style.add_modifier(Modifier::REVERSED);
        }
        lines.push(Line::styled(
            grid_row_text(product, selected, inner_width),
            style,
        ));
    }

    let mut title = format!(
        "products {}/{} | {} selected",
        products.len(),
        state.catalog().len(),
        state.selection().len()
    );
    if state.filter().is_active() {
        title.push_str(" | filtered");
    }
    let grid = Paragraph::new(lines).block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(focus_style(view_data, Pane::Products)),
    );
    frame.render_widget(grid, area);
}

fn render_panel(frame: &mut ratatui::Frame<'_>, area: Rect, state: &AppState, view_data: &ViewData) {
    let lines = panel_lines(state);
    let cursor_line = panel_cursor_line(&lines, view_data.panel_cursor);
    let offset = scroll_offset(cursor_line, panel_visible_rows(area));

    let rendered = lines
        .iter()
        .enumerate()
        .skip(offset)
        .map(|(index, line)| {
            let mut style = match line.entry {
                None if [EMPTY_SELECTION_MESSAGE, EMPTY_SELECTION_HINT]
                    .contains(&line.text.as_str()) =>
                {
                    Style::default().fg(Color::DarkGray)
                }
                None => Style::default().add_modifier(Modifier::BOLD),
                Some(PanelEntry::ClearAll) => Style::default().fg(Color::Red),
                Some(PanelEntry::Remove(_)) => Style::default(),
            };
            if line.entry.is_some() && index == cursor_line && view_data.focus == Pane::Selection
            {
                style = style.add_modifier(Modifier::REVERSED);
            }
            Line::styled(line.text.clone(), style)
        })
        .collect::<Vec<_>>();

    let panel = Paragraph::new(rendered).block(
        Block::default()
            .title("selected products")
            .borders(Borders::ALL)
            .border_style(focus_style(view_data, Pane::Selection)),
    );
    frame.render_widget(panel, area);
}

fn render_chat(frame: &mut ratatui::Frame<'_>, area: Rect, state: &AppState, view_data: &ViewData) {
    let width = usize::from(area.width.saturating_sub(2));
    let height = usize::from(area.height.saturating_sub(2));
    let lines = chat_lines(state, width);

    let rendered = if state.window().is_empty() {
        vec![Line::styled(
            CHAT_GREETING,
            Style::default().fg(Color::DarkGray),
        )]
    } else {
        lines[lines.len().saturating_sub(height)..]
            .iter()
            .map(|(text, style)| Line::styled(text.clone(), *style))
            .collect()
    };

    let title = if state.in_flight().is_some() {
        "chat (waiting for reply)"
    } else {
        "chat"
    };
    let chat = Paragraph::new(rendered).block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(focus_style(view_data, Pane::Chat)),
    );
    frame.render_widget(chat, area);
}

fn render_detail_overlay(
    frame: &mut ratatui::Frame<'_>,
    areas: ScreenAreas,
    state: &AppState,
    detail: &DetailOverlay,
) {
    let Some(product) = state.catalog().get(&detail.product_id) else {
        return;
    };
    let style = match detail.phase {
        OverlayPhase::Open => Style::default().fg(Color::White),
        OverlayPhase::Closing => Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::DIM),
    };

    frame.render_widget(Clear, areas.overlay);
    let overlay = Paragraph::new(detail_overlay_text(product))
        .wrap(Wrap { trim: false })
        .style(style)
        .block(
            Block::default()
                .title(product.name.clone())
                .title(Line::from(CLOSE_LABEL).right_aligned())
                .borders(Borders::ALL)
                .border_style(style),
        );
    frame.render_widget(overlay, areas.overlay);
}

fn detail_overlay_text(product: &Product) -> String {
    let description = product
        .description
        .as_deref()
        .filter(|text| !text.trim().is_empty())
        .unwrap_or("No description available.");
    let image = if product.image.is_empty() {
        "none"
    } else {
        product.image.as_str()
    };
    format!(
        "{}\n{}\ncategory: {}\n\n{}\n\nimage: {}",
        product.brand,
        product.name,
        category_label(&product.category),
        description,
        image
    )
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    if view_data.detail.is_some() {
        return "esc/x close details".to_owned();
    }
    if view_data.help_visible {
        return "esc/? close help".to_owned();
    }

    let hints = match view_data.focus {
        Pane::Products => {
            "j/k move | enter select | i details | c/C category | / search | g routine | tab pane | ? help | ctrl+q"
        }
        Pane::Search => "type to filter | ctrl+u clear | esc/enter done",
        Pane::Selection => "j/k move | x remove | X clear all | g routine | tab pane",
        Pane::Chat => "type message | enter send | ctrl+g routine | esc back",
    };
    let focus = view_data.focus.label();
    match &state.status_line {
        Some(status) => format!("{focus} | {status} | {hints}"),
        None => format!("{focus} | {hints}"),
    }
}

fn help_overlay_text() -> &'static str {
    "global: ctrl+q quit | ctrl+g generate routine | tab/shift+tab switch pane | ? help\n\
products: j/k pgup/pgdn home/end | enter/space select | i details | c/C category | a all | / search | g routine\n\
search: type to filter | backspace | ctrl+u clear | esc/enter back\n\
selection: j/k | x/enter remove | X clear all | g routine\n\
chat: type | enter send | ctrl+u clear | esc back\n\
details: esc/x/q or click [x] or outside to close\n\
mouse: click row select | click [details] | click category to cycle | wheel scroll"
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{
        AppRuntime, CLEAR_ALL_LABEL, DETAILS_LABEL, InternalEvent, OVERLAY_CLOSE_DELAY,
        OVERLAY_TRANSITION, OverlayPhase, Pane, PanelEntry, ViewData, chat_lines,
        details_column_start, handle_internal_event, handle_key_event, handle_mouse_event,
        panel_entries, panel_lines, process_internal_events, render, screen_areas, truncate_label,
        wrap_text,
    };
    use anyhow::{Result, anyhow};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use ratatui::layout::Rect;
    use routinely_app::{
        AppState, BubbleKind, ChatMessage, EMPTY_SELECTION_HINT, EMPTY_SELECTION_MESSAGE,
        NO_SELECTION_MESSAGE,
        ProductId, REQUEST_BUSY_STATUS, ROUTINE_ERROR, Role, SelectionSet,
    };
    use routinely_testkit::{ProductFaker, sample_catalog};
    use std::collections::VecDeque;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::time::Duration;

    #[derive(Default)]
    struct TestRuntime {
        saved: Vec<Vec<ProductId>>,
        save_error: Option<String>,
        replies: VecDeque<Result<Option<String>, String>>,
        requests: Vec<Vec<ChatMessage>>,
    }

    impl AppRuntime for TestRuntime {
        fn save_selection(&mut self, selection: &SelectionSet) -> Result<()> {
            if let Some(error) = &self.save_error {
                return Err(anyhow!(error.clone()));
            }
            self.saved.push(selection.ids().to_vec());
            Ok(())
        }

        fn complete_chat(&mut self, messages: &[ChatMessage]) -> Result<Option<String>> {
            self.requests.push(messages.to_vec());
            match self.replies.pop_front() {
                Some(Ok(content)) => Ok(content),
                Some(Err(error)) => Err(anyhow!(error)),
                None => Ok(None),
            }
        }
    }

    struct Harness {
        state: AppState,
        runtime: TestRuntime,
        view_data: ViewData,
        tx: Sender<InternalEvent>,
        rx: Receiver<InternalEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let (tx, rx) = internal_channel();
            Self {
                state: AppState::new(sample_catalog(), SelectionSet::new(), "system"),
                runtime: TestRuntime::default(),
                view_data: view_data_for_test(),
                tx,
                rx,
            }
        }

        fn press(&mut self, event: KeyEvent) -> bool {
            handle_key_event(
                &mut self.state,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                event,
            )
        }

        fn press_code(&mut self, code: KeyCode) -> bool {
            self.press(key(code))
        }

        fn type_text(&mut self, text: &str) {
            for ch in text.chars() {
                self.press_code(KeyCode::Char(ch));
            }
        }

        fn click(&mut self, column: u16, row: u16) {
            handle_mouse_event(
                &mut self.state,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                MouseEvent {
                    kind: MouseEventKind::Down(MouseButton::Left),
                    column,
                    row,
                    modifiers: KeyModifiers::NONE,
                },
            );
        }

        fn pump_internal(&mut self) {
            process_internal_events(
                &mut self.state,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                &self.rx,
            );
        }

        fn selected(&self) -> Vec<&str> {
            self.state
                .selection()
                .ids()
                .iter()
                .map(ProductId::as_str)
                .collect()
        }
    }

    fn internal_channel() -> (Sender<InternalEvent>, Receiver<InternalEvent>) {
        mpsc::channel()
    }

    fn view_data_for_test() -> ViewData {
        ViewData {
            areas: screen_areas(Rect::new(0, 0, 120, 40)),
            ..ViewData::default()
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(ch: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL)
    }

    fn first_product_row(view_data: &ViewData) -> u16 {
        view_data.areas.grid.y + 2
    }

    #[test]
    fn toggling_a_product_twice_persists_each_change() -> Result<()> {
        let mut h = Harness::new();
        h.press_code(KeyCode::Enter);
        assert_eq!(h.selected(), ["1"]);
        h.press_code(KeyCode::Char(' '));
        assert!(h.selected().is_empty());

        assert_eq!(
            h.runtime.saved,
            vec![vec![ProductId::from(1)], Vec::<ProductId>::new()]
        );
        Ok(())
    }

    #[test]
    fn search_filters_live_while_typing() -> Result<()> {
        let mut h = Harness::new();
        h.press_code(KeyCode::Char('/'));
        assert_eq!(h.view_data.focus, Pane::Search);
        h.type_text("LUMINA");
        assert_eq!(h.state.filter().search, "LUMINA");
        let names: Vec<&str> = h
            .state
            .visible_products()
            .iter()
            .map(|product| product.name.as_str())
            .collect();
        assert_eq!(names, ["Serum B"]);

        h.press(ctrl('u'));
        assert_eq!(h.state.visible_products().len(), 2);
        h.press_code(KeyCode::Esc);
        assert_eq!(h.view_data.focus, Pane::Products);
        Ok(())
    }

    #[test]
    fn category_cycle_wraps_back_to_all() -> Result<()> {
        let mut h = Harness::new();
        h.press_code(KeyCode::Char('c'));
        assert_eq!(h.state.filter().category.as_deref(), Some("cleanser"));
        h.press_code(KeyCode::Char('c'));
        assert_eq!(h.state.filter().category.as_deref(), Some("serum"));
        h.press_code(KeyCode::Char('c'));
        assert_eq!(h.state.filter().category, None);
        h.press_code(KeyCode::Char('C'));
        assert_eq!(h.state.filter().category.as_deref(), Some("serum"));
        h.press_code(KeyCode::Char('a'));
        assert_eq!(h.state.filter().category, None);
        Ok(())
    }

    #[test]
    fn grid_cursor_stays_within_filtered_products() -> Result<()> {
        let mut h = Harness::new();
        h.press_code(KeyCode::End);
        assert_eq!(h.view_data.grid_cursor, 1);
        h.press_code(KeyCode::Char('c'));
        assert_eq!(h.view_data.grid_cursor, 0);
        h.press_code(KeyCode::PageDown);
        assert_eq!(h.view_data.grid_cursor, 0);
        Ok(())
    }

    #[test]
    fn removing_last_selection_restores_placeholder() -> Result<()> {
        let mut h = Harness::new();
        h.press_code(KeyCode::Enter);
        assert_eq!(panel_entries(&h.state).len(), 2);

        h.press_code(KeyCode::Tab);
        assert_eq!(h.view_data.focus, Pane::Selection);
        h.press_code(KeyCode::Char('x'));
        assert!(h.selected().is_empty());
        let lines = panel_lines(&h.state);
        let texts: Vec<&str> = lines.iter().map(|line| line.text.as_str()).collect();
        assert_eq!(texts, [EMPTY_SELECTION_MESSAGE, EMPTY_SELECTION_HINT]);
        assert!(panel_entries(&h.state).is_empty());
        assert_eq!(h.runtime.saved.last(), Some(&Vec::new()));
        Ok(())
    }

    #[test]
    fn removing_a_filtered_out_product_deletes_it_directly() -> Result<()> {
        let mut h = Harness::new();
        h.press_code(KeyCode::Enter);
        h.press_code(KeyCode::Down);
        h.press_code(KeyCode::Enter);
        assert_eq!(h.selected(), ["1", "2"]);

        h.press_code(KeyCode::Char('/'));
        h.type_text("serum");
        h.press_code(KeyCode::Enter);
        assert!(!h.state.is_visible(&ProductId::from(1)));

        h.press_code(KeyCode::Tab);
        assert_eq!(
            panel_entries(&h.state).first(),
            Some(&PanelEntry::Remove(ProductId::from(1)))
        );
        h.press_code(KeyCode::Delete);
        assert_eq!(h.selected(), ["2"]);
        assert_eq!(h.runtime.saved.last(), Some(&vec![ProductId::from(2)]));
        Ok(())
    }

    #[test]
    fn clear_all_only_acts_on_a_non_empty_selection() -> Result<()> {
        let mut h = Harness::new();
        h.press_code(KeyCode::Tab);
        h.press_code(KeyCode::Char('X'));
        assert!(h.runtime.saved.is_empty());

        h.press_code(KeyCode::BackTab);
        h.press_code(KeyCode::Enter);
        h.press_code(KeyCode::Down);
        h.press_code(KeyCode::Enter);
        h.press_code(KeyCode::Tab);
        h.press_code(KeyCode::Char('X'));
        assert!(h.selected().is_empty());
        assert_eq!(h.runtime.saved.len(), 3);
        Ok(())
    }

    #[test]
    fn generate_routine_round_trip() -> Result<()> {
        let mut h = Harness::new();
        h.runtime
            .replies
            .push_back(Ok(Some("- Cleanse\n- Moisturize".to_owned())));
        h.press_code(KeyCode::Enter);
        h.press_code(KeyCode::Char('g'));

        let bubbles = h.state.window().bubbles();
        assert_eq!(bubbles.len(), 2);
        assert_eq!(bubbles[0].text, "Generate routine for 1 product(s)");
        assert_eq!(bubbles[1].kind, BubbleKind::Pending);

        let request = &h.runtime.requests[0];
        assert_eq!(request[0].role, Role::System);
        assert!(
            request[1]
                .content
                .contains("- Cleanser A (Dewfield, cleanser): Gentle foaming wash")
        );

        h.pump_internal();
        let bubbles = h.state.window().bubbles();
        assert_eq!(bubbles.len(), 2);
        assert_eq!(bubbles[1].text, "- Cleanse\n- Moisturize");
        assert_eq!(bubbles[1].kind, BubbleKind::Message);
        assert!(h.state.in_flight().is_none());
        assert_eq!(h.state.transcript().messages().len(), 3);

        let rendered: Vec<String> = chat_lines(&h.state, 60)
            .into_iter()
            .map(|(text, _)| text)
            .collect();
        assert!(rendered.contains(&"  • Cleanse".to_owned()));
        assert!(rendered.contains(&"  • Moisturize".to_owned()));
        Ok(())
    }

    #[test]
    fn generate_without_selection_only_advises() -> Result<()> {
        let mut h = Harness::new();
        h.press(ctrl('g'));
        let bubbles = h.state.window().bubbles();
        assert_eq!(bubbles.len(), 1);
        assert_eq!(bubbles[0].text, NO_SELECTION_MESSAGE);
        assert_eq!(bubbles[0].kind, BubbleKind::Advisory);
        assert!(h.runtime.requests.is_empty());
        Ok(())
    }

    #[test]
    fn routine_failure_swaps_placeholder_for_error() -> Result<()> {
        let mut h = Harness::new();
        h.runtime
            .replies
            .push_back(Err("connection refused".to_owned()));
        h.press_code(KeyCode::Enter);
        h.press(ctrl('g'));
        h.pump_internal();

        let bubbles = h.state.window().bubbles();
        assert_eq!(bubbles.len(), 2);
        assert_eq!(bubbles[1].text, ROUTINE_ERROR);
        assert_eq!(bubbles[1].kind, BubbleKind::Advisory);
        assert!(h.state.in_flight().is_none());
        assert_eq!(h.state.transcript().messages().len(), 2);
        Ok(())
    }

    #[test]
    fn blank_chat_submission_is_ignored() -> Result<()> {
        let mut h = Harness::new();
        h.view_data.focus = Pane::Chat;
        h.type_text("   ");
        h.press_code(KeyCode::Enter);
        assert!(h.state.window().is_empty());
        assert!(h.runtime.requests.is_empty());
        Ok(())
    }

    #[test]
    fn chat_submission_clears_input_and_appends_reply() -> Result<()> {
        let mut h = Harness::new();
        h.runtime
            .replies
            .push_back(Ok(Some("Wear sunscreen daily.".to_owned())));
        h.view_data.focus = Pane::Chat;
        h.type_text("what about spf?");
        h.press_code(KeyCode::Enter);
        assert!(h.view_data.chat_input.is_empty());

        h.pump_internal();
        let messages = h.state.transcript().messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content, "what about spf?");
        assert_eq!(messages[2].content, "Wear sunscreen daily.");
        Ok(())
    }

    #[test]
    fn second_message_while_waiting_is_refused_and_kept() -> Result<()> {
        let mut h = Harness::new();
        h.view_data.focus = Pane::Chat;
        h.type_text("hi");
        h.press_code(KeyCode::Enter);
        h.type_text("again");
        h.press_code(KeyCode::Enter);

        assert_eq!(h.view_data.chat_input, "again");
        assert_eq!(h.state.status_line.as_deref(), Some(REQUEST_BUSY_STATUS));
        assert_eq!(h.runtime.requests.len(), 1);
        Ok(())
    }

    #[test]
    fn detail_overlay_closes_after_delay() -> Result<()> {
        let mut h = Harness::new();
        h.press_code(KeyCode::Char('i'));
        let token = h
            .view_data
            .detail
            .as_ref()
            .map(|detail| detail.token)
            .ok_or_else(|| anyhow!("overlay should open"))?;

        // Keys other than the dismiss keys are swallowed while open.
        h.press_code(KeyCode::Enter);
        assert!(h.selected().is_empty());

        h.press_code(KeyCode::Esc);
        assert_eq!(
            h.view_data.detail.as_ref().map(|detail| detail.phase),
            Some(OverlayPhase::Closing)
        );

        let event = h.rx.recv_timeout(Duration::from_secs(2))?;
        assert_eq!(event, InternalEvent::OverlayExpired { token });
        handle_internal_event(
            &mut h.state,
            &mut h.runtime,
            &mut h.view_data,
            &h.tx,
            event,
        );
        assert!(h.view_data.detail.is_none());
        Ok(())
    }

    #[test]
    fn stale_overlay_expiry_leaves_newer_overlay_open() -> Result<()> {
        let mut h = Harness::new();
        h.press_code(KeyCode::Char('i'));
        let stale = h.view_data.overlay_token;
        h.view_data.detail = None;
        h.press_code(KeyCode::Char('i'));

        handle_internal_event(
            &mut h.state,
            &mut h.runtime,
            &mut h.view_data,
            &h.tx,
            InternalEvent::OverlayExpired { token: stale },
        );
        assert_eq!(
            h.view_data.detail.as_ref().map(|detail| detail.phase),
            Some(OverlayPhase::Open)
        );
        Ok(())
    }

    #[test]
    fn close_delay_outlasts_transition() {
        assert!(OVERLAY_CLOSE_DELAY > OVERLAY_TRANSITION);
    }

    #[test]
    fn clicking_a_row_toggles_and_details_opens_overlay() -> Result<()> {
        let mut h = Harness::new();
        let grid = h.view_data.areas.grid;
        let row = first_product_row(&h.view_data);

        h.click(grid.x + 2, row);
        assert_eq!(h.selected(), ["1"]);

        h.click(details_column_start(grid) + 1, row + 1);
        assert_eq!(h.selected(), ["1"]);
        assert_eq!(
            h.view_data
                .detail
                .as_ref()
                .map(|detail| detail.product_id.clone()),
            Some(ProductId::from(2))
        );
        assert_eq!(h.view_data.grid_cursor, 1);
        Ok(())
    }

    #[test]
    fn clicks_follow_the_scrolled_grid() -> Result<()> {
        let mut h = Harness::new();
        h.state = AppState::new(ProductFaker::new(3).catalog(40), SelectionSet::new(), "system");
        for _ in 0..3 {
            h.press_code(KeyCode::PageDown);
        }
        assert_eq!(h.view_data.grid_cursor, 30);

        let grid = h.view_data.areas.grid;
        let visible_rows = usize::from(grid.height - 3);
        let offset = 30 - (visible_rows - 1);
        let expected = h.state.visible_products()[offset].id.clone();

        h.click(grid.x + 2, first_product_row(&h.view_data));
        assert_eq!(h.view_data.grid_cursor, offset);
        assert_eq!(h.state.selection().ids(), [expected]);
        Ok(())
    }

    #[test]
    fn overlay_dismisses_on_close_label_or_outside_click() -> Result<()> {
        let mut h = Harness::new();
        h.press_code(KeyCode::Char('i'));
        let overlay = h.view_data.areas.overlay;

        h.click(overlay.x + 2, overlay.y + 2);
        assert_eq!(
            h.view_data.detail.as_ref().map(|detail| detail.phase),
            Some(OverlayPhase::Open)
        );

        h.click(0, 0);
        assert_eq!(
            h.view_data.detail.as_ref().map(|detail| detail.phase),
            Some(OverlayPhase::Closing)
        );

        h.view_data.detail = None;
        h.press_code(KeyCode::Char('i'));
        let close = h.view_data.areas.close;
        h.click(close.x + 1, close.y);
        assert_eq!(
            h.view_data.detail.as_ref().map(|detail| detail.phase),
            Some(OverlayPhase::Closing)
        );
        assert!(h.selected().is_empty());
        Ok(())
    }

    #[test]
    fn panel_labels_respond_to_clicks() -> Result<()> {
        let mut h = Harness::new();
        h.press_code(KeyCode::Enter);
        h.press_code(KeyCode::Down);
        h.press_code(KeyCode::Enter);

        let panel = h.view_data.areas.panel;
        let text_start = panel.x + 1;
        let lines = panel_lines(&h.state);
        let clear_index = lines
            .iter()
            .position(|line| line.entry == Some(PanelEntry::ClearAll))
            .ok_or_else(|| anyhow!("clear all entry expected"))?;
        assert_eq!(lines[clear_index].text, CLEAR_ALL_LABEL);

        // Clicking the product name only moves the cursor.
        h.click(text_start + 3, panel.y + 2);
        assert_eq!(h.view_data.focus, Pane::Selection);
        assert_eq!(h.selected(), ["1", "2"]);

        let remove_column = text_start + lines[1].text.chars().count() as u16 - 2;
        h.click(remove_column, panel.y + 2);
        assert_eq!(h.selected(), ["2"]);

        let lines = panel_lines(&h.state);
        let clear_index = lines
            .iter()
            .position(|line| line.entry == Some(PanelEntry::ClearAll))
            .ok_or_else(|| anyhow!("clear all entry expected"))?;
        h.click(text_start, panel.y + 1 + clear_index as u16);
        assert!(h.selected().is_empty());
        Ok(())
    }

    #[test]
    fn failed_save_reports_on_status_line() -> Result<()> {
        let mut h = Harness::new();
        h.runtime.save_error = Some("disk full".to_owned());
        h.press_code(KeyCode::Enter);
        assert_eq!(h.selected(), ["1"]);
        let status = h.state.status_line.clone().unwrap_or_default();
        assert!(status.contains("selection not saved: disk full"));
        Ok(())
    }

    #[test]
    fn status_clear_ignores_stale_tokens() -> Result<()> {
        let mut h = Harness::new();
        h.state.status_line = Some("hello".to_owned());
        h.view_data.status_token = 3;
        handle_internal_event(
            &mut h.state,
            &mut h.runtime,
            &mut h.view_data,
            &h.tx,
            InternalEvent::ClearStatus { token: 2 },
        );
        assert_eq!(h.state.status_line.as_deref(), Some("hello"));
        handle_internal_event(
            &mut h.state,
            &mut h.runtime,
            &mut h.view_data,
            &h.tx,
            InternalEvent::ClearStatus { token: 3 },
        );
        assert_eq!(h.state.status_line, None);
        Ok(())
    }

    #[test]
    fn ctrl_q_quits() {
        let mut h = Harness::new();
        assert!(!h.press_code(KeyCode::Char('q')));
        assert!(h.press(ctrl('q')));
    }

    #[test]
    fn render_shows_products_and_placeholder() -> Result<()> {
        let h = Harness::new();
        let mut terminal = Terminal::new(TestBackend::new(120, 40))?;
        terminal.draw(|frame| render(frame, &h.state, &h.view_data))?;
        let text: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(text.contains("Cleanser A"));
        assert!(text.contains("Serum B"));
        assert!(text.contains(DETAILS_LABEL));
        assert!(text.contains(EMPTY_SELECTION_MESSAGE));
        assert!(text.contains(EMPTY_SELECTION_HINT));
        assert!(!text.contains("| filtered"));
        Ok(())
    }

    #[test]
    fn grid_title_marks_an_active_filter() -> Result<()> {
        let mut h = Harness::new();
        h.press_code(KeyCode::Char('c'));
        let mut terminal = Terminal::new(TestBackend::new(120, 40))?;
        terminal.draw(|frame| render(frame, &h.state, &h.view_data))?;
        let text: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(text.contains("products 1/2 | 0 selected | filtered"));
        assert!(!text.contains("Serum B"));
        Ok(())
    }

    #[test]
    fn wrap_text_breaks_on_words() {
        assert_eq!(
            wrap_text("apply a pea sized amount", 10),
            ["apply a", "pea sized", "amount"]
        );
        assert_eq!(wrap_text("short", 10), ["short"]);
        assert_eq!(wrap_text("abcdefghijkl", 5), ["abcde", "fghij", "kl"]);
    }

    #[test]
    fn truncate_label_marks_cut_text() {
        assert_eq!(truncate_label("Hydrating", 4), "Hydr…");
        assert_eq!(truncate_label("Gel", 4), "Gel");
    }
}
