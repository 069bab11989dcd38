use std::ops::Range;

use serde::Serialize;
use tracing::debug;

use crate::config::CoreSettings;
use crate::operations::OperationError;
use crate::placement::{PlacementMargins, Point, Size, ToolbarPlacement, place_toolbar};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Selection {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    NoSelection,
    Selected,
    ToolbarVisible,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "camelCase")]
pub enum OperationStatus {
    #[default]
    Idle,
    Pending,
    Success,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTicket(u64);

/// Returned by a successful completion; hands the pending toolbar hide to a
/// timer without holding the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct AutoHide {
    ticket: OperationTicket,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct SelectionState {
    selection: Option<Selection>,
    anchor: Option<Point>,
    toolbar_shown: bool,
    active_operation: Option<String>,
    status: OperationStatus,
    current_ticket: Option<OperationTicket>,
    issued_tickets: u64,
    generation: u64,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a user selection. An empty range or empty text clears the
    /// selection. `anchor` is `None` for programmatic focus changes, in which
    /// case the previous anchor is kept.
    pub fn update_selection(
        &mut self,
        start: usize,
        end: usize,
        text: impl Into<String>,
        anchor: Option<Point>,
    ) {
        let text = text.into();
        if start == end || text.is_empty() {
            self.clear_selection();
            return;
        }

        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        self.selection = Some(Selection { start, end, text });
        if anchor.is_some() {
            self.anchor = anchor;
        }
        self.toolbar_shown = self.anchor.is_some();
        self.generation += 1;
    }

    pub fn clear_selection(&mut self) {
        if let Some(ticket) = self.current_ticket.take() {
            debug!(ticket = ticket.0, "selection cleared while operation in flight");
        }
        self.selection = None;
        self.anchor = None;
        self.toolbar_shown = false;
        self.active_operation = None;
        self.status = OperationStatus::Idle;
        self.generation += 1;
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn anchor(&self) -> Option<Point> {
        self.anchor
    }

    pub fn visibility(&self) -> Visibility {
        match (&self.selection, self.toolbar_shown && self.anchor.is_some()) {
            (None, _) => Visibility::NoSelection,
            (Some(_), false) => Visibility::Selected,
            (Some(_), true) => Visibility::ToolbarVisible,
        }
    }

    pub fn status(&self) -> &OperationStatus {
        &self.status
    }

    pub fn active_operation(&self) -> Option<&str> {
        self.active_operation.as_deref()
    }

    pub fn is_pending(&self) -> bool {
        self.status == OperationStatus::Pending
    }

    pub fn is_current(&self, ticket: OperationTicket) -> bool {
        self.current_ticket == Some(ticket)
    }

    pub fn start_operation(&mut self, id: &str) -> Result<OperationTicket, OperationError> {
        if self.is_pending() {
            return Err(OperationError::Busy);
        }

        self.issued_tickets += 1;
        let ticket = OperationTicket(self.issued_tickets);
        self.current_ticket = Some(ticket);
        self.active_operation = Some(id.to_string());
        self.status = OperationStatus::Pending;
        self.generation += 1;
        Ok(ticket)
    }

    /// Marks an operation that was refused before it could start as failed.
    /// Ignored while another operation is pending.
    pub fn reject_operation(&mut self, id: &str, message: impl Into<String>) {
        if self.is_pending() {
            return;
        }
        self.current_ticket = None;
        self.active_operation = Some(id.to_string());
        self.status = OperationStatus::Error(message.into());
        self.generation += 1;
    }

    /// Moves the selection over freshly inserted text. Returns `false` when
    /// the ticket is stale and nothing was changed.
    pub fn reanchor(
        &mut self,
        ticket: OperationTicket,
        start: usize,
        text: &str,
        anchor: Option<Point>,
    ) -> bool {
        if !self.is_current(ticket) {
            return false;
        }

        if text.is_empty() {
            self.selection = None;
            self.toolbar_shown = false;
        } else {
            self.selection = Some(Selection {
                start,
                end: start + text.len(),
                text: text.to_string(),
            });
        }
        if anchor.is_some() {
            self.anchor = anchor;
        }
        self.generation += 1;
        true
    }

    pub fn complete_operation(&mut self, ticket: OperationTicket) -> Option<AutoHide> {
        if !self.is_current(ticket) {
            debug!(ticket = ticket.0, "ignoring completion for stale operation");
            return None;
        }

        self.current_ticket = None;
        self.status = OperationStatus::Success;
        self.generation += 1;
        Some(AutoHide {
            ticket,
            generation: self.generation,
        })
    }

    pub fn fail_operation(&mut self, ticket: OperationTicket, message: impl Into<String>) -> bool {
        if !self.is_current(ticket) {
            debug!(ticket = ticket.0, "ignoring failure for stale operation");
            return false;
        }

        self.current_ticket = None;
        self.status = OperationStatus::Error(message.into());
        self.generation += 1;
        true
    }

    pub fn dismiss_error(&mut self) {
        if matches!(self.status, OperationStatus::Error(_)) {
            self.status = OperationStatus::Idle;
            self.active_operation = None;
            self.generation += 1;
        }
    }

    /// Ends the success pulse. A no-op once another operation has started.
    /// The toolbar is hidden only if nothing moved since the completion.
    pub fn expire_success(&mut self, auto_hide: AutoHide) -> bool {
        if self.status != OperationStatus::Success || self.issued_tickets != auto_hide.ticket.0 {
            return false;
        }

        if auto_hide.generation == self.generation {
            self.toolbar_shown = false;
        }
        self.status = OperationStatus::Idle;
        self.active_operation = None;
        self.generation += 1;
        true
    }

    pub fn toolbar_position(
        &self,
        toolbar: Size,
        viewport: Size,
        settings: &CoreSettings,
    ) -> Option<ToolbarPlacement> {
        if self.visibility() != Visibility::ToolbarVisible {
            return None;
        }
        let anchor = self.anchor?;
        Some(place_toolbar(
            anchor,
            toolbar,
            viewport,
            PlacementMargins {
                padding: settings.toolbar_padding_px,
                gap: settings.toolbar_gap_px,
            },
        ))
    }
}
