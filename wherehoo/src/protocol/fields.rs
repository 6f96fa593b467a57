//! Accumulated per-session field values and their status tables.

use chrono::{DateTime, Utc};

use super::command::Command;
use super::time::TimeInterval;
use crate::geo::GeoPoint;

/// One boolean per [`Command`].
///
/// Each session keeps two: which commands were received and which carried
/// invalid parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldState {
    flags: [bool; Command::COUNT],
}

impl FieldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_received(&mut self, cmd: Command) {
        self.flags[cmd.index()] = true;
    }

    pub fn mark_error(&mut self, cmd: Command, value: bool) {
        self.flags[cmd.index()] = value;
    }

    pub fn is_received(&self, cmd: Command) -> bool {
        self.flags[cmd.index()]
    }

    pub fn is_error(&self, cmd: Command) -> bool {
        self.flags[cmd.index()]
    }

    pub fn reset_all(&mut self, value: bool) {
        self.flags = [value; Command::COUNT];
    }

    /// Commands whose flag is currently set, in table order.
    pub fn flagged(&self) -> impl Iterator<Item = Command> + '_ {
        Command::ALL
            .iter()
            .copied()
            .filter(move |cmd| self.flags[cmd.index()])
    }
}

/// Requested operation, from `ACT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Insert,
    Query,
    Count,
    Delete,
}

impl Action {
    /// Parses an action keyword, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "insert" => Some(Action::Insert),
            "query" => Some(Action::Query),
            "count" => Some(Action::Count),
            "delete" => Some(Action::Delete),
            _ => None,
        }
    }
}

/// Search area shape, from `SHP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Rectangle extending forward from the location along the heading.
    RectForward,
    /// Square centered on the location.
    RectCenter,
}

impl Shape {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "rect_fwd" => Some(Shape::RectForward),
            "rect_ctr" => Some(Shape::RectCenter),
            _ => None,
        }
    }
}

/// Payload and trailing signature block read after `DAT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub data: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Everything a client has sent so far in one session.
///
/// Values are only meaningful when the matching command is received and not
/// in error; validation consults the [`FieldState`] tables before reading
/// any of them.
#[derive(Debug, Clone)]
pub struct SessionFields {
    pub received: FieldState,
    pub errors: FieldState,

    pub identity: String,
    pub signature_claim: String,
    pub action: Option<Action>,
    pub locations: Vec<GeoPoint>,
    pub height: f64,
    pub heading: f64,
    pub width: f64,
    pub length: f64,
    pub radius: f64,
    pub shape: Option<Shape>,
    pub interval: TimeInterval,
    pub limit: u32,
    pub mimetype: String,
    pub protocol: String,
    pub meta: String,
    pub payload: Option<Payload>,
    pub projection: Option<(f64, f64)>,
    pub uid: String,
}

impl SessionFields {
    /// Empty field set for a session created at `base`.
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            received: FieldState::new(),
            errors: FieldState::new(),
            identity: String::new(),
            signature_claim: String::new(),
            action: None,
            locations: Vec::new(),
            height: -1.0,
            heading: 0.0,
            width: 0.0,
            length: 0.0,
            radius: 0.0,
            shape: None,
            interval: TimeInterval::starting_at(base),
            limit: 0,
            mimetype: String::new(),
            protocol: String::new(),
            meta: String::new(),
            payload: None,
            projection: None,
            uid: String::new(),
        }
    }

    /// True when `cmd` was received without a parameter error.
    pub fn is_valid(&self, cmd: Command) -> bool {
        self.received.is_received(cmd) && !self.errors.is_error(cmd)
    }
}
