//! Line-at-a-time field collection.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::channel::LineChannel;
use super::command::Command;
use super::error::TransportError;
use super::fields::{Action, Payload, SessionFields, Shape};
use super::{SessionLimits, MAX_DIMENSION};
use crate::geo::{normalize_degrees, GeoPoint};
use crate::store::SIGNATURE_LEN;

/// How collection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Client sent `.` and wants the operation executed.
    Proceed,
    /// Client sent `BYE` or an unrecognized command.
    Disconnect,
}

/// What the driver must do after a line has been handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    Reply(String),
    /// Read `len` payload bytes plus the signature block.
    ReadPayload { len: usize },
    Finish(Outcome),
}

/// Per-connection collection state.
#[derive(Debug)]
pub struct Session {
    fields: SessionFields,
    limits: SessionLimits,
    verbose: bool,
}

/// Logs at info when the session is verbose, debug otherwise.
macro_rules! session_log {
    ($session:expr, $($arg:tt)+) => {
        if $session.verbose {
            info!($($arg)+);
        } else {
            debug!($($arg)+);
        }
    };
}

impl Session {
    pub fn new(limits: SessionLimits, started: DateTime<Utc>) -> Self {
        Self {
            fields: SessionFields::new(started),
            limits,
            verbose: false,
        }
    }

    pub fn fields(&self) -> &SessionFields {
        &self.fields
    }

    pub fn into_fields(self) -> SessionFields {
        self.fields
    }

    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    /// True once the client sent `DBG`.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Reads lines until the client proceeds or disconnects.
    pub async fn collect(&mut self, channel: &mut LineChannel) -> Result<Outcome, TransportError> {
        loop {
            let line = channel.read_line().await?;
            match self.handle_line(&line) {
                Step::Continue => {}
                Step::Reply(reply) => channel.write_line(&reply).await?,
                Step::ReadPayload { len } => {
                    let total = len + SIGNATURE_LEN;
                    let bytes = channel
                        .read_exact_within(total, self.limits.data_timeout)
                        .await?;
                    if let Some(reply) = self.accept_payload(len, bytes) {
                        channel.write_line(&reply).await?;
                    }
                }
                Step::Finish(outcome) => {
                    session_log!(self, outcome = ?outcome, "Collection finished");
                    return Ok(outcome);
                }
            }
        }
    }

    /// Handles one command line. Never fails: bad parameters only set the
    /// command's error flag.
    pub fn handle_line(&mut self, line: &str) -> Step {
        let line = line.trim();
        if line.is_empty() {
            return Step::Continue;
        }
        let (keyword, param) = match line.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (line, ""),
        };

        let Some(cmd) = Command::parse(keyword) else {
            warn!(keyword = %keyword, "Unrecognized command, closing session");
            return Step::Finish(Outcome::Disconnect);
        };

        self.fields.received.mark_received(cmd);
        let step = self.apply(cmd, param);
        session_log!(
            self,
            command = %cmd,
            error = self.fields.errors.is_error(cmd),
            "Command handled"
        );
        step
    }

    fn apply(&mut self, cmd: Command, param: &str) -> Step {
        let fields = &mut self.fields;
        match cmd {
            Command::Idt => {
                fields.identity = param.to_lowercase();
                let len = fields.identity.chars().count();
                fields
                    .errors
                    .mark_error(cmd, len == 0 || len > self.limits.max_identity_len);
                return Step::Reply(self.limits.capability_header());
            }
            Command::Sha => {
                fields.signature_claim = param.to_string();
            }
            Command::Act => {
                fields.action = Action::parse(param);
                fields.errors.mark_error(cmd, fields.action.is_none());
            }
            Command::Llh => match parse_locations(param) {
                Some((points, height)) => {
                    fields.locations = points;
                    fields.height = height;
                    fields.errors.mark_error(cmd, false);
                }
                None => {
                    fields.locations.clear();
                    fields.errors.mark_error(cmd, true);
                }
            },
            Command::Beg => {
                let ok = fields.interval.set_begin(param).is_ok();
                fields.errors.mark_error(cmd, !ok);
            }
            Command::End => {
                let ok = fields.interval.set_end(param).is_ok();
                fields.errors.mark_error(cmd, !ok);
            }
            Command::Hdg => match parse_finite(param) {
                Some(heading) => {
                    fields.heading = normalize_degrees(heading);
                    fields.errors.mark_error(cmd, false);
                }
                None => fields.errors.mark_error(cmd, true),
            },
            Command::Len => match parse_dimension(param) {
                Some(length) => {
                    fields.length = length;
                    fields.errors.mark_error(cmd, false);
                }
                None => fields.errors.mark_error(cmd, true),
            },
            Command::Wid => match parse_dimension(param) {
                Some(width) => {
                    fields.width = width;
                    fields.errors.mark_error(cmd, false);
                }
                None => fields.errors.mark_error(cmd, true),
            },
            Command::Rad => match parse_dimension(param) {
                Some(radius) => {
                    fields.radius = radius;
                    fields.width = radius;
                    fields.length = radius;
                    fields.received.mark_received(Command::Wid);
                    fields.received.mark_received(Command::Len);
                    fields.errors.mark_error(cmd, false);
                }
                None => fields.errors.mark_error(cmd, true),
            },
            Command::Lim => match param.parse::<u32>() {
                Ok(limit) => {
                    fields.limit = limit;
                    fields.errors.mark_error(cmd, false);
                }
                Err(_) => fields.errors.mark_error(cmd, true),
            },
            Command::Met => {
                let truncated: String = param.chars().take(self.limits.max_meta_len).collect();
                fields.meta = truncated.trim().to_string();
            }
            Command::Mim => {
                fields.mimetype = param.trim().to_lowercase();
                fields.errors.mark_error(cmd, fields.mimetype.is_empty());
            }
            Command::Pjt => match parse_projection(param) {
                Some(projection) => {
                    fields.projection = Some(projection);
                    fields.errors.mark_error(cmd, false);
                }
                None => {
                    fields.projection = None;
                    fields.errors.mark_error(cmd, true);
                }
            },
            Command::Pro => {
                fields.protocol = param.to_uppercase();
                fields.errors.mark_error(cmd, false);
            }
            Command::Shp => {
                fields.shape = Shape::parse(param);
                fields.errors.mark_error(cmd, fields.shape.is_none());
            }
            Command::Dat => {
                return match param.parse::<usize>() {
                    Ok(len) if (1..=self.limits.max_data_len).contains(&len) => {
                        Step::ReadPayload { len }
                    }
                    _ => {
                        fields.errors.mark_error(cmd, true);
                        Step::Continue
                    }
                };
            }
            Command::Uid => {
                fields.uid = param.to_string();
                fields.errors.mark_error(cmd, false);
            }
            Command::Dbg => {
                self.verbose = true;
                info!("Verbose diagnostics enabled for session");
            }
            Command::Nop => return Step::Reply("ACK".to_string()),
            Command::Bye => return Step::Finish(Outcome::Disconnect),
            Command::Dot => return Step::Finish(Outcome::Proceed),
        }
        Step::Continue
    }

    /// Stores a payload read after `DAT`, or flags `DAT` when the read hit
    /// its deadline. Returns the reply to send, if any.
    pub fn accept_payload(&mut self, len: usize, bytes: Option<Vec<u8>>) -> Option<String> {
        match bytes {
            Some(mut data) if data.len() >= len => {
                let signature = data.split_off(len);
                self.fields.payload = Some(Payload { data, signature });
                self.fields.errors.mark_error(Command::Dat, false);
                Some("ACK".to_string())
            }
            _ => {
                warn!(len, "Payload not received before deadline");
                self.fields.payload = None;
                self.fields.errors.mark_error(Command::Dat, true);
                None
            }
        }
    }
}

fn parse_finite(token: &str) -> Option<f64> {
    token.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_dimension(token: &str) -> Option<f64> {
    parse_finite(token).filter(|v| (1.0..=MAX_DIMENSION).contains(v))
}

/// Parses `lat lon h [lat lon h ...]` with one shared height.
fn parse_locations(param: &str) -> Option<(Vec<GeoPoint>, f64)> {
    let values = param
        .split_whitespace()
        .map(parse_finite)
        .collect::<Option<Vec<f64>>>()?;
    if values.is_empty() || values.len() % 3 != 0 {
        return None;
    }

    let height = values[2];
    let mut points = Vec::with_capacity(values.len() / 3);
    for triple in values.chunks_exact(3) {
        if triple[2] != height {
            return None;
        }
        points.push(GeoPoint::new(triple[0], triple[1]).canonicalize());
    }
    Some((points, height))
}

/// Parses `angle range`; the angle is normalized and the range must be >= 0.
fn parse_projection(param: &str) -> Option<(f64, f64)> {
    let mut tokens = param.split_whitespace();
    let angle = parse_finite(tokens.next()?)?;
    let range = parse_finite(tokens.next()?)?;
    if tokens.next().is_some() || range < 0.0 {
        return None;
    }
    Some((normalize_degrees(angle), range))
}
