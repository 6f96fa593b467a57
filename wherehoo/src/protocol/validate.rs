//! End-of-collection checks that turn session fields into an operation.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use super::command::Command;
use super::error::CommandRejected;
use super::fields::{Action, SessionFields, Shape};
use super::SessionLimits;
use crate::geo::Polygon;
use crate::operation::{
    CountOperation, DeleteOperation, InsertOperation, Operation, SearchArea, SearchFilter,
    SearchOperation,
};
use crate::store::{verify_signature, Store, StoreError};

/// Validates collected fields against the declared action.
///
/// Every failing field is reported, in a fixed per-action order. Store
/// lookups that fail count as failed checks.
pub async fn build_operation(
    fields: SessionFields,
    store: &dyn Store,
    limits: &SessionLimits,
    now: DateTime<Utc>,
) -> Result<Operation, CommandRejected> {
    let action = match fields.action {
        Some(action) if fields.is_valid(Command::Act) => action,
        _ => return Err(CommandRejected::single(Command::Act)),
    };

    match action {
        Action::Insert => validate_insert(fields, store, limits, now).await,
        Action::Query | Action::Count => validate_search(fields, action, store).await,
        Action::Delete => validate_delete(fields, store).await,
    }
}

/// Collapses a store lookup to a pass/fail, logging failures.
fn passed(check: &str, result: Result<bool, StoreError>) -> bool {
    match result {
        Ok(ok) => ok,
        Err(e) => {
            warn!(check, error = %e, "Store check failed");
            false
        }
    }
}

async fn identity_registered(fields: &SessionFields, store: &dyn Store) -> bool {
    fields.is_valid(Command::Idt)
        && passed("identity", store.check_identity(&fields.identity).await)
}

async fn validate_insert(
    fields: SessionFields,
    store: &dyn Store,
    limits: &SessionLimits,
    now: DateTime<Utc>,
) -> Result<Operation, CommandRejected> {
    let mut rejected = Vec::new();

    if !identity_registered(&fields, store).await {
        rejected.push(Command::Idt);
    }
    if fields.errors.is_error(Command::Mim) {
        rejected.push(Command::Mim);
    }
    if !fields.is_valid(Command::Pro)
        || !passed("protocol", store.check_protocol(&fields.protocol).await)
    {
        rejected.push(Command::Pro);
    }
    if fields.errors.is_error(Command::Pjt) {
        rejected.push(Command::Pjt);
    }
    if !fields.is_valid(Command::Llh) {
        rejected.push(Command::Llh);
    }

    let min_life = TimeDelta::from_std(limits.record_min_life).unwrap_or(TimeDelta::MAX);
    let compliant = fields.interval.complies_for_insert(now, min_life);
    let received = &fields.received;
    if fields.errors.is_error(Command::Beg) || (!compliant && received.is_received(Command::Beg)) {
        rejected.push(Command::Beg);
    }
    if fields.errors.is_error(Command::End) || (!compliant && received.is_received(Command::End)) {
        rejected.push(Command::End);
    }

    if !fields.is_valid(Command::Dat) || fields.payload.is_none() {
        rejected.push(Command::Dat);
    }
    if !signature_verified(&fields, store).await {
        rejected.push(Command::Sha);
    }

    if !rejected.is_empty() {
        return Err(CommandRejected::new(rejected));
    }

    let area = insert_area(&fields).ok_or_else(|| CommandRejected::single(Command::Llh))?;
    let received = fields.received;
    let payload = fields.payload.map(|p| p.data).unwrap_or_default();
    debug!(area = %area, "Insert validated");

    Ok(Operation::Insert(InsertOperation {
        identity: fields.identity,
        area,
        height: fields.height,
        begin: fields.interval.begin(),
        end: fields.interval.end(),
        payload,
        mimetype: fields.mimetype,
        protocol: fields.protocol,
        meta: received.is_received(Command::Met).then_some(fields.meta),
    }))
}

async fn signature_verified(fields: &SessionFields, store: &dyn Store) -> bool {
    if !fields.received.is_received(Command::Sha) {
        return false;
    }
    let Some(payload) = &fields.payload else {
        return false;
    };
    let secret = match store.fetch_secret(&fields.identity).await {
        Ok(Some(secret)) => secret,
        Ok(None) => return false,
        Err(e) => {
            warn!(error = %e, "Store check failed");
            return false;
        }
    };
    verify_signature(&payload.data, &secret, &payload.signature)
}

fn insert_area(fields: &SessionFields) -> Option<Polygon> {
    let polygon = Polygon::new(fields.locations.clone()).ok()?;
    Some(match projection(fields) {
        Some((angle, range)) => polygon.project(angle, range),
        None => polygon,
    })
}

fn projection(fields: &SessionFields) -> Option<(f64, f64)> {
    if fields.is_valid(Command::Pjt) {
        fields.projection
    } else {
        None
    }
}

async fn validate_search(
    fields: SessionFields,
    action: Action,
    store: &dyn Store,
) -> Result<Operation, CommandRejected> {
    let mut rejected = Vec::new();

    if fields.errors.is_error(Command::Lim) {
        rejected.push(Command::Lim);
    }
    match fields.shape {
        Some(shape) if fields.is_valid(Command::Shp) => match shape {
            Shape::RectCenter => {
                if !fields.is_valid(Command::Rad) {
                    rejected.push(Command::Rad);
                }
            }
            Shape::RectForward => {
                for cmd in [Command::Hdg, Command::Wid, Command::Len] {
                    if !fields.is_valid(cmd) {
                        rejected.push(cmd);
                    }
                }
            }
        },
        _ => rejected.push(Command::Shp),
    }
    if fields.errors.is_error(Command::Mim) {
        rejected.push(Command::Mim);
    }
    if fields.errors.is_error(Command::Pro)
        || (fields.received.is_received(Command::Pro)
            && !passed("protocol", store.check_protocol(&fields.protocol).await))
    {
        rejected.push(Command::Pro);
    }
    for cmd in [Command::Beg, Command::End, Command::Pjt] {
        if fields.errors.is_error(cmd) {
            rejected.push(cmd);
        }
    }
    if !fields.is_valid(Command::Llh) || fields.locations.is_empty() {
        rejected.push(Command::Llh);
    }

    if !rejected.is_empty() {
        return Err(CommandRejected::new(rejected));
    }

    let location = fields.locations[0];
    let polygon = match fields.shape {
        Some(Shape::RectForward) => {
            Polygon::rectangle(location, fields.heading, fields.width, fields.length)
        }
        _ => Polygon::square(location, fields.radius),
    };
    let polygon = match projection(&fields) {
        Some((angle, range)) => polygon.project(angle, range),
        None => polygon,
    };
    debug!(area = %polygon, "Search area built");

    let received = &fields.received;
    let filter = SearchFilter {
        area: SearchArea::new(polygon, location, fields.height, fields.heading),
        begin: received
            .is_received(Command::Beg)
            .then(|| fields.interval.begin()),
        end: received.is_received(Command::End).then(|| fields.interval.end()),
        mimetype: received
            .is_received(Command::Mim)
            .then(|| fields.mimetype.clone()),
        protocol: received
            .is_received(Command::Pro)
            .then(|| fields.protocol.clone()),
        meta: received.is_received(Command::Met).then(|| fields.meta.clone()),
        limit: received.is_received(Command::Lim).then_some(fields.limit),
    };

    Ok(match action {
        Action::Count => Operation::Count(CountOperation::new(filter)),
        _ => Operation::Search(SearchOperation::new(filter)),
    })
}

async fn validate_delete(
    fields: SessionFields,
    store: &dyn Store,
) -> Result<Operation, CommandRejected> {
    let mut rejected = Vec::new();

    if !identity_registered(&fields, store).await {
        rejected.push(Command::Idt);
    }
    if !fields.is_valid(Command::Uid)
        || !passed("record", store.check_record_exists(&fields.uid).await)
    {
        rejected.push(Command::Uid);
    }

    if !rejected.is_empty() {
        return Err(CommandRejected::new(rejected));
    }
    Ok(Operation::Delete(DeleteOperation::new(fields.uid)))
}
