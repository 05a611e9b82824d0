use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::WorkflowError;
use crate::database::models::ScheduledViewing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewingStatus {
    Requested,
    OptionsSent,
    SlotSelected,
    Confirmed,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewingEvent {
    Propose,
    Select,
    Confirm,
    Complete,
    Cancel,
}

use ViewingEvent as E;
use ViewingStatus as S;

/// (from, event) -> to. Anything not listed is rejected.
const TRANSITIONS: &[(ViewingStatus, ViewingEvent, ViewingStatus)] = &[
    (S::Requested, E::Propose, S::OptionsSent),
    (S::OptionsSent, E::Select, S::SlotSelected),
    (S::SlotSelected, E::Confirm, S::Confirmed),
    (S::Confirmed, E::Complete, S::Completed),
    (S::Requested, E::Cancel, S::Cancelled),
    (S::OptionsSent, E::Cancel, S::Cancelled),
    (S::SlotSelected, E::Cancel, S::Cancelled),
    (S::Confirmed, E::Cancel, S::Cancelled),
];

impl ViewingEvent {
    fn verb(&self) -> &'static str {
        match self {
            E::Propose => "propose options",
            E::Select => "select a slot",
            E::Confirm => "confirm the viewing",
            E::Complete => "complete the viewing",
            E::Cancel => "cancel the viewing",
        }
    }
}

impl ViewingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            S::Requested => "requested",
            S::OptionsSent => "options_sent",
            S::SlotSelected => "slot_selected",
            S::Confirmed => "confirmed",
            S::Completed => "completed",
            S::Cancelled => "cancelled",
        }
    }

    pub fn next(self, event: ViewingEvent) -> Result<ViewingStatus, WorkflowError> {
        TRANSITIONS
            .iter()
            .find(|(from, ev, _)| *from == self && *ev == event)
            .map(|(_, _, to)| *to)
            .ok_or_else(|| WorkflowError::invalid(event.verb(), self))
    }
}

impl fmt::Display for ViewingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewingStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "requested" => Ok(S::Requested),
            "options_sent" => Ok(S::OptionsSent),
            "slot_selected" => Ok(S::SlotSelected),
            "confirmed" => Ok(S::Confirmed),
            "completed" => Ok(S::Completed),
            "cancelled" => Ok(S::Cancelled),
            other => Err(WorkflowError::UnknownStatus(other.to_string())),
        }
    }
}

/// Validated proposal: at least one date and one time.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub dates: Vec<NaiveDate>,
    pub times: Vec<String>,
}

pub fn propose(viewing: &ScheduledViewing, dates: &[String], times: &[String]) -> Result<(ViewingStatus, Proposal), WorkflowError> {
    let next = viewing.status.next(E::Propose)?;
    if dates.is_empty() {
        return Err(WorkflowError::validation("proposed_dates", "At least one proposed date is required"));
    }
    if times.is_empty() {
        return Err(WorkflowError::validation("proposed_times", "At least one proposed time is required"));
    }

    let mut parsed_dates = Vec::with_capacity(dates.len());
    for d in dates {
        let date = parse_date(d).ok_or_else(|| {
            WorkflowError::validation("proposed_dates", format!("Invalid date '{}', expected YYYY-MM-DD", d))
        })?;
        if !parsed_dates.contains(&date) {
            parsed_dates.push(date);
        }
    }
    let mut parsed_times = Vec::with_capacity(times.len());
    for t in times {
        let time = normalize_time(t).ok_or_else(|| {
            WorkflowError::validation("proposed_times", format!("Invalid time '{}', expected HH:MM", t))
        })?;
        if !parsed_times.contains(&time) {
            parsed_times.push(time);
        }
    }

    Ok((next, Proposal { dates: parsed_dates, times: parsed_times }))
}

/// The chosen slot must come from the proposed lists.
pub fn select(viewing: &ScheduledViewing, date: &str, time: &str) -> Result<(ViewingStatus, NaiveDate, String), WorkflowError> {
    let next = viewing.status.next(E::Select)?;

    let selected_date = parse_date(date)
        .filter(|d| viewing.proposed_dates.contains(d))
        .ok_or_else(|| WorkflowError::validation("selected_date", format!("'{}' is not one of the proposed dates", date)))?;
    let selected_time = normalize_time(time)
        .filter(|t| viewing.proposed_times.contains(t))
        .ok_or_else(|| WorkflowError::validation("selected_time", format!("'{}' is not one of the proposed times", time)))?;

    Ok((next, selected_date, selected_time))
}

/// Returns the slot to copy into `viewing_date` / `viewing_time`.
pub fn confirm(viewing: &ScheduledViewing) -> Result<(ViewingStatus, NaiveDate, String), WorkflowError> {
    let next = viewing.status.next(E::Confirm)?;
    match (viewing.selected_date, viewing.selected_time.clone()) {
        (Some(date), Some(time)) => Ok((next, date, time)),
        _ => Err(WorkflowError::validation("selected_date", "No slot has been selected for this viewing")),
    }
}

/// Staff may cancel any open viewing. A customer only while it is still
/// `requested` or once it is `confirmed`; in between, staff own the slot.
pub fn cancel(viewing: &ScheduledViewing, by_staff: bool) -> Result<ViewingStatus, WorkflowError> {
    let next = viewing.status.next(E::Cancel)?;
    if !by_staff && !matches!(viewing.status, S::Requested | S::Confirmed) {
        return Err(WorkflowError::invalid(E::Cancel.verb(), viewing.status));
    }
    Ok(next)
}

pub fn complete(viewing: &ScheduledViewing) -> Result<ViewingStatus, WorkflowError> {
    viewing.status.next(E::Complete)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Accepts `H:MM`, `HH:MM` or `HH:MM:SS`; yields `HH:MM`.
fn normalize_time(s: &str) -> Option<String> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
        .map(|t| t.format("%H:%M").to_string())
}
