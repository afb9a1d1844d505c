//! # Publication Reports
//!
//! Human-readable summary sent after a successful anchor: the anchored
//! digest, the previous anchor for context, and how every entry in the
//! verified range was computed.

use crate::domain::entities::{ChainEntry, ChainPosition, PublicationRecord, Timestamp};
use crate::domain::fingerprint::short_hex;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// One row of the verified range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLine {
    pub position: ChainPosition,
    pub item_fingerprint: String,
    pub linking_input: String,
    pub digest: String,
}

impl From<&ChainEntry> for ReportLine {
    fn from(entry: &ChainEntry) -> Self {
        Self {
            position: entry.position,
            item_fingerprint: entry.item_fingerprint.encode(),
            linking_input: entry.linking_input_hex(),
            digest: entry.digest_hex(),
        }
    }
}

/// Summary of one anchor event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationReport {
    pub authority: String,
    pub anchored_position: ChainPosition,
    pub anchored_digest: String,
    pub previous: Option<PublicationRecord>,
    pub lines: Vec<ReportLine>,
    pub generated_at: Timestamp,
}

impl PublicationReport {
    pub fn new(
        publication: &PublicationRecord,
        previous: Option<PublicationRecord>,
        verified: &[ChainEntry],
    ) -> Self {
        Self {
            authority: publication.authority.clone(),
            anchored_position: publication.position,
            anchored_digest: publication.digest_hex.clone(),
            previous,
            lines: verified.iter().map(ReportLine::from).collect(),
            generated_at: publication.published_at,
        }
    }

    pub fn subject(&self) -> String {
        format!("Successfully published to {}", self.authority)
    }

    /// Plain-text body. Digests and linking inputs in the table are shortened
    /// when `short_digests` is set.
    pub fn render(&self, short_digests: bool) -> String {
        let shorten = |hex: &str| {
            if short_digests {
                short_hex(hex)
            } else {
                hex.to_string()
            }
        };

        let mut body = String::new();
        let _ = writeln!(body, "Good {},", time_of_day(self.generated_at));
        let _ = writeln!(body);
        let _ = writeln!(
            body,
            "The published value to {} is: {}",
            self.authority, self.anchored_digest
        );
        let _ = writeln!(body);
        let _ = writeln!(body, "The value was calculated as follows:");
        let _ = writeln!(body);
        match &self.previous {
            None => {
                let _ = writeln!(body, "This is the first value to be published.");
            }
            Some(prev) => {
                let _ = writeln!(
                    body,
                    "Previous published value, at {}, had ID {} and hash {}.",
                    format_timestamp(prev.published_at),
                    prev.position,
                    prev.digest_hex
                );
            }
        }
        let _ = writeln!(body);
        let _ = writeln!(body, "Chain Id | Hash | Hashed value | Chain hash");
        let _ = writeln!(body);
        for line in &self.lines {
            let _ = writeln!(
                body,
                "{} | {} | {} | {}",
                line.position,
                line.item_fingerprint,
                shorten(&line.linking_input),
                shorten(&line.digest)
            );
            let _ = writeln!(body);
        }
        let _ = writeln!(body);
        let _ = writeln!(
            body,
            "The last chained hash was published to {}.",
            self.authority
        );
        body
    }
}

fn time_of_day(at: Timestamp) -> &'static str {
    let hour = i64::try_from(at)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|t| t.hour())
        .unwrap_or(0);
    match hour {
        h if h >= 18 => "evening",
        h if h > 12 => "afternoon",
        _ => "morning",
    }
}

fn format_timestamp(at: Timestamp) -> String {
    i64::try_from(at)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| at.to_string())
}
