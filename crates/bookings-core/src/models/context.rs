//! Replica identity and booking id generation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::BookingId;
use crate::error::Error;

/// Length of generated context ids, taken from the random tail of a UUID v7.
const GENERATED_CONTEXT_LEN: usize = 10;

/// Identifier of one replica (one open tab/window of a session)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    /// Wrap an existing context id
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate a fresh random context id
    #[must_use]
    pub fn generate() -> Self {
        let simple = Uuid::now_v7().simple().to_string();
        let tail = &simple[simple.len() - GENERATED_CONTEXT_LEN..];
        Self(tail.to_string())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a replica mints booking ids.
///
/// Both variants are collision-free across replicas without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// UUID v7 (time-sortable)
    #[default]
    Uuid,
    /// `{contextId}-{seq}` with a per-replica monotonic counter
    Sequenced,
}

impl IdStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uuid => "uuid",
            Self::Sequenced => "sequenced",
        }
    }
}

impl FromStr for IdStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uuid" => Ok(Self::Uuid),
            "sequenced" | "seq" => Ok(Self::Sequenced),
            other => Err(Error::Validation(format!("unknown id strategy '{other}'"))),
        }
    }
}

/// Hands out booking ids for one replica
#[derive(Debug)]
pub struct IdGenerator {
    strategy: IdStrategy,
    context: ContextId,
    next_seq: u64,
}

impl IdGenerator {
    pub const fn new(strategy: IdStrategy, context: ContextId) -> Self {
        Self {
            strategy,
            context,
            next_seq: 1,
        }
    }

    pub const fn strategy(&self) -> IdStrategy {
        self.strategy
    }

    /// Mint the next id
    pub fn next_id(&mut self) -> BookingId {
        match self.strategy {
            IdStrategy::Uuid => BookingId::new(Uuid::now_v7().to_string()),
            IdStrategy::Sequenced => {
                let seq = self.next_seq;
                self.next_seq += 1;
                BookingId::new(format!("{}-{seq}", self.context))
            }
        }
    }

    /// Move the sequence past `id` when it was minted under this context.
    ///
    /// A reopened context with a fixed id learns its earlier sequence
    /// numbers from the records and deletions it receives.
    pub fn observe(&mut self, id: &BookingId) {
        if self.strategy != IdStrategy::Sequenced {
            return;
        }
        let seq = id
            .as_str()
            .strip_prefix(self.context.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|rest| rest.parse::<u64>().ok());
        if let Some(seq) = seq {
            self.next_seq = self.next_seq.max(seq.saturating_add(1));
        }
    }
}
