use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix reserved for system streams (projection registry, checkpoints).
pub const SYSTEM_STREAM_PREFIX: char = '$';

/// Stream holding every projection definition and tombstone.
pub const PROJECTION_REGISTRY_STREAM: &str = "$projections-$all";

/// Errors produced when parsing identifiers from user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("identifier must not be empty")]
    Empty,

    #[error("identifier must not contain '/': {0}")]
    InvalidCharacter(String),

    #[error("invalid log position: {0}")]
    InvalidPosition(String),
}

/// Name of a stream in the log.
///
/// Stream names are free-form except that they cannot be empty or contain a
/// `/` (it would break feed URIs). Names starting with `$` are system streams.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Creates a stream id, validating its shape.
    pub fn new(name: impl Into<String>) -> Result<Self, IdentifierError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self(name))
    }

    /// Returns the stream name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for `$`-prefixed system streams.
    pub fn is_system(&self) -> bool {
        self.0.starts_with(SYSTEM_STREAM_PREFIX)
    }

    /// The projection registry stream.
    pub fn projection_registry() -> Self {
        Self(PROJECTION_REGISTRY_STREAM.to_string())
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StreamId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Unique name of a projection. Assigned at creation and never reused.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectionName(String);

impl ProjectionName {
    /// Creates a projection name, validating its shape.
    pub fn new(name: impl Into<String>) -> Result<Self, IdentifierError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self(name))
    }

    /// Returns the projection name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stream of this projection's management events.
    pub fn management_stream(&self) -> StreamId {
        StreamId(format!("$projections-{}", self.0))
    }

    /// Stream of this projection's checkpoints.
    pub fn checkpoint_stream(&self) -> StreamId {
        StreamId(format!("$projections-{}-checkpoint", self.0))
    }
}

impl std::fmt::Display for ProjectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProjectionName {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

fn validate_name(name: &str) -> Result<(), IdentifierError> {
    if name.is_empty() {
        return Err(IdentifierError::Empty);
    }
    if name.contains('/') {
        return Err(IdentifierError::InvalidCharacter(name.to_string()));
    }
    Ok(())
}

/// A position in the global log (the `$all` stream).
///
/// Ordered by commit position, then prepare position. `END` is a sentinel
/// used to request a backward read from the current end of the log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct LogPosition {
    pub commit: i64,
    pub prepare: i64,
}

impl LogPosition {
    /// The beginning of the log.
    pub const START: LogPosition = LogPosition {
        commit: 0,
        prepare: 0,
    };

    /// Sentinel for "current end of the log".
    pub const END: LogPosition = LogPosition {
        commit: -1,
        prepare: -1,
    };

    pub fn new(commit: i64, prepare: i64) -> Self {
        Self { commit, prepare }
    }

    /// Returns true if this is the `END` sentinel.
    pub fn is_end(&self) -> bool {
        *self == Self::END
    }
}

/// Formats as 32 upper-case hex digits: commit then prepare.
impl std::fmt::Display for LogPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016X}{:016X}", self.commit as u64, self.prepare as u64)
    }
}

impl FromStr for LogPosition {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 || !s.is_ascii() {
            return Err(IdentifierError::InvalidPosition(s.to_string()));
        }
        let parse = |part: &str| {
            u64::from_str_radix(part, 16)
                .map(|v| v as i64)
                .map_err(|_| IdentifierError::InvalidPosition(s.to_string()))
        };
        Ok(Self {
            commit: parse(&s[..16])?,
            prepare: parse(&s[16..])?,
        })
    }
}
