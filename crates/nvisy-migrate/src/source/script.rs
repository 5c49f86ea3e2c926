//! Migration script types and file name parsing.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Direction a migration script is applied in.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Forward; moves the schema to a newer version.
    Up,
    /// Backward; reverts the schema to an older version.
    Down,
}

/// One script file, as read from the source directory.
#[derive(Clone, PartialEq, Eq)]
pub struct ScriptFile {
    /// File name, used to identify the script in logs and errors.
    pub name: String,
    /// Raw script content.
    pub body: String,
}

impl ScriptFile {
    /// Creates a script file from its name and content.
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }

    /// Returns whether the script has nothing to execute.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }
}

impl fmt::Debug for ScriptFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptFile")
            .field("name", &self.name)
            .field("bytes", &self.body.len())
            .finish()
    }
}

/// A versioned unit of schema change with its forward and reverse scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    /// Version number, taken from the file name.
    pub version: u64,
    /// Descriptive part of the file name.
    pub title: String,
    /// Forward script.
    pub up: ScriptFile,
    /// Reverse script, if one was provided.
    pub down: Option<ScriptFile>,
}

impl MigrationScript {
    /// Creates a script with only a forward body.
    pub fn new(version: u64, title: impl Into<String>, up: ScriptFile) -> Self {
        Self {
            version,
            title: title.into(),
            up,
            down: None,
        }
    }

    /// Attaches a reverse body.
    pub fn with_down(mut self, down: ScriptFile) -> Self {
        self.down = Some(down);
        self
    }

    /// Returns the script for the given direction.
    pub fn file(&self, direction: Direction) -> Option<&ScriptFile> {
        match direction {
            Direction::Up => Some(&self.up),
            Direction::Down => self.down.as_ref(),
        }
    }
}

/// Parts of a script file name: `{version}_{title}.{up|down}.{ext}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedName<'a> {
    pub version: u64,
    pub title: &'a str,
    pub direction: Direction,
}

/// Parses a script file name, returning `None` for files that do not follow
/// the naming convention.
pub(crate) fn parse_file_name(name: &str) -> Option<ParsedName<'_>> {
    let (version, rest) = name.split_once('_')?;
    if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let version = version.parse().ok()?;

    let up = rest.rfind(".up.").map(|pos| (pos, Direction::Up, 4));
    let down = rest.rfind(".down.").map(|pos| (pos, Direction::Down, 6));
    let (pos, direction, marker_len) = match (up, down) {
        (Some(up), Some(down)) => {
            if up.0 > down.0 {
                up
            } else {
                down
            }
        }
        (Some(found), None) | (None, Some(found)) => found,
        (None, None) => return None,
    };

    let extension = &rest[pos + marker_len..];
    if extension.is_empty() {
        return None;
    }

    Some(ParsedName {
        version,
        title: &rest[..pos],
        direction,
    })
}
