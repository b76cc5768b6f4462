//! Format routing
//!
//! Camera-native RAW containers go to the object store; delivery formats go
//! to the media platform.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{AppError, Result};

/// Camera/cinema RAW containers
pub const RAW_EXTENSIONS: &[&str] = &[
    "braw", // Blackmagic RAW
    "r3d",  // RED
    "ari",  // ARRIRAW
    "arri",
    "dng", // CinemaDNG
    "crm", // Canon Cinema RAW Light
    "mxf",
    "dpx",
    "cin",
];

/// Standard delivery video containers
pub const STREAM_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "mkv", "avi", "webm", "flv", "mpg", "mpeg", "3gp", "wmv", "m4v",
];

/// Which backend a file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaClass {
    Raw,
    Stream,
}

/// What to do with an extension found in neither list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFormatPolicy {
    /// Fail with `InvalidFormat`
    Reject,
    /// Treat as a delivery format
    Stream,
}

impl FromStr for UnknownFormatPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "stream" => Ok(Self::Stream),
            other => Err(format!("expected 'reject' or 'stream', got '{}'", other)),
        }
    }
}

/// Lower-cased extension after the last dot, if any
pub fn extension(filename: &str) -> Option<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_ascii_lowercase()),
        _ => None,
    }
}

/// Classifies filenames by extension
#[derive(Debug, Clone, Copy)]
pub struct FormatRouter {
    unknown: UnknownFormatPolicy,
}

impl FormatRouter {
    pub fn new(unknown: UnknownFormatPolicy) -> Self {
        Self { unknown }
    }

    pub fn classify(&self, filename: &str) -> Result<MediaClass> {
        let ext = extension(filename);

        match ext.as_deref() {
            Some(ext) if RAW_EXTENSIONS.contains(&ext) => Ok(MediaClass::Raw),
            Some(ext) if STREAM_EXTENSIONS.contains(&ext) => Ok(MediaClass::Stream),
            _ => match self.unknown {
                UnknownFormatPolicy::Stream => {
                    tracing::debug!(filename = %filename, "Unknown extension routed to stream backend");
                    Ok(MediaClass::Stream)
                }
                UnknownFormatPolicy::Reject => Err(AppError::InvalidFormat(format!(
                    "{} (extension: {})",
                    filename,
                    ext.as_deref().unwrap_or("none")
                ))),
            },
        }
    }
}

impl Default for FormatRouter {
    fn default() -> Self {
        Self::new(UnknownFormatPolicy::Reject)
    }
}
