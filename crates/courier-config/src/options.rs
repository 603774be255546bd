//! Enumerated configuration options.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Role a `courierd` process plays in the deployment.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum NodeRole {
    /// Public query gateway dispatching to the backends.
    #[default]
    Gateway,
    /// Backend answering user commands.
    Users,
    /// Backend answering form commands.
    Forms,
}

/// Errors encountered while parsing a [`LogFormat`] or [`NodeRole`] from text.
pub type OptionParseError = strum::ParseError;
