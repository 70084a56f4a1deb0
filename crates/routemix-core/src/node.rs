//! Subscription node lines.
//!
//! A subscription feed is a plain-text document with one node descriptor per
//! line:
//!
//! ```text
//! name,type,host,port,uuid[,key=value...]
//! ```
//!
//! Providers interleave account-status banners (remaining quota, reset
//! countdowns, plan expiry) with the real nodes; [`is_banner`] recognizes
//! them by name so they can be screened out before or after parsing.

use indexmap::IndexMap;
use thiserror::Error;

/// Comma-separated fields required before the `key=value` tail.
const REQUIRED_FIELDS: usize = 5;

/// Name markers providers use for account-status banner lines.
const BANNER_MARKERS: [&str; 3] = ["剩余流量", "距离下次重置剩余", "套餐到期"];

/// Errors produced while parsing a node descriptor line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The line has fewer comma-separated fields than a node needs.
    #[error("expected at least {REQUIRED_FIELDS} fields, found {0}")]
    TooFewFields(usize),

    /// The port field is not a valid 16-bit unsigned integer.
    #[error("invalid port {0:?}")]
    InvalidPort(String),

    /// A required field is empty after trimming.
    #[error("empty {0} field")]
    EmptyField(&'static str),
}

/// Result type for parsing operations.
pub type Result<T> = std::result::Result<T, ParseError>;

/// One proxy endpoint parsed from a subscription line.
///
/// Immutable once parsed; records live only for the duration of one
/// synthesis run and are never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// Display name, also the source of the region code.
    pub name: String,
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Credential token (UUID-shaped in practice).
    pub uuid: String,
    /// `key=value` parameters in line order; duplicate keys last-write-wins.
    pub params: IndexMap<String, String>,
    /// Substring of the name before the first `-`, or the whole name.
    pub region: String,
}

impl NodeRecord {
    /// Looks up a connection parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Parses one `name,type,host,port,uuid[,key=value...]` line.
///
/// The type tag is carried by the feed but unused. Double quotes around (or
/// inside) the identifier and parameter values are stripped; only the first
/// `=` separates a parameter key from its value, so later equals signs stay
/// part of the value.
pub fn parse_node_line(line: &str) -> Result<NodeRecord> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < REQUIRED_FIELDS {
        return Err(ParseError::TooFewFields(fields.len()));
    }

    let name = fields[0].trim();
    if name.is_empty() {
        return Err(ParseError::EmptyField("name"));
    }
    let host = fields[2].trim();
    if host.is_empty() {
        return Err(ParseError::EmptyField("host"));
    }
    let port_field = fields[3].trim();
    let port: u16 = port_field
        .parse()
        .map_err(|_| ParseError::InvalidPort(port_field.to_string()))?;
    let uuid = fields[4].replace('"', "");
    let uuid = uuid.trim();
    if uuid.is_empty() {
        return Err(ParseError::EmptyField("identifier"));
    }

    let mut params = IndexMap::new();
    for field in &fields[REQUIRED_FIELDS..] {
        if let Some((key, value)) = field.split_once('=') {
            let value = value.replace('"', "");
            params.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    // Region derivation never fails: a name without a separator is its own
    // region code.
    let region = name.split('-').next().unwrap_or(name).to_string();

    Ok(NodeRecord {
        name: name.to_string(),
        host: host.to_string(),
        port,
        uuid: uuid.to_string(),
        params,
        region,
    })
}

/// Returns whether a node name is an account-status banner.
pub fn is_banner(name: &str) -> bool {
    BANNER_MARKERS.iter().any(|marker| name.contains(marker))
}

/// Drops banner records, preserving the order of the survivors.
///
/// Idempotent: filtering an already filtered list returns it unchanged.
pub fn filter_banners(nodes: Vec<NodeRecord>) -> Vec<NodeRecord> {
    nodes.into_iter().filter(|n| !is_banner(&n.name)).collect()
}
