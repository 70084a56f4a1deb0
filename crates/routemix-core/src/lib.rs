//! RouteMix Core - node parsing, grouping, and configuration synthesis.
//!
//! This crate is the pure data pipeline behind RouteMix: it turns the raw
//! lines of a subscription feed into typed node records, drops the
//! account-status banners providers interleave with real nodes, buckets
//! nodes by region, and assembles the final routing configuration document.
//!
//! Nothing here performs I/O; fetching the feed and delivering the document
//! are the caller's concern.
//!
//! # Example
//!
//! ```
//! use routemix_core::{filter_banners, group_by_region, parse_node_line, synthesize, to_yaml};
//!
//! let nodes = vec![
//!     parse_node_line("US-01,vless,1.2.3.4,443,abc-uuid,transport=ws").unwrap(),
//!     parse_node_line("JP-02,vless,5.6.7.8,8443,def-uuid").unwrap(),
//! ];
//! let nodes = filter_banners(nodes);
//! let regions = group_by_region(&nodes);
//! let config = synthesize(&nodes, &regions, &["Netflix".to_string()]).unwrap();
//! let yaml = to_yaml(&config).unwrap();
//! assert!(yaml.contains("RULE-SET,Netflix,Netflix"));
//! ```

pub mod config;
pub mod node;
pub mod region;

pub use config::{
    canonical_folder, synthesize, to_yaml, ClashConfig, ConfigError, Proxy, ProxyGroup,
    RuleProvider, AUTO_GROUP,
};
pub use node::{filter_banners, is_banner, parse_node_line, NodeRecord, ParseError};
pub use region::{group_by_region, region_label, RegionGroup};
