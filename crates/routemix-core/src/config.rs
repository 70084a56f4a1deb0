//! Configuration synthesis.
//!
//! Assembles the output routing document from filtered nodes, region
//! groups, and the chosen rule-set names, then serializes it as YAML. The
//! serialized key order follows struct field order, and the rule-provider
//! map keeps caller order, so the document is stable across runs.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

use crate::node::NodeRecord;
use crate::region::RegionGroup;

/// Name of the auto-selecting latency-probe group.
pub const AUTO_GROUP: &str = "Automatic";

/// Health-check target probed by the latency group.
const PROBE_URL: &str = "https://cp.cloudflare.com/generate_204";

/// Latency re-probe interval, in seconds.
const PROBE_INTERVAL: u32 = 300;

/// Rule-provider refresh interval, in seconds (24 hours).
const PROVIDER_INTERVAL: u32 = 86_400;

/// Remote base location of the hosted rule-set lists.
const RULE_BASE_URL: &str =
    "https://raw.githubusercontent.com/blackmatrix7/ios_rule_script/refs/heads/master/rule/Clash";

/// Display-name → canonical-folder overrides for hosted rule sets.
const FOLDER_ALIASES: [(&str, &str); 5] = [
    ("PrimeVideo", "AmazonPrimeVideo"),
    ("TikTok", "DouYin"),
    ("Copilot", "MicrosoftCopilot"),
    ("ChatGPT", "OpenAI"),
    ("X", "Twitter"),
];

/// Resolves a rule-set display name to its canonical remote folder.
///
/// Names without an override resolve to themselves.
pub fn canonical_folder(name: &str) -> &str {
    FOLDER_ALIASES
        .iter()
        .find(|(display, _)| *display == name)
        .map_or(name, |(_, folder)| *folder)
}

/// Errors raised while assembling the output document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Two policy groups would share the same name.
    #[error("policy group name {0:?} is already taken")]
    GroupNameCollision(String),

    /// The document could not be serialized.
    #[error("failed to serialize configuration: {0}")]
    Serialize(String),
}

/// Result type for synthesis operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// One proxy entry of the output document.
#[derive(Debug, Clone, Serialize)]
pub struct Proxy {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub server: String,
    pub port: u16,
    pub uuid: String,
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    pub tls: bool,
    #[serde(rename = "skip-cert-verify")]
    pub skip_cert_verify: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    pub udp: bool,
}

impl From<&NodeRecord> for Proxy {
    fn from(node: &NodeRecord) -> Self {
        Self {
            name: node.name.clone(),
            kind: "vless",
            server: node.host.clone(),
            port: node.port,
            uuid: node.uuid.clone(),
            network: node.param("transport").unwrap_or("tcp").to_string(),
            flow: node.param("flow").map(str::to_string),
            tls: node.param("over-tls") == Some("true"),
            // Verification is skipped unless the feed opts in explicitly.
            skip_cert_verify: node.param("skip-cert-verify") != Some("false"),
            sni: node.param("sni").map(str::to_string),
            udp: node.param("udp") == Some("true"),
        }
    }
}

/// One policy group entry of the output document.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyGroup {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxies: Option<Vec<String>>,
}

impl ProxyGroup {
    /// The latency-probe group re-evaluated by the consuming software.
    fn url_test(name: impl Into<String>, proxies: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: "url-test",
            url: Some(PROBE_URL),
            interval: Some(PROBE_INTERVAL),
            proxies: Some(proxies),
        }
    }

    /// A manual-choice group.
    fn select(name: impl Into<String>, proxies: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: "select",
            url: None,
            interval: None,
            proxies: Some(proxies),
        }
    }

    /// A fixed-behavior group with no members (DIRECT, REJECT).
    fn fixed(name: &'static str, kind: &'static str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            url: None,
            interval: None,
            proxies: None,
        }
    }
}

/// One rule-set provider binding.
#[derive(Debug, Clone, Serialize)]
pub struct RuleProvider {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub behavior: &'static str,
    pub url: String,
    pub path: String,
    pub interval: u32,
}

impl RuleProvider {
    /// Builds the binding for one rule set from its canonical folder name.
    fn hosted(folder: &str) -> Self {
        Self {
            kind: "http",
            behavior: "domain",
            url: format!("{RULE_BASE_URL}/{folder}/{folder}.yaml"),
            path: format!("./rules/{folder}.yaml"),
            interval: PROVIDER_INTERVAL,
        }
    }
}

/// The full output document. Field order is the serialized key order.
#[derive(Debug, Serialize)]
pub struct ClashConfig {
    pub port: u16,
    #[serde(rename = "socksPort")]
    pub socks_port: u16,
    #[serde(rename = "allow-lan")]
    pub allow_lan: bool,
    pub mode: &'static str,
    pub proxies: Vec<Proxy>,
    #[serde(rename = "proxy-groups")]
    pub proxy_groups: Vec<ProxyGroup>,
    #[serde(rename = "rule-providers")]
    pub rule_providers: IndexMap<String, RuleProvider>,
    pub rules: Vec<String>,
}

/// Assembles the output document.
///
/// `nodes` must already be banner-filtered; `regions` come from
/// [`crate::group_by_region`] over the same nodes; `rule_sets` are the
/// chosen names in caller order (deduplicated by the caller).
///
/// Group names must be unique across the whole document: a rule-set name or
/// region label that collides with an already-emitted group name (including
/// `DIRECT`, `REJECT`, and the probe group) is rejected, and no partial
/// document is produced.
pub fn synthesize(
    nodes: &[NodeRecord],
    regions: &[RegionGroup],
    rule_sets: &[String],
) -> Result<ClashConfig> {
    let proxies: Vec<Proxy> = nodes.iter().map(Proxy::from).collect();
    let proxy_names: Vec<String> = proxies.iter().map(|p| p.name.clone()).collect();
    let region_labels: Vec<String> = regions.iter().map(|r| r.label.clone()).collect();

    let mut seen = HashSet::new();
    let mut groups = Vec::with_capacity(regions.len() + rule_sets.len() + 3);
    let mut push = |groups: &mut Vec<ProxyGroup>, group: ProxyGroup| -> Result<()> {
        if !seen.insert(group.name.clone()) {
            return Err(ConfigError::GroupNameCollision(group.name));
        }
        groups.push(group);
        Ok(())
    };

    push(&mut groups, ProxyGroup::url_test(AUTO_GROUP, proxy_names))?;
    for region in regions {
        push(
            &mut groups,
            ProxyGroup::select(region.label.clone(), region.nodes.clone()),
        )?;
    }
    push(&mut groups, ProxyGroup::fixed("DIRECT", "direct"))?;
    push(&mut groups, ProxyGroup::fixed("REJECT", "reject"))?;

    // Candidates every rule-target group offers, in document order.
    let mut candidates = Vec::with_capacity(region_labels.len() + 3);
    candidates.push(AUTO_GROUP.to_string());
    candidates.extend(region_labels);
    candidates.push("DIRECT".to_string());
    candidates.push("REJECT".to_string());

    for rule_set in rule_sets {
        push(
            &mut groups,
            ProxyGroup::select(rule_set.clone(), candidates.clone()),
        )?;
    }

    let mut rule_providers = IndexMap::with_capacity(rule_sets.len());
    for rule_set in rule_sets {
        let folder = canonical_folder(rule_set);
        rule_providers.insert(rule_set.clone(), RuleProvider::hosted(folder));
    }

    let mut rules: Vec<String> = rule_sets
        .iter()
        .map(|name| format!("RULE-SET,{name},{name}"))
        .collect();
    rules.push(format!("MATCH,{AUTO_GROUP}"));

    Ok(ClashConfig {
        port: 7890,
        socks_port: 7891,
        allow_lan: true,
        mode: "rule",
        proxies,
        proxy_groups: groups,
        rule_providers,
        rules,
    })
}

/// Serializes the document as key-ordered YAML.
pub fn to_yaml(config: &ClashConfig) -> Result<String> {
    serde_yaml::to_string(config).map_err(|e| ConfigError::Serialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{filter_banners, parse_node_line};
    use crate::region::group_by_region;

    fn pipeline(lines: &[&str], rule_sets: &[&str]) -> Result<ClashConfig> {
        let nodes: Vec<NodeRecord> = lines
            .iter()
            .filter(|&l| !crate::node::is_banner(l.split(',').next().unwrap_or(l)))
            .map(|l| parse_node_line(l).unwrap())
            .collect();
        let nodes = filter_banners(nodes);
        let regions = group_by_region(&nodes);
        let rule_sets: Vec<String> = rule_sets.iter().map(|s| s.to_string()).collect();
        synthesize(&nodes, &regions, &rule_sets)
    }

    // ==================== Proxy Entry Tests ====================

    #[test]
    fn test_proxy_defaults() {
        let node = parse_node_line("US-01,vless,1.2.3.4,443,abc-uuid").unwrap();
        let proxy = Proxy::from(&node);
        assert_eq!(proxy.kind, "vless");
        assert_eq!(proxy.network, "tcp");
        assert!(!proxy.tls);
        assert!(proxy.skip_cert_verify);
        assert!(!proxy.udp);
        assert_eq!(proxy.flow, None);
        assert_eq!(proxy.sni, None);
    }

    #[test]
    fn test_proxy_params_applied() {
        let node = parse_node_line(
            "US-01,vless,1.2.3.4,443,abc,transport=ws,over-tls=true,skip-cert-verify=false,sni=example.com,udp=true,flow=xtls-rprx-vision",
        )
        .unwrap();
        let proxy = Proxy::from(&node);
        assert_eq!(proxy.network, "ws");
        assert!(proxy.tls);
        assert!(!proxy.skip_cert_verify);
        assert_eq!(proxy.sni.as_deref(), Some("example.com"));
        assert!(proxy.udp);
        assert_eq!(proxy.flow.as_deref(), Some("xtls-rprx-vision"));
    }

    #[test]
    fn test_skip_cert_verify_only_disabled_by_literal_false() {
        let node = parse_node_line("US-01,vless,h,1,u,skip-cert-verify=no").unwrap();
        assert!(Proxy::from(&node).skip_cert_verify);
    }

    // ==================== Alias Tests ====================

    #[test]
    fn test_canonical_folder_overrides() {
        assert_eq!(canonical_folder("ChatGPT"), "OpenAI");
        assert_eq!(canonical_folder("TikTok"), "DouYin");
        assert_eq!(canonical_folder("X"), "Twitter");
    }

    #[test]
    fn test_canonical_folder_identity_fallback() {
        assert_eq!(canonical_folder("Netflix"), "Netflix");
    }

    // ==================== Document Tests ====================

    #[test]
    fn test_end_to_end_document() {
        let config = pipeline(
            &[
                "US-01,vless,1.2.3.4,443,abc-uuid,transport=ws,over-tls=true,sni=example.com",
                "剩余流量:100GB",
                "JP-02,vless,5.6.7.8,8443,def-uuid",
            ],
            &["Netflix", "OpenAI"],
        )
        .unwrap();

        // Banner line dropped.
        assert_eq!(config.proxies.len(), 2);
        assert_eq!(config.proxies[0].name, "US-01");
        assert_eq!(config.proxies[1].name, "JP-02");

        // Groups: probe, two regions, fixed pair, two rule targets.
        let names: Vec<&str> = config.proxy_groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(
            names,
            ["Automatic", "美国节点", "日本节点", "DIRECT", "REJECT", "Netflix", "OpenAI"]
        );

        let probe = &config.proxy_groups[0];
        assert_eq!(probe.kind, "url-test");
        assert_eq!(probe.interval, Some(300));
        assert_eq!(
            probe.proxies.as_deref(),
            Some(["US-01".to_string(), "JP-02".to_string()].as_slice())
        );

        let target = &config.proxy_groups[5];
        assert_eq!(target.kind, "select");
        assert_eq!(
            target.proxies.as_deref(),
            Some(
                [
                    "Automatic".to_string(),
                    "美国节点".to_string(),
                    "日本节点".to_string(),
                    "DIRECT".to_string(),
                    "REJECT".to_string(),
                ]
                .as_slice()
            )
        );

        assert_eq!(
            config.rules,
            [
                "RULE-SET,Netflix,Netflix",
                "RULE-SET,OpenAI,OpenAI",
                "MATCH,Automatic",
            ]
        );
    }

    #[test]
    fn test_provider_bindings_use_canonical_folder() {
        let config = pipeline(&["US-01,vless,h,1,u"], &["ChatGPT", "Netflix"]).unwrap();
        let chatgpt = &config.rule_providers["ChatGPT"];
        assert_eq!(chatgpt.url, format!("{RULE_BASE_URL}/OpenAI/OpenAI.yaml"));
        assert_eq!(chatgpt.path, "./rules/OpenAI.yaml");
        assert_eq!(chatgpt.interval, 86_400);
        assert_eq!(chatgpt.kind, "http");
        assert_eq!(chatgpt.behavior, "domain");

        let netflix = &config.rule_providers["Netflix"];
        assert_eq!(netflix.path, "./rules/Netflix.yaml");
    }

    #[test]
    fn test_providers_keep_caller_order() {
        let config = pipeline(&["US-01,vless,h,1,u"], &["OpenAI", "Netflix", "Apple"]).unwrap();
        let keys: Vec<&str> = config.rule_providers.keys().map(String::as_str).collect();
        assert_eq!(keys, ["OpenAI", "Netflix", "Apple"]);
    }

    #[test]
    fn test_empty_node_list_is_valid() {
        let config = pipeline(&[], &["Netflix"]).unwrap();
        assert!(config.proxies.is_empty());
        let names: Vec<&str> = config.proxy_groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["Automatic", "DIRECT", "REJECT", "Netflix"]);
    }

    // ==================== Collision Tests ====================

    #[test]
    fn test_rule_set_colliding_with_fixed_group() {
        let err = pipeline(&["US-01,vless,h,1,u"], &["DIRECT"]).unwrap_err();
        assert_eq!(err, ConfigError::GroupNameCollision("DIRECT".to_string()));
    }

    #[test]
    fn test_rule_set_colliding_with_region_label() {
        let err = pipeline(&["US-01,vless,h,1,u"], &["美国节点"]).unwrap_err();
        assert_eq!(err, ConfigError::GroupNameCollision("美国节点".to_string()));
    }

    #[test]
    fn test_region_code_colliding_with_fixed_group() {
        // A node literally named DIRECT produces a region group "DIRECT".
        let err = pipeline(&["DIRECT,vless,h,1,u"], &[]).unwrap_err();
        assert_eq!(err, ConfigError::GroupNameCollision("DIRECT".to_string()));
    }

    // ==================== Serialization Tests ====================

    #[test]
    fn test_yaml_top_level_key_order() {
        let config = pipeline(&["US-01,vless,h,1,u"], &["Netflix"]).unwrap();
        let yaml = to_yaml(&config).unwrap();
        let positions: Vec<usize> = [
            "port:",
            "socksPort:",
            "allow-lan:",
            "mode:",
            "proxies:",
            "proxy-groups:",
            "rule-providers:",
            "rules:",
        ]
        .iter()
        .map(|key| yaml.find(key).unwrap_or_else(|| panic!("missing {key}")))
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_yaml_omits_absent_optional_params() {
        let config = pipeline(&["US-01,vless,h,1,u"], &[]).unwrap();
        let yaml = to_yaml(&config).unwrap();
        assert!(!yaml.contains("flow:"));
        assert!(!yaml.contains("sni:"));
    }

    #[test]
    fn test_yaml_round_trips_as_mapping() {
        let config = pipeline(&["US-01,vless,h,1,u"], &["Netflix"]).unwrap();
        let yaml = to_yaml(&config).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(value["port"], serde_yaml::Value::from(7890));
        assert_eq!(value["rules"][1], serde_yaml::Value::from("MATCH,Automatic"));
    }
}
