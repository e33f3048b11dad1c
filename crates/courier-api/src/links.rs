use std::sync::LazyLock;

use courier_core::FilterConfig;
use regex::Regex;
use tracing::debug;

/// Characters that terminate a link besides whitespace: full-width punctuation and curly quotes.
const LINK_BODY: &str = r"[^\s\x{FF0C}\x{3002}\x{FF1F}\x{FF01}\x{FF1B}\x{FF1A}\x{201C}\x{201D}\x{2018}\x{2019}]+";

/// Used when the filters name no protocol. Longest first so alternation prefers `hysteria2` over `hysteria`.
const DEFAULT_PROTOCOLS: &[&str] = &[
    "hysteria2", "wireguard", "hysteria", "juicity", "anytls", "mieru", "snell", "socks", "trojan",
    "vmess", "vless", "https", "tuic", "http", "ssr", "hy2", "ss", "sudoku",
];

static HTTP_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("https?://{LINK_BODY}")).expect("http link pattern is valid")
});

/// All `http(s)://` links in `text`, in order of appearance.
pub fn extract_links(text: &str) -> Vec<String> {
    HTTP_LINK
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Drop links containing any blacklist keyword, case-insensitively.
pub fn filter_links(links: &[String], blacklist: &[String]) -> Vec<String> {
    let blacklist: Vec<String> = blacklist.iter().map(|k| k.to_lowercase()).collect();
    links
        .iter()
        .filter(|link| {
            let lower = link.to_lowercase();
            !blacklist.iter().any(|k| lower.contains(k.as_str()))
        })
        .cloned()
        .collect()
}

/// Case-insensitive substring match against any pattern; an empty list matches everything.
pub fn matches_any(text: &str, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let text = text.to_lowercase();
    patterns.iter().any(|p| text.contains(&p.to_lowercase()))
}

/// Whitespace-separated words that look like message links (`t.me/...`) or `@username`s.
pub fn extract_telegram_links(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter(|w| w.contains("t.me/") || (w.len() > 1 && w.starts_with('@')))
        .map(str::to_string)
        .collect()
}

/// Extracts subscription links and proxy node URIs using the configured protocols.
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    pattern: Regex,
    node_prefixes: Vec<String>,
}

impl LinkExtractor {
    /// Protocols come from `subs` and `ss` (`"vmess://"` or `"vmess"`), deduplicated in order.
    pub fn new(filters: &FilterConfig) -> Result<Self, regex::Error> {
        let mut protocols: Vec<String> = Vec::new();
        for raw in filters.subs.iter().chain(&filters.ss) {
            let proto = raw.trim_end_matches("://").to_lowercase();
            if !proto.is_empty() && !protocols.contains(&proto) {
                protocols.push(proto);
            }
        }
        if protocols.is_empty() {
            debug!(target: "courier.api.links", count = DEFAULT_PROTOCOLS.len(), "no protocols configured, using defaults");
            protocols = DEFAULT_PROTOCOLS.iter().map(|p| p.to_string()).collect();
        }

        let alternation = protocols
            .iter()
            .map(|p| regex::escape(p))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!("(?i)(?:{alternation})://{LINK_BODY}"))?;

        Ok(Self {
            pattern,
            node_prefixes: filters.ss.iter().map(|p| p.to_lowercase()).collect(),
        })
    }

    pub fn extract(&self, text: &str) -> Vec<String> {
        self.pattern
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// A link is a node when it starts with one of the `ss` prefixes.
    pub fn is_node(&self, link: &str) -> bool {
        let lower = link.to_lowercase();
        self.node_prefixes.iter().any(|p| lower.starts_with(p.as_str()))
    }

    /// Split into `(subscriptions, nodes)`, keeping order within each group.
    pub fn partition(&self, links: &[String]) -> (Vec<String>, Vec<String>) {
        links.iter().cloned().partition(|l| !self.is_node(l))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn http_links_stop_at_full_width_punctuation() {
        let text = "new sub: https://a.example/sub?token=1，also http://b.example/x。done";
        assert_eq!(
            extract_links(text),
            vec!["https://a.example/sub?token=1", "http://b.example/x"]
        );
        assert!(extract_links("no links here").is_empty());
    }

    #[test]
    fn blacklist_is_case_insensitive() {
        let links = strings(&["https://Spam.example/a", "https://good.example/b"]);
        let kept = filter_links(&links, &strings(&["spam.EXAMPLE"]));
        assert_eq!(kept, vec!["https://good.example/b"]);
        assert_eq!(filter_links(&links, &[]), links);
    }

    #[test]
    fn matches_any_semantics() {
        assert!(matches_any("anything", &[]));
        assert!(matches_any("Free NODES today", &strings(&["nodes"])));
        assert!(!matches_any("weather report", &strings(&["nodes", "sub"])));
    }

    #[test]
    fn telegram_links_and_usernames() {
        let text = "grab https://t.me/chan/12 and @someone but not @ or plain words";
        assert_eq!(
            extract_telegram_links(text),
            vec!["https://t.me/chan/12", "@someone"]
        );
    }

    #[test]
    fn configured_protocols_drive_extraction() {
        let filters = FilterConfig {
            subs: strings(&["https://"]),
            ss: strings(&["vmess://", "SS://"]),
            ..FilterConfig::default()
        };
        let ex = LinkExtractor::new(&filters).unwrap();
        let text = "sub https://x.example/s node vmess://abc： and ss://def trojan://skip";
        let links = ex.extract(text);
        assert_eq!(links, vec!["https://x.example/s", "vmess://abc", "ss://def"]);

        let (subs, nodes) = ex.partition(&links);
        assert_eq!(subs, vec!["https://x.example/s"]);
        assert_eq!(nodes, vec!["vmess://abc", "ss://def"]);
    }

    #[test]
    fn defaults_prefer_longest_protocol() {
        let ex = LinkExtractor::new(&FilterConfig::default()).unwrap();
        assert_eq!(
            ex.extract("HYSTERIA2://node-1 hy2://node-2"),
            vec!["HYSTERIA2://node-1", "hy2://node-2"]
        );
        // no ss prefixes configured, so nothing counts as a node
        assert!(!ex.is_node("ss://abc"));
    }
}
