use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-z0-9-]+\.)+[a-z]{2,}").expect("hostname pattern is valid")
});

const SEPARATORS: [char; 5] = ['\t', ',', ';', '|', '\r'];

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DomainParse {
    pub domains: Vec<String>,
    /// Tokens that did not contain anything hostname-shaped.
    pub ignored_tokens: usize,
}

/// Turns pasted text into a deduplicated, lowercase list of bare hostnames in first-seen order.
pub fn normalize_domains(raw: &str) -> Vec<String> {
    parse_domains(raw).domains
}

pub fn parse_domains(raw: &str) -> DomainParse {
    let mut text = raw.to_lowercase();
    text = text.replace(SEPARATORS, " ");
    text = text.replace("https://", "").replace("http://", "");
    text = text.replace('/', " ");

    let mut seen = HashSet::new();
    let mut parse = DomainParse::default();
    for token in text.split_whitespace() {
        let Some(found) = HOSTNAME.find(token) else {
            parse.ignored_tokens += 1;
            continue;
        };
        let host = found.as_str();
        let host = host.strip_prefix("www.").unwrap_or(host);
        if seen.insert(host.to_string()) {
            parse.domains.push(host.to_string());
        }
    }
    parse
}
