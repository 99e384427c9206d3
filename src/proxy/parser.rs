//! Candidate extraction from the payloads proxy sources publish

use crate::proxy::models::Candidate;
use crate::Result;
use anyhow::anyhow;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Regex pattern to match IP:PORT patterns in text
static IP_PORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d{1,5})\b")
        .expect("Invalid IP:PORT regex")
});

static TD_IP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<td>(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})</td>").expect("Invalid <td> IP regex")
});

static TD_PORT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<td>(\d{1,5})</td>").expect("Invalid <td> port regex"));

/// Parser turning source payloads into candidates
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a single `host:port` line
    pub fn parse_line(line: &str, source_tag: &str) -> Option<Candidate> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let (host, port) = line.split_once(':')?;
        let host = host.trim();
        let port: u16 = port.trim().parse().ok()?;
        if host.is_empty() || port == 0 {
            return None;
        }
        Some(Candidate::new(host, port, source_tag))
    }

    /// Parse a plain-text list, one proxy per line
    ///
    /// Falls back to scanning for `ip:port` anywhere in the text when no line
    /// parses on its own.
    pub fn parse_text_list(content: &str, source_tag: &str) -> Vec<Candidate> {
        let proxies: Vec<Candidate> = content
            .lines()
            .filter_map(|line| Self::parse_line(line, source_tag))
            .collect();

        if proxies.is_empty() {
            Self::extract_with_regex(content, source_tag)
        } else {
            proxies
        }
    }

    /// Extract proxies using regex pattern matching
    fn extract_with_regex(content: &str, source_tag: &str) -> Vec<Candidate> {
        IP_PORT_REGEX
            .captures_iter(content)
            .filter_map(|cap| {
                let host = cap.get(1)?.as_str();
                let port: u16 = cap.get(2)?.as_str().parse().ok()?;
                if !is_ipv4(host) || port == 0 {
                    return None;
                }
                Some(Candidate::new(host, port, source_tag))
            })
            .collect()
    }

    /// Pair up `<td>ip</td>` and `<td>port</td>` cells of a proxy table
    ///
    /// Returns `None` when the page has no rows or the columns do not line up.
    pub fn parse_html_table(content: &str, source_tag: &str) -> Option<Vec<Candidate>> {
        let hosts: Vec<&str> = TD_IP_REGEX
            .captures_iter(content)
            .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
            .collect();
        let ports: Vec<&str> = TD_PORT_REGEX
            .captures_iter(content)
            .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
            .collect();

        if hosts.is_empty() || hosts.len() != ports.len() {
            return None;
        }

        Some(
            hosts
                .into_iter()
                .zip(ports)
                .filter_map(|(host, port)| {
                    let port: u16 = port.parse().ok()?;
                    Some(Candidate::new(host, port, source_tag))
                })
                .collect(),
        )
    }

    /// Parse a JSON array of `{ip, port, country_code?}` objects
    pub fn parse_json_api(content: &str, source_tag: &str) -> Result<Vec<Candidate>> {
        let entries: Vec<Value> = serde_json::from_str(content)?;
        if entries.is_empty() {
            return Err(anyhow!("empty proxy list"));
        }

        Ok(entries
            .iter()
            .filter_map(|entry| {
                let host = entry.get("ip")?.as_str()?;
                let port = match entry.get("port")? {
                    Value::Number(n) => u16::try_from(n.as_u64()?).ok()?,
                    Value::String(s) => s.trim().parse().ok()?,
                    _ => return None,
                };
                let candidate = Candidate::new(host, port, source_tag);
                match entry.get("country_code").and_then(Value::as_str) {
                    Some(code) if !code.is_empty() => Some(candidate.with_country(code)),
                    _ => Some(candidate),
                }
            })
            .collect())
    }
}

fn is_ipv4(host: &str) -> bool {
    let parts: Vec<&str> = host.split('.').collect();
    parts.len() == 4 && parts.iter().all(|part| part.parse::<u8>().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_line() {
        let candidate = ProxyParser::parse_line("192.168.1.1:8080", "txt").unwrap();
        assert_eq!(candidate.host, "192.168.1.1");
        assert_eq!(candidate.port, 8080);
        assert_eq!(candidate.source_tag, "txt");
        assert!(candidate.country.is_none());
    }

    #[test]
    fn test_parse_invalid_lines() {
        assert!(ProxyParser::parse_line("", "txt").is_none());
        assert!(ProxyParser::parse_line("# comment", "txt").is_none());
        assert!(ProxyParser::parse_line("192.168.1.1", "txt").is_none());
        assert!(ProxyParser::parse_line("192.168.1.1:abc", "txt").is_none());
        assert!(ProxyParser::parse_line("192.168.1.1:0", "txt").is_none());
        assert!(ProxyParser::parse_line(":8080", "txt").is_none());
    }

    #[test]
    fn test_parse_text_list() {
        let content = "\n# HTTP\n192.168.1.1:8080\r\n10.0.0.1:3128\ngarbage\n";
        let proxies = ProxyParser::parse_text_list(content, "txt");
        assert_eq!(proxies.len(), 2);
        assert_eq!(proxies[1].host, "10.0.0.1");
    }

    #[test]
    fn test_parse_text_list_falls_back_to_regex() {
        let content = "Here is a proxy: 192.168.1.1:8080 and another one 10.0.0.1:3128.";
        let proxies = ProxyParser::parse_text_list(content, "txt");
        assert_eq!(proxies.len(), 2);
    }

    #[test]
    fn test_regex_rejects_invalid_ip() {
        let proxies = ProxyParser::parse_text_list("Invalid IP: 999.999.999.999:8080 x", "txt");
        assert!(proxies.is_empty());
    }

    #[test]
    fn test_parse_html_table() {
        let content = r#"
<table>
<tr><td>1.2.3.4</td><td>8080</td><td>China</td></tr>
<tr><td>5.6.7.8</td><td>3128</td><td>Japan</td></tr>
</table>
"#;
        let proxies = ProxyParser::parse_html_table(content, "xici").unwrap();
        assert_eq!(proxies.len(), 2);
        assert_eq!(proxies[0].host, "1.2.3.4");
        assert_eq!(proxies[0].port, 8080);
        assert_eq!(proxies[1].port, 3128);
    }

    #[test]
    fn test_parse_html_table_mismatch() {
        let content = "<td>1.2.3.4</td><td>8080</td><td>5.6.7.8</td>";
        assert!(ProxyParser::parse_html_table(content, "xici").is_none());
        assert!(ProxyParser::parse_html_table("<html></html>", "xici").is_none());
    }

    #[test]
    fn test_parse_json_api() {
        let content = r#"[
            {"ip": "1.2.3.4", "port": 8080, "country_code": "US"},
            {"ip": "5.6.7.8", "port": "3128"},
            {"ip": "9.9.9.9"},
            {"port": 80}
        ]"#;
        let proxies = ProxyParser::parse_json_api(content, "cool").unwrap();
        assert_eq!(proxies.len(), 2);
        assert_eq!(proxies[0].country.as_deref(), Some("US"));
        assert_eq!(proxies[1].port, 3128);
        assert!(proxies[1].country.is_none());
    }

    #[test]
    fn test_parse_json_api_errors() {
        assert!(ProxyParser::parse_json_api("not json", "cool").is_err());
        assert!(ProxyParser::parse_json_api("[]", "cool").is_err());
    }
}
