//! Proxy sources: each discovers fresh candidates from one kind of origin

use crate::proxy::crawler::ProxyCrawler;
use crate::proxy::models::Candidate;
use crate::proxy::parser::ProxyParser;
use crate::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, warn};

/// A source of candidate endpoints, invoked once per run
#[async_trait]
pub trait SourcePlugin: Send + Sync {
    /// Short tag stamped on every candidate this source yields
    fn name(&self) -> &str;

    async fn discover(&self, crawler: &ProxyCrawler) -> Result<Vec<Candidate>>;
}

/// Fetch every URL concurrently; a failing URL contributes nothing
async fn fetch_all<F>(crawler: &ProxyCrawler, urls: &[String], parse: F) -> Vec<Candidate>
where
    F: Fn(&str, &str) -> Result<Vec<Candidate>>,
{
    let bodies = join_all(urls.iter().map(|url| crawler.fetch_text(url))).await;

    let mut proxies = Vec::new();
    for (url, body) in urls.iter().zip(bodies) {
        match body.and_then(|text| parse(url, &text)) {
            Ok(found) => proxies.extend(found),
            Err(e) => error!("Request url {} error: {}", url, e),
        }
    }
    proxies
}

/// Plain-text lists with one `host:port` per line
pub struct TextListSource {
    urls: Vec<String>,
}

impl TextListSource {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }
}

#[async_trait]
impl SourcePlugin for TextListSource {
    fn name(&self) -> &str {
        "txt"
    }

    async fn discover(&self, crawler: &ProxyCrawler) -> Result<Vec<Candidate>> {
        let tag = self.name();
        Ok(fetch_all(crawler, &self.urls, |_, text| Ok(ProxyParser::parse_text_list(text, tag))).await)
    }
}

/// A JSON API returning an array of `{ip, port}` objects
pub struct JsonApiSource {
    url: String,
}

impl JsonApiSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl SourcePlugin for JsonApiSource {
    fn name(&self) -> &str {
        "cool"
    }

    async fn discover(&self, crawler: &ProxyCrawler) -> Result<Vec<Candidate>> {
        let body = crawler.fetch_text(&self.url).await?;
        ProxyParser::parse_json_api(&body, self.name())
    }
}

/// HTML pages listing proxies in `<td>` table cells
pub struct HtmlTableSource {
    urls: Vec<String>,
}

impl HtmlTableSource {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }
}

#[async_trait]
impl SourcePlugin for HtmlTableSource {
    fn name(&self) -> &str {
        "xici"
    }

    async fn discover(&self, crawler: &ProxyCrawler) -> Result<Vec<Candidate>> {
        let tag = self.name();
        Ok(fetch_all(crawler, &self.urls, |url, text| {
            Ok(ProxyParser::parse_html_table(text, tag).unwrap_or_else(|| {
                warn!("Request url {} has no usable proxy table", url);
                Vec::new()
            }))
        })
        .await)
    }
}

fn urls(list: &[&str]) -> Vec<String> {
    list.iter().map(|url| url.to_string()).collect()
}

/// The compiled-in source registry
pub fn default_sources() -> Vec<Arc<dyn SourcePlugin>> {
    vec![
        Arc::new(JsonApiSource::new("http://www.cool-proxy.net/proxies.json")),
        Arc::new(TextListSource::new(urls(&[
            "http://pubproxy.com/api/proxy?limit=5&format=txt&type=http",
            "http://static.fatezero.org/tmp/proxy.txt",
            "http://www.proxylists.net/http_highanon.txt",
            "http://www.proxylists.net/http.txt",
            "http://ab57.ru/downloads/proxylist.txt",
            "http://pubproxy.com/api/proxy?limit=5&format=txt&type=https",
        ]))),
        Arc::new(HtmlTableSource::new(urls(&[
            "https://www.xicidaili.com/nn/",
            "https://www.xicidaili.com/nt/",
            "https://www.xicidaili.com/wn/",
            "https://www.xicidaili.com/wt/",
        ]))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::crawler::CrawlerConfig;
    use crate::proxy::testutil::FakeProxy;

    fn crawler() -> ProxyCrawler {
        ProxyCrawler::with_config(CrawlerConfig::new().with_max_attempts(1)).unwrap()
    }

    #[test]
    fn test_default_sources() {
        let sources = default_sources();
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["cool", "txt", "xici"]);
    }

    #[tokio::test]
    async fn test_text_list_source() {
        let server = FakeProxy::spawn(|_| (200, "1.2.3.4:8080\n5.6.7.8:3128\n".to_string())).await;
        let source = TextListSource::new(vec![format!("http://{}/list.txt", server.addr)]);

        let found = source.discover(&crawler()).await.unwrap();

        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| c.source_tag == "txt"));
    }

    #[tokio::test]
    async fn test_text_list_source_skips_failing_urls() {
        let good = FakeProxy::spawn(|_| (200, "1.2.3.4:8080".to_string())).await;
        let bad = FakeProxy::spawn(|_| (500, String::new())).await;
        let source = TextListSource::new(vec![
            format!("http://{}/a.txt", bad.addr),
            format!("http://{}/b.txt", good.addr),
        ]);

        let found = source.discover(&crawler()).await.unwrap();
        assert_eq!(found, vec![Candidate::new("1.2.3.4", 8080, "txt")]);
    }

    #[tokio::test]
    async fn test_json_api_source() {
        let server = FakeProxy::spawn(|_| {
            (200, r#"[{"ip": "1.2.3.4", "port": 8080, "country_code": "FR"}]"#.to_string())
        })
        .await;
        let source = JsonApiSource::new(format!("http://{}/proxies.json", server.addr));

        let found = source.discover(&crawler()).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source_tag, "cool");
        assert_eq!(found[0].country.as_deref(), Some("FR"));
    }

    #[tokio::test]
    async fn test_json_api_source_failure_is_an_error() {
        let server = FakeProxy::spawn(|_| (503, String::new())).await;
        let source = JsonApiSource::new(format!("http://{}/proxies.json", server.addr));
        assert!(source.discover(&crawler()).await.is_err());
    }

    #[tokio::test]
    async fn test_html_table_source() {
        let server = FakeProxy::spawn(|_| {
            (
                200,
                "<tr><td>1.2.3.4</td><td>8080</td></tr><tr><td>5.6.7.8</td><td>80</td></tr>"
                    .to_string(),
            )
        })
        .await;
        let source = HtmlTableSource::new(vec![format!("http://{}/nn/", server.addr)]);

        let found = source.discover(&crawler()).await.unwrap();

        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| c.source_tag == "xici"));
    }
}
