use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("chlog/", env!("CARGO_PKG_VERSION"));

/// One decoded response plus the URL of the following page, if any.
#[derive(Debug, Clone)]
pub struct Page {
    pub body: serde_json::Value,
    pub next: Option<String>,
}

/// HTTP GET seam; the REST client never touches the network directly.
pub trait Transport {
    fn get(&self, url: &str) -> anyhow::Result<Page>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
    token: Option<String>,
}

impl UreqTransport {
    pub fn new(token: Option<String>) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(TIMEOUT))
            .build()
            .new_agent();
        Self { agent, token }
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str) -> anyhow::Result<Page> {
        tracing::trace!(%url, "GET");
        let mut request = self
            .agent
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT);
        if let Some(token) = &self.token {
            request = request.header("Authorization", &format!("Bearer {token}"));
        }
        let mut response = request.call()?;
        let next = response
            .headers()
            .get("link")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_next_link);
        let text = response.body_mut().read_to_string()?;
        Ok(Page {
            body: serde_json::from_str(&text)?,
            next,
        })
    }
}

/// Extract the `rel="next"` target from a `Link` header.
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| p.trim() == "rel=\"next\"");
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}
