use longship_core::{Mirror, MirrorStyle, ServerEndpoint};
use reqwest::{Client, Response, Url};
use std::time::Duration;

const USER_AGENT: &str = concat!("longship/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Shared client for manifest, file and announcement requests. Only the connect phase
/// is bounded; large file bodies may take as long as they need.
pub fn default_http_client() -> Result<Client, NetError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|source| NetError::Transport {
            url: String::new(),
            source,
        })
}

/// GET `url` and fail on transport errors or a non-2xx answer.
pub async fn get_ok(client: &Client, url: Url) -> Result<Response, NetError> {
    let shown = url.to_string();
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|source| NetError::Transport {
            url: shown.clone(),
            source,
        })?;
    let status = resp.status();
    if !status.is_success() {
        return Err(NetError::Status {
            url: shown,
            status: status.as_u16(),
        });
    }
    Ok(resp)
}

fn origin(protocol: &str, host: &str, port: u16) -> Result<Url, NetError> {
    let raw = format!("{protocol}://{host}:{port}/");
    Url::parse(&raw).map_err(|e| NetError::InvalidUrl(format!("{raw}: {e}")))
}

fn push_segments(url: &mut Url, path: &str) -> Result<(), NetError> {
    let shown = url.to_string();
    let mut segs = url
        .path_segments_mut()
        .map_err(|_| NetError::InvalidUrl(format!("{shown} cannot be a base")))?;
    segs.pop_if_empty();
    for seg in path.split('/').filter(|s| !s.is_empty()) {
        segs.push(seg);
    }
    Ok(())
}

/// URL builder for the sync server's endpoints.
#[derive(Debug, Clone)]
pub struct ServerUrls {
    base: Url,
}

impl ServerUrls {
    pub fn new(endpoint: &ServerEndpoint) -> Result<Self, NetError> {
        let protocol = if endpoint.protocol.is_empty() {
            "http"
        } else {
            endpoint.protocol.as_str()
        };
        Ok(Self {
            base: origin(protocol, &endpoint.host, endpoint.port)?,
        })
    }

    /// Use an already-parsed base, e.g. a test server address. The base must be able
    /// to carry path segments.
    pub fn from_base(base: Url) -> Result<Self, NetError> {
        if base.cannot_be_a_base() {
            return Err(NetError::InvalidUrl(format!("{base} cannot be a base")));
        }
        Ok(Self { base })
    }

    fn endpoint(&self, name: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segs) = url.path_segments_mut() {
            segs.pop_if_empty();
            segs.push(name);
        }
        url
    }

    pub fn files(&self) -> Url {
        self.endpoint("files")
    }

    pub fn sync_file(&self, relative_path: &str) -> Url {
        let mut url = self.endpoint("sync");
        url.query_pairs_mut().append_pair("file", relative_path);
        url
    }

    pub fn announcement(&self, hash: Option<&str>) -> Url {
        let mut url = self.endpoint("announcement");
        if let Some(h) = hash.filter(|h| !h.is_empty()) {
            url.query_pairs_mut().append_pair("hash", h);
        }
        url
    }
}

/// Where a mirror serves `relative_path`. Object mirrors get one percent-encoded URL
/// segment per path component; query mirrors get `?file=`.
pub fn mirror_file_url(mirror: &Mirror, relative_path: &str) -> Result<Url, NetError> {
    let mut url = origin(&mirror.protocol, &mirror.host, mirror.port)?;
    push_segments(&mut url, &mirror.prefix)?;
    match mirror.style {
        MirrorStyle::Object => push_segments(&mut url, relative_path)?,
        MirrorStyle::Query => {
            url.query_pairs_mut().append_pair("file", relative_path);
        }
    }
    Ok(url)
}
