use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::{Method, Request, Response, StatusCode};
use serde::Serialize;
use url::Url;

/// Generic HTTP client.
///
/// A trait is used here so to facilitate native HTTP/TLS when compiled for mobile applications,
/// and so that tests can serve canned responses.
#[async_trait]
pub trait AsyncHttpClient: Send + Sync {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

pub(crate) fn base_request() -> http::request::Builder {
    Request::builder().header(
        USER_AGENT,
        concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
    )
}

/// A response body together with the status it was received with.
#[derive(Debug, Clone)]
pub(crate) struct HttpReply {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl From<Response<Vec<u8>>> for HttpReply {
    fn from(response: Response<Vec<u8>>) -> Self {
        Self {
            status: response.status(),
            body: response.into_body(),
        }
    }
}

/// Sends a GET request and returns the reply regardless of its status.
pub(crate) async fn get(client: &dyn AsyncHttpClient, url: &Url) -> Result<HttpReply> {
    let request = base_request()
        .method(Method::GET)
        .uri(url.as_str())
        .header(ACCEPT, "application/json")
        .body(Vec::new())
        .context("failed to construct GET request")?;

    send(client, request).await
}

/// Sends a GET request and fails unless the server answers with `200 OK`.
pub(crate) async fn get_ok(client: &dyn AsyncHttpClient, url: &Url) -> Result<Vec<u8>> {
    let reply = get(client, url).await?;
    if reply.status != StatusCode::OK {
        anyhow::bail!(
            "expected status code 200 but got status code {} with response body {} from {url}",
            reply.status,
            reply.body_str()
        )
    }
    Ok(reply.body)
}

/// Sends an `application/x-www-form-urlencoded` POST request.
pub(crate) async fn post_form(
    client: &dyn AsyncHttpClient,
    url: &Url,
    form: &impl Serialize,
    bearer: Option<&str>,
) -> Result<HttpReply> {
    let body = serde_urlencoded::to_string(form).context("failed to encode form body")?;

    let mut builder = base_request()
        .method(Method::POST)
        .uri(url.as_str())
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(token) = bearer {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = builder
        .body(body.into_bytes())
        .context("failed to construct form request")?;

    send(client, request).await
}

/// Sends an `application/json` POST request.
pub(crate) async fn post_json(
    client: &dyn AsyncHttpClient,
    url: &Url,
    body: &impl Serialize,
    bearer: Option<&str>,
) -> Result<HttpReply> {
    let mut builder = base_request()
        .method(Method::POST)
        .uri(url.as_str())
        .header(CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = builder
        .body(serde_json::to_vec(body).context("failed to encode json body")?)
        .context("failed to construct json request")?;

    send(client, request).await
}

async fn send(client: &dyn AsyncHttpClient, request: Request<Vec<u8>>) -> Result<HttpReply> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = std::time::Instant::now();

    let response = client
        .execute(request)
        .await
        .with_context(|| format!("{method} {uri} failed"))?;

    tracing::debug!(
        %method,
        %uri,
        status = response.status().as_u16(),
        duration_ms = started.elapsed().as_millis() as u64,
        "http request completed"
    );

    Ok(response.into())
}

#[derive(Debug)]
pub struct ReqwestClient(reqwest::Client);

impl AsRef<reqwest::Client> for ReqwestClient {
    fn as_ref(&self) -> &reqwest::Client {
        &self.0
    }
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .context("unable to build http_client")
            .map(Self)
    }

    /// A client whose requests fail once `timeout` elapses.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .context("unable to build http_client")
            .map(Self)
    }
}

impl From<reqwest::Client> for ReqwestClient {
    fn from(client: reqwest::Client) -> Self {
        Self(client)
    }
}

#[async_trait]
impl AsyncHttpClient for ReqwestClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let response = self
            .0
            .execute(request.try_into().context("unable to convert request")?)
            .await
            .context("http request failed")?;

        let mut builder = Response::builder()
            .status(response.status())
            .version(response.version());

        builder
            .headers_mut()
            .context("unable to set headers")?
            .extend(response.headers().clone());

        builder
            .body(
                response
                    .bytes()
                    .await
                    .context("failed to extract response body")?
                    .to_vec(),
            )
            .context("unable to construct response")
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use serde_json::Value as Json;

    use super::*;

    /// A request as seen by [MockHttpClient].
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub method: Method,
        pub url: String,
        pub body: Vec<u8>,
        pub authorization: Option<String>,
    }

    impl RecordedRequest {
        pub fn json(&self) -> Json {
            serde_json::from_slice(&self.body).unwrap()
        }

        pub fn form(&self) -> HashMap<String, String> {
            serde_urlencoded::from_bytes(&self.body).unwrap()
        }
    }

    /// Serves queued responses per URL (query string ignored) and records every request.
    #[derive(Default)]
    pub struct MockHttpClient {
        responses: Mutex<HashMap<String, Vec<(u16, Vec<u8>)>>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl MockHttpClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response. Responses for the same URL are served in the order they were queued,
        /// the last one is repeated.
        pub fn respond(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) -> &Self {
            self.responses
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push((status, body.into()));
            self
        }

        pub fn respond_json(&self, url: &str, status: u16, body: Json) -> &Self {
            self.respond(url, status, serde_json::to_vec(&body).unwrap())
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn requests_to(&self, url: &str) -> Vec<RecordedRequest> {
            self.requests()
                .into_iter()
                .filter(|r| r.url.split('?').next() == Some(url))
                .collect()
        }
    }

    #[async_trait]
    impl AsyncHttpClient for MockHttpClient {
        async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
            let url = request.uri().to_string();
            let key = url.split('?').next().unwrap_or_default().to_string();

            self.requests.lock().unwrap().push(RecordedRequest {
                method: request.method().clone(),
                url: url.clone(),
                authorization: request
                    .headers()
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(ToOwned::to_owned),
                body: request.into_body(),
            });

            let mut responses = self.responses.lock().unwrap();
            let queue = responses
                .get_mut(&key)
                .with_context(|| format!("no mock response for {key}"))?;
            let (status, body) = if queue.len() > 1 {
                queue.remove(0)
            } else {
                queue[0].clone()
            };

            Ok(Response::builder().status(status).body(body)?)
        }
    }
}

#[cfg(test)]
mod test {
    use super::mock::MockHttpClient;
    use super::*;

    #[test]
    fn debug() {
        Response::builder().headers_mut().unwrap();
    }

    #[tokio::test]
    async fn form_post_sets_bearer_and_encodes_body() {
        let client = MockHttpClient::new();
        client.respond("https://issuer.example/token", 200, "{}");

        let url: Url = "https://issuer.example/token".parse().unwrap();
        let reply = post_form(&client, &url, &[("a", "b c"), ("d", "e")], Some("tok"))
            .await
            .unwrap();
        assert_eq!(reply.status, StatusCode::OK);

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer tok"));
        assert_eq!(requests[0].form()["a"], "b c");
    }

    #[tokio::test]
    async fn get_ok_rejects_non_200() {
        let client = MockHttpClient::new();
        client.respond("https://issuer.example/missing", 404, "not here");

        let url: Url = "https://issuer.example/missing".parse().unwrap();
        let err = get_ok(&client, &url).await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
