//! Blocking HTTP request executor for the VSC API
//!
//! Each call picks one endpoint candidate at random, attaches the configured
//! credentials, sends a single request with a bounded timeout and decodes the
//! outcome. Nothing is retried and no other candidate is tried on failure.

use std::{fmt, sync::RwLock, time::Duration};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::seq::IndexedRandom;
use reqwest::{
    StatusCode,
    blocking::{Client, RequestBuilder, Response},
    header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE},
    redirect::Policy,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    config::{CredentialMode, VscClientConfig},
    constants::{USER_AGENT, header},
    error::{RawHttpError, Result, VscError, decode_error_response},
    resolver::EndpointCandidate,
};

/// HTTP verbs understood by the VSC API
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
    /// Non-standard verb used to stop jobs
    Stop,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Stop => "STOP",
        }
    }

    /// Read-oriented verbs carry their arguments in the query string,
    /// write-oriented verbs in a JSON body.
    pub fn is_read(&self) -> bool {
        matches!(self, Method::Get | Method::Delete | Method::Stop)
    }

    fn to_http(self) -> Result<reqwest::Method> {
        match self {
            Method::Get => Ok(reqwest::Method::GET),
            Method::Put => Ok(reqwest::Method::PUT),
            Method::Post => Ok(reqwest::Method::POST),
            Method::Delete => Ok(reqwest::Method::DELETE),
            Method::Stop => reqwest::Method::from_bytes(b"STOP")
                .map_err(|e| VscError::bad_argument(e.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single API call: verb, resource path and its arguments
#[derive(Clone, Debug, PartialEq)]
pub struct RequestSpec {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn stop(path: impl Into<String>) -> Self {
        Self::new(Method::Stop, path)
    }

    /// Add a query parameter (read-oriented verbs only)
    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn param_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    /// Attach a JSON body (write-oriented verbs only)
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self> {
        Ok(self.body(serde_json::to_value(body)?))
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn json_body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    fn validate(&self) -> Result<()> {
        if self.method.is_read() && self.body.is_some() {
            return Err(VscError::bad_argument(format!(
                "{} requests cannot carry a JSON body",
                self.method
            )));
        }
        if !self.method.is_read() && !self.query.is_empty() {
            return Err(VscError::bad_argument(format!(
                "{} requests cannot carry query parameters",
                self.method
            )));
        }
        Ok(())
    }
}

/// Decoded successful response
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// The server returned no content (HTTP 204 or an empty body)
    NoContent,
    Json(Value),
}

impl Reply {
    pub fn is_no_content(&self) -> bool {
        matches!(self, Reply::NoContent)
    }

    /// The JSON payload, `Value::Null` for `NoContent`
    pub fn into_json(self) -> Value {
        match self {
            Reply::NoContent => Value::Null,
            Reply::Json(value) => value,
        }
    }

    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.into_json())?)
    }
}

/// Serialize a request body exactly as it is sent on the wire
pub fn encode_body(body: &Value) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(body)?)
}

/// Redirects are followed only while they stay on the same origin. reqwest
/// strips `Authorization` across hosts but not the plain credential headers,
/// so a cross-origin redirect is handed back to the caller as a 3xx status.
fn same_origin_redirects() -> Policy {
    Policy::custom(|attempt| {
        let cross_origin = attempt
            .previous()
            .last()
            .is_some_and(|previous| previous.origin() != attempt.url().origin());
        if cross_origin {
            warn!("Not following redirect to {}", attempt.url());
            attempt.stop()
        } else {
            Policy::default().redirect(attempt)
        }
    })
}

/// Blocking HTTP client bound to one set of endpoint candidates and
/// credentials
pub struct VscHttpClient {
    client: Client,
    candidates: Vec<EndpointCandidate>,
    username: Option<String>,
    password: Option<String>,
    use_tls: bool,
    timeout: Duration,
    credential_mode: CredentialMode,
    user_id: RwLock<Option<String>>,
}

impl fmt::Debug for VscHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VscHttpClient")
            .field("candidates", &self.candidates)
            .field("username", &self.username)
            .field("use_tls", &self.use_tls)
            .field("timeout", &self.timeout)
            .field("credential_mode", &self.credential_mode)
            .finish_non_exhaustive()
    }
}

impl VscHttpClient {
    /// Create a client for the given candidates using the settings in
    /// `config`. Hostname and port in `config` are not consulted; resolution
    /// happens before.
    pub fn new(config: &VscClientConfig, candidates: Vec<EndpointCandidate>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(0)
            .redirect(same_origin_redirects())
            .build()
            .map_err(VscError::ClientSetup)?;

        Ok(Self {
            client,
            candidates,
            username: config.username.clone(),
            password: config.password.clone(),
            use_tls: config.use_tls,
            timeout: config.timeout,
            credential_mode: config.credential_mode,
            user_id: RwLock::new(None),
        })
    }

    pub fn candidates(&self) -> &[EndpointCandidate] {
        &self.candidates
    }

    pub fn set_candidates(&mut self, candidates: Vec<EndpointCandidate>) {
        self.candidates = candidates;
    }

    /// Replace the credentials. Switching to another username forgets the
    /// cached identity.
    pub fn set_auth(&mut self, username: Option<String>, password: Option<String>) {
        if username != self.username {
            self.forget_user_id();
        }
        self.username = username;
        self.password = password;
    }

    /// Drop the credentials and the cached identity
    pub fn drop_auth(&mut self) {
        self.username = None;
        self.password = None;
        self.forget_user_id();
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn use_tls(&self) -> bool {
        self.use_tls
    }

    pub fn set_use_tls(&mut self, use_tls: bool) {
        self.use_tls = use_tls;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn credential_mode(&self) -> CredentialMode {
        self.credential_mode
    }

    pub fn set_credential_mode(&mut self, mode: CredentialMode) {
        self.credential_mode = mode;
    }

    /// Identity the server reported for the current credentials, if any
    pub fn user_id(&self) -> Option<String> {
        self.user_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn remember_user_id(&self, user_id: &str) {
        let mut guard = self.user_id.write().unwrap_or_else(|e| e.into_inner());
        if guard.as_deref() != Some(user_id) {
            debug!("Server identified caller as {}", user_id);
            *guard = Some(user_id.to_string());
        }
    }

    fn forget_user_id(&self) {
        *self.user_id.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn pick_candidate(&self) -> Result<&EndpointCandidate> {
        self.candidates
            .choose(&mut rand::rng())
            .ok_or_else(|| VscError::NoAliveServers {
                reason: "no endpoint candidates configured".to_string(),
                source: None,
            })
    }

    /// Build the full URL for `path` on `candidate`
    fn build_url(&self, candidate: &EndpointCandidate, path: &str) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!(
            "{}://{}/{}",
            scheme,
            candidate.authority(),
            path.trim_matches('/')
        )
    }

    /// Attach credentials when both username and password are set
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let (Some(username), Some(password)) = (&self.username, &self.password) else {
            return request;
        };
        match self.credential_mode {
            CredentialMode::Basic => {
                let encoded = BASE64.encode(format!("{username}:{password}"));
                request.header(AUTHORIZATION, format!("Basic {encoded}"))
            }
            CredentialMode::PlainHeaders => request
                .header(header::USERNAME, username.as_str())
                .header(header::PASSWORD, password.as_str()),
        }
    }

    /// Send one request and decode the response
    pub fn execute(&self, spec: &RequestSpec) -> Result<Reply> {
        spec.validate()?;

        let candidate = self.pick_candidate()?;
        let url = self.build_url(candidate, &spec.path);

        let mut request = self
            .client
            .request(spec.method.to_http()?, &url)
            .timeout(self.timeout);
        if !spec.query.is_empty() {
            request = request.query(&spec.query);
        }
        if let Some(body) = &spec.body {
            let encoded = encode_body(body)?;
            request = request
                .header(CONTENT_TYPE, "application/json")
                .header(CONTENT_LENGTH, encoded.len())
                .body(encoded);
        }
        let request = self.authorize(request);

        debug!("{} {}", spec.method, url);

        let response = request.send().map_err(|e| {
            if e.is_builder() {
                return VscError::bad_argument(format!("invalid request: {e}"));
            }
            warn!("Request to {} failed: {}", candidate, e);
            VscError::no_alive_servers(format!("request to {candidate} failed"), e)
        })?;

        self.handle_response(response)
    }

    fn handle_response(&self, response: Response) -> Result<Reply> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = match response.bytes() {
            Ok(body) => body,
            Err(e) if status.is_success() => {
                return Err(VscError::no_alive_servers("failed to read response body", e));
            }
            Err(e) => {
                warn!("Failed to read body of {} response: {}", status, e);
                return Err(decode_error_response(RawHttpError::new(
                    status,
                    headers,
                    Vec::new(),
                )));
            }
        };

        if !status.is_success() {
            debug!("Request failed with status {}", status);
            return Err(decode_error_response(RawHttpError::new(
                status,
                headers,
                body.to_vec(),
            )));
        }

        if let Some(user_id) = headers
            .get(header::USER_ID)
            .and_then(|value| value.to_str().ok())
        {
            self.remember_user_id(user_id);
        }

        if status == StatusCode::NO_CONTENT || body.is_empty() {
            return Ok(Reply::NoContent);
        }
        Ok(Reply::Json(serde_json::from_slice(&body)?))
    }
}
