use std::{fmt, str::FromStr};

use reqwest::Url;

use crate::CallError;

/// HTTP methods supported for outbound calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Whether a body (possibly empty) is sent with this method.
    pub fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = CallError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(CallError::InvalidRequest(format!(
                "unsupported method '{other}'"
            ))),
        }
    }
}

/// Describes one outbound call: target, method, headers, query, body and
/// retry budget.
///
/// ```
/// use callguard::CallRequest;
///
/// let request = CallRequest::post("https://api.example.com/users")
///     .header("Authorization", "Bearer token")
///     .query("ref", "signup")
///     .body(r#"{"name":"John"}"#)
///     .max_retries(3);
/// assert_eq!(request.max_retries, 3);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRequest {
    pub url: String,
    pub method: Method,
    /// Sent verbatim, in order.
    pub headers: Vec<(String, String)>,
    /// `None` values are skipped when the URL is built.
    pub query: Vec<(String, Option<String>)>,
    /// Only sent for POST, PUT and PATCH.
    pub body: Option<Vec<u8>>,
    /// Additional attempts after the first one.
    pub max_retries: u32,
}

impl CallRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            max_retries: 0,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::Patch, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), Some(value.into())));
        self
    }

    /// Adds a query parameter that is dropped when `value` is `None`.
    pub fn query_opt(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.query.push((name.into(), value));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Builds the final URL with form-encoded query parameters appended.
    pub fn full_url(&self) -> Result<Url, CallError> {
        build_url(&self.url, &self.query)
    }

    /// Caller-supplied `Content-Type`, matched case-insensitively.
    pub(crate) fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }
}

/// Appends the non-`None` parameters to `base` in insertion order. The query
/// string is left untouched when no parameter remains.
pub fn build_url(base: &str, query: &[(String, Option<String>)]) -> Result<Url, CallError> {
    let mut url = Url::parse(base.trim())
        .map_err(|err| CallError::InvalidRequest(format!("bad url '{base}': {err}")))?;

    let mut present = query
        .iter()
        .filter_map(|(name, value)| value.as_deref().map(|value| (name.as_str(), value)))
        .peekable();

    if present.peek().is_some() {
        url.query_pairs_mut().extend_pairs(present);
    }
    Ok(url)
}
