//! Paged retrieval through the Okapi API gateway.
//!
//! The HTTP client is abstracted behind [`HttpClient`] so the paging and
//! session logic can be exercised without a network.

use super::{records_of, write_page, ExtractionFiles, Extractor};
use crate::error::{UpdateError, UpdateResult};
use crate::options::{SourceConf, DEFAULT_PAGE_SIZE};
use crate::schema::TableSchema;
use std::path::Path;

const TOKEN_HEADER: &str = "x-okapi-token";
const TENANT_HEADER: &str = "X-Okapi-Tenant";
const ALL_RECORDS_QUERY: &str = "cql.allRecords%3D1%20sortBy%20id";

/// A response from the source API.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: String,
}

impl HttpResponse {
    /// Returns the first header with the given name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP client abstraction.
///
/// Errors are transport failures; non-success statuses are returned as
/// responses.
pub trait HttpClient {
    /// Sends a GET request.
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, String>;

    /// Sends a POST request with a body.
    fn post(&self, url: &str, headers: &[(&str, &str)], body: String)
        -> Result<HttpResponse, String>;
}

/// [`HttpClient`] backed by a blocking reqwest client.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a client.
    pub fn new() -> UpdateResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| UpdateError::Http {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    fn send(request: reqwest::blocking::RequestBuilder) -> Result<HttpResponse, String> {
        let response = request.send().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.text().map_err(|e| e.to_string())?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, String> {
        let mut request = self.client.get(url);
        for (k, v) in headers {
            request = request.header(*k, *v);
        }
        Self::send(request)
    }

    fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: String,
    ) -> Result<HttpResponse, String> {
        let mut request = self.client.post(url).body(body);
        for (k, v) in headers {
            request = request.header(*k, *v);
        }
        Self::send(request)
    }
}

/// Extracts tables page by page from an Okapi gateway.
pub struct OkapiClient<H: HttpClient> {
    http: H,
    url: String,
    tenant: String,
    user: String,
    password: String,
    token: Option<String>,
    page_size: usize,
}

impl<H: HttpClient> OkapiClient<H> {
    /// Creates a client for the configured source.
    pub fn new(http: H, source: &SourceConf) -> Self {
        Self {
            http,
            url: source.okapi_url.trim_end_matches('/').to_string(),
            tenant: source.okapi_tenant.clone(),
            user: source.okapi_user.clone(),
            password: source.okapi_password.clone(),
            token: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets the number of records requested per page.
    #[must_use]
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Returns the session token, once authenticated.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns the underlying HTTP client.
    pub fn http(&self) -> &H {
        &self.http
    }

    fn page_url(&self, path: &str, page: usize) -> String {
        format!(
            "{}{}?offset={}&limit={}&query={ALL_RECORDS_QUERY}",
            self.url,
            path,
            page * self.page_size,
            self.page_size
        )
    }
}

impl<H: HttpClient> Extractor for OkapiClient<H> {
    fn authenticate(&mut self) -> UpdateResult<()> {
        let url = format!("{}/authn/login", self.url);
        let body = serde_json::json!({
            "username": self.user,
            "password": self.password,
        })
        .to_string();
        tracing::debug!(url = %url, user = %self.user, "logging in");
        let headers = [
            (TENANT_HEADER, self.tenant.as_str()),
            ("Accept", "application/json"),
            ("Content-Type", "application/json"),
        ];
        let response = self
            .http
            .post(&url, &headers, body)
            .map_err(|message| UpdateError::Http {
                url: url.clone(),
                message,
            })?;
        if response.status != 201 {
            return Err(UpdateError::Authentication(format!(
                "{url}: status {}: {}",
                response.status,
                response.body.trim_end()
            )));
        }
        let token = response
            .header(TOKEN_HEADER)
            .ok_or_else(|| UpdateError::Authentication(format!("{url}: no token in response")))?;
        self.token = Some(token.to_string());
        Ok(())
    }

    fn retrieve(
        &mut self,
        table: &TableSchema,
        load_dir: &Path,
        files: &mut ExtractionFiles,
    ) -> UpdateResult<bool> {
        let token = self
            .token
            .clone()
            .ok_or_else(|| UpdateError::Authentication("not logged in".into()))?;
        let headers = [
            (TENANT_HEADER, self.tenant.as_str()),
            ("X-Okapi-Token", token.as_str()),
            ("Accept", "application/json,text/plain"),
        ];
        let mut written = 0;
        loop {
            let url = self.page_url(&table.source_path, written);
            tracing::trace!(url = %url, "retrieving page");
            let response = self
                .http
                .get(&url, &headers)
                .map_err(|message| UpdateError::Http {
                    url: url.clone(),
                    message,
                })?;
            if response.status != 200 {
                return Err(UpdateError::extraction(
                    &table.table_name,
                    format!("{url}: status {}: {}", response.status, response.body.trim_end()),
                ));
            }
            let document: serde_json::Value = serde_json::from_str(&response.body)
                .map_err(|e| UpdateError::extraction(&table.table_name, format!("{url}: {e}")))?;
            let count = records_of(&document).map_or(0, Vec::len);
            if count == 0 {
                break;
            }
            write_page(load_dir, &table.table_name, written, &response.body, files)?;
            written += 1;
            if count < self.page_size {
                break;
            }
        }
        tracing::debug!(table = %table.table_name, pages = written, "retrieved pages");
        Ok(written > 0)
    }
}
