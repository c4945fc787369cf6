//! REST implementation of [`VpcClient`]
//!
//! Authenticates against the IAM token endpoint with an API key and calls the
//! VPC regional API with the resulting bearer token. One token per session;
//! sessions live for a single reconciliation pass, well inside token expiry.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Instance, InstancePrototype, SessionFactory, Vpc, VpcClient, VpcPrototype};
use crate::config::{VpcCredentials, DEFAULT_REQUEST_TIMEOUT};
use crate::{Error, Result};

/// VPC API version date sent with every request
pub const API_VERSION: &str = "2024-04-30";

/// VPC API generation (2 = VPC Gen 2 infrastructure)
const API_GENERATION: &str = "2";

/// Page size requested on list calls
const PAGE_LIMIT: &str = "100";

/// Grant type for exchanging an API key at the IAM token endpoint
const APIKEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PageLink {
    href: String,
}

/// A page of a paginated list response
trait Collection: DeserializeOwned {
    type Item;

    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

#[derive(Debug, Deserialize)]
struct VpcCollection {
    #[serde(default)]
    vpcs: Vec<Vpc>,
    next: Option<PageLink>,
}

impl Collection for VpcCollection {
    type Item = Vpc;

    fn into_parts(self) -> (Vec<Vpc>, Option<String>) {
        (self.vpcs, self.next.map(|n| n.href))
    }
}

#[derive(Debug, Deserialize)]
struct InstanceCollection {
    #[serde(default)]
    instances: Vec<Instance>,
    next: Option<PageLink>,
}

impl Collection for InstanceCollection {
    type Item = Instance;

    fn into_parts(self) -> (Vec<Instance>, Option<String>) {
        (self.instances, self.next.map(|n| n.href))
    }
}

/// Error payloads from the VPC API (`errors[]`) and IAM (`errorMessage`)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorDetail>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl ErrorBody {
    fn describe(self, raw: &str) -> String {
        if let Some(msg) = self.error_message {
            return msg;
        }
        if self.errors.is_empty() {
            return raw.trim().to_string();
        }
        self.errors
            .into_iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Build a provider error from a non-success response
async fn provider_error(operation: &str, target: &str, response: Response) -> Error {
    let status = response.status();
    let raw = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&raw).unwrap_or_default();
    Error::provider(
        operation,
        target,
        format!("HTTP {}: {}", status, body.describe(&raw)),
    )
}

fn request_error(operation: &str, target: &str, err: reqwest::Error) -> Error {
    Error::provider(operation, target, format!("request failed: {}", err))
}

/// VPC REST client bound to one authenticated session
pub struct VpcApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl VpcApiClient {
    /// Open a session: build the HTTP client and exchange the API key for a token.
    ///
    /// Any failure here is a scope construction failure.
    pub async fn connect(credentials: &VpcCredentials, timeout: Duration) -> Result<Self> {
        if credentials.api_key.is_empty() {
            return Err(Error::scope("API key is empty"));
        }
        if credentials.iam_endpoint.is_empty() || credentials.service_endpoint.is_empty() {
            return Err(Error::scope("IAM and service endpoints must both be set"));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::scope(format!("failed to build HTTP client: {}", e)))?;

        let token = request_token(&http, credentials).await?;
        debug!(endpoint = %credentials.service_endpoint, "VPC session established");

        Ok(Self {
            http,
            base_url: service_base_url(&credentials.service_endpoint),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn version_query() -> [(&'static str, &'static str); 2] {
        [("version", API_VERSION), ("generation", API_GENERATION)]
    }

    async fn list_all<C: Collection>(&self, operation: &str, path: &str) -> Result<Vec<C::Item>> {
        let mut items = Vec::new();
        let mut followed = HashSet::new();
        let mut request = self
            .http
            .get(self.url(path))
            .query(&Self::version_query())
            .query(&[("limit", PAGE_LIMIT)]);

        loop {
            let response = request
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(|e| request_error(operation, path, e))?;
            if !response.status().is_success() {
                return Err(provider_error(operation, path, response).await);
            }
            let page: C = response
                .json()
                .await
                .map_err(|e| Error::serialization(format!("{}: {}", operation, e)))?;
            let (page_items, next) = page.into_parts();
            items.extend(page_items);

            let Some(href) = next else { break };
            // The bearer token is only ever sent to the service endpoint
            if !within_base(&self.base_url, &href) {
                return Err(Error::provider(
                    operation,
                    path,
                    format!("next page {href} is outside {}", self.base_url),
                ));
            }
            // A partial listing could hide an existing object, so a
            // pagination loop fails instead of returning what was seen
            if !followed.insert(href.clone()) {
                return Err(Error::provider(
                    operation,
                    path,
                    format!("next page {href} was already listed"),
                ));
            }
            // next.href already carries version, generation and start
            request = self.http.get(href);
        }

        Ok(items)
    }

    async fn create<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        target: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .http
            .post(self.url(path))
            .query(&Self::version_query())
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(operation, target, e))?;
        if !response.status().is_success() {
            return Err(provider_error(operation, target, response).await);
        }
        response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("{}: {}", operation, e)))
    }

    async fn delete(&self, operation: &str, path: &str, target: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(path))
            .query(&Self::version_query())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| request_error(operation, target, e))?;
        if !response.status().is_success() {
            return Err(provider_error(operation, target, response).await);
        }
        Ok(())
    }
}

#[async_trait]
impl VpcClient for VpcApiClient {
    async fn list_vpcs(&self) -> Result<Vec<Vpc>> {
        self.list_all::<VpcCollection>("list_vpcs", "/vpcs").await
    }

    async fn create_vpc(&self, prototype: &VpcPrototype) -> Result<Vpc> {
        let vpc: Vpc = self
            .create("create_vpc", "/vpcs", &prototype.name, prototype)
            .await?;
        info!(vpc = %vpc.name, id = %vpc.id, "created VPC");
        Ok(vpc)
    }

    async fn delete_vpc(&self, id: &str) -> Result<()> {
        self.delete("delete_vpc", &format!("/vpcs/{}", id), id).await
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        self.list_all::<InstanceCollection>("list_instances", "/instances")
            .await
    }

    async fn create_instance(&self, prototype: &InstancePrototype) -> Result<Instance> {
        let instance: Instance = self
            .create("create_instance", "/instances", &prototype.name, prototype)
            .await?;
        info!(instance = %instance.name, id = %instance.id, "created instance");
        Ok(instance)
    }

    async fn get_instance(&self, id: &str) -> Result<Instance> {
        let response = self
            .http
            .get(self.url(&format!("/instances/{}", id)))
            .query(&Self::version_query())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| request_error("get_instance", id, e))?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(Error::not_found("instance", id)),
            s if s.is_success() => response
                .json()
                .await
                .map_err(|e| Error::serialization(format!("get_instance: {}", e))),
            _ => Err(provider_error("get_instance", id, response).await),
        }
    }

    async fn delete_instance(&self, id: &str) -> Result<()> {
        self.delete("delete_instance", &format!("/instances/{}", id), id)
            .await
    }
}

/// Exchange the API key for a bearer token
async fn request_token(http: &reqwest::Client, credentials: &VpcCredentials) -> Result<String> {
    let url = format!(
        "{}/identity/token",
        credentials.iam_endpoint.trim_end_matches('/')
    );
    let response = http
        .post(&url)
        .header(reqwest::header::ACCEPT, "application/json")
        .form(&[
            ("grant_type", APIKEY_GRANT_TYPE),
            ("apikey", credentials.api_key.as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::scope(format!("IAM token request failed: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let raw = response.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&raw).unwrap_or_default();
        return Err(Error::scope(format!(
            "IAM token request rejected (HTTP {}): {}",
            status,
            body.describe(&raw)
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| Error::scope(format!("invalid IAM token response: {}", e)))?;
    Ok(token.access_token)
}

/// True if `href` addresses a resource under `base_url`
fn within_base(base_url: &str, href: &str) -> bool {
    href.strip_prefix(base_url)
        .is_some_and(|rest| rest.starts_with('/') || rest.starts_with('?'))
}

/// Normalise the service endpoint to `<endpoint>/v1` without a trailing slash
fn service_base_url(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{}/v1", trimmed)
    }
}

/// Production [`SessionFactory`]: one IAM-authenticated [`VpcApiClient`] per pass
#[derive(Clone, Debug)]
pub struct IamSessionFactory {
    timeout: Duration,
}

impl IamSessionFactory {
    /// Create a factory whose sessions use the given per-request timeout
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for IamSessionFactory {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

#[async_trait]
impl SessionFactory for IamSessionFactory {
    async fn connect(&self, credentials: &VpcCredentials) -> Result<Arc<dyn VpcClient>> {
        let client = VpcApiClient::connect(credentials, self.timeout).await?;
        Ok(Arc::new(client))
    }
}
