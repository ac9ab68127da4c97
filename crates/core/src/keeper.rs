//! LTD Keeper API client
//!
//! Keeper issues the presigned POST URLs for a build and is told when the
//! upload is complete. Servers from 2.0.0 on use the org-scoped `/v2`
//! routes; older servers use `/products`.

use crate::error::{Error, Result};
use crate::presigned::PresignedPostUrls;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, error, info};

const V1_BUILD_MEDIA_TYPE: &str = "application/vnd.ltdkeeper.v2+json";

/// A build resource returned by Keeper on registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResource {
    pub self_url: String,
    #[serde(default)]
    pub published_url: Option<String>,
    #[serde(default)]
    pub surrogate_key: Option<String>,
    #[serde(default)]
    pub bucket_name: Option<String>,
    #[serde(default)]
    pub bucket_root_dir: Option<String>,
    #[serde(default)]
    pub post_prefix_urls: PresignedPostUrls,
    #[serde(default)]
    pub post_dir_urls: PresignedPostUrls,
}

/// `MAJOR.MINOR.PATCH` reported by a Keeper server
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl ServerVersion {
    pub const V2: ServerVersion = ServerVersion {
        major: 2,
        minor: 0,
        patch: 0,
    };

    /// Parse the leading `MAJOR.MINOR.PATCH`; anything after the patch
    /// digits (`2.0.0a1`, `1.4.2.dev3`) is ignored.
    pub fn parse(version: &str) -> Option<Self> {
        let mut parts = version.splitn(3, '.');
        let major = parts.next()?;
        let minor = parts.next()?;
        let rest = parts.next()?;

        let patch_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let patch = &rest[..patch_len];

        let number = |s: &str| -> Option<u64> {
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                None
            } else {
                s.parse().ok()
            }
        };
        Some(Self {
            major: number(major)?,
            minor: number(minor)?,
            patch: number(patch)?,
        })
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Which build-registration routes a server speaks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeeperApi {
    /// `/products/{product}/builds/`
    V1,
    /// `/v2/orgs/{org}/projects/{project}/builds/`
    V2 { org: String },
}

impl KeeperApi {
    pub fn select(version: ServerVersion, org: Option<&str>) -> Result<Self> {
        if version >= ServerVersion::V2 {
            match org {
                Some(org) if !org.is_empty() => Ok(KeeperApi::V2 {
                    org: org.to_string(),
                }),
                _ => Err(Error::Config(format!(
                    "An organization is required for LTD Keeper {} servers",
                    version
                ))),
            }
        } else {
            Ok(KeeperApi::V1)
        }
    }
}

/// Unauthenticated handle on a Keeper server
#[derive(Debug, Clone)]
pub struct KeeperClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
}

impl KeeperClient {
    pub fn new(http: Client, base_url: &str, username: &str, password: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange username and password for an API token
    pub async fn get_token(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct TokenResponse {
            token: String,
        }

        let url = format!("{}/token", self.base_url);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let response = check_status(Method::GET, &url, response, StatusCode::OK).await?;
        let body: TokenResponse = response.json().await?;
        Ok(body.token)
    }

    /// Version reported under `data.server_version` of the root resource
    pub async fn get_server_version(&self, token: &str) -> Result<ServerVersion> {
        let url = format!("{}/", self.base_url);
        let response = self
            .authorized(self.http.get(&url), token)
            .send()
            .await?;
        let response = check_status(Method::GET, &url, response, StatusCode::OK).await?;
        let body: Value = response.json().await?;

        let version = body
            .pointer("/data/server_version")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Keeper("Could not parse server version".to_string()))?;
        ServerVersion::parse(version).ok_or_else(|| {
            Error::Keeper(format!("Could not parse server version {:?}", version))
        })
    }

    fn authorized(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request.basic_auth(token, Some(""))
    }

    /// `{base}/segment/.../` with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid LTD Keeper URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Invalid LTD Keeper URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments)
            .push("");
        Ok(url)
    }
}

/// An authenticated Keeper connection with its API flavour resolved
#[derive(Debug, Clone)]
pub struct KeeperSession {
    client: KeeperClient,
    token: String,
    api: KeeperApi,
}

impl KeeperSession {
    /// Get a token, then pick the API flavour from the server version
    pub async fn connect(client: KeeperClient, org: Option<&str>) -> Result<Self> {
        let token = client.get_token().await?;
        let version = client.get_server_version(&token).await?;
        let api = KeeperApi::select(version, org)?;
        debug!(host = %client.base_url(), version = %version, api = ?api, "Connected to LTD Keeper");
        Ok(Self { client, token, api })
    }

    pub fn api(&self) -> &KeeperApi {
        &self.api
    }

    /// Register a new build and receive its presigned upload URLs
    pub async fn register_build(
        &self,
        project: &str,
        git_refs: &[String],
        dirnames: &[String],
    ) -> Result<BuildResource> {
        let request = match &self.api {
            KeeperApi::V1 => {
                let url = self.client.endpoint(&["products", project, "builds"])?;
                self.client
                    .http
                    .post(url)
                    .header(reqwest::header::ACCEPT, V1_BUILD_MEDIA_TYPE)
                    .json(&json!({
                        "git_refs": git_refs,
                        "directories": dirnames,
                    }))
            }
            KeeperApi::V2 { org } => {
                let git_ref = match git_refs {
                    [git_ref] => git_ref,
                    _ => {
                        return Err(Error::InvalidInput(format!(
                            "LTD Keeper v2 builds take exactly one git ref, got {}",
                            git_refs.len()
                        )))
                    }
                };
                let url = self
                    .client
                    .endpoint(&["v2", "orgs", org, "projects", project, "builds"])?;
                self.client.http.post(url).json(&json!({
                    "git_ref": git_ref,
                    "directories": dirnames,
                }))
            }
        };

        let request = self.client.authorized(request, &self.token).build()?;
        let url = request.url().to_string();
        let response = self.client.http.execute(request).await?;
        let response = check_status(Method::POST, &url, response, StatusCode::CREATED).await?;

        let build: BuildResource = response.json().await?;
        info!(project = %project, build = %build.self_url, "Registered a build");
        Ok(build)
    }

    /// Tell Keeper every file of the build has been uploaded
    pub async fn confirm_build(&self, self_url: &str) -> Result<()> {
        let response = self
            .client
            .authorized(self.client.http.patch(self_url), &self.token)
            .json(&json!({ "uploaded": true }))
            .send()
            .await?;
        check_status(Method::PATCH, self_url, response, StatusCode::OK)
            .await
            .map_err(|e| Error::Keeper(format!("Failed to confirm build at {}: {}", self_url, e)))?;
        info!(build = %self_url, "Confirmed build upload");
        Ok(())
    }
}

async fn check_status(
    method: Method,
    url: &str,
    response: Response,
    expected: StatusCode,
) -> Result<Response> {
    let status = response.status();
    if status == expected {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!(method = %method, url = %url, status = status.as_u16(), "LTD Keeper request failed");
    Err(Error::Keeper(format!(
        "Failed to {} {}: {}\n{}",
        method,
        url,
        status.as_u16(),
        body
    )))
}
