//! OpenStack Nova compute backend.
//!
//! Speaks the Nova v2.1 servers API over plain HTTP with a pre-issued
//! token. Keystone authentication is out of scope; the token comes from
//! config or `FLEETSCALE_AUTH_TOKEN`.
//!
//! Nova accepts duplicate server names, so creates look the name up first
//! and return the existing server instead of booting a second one.

use std::fmt::Write as _;

use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use tracing::debug;

use fleetscale_core::{Instance, InstanceSpec, InstanceStatus, instance_index};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{ComputeProvider, ProviderFuture};

const AUTH_HEADER: &str = "x-auth-token";

pub struct OpenStackProvider {
    client: Client<HttpConnector, Full<Bytes>>,
    endpoint: String,
    token: String,
    name_prefix: String,
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    server: CreateServer<'a>,
}

#[derive(Serialize)]
struct CreateServer<'a> {
    name: &'a str,
    #[serde(rename = "flavorRef")]
    flavor_ref: &'a str,
    #[serde(rename = "imageRef")]
    image_ref: &'a str,
}

#[derive(Deserialize)]
struct CreateResponse {
    server: CreatedServer,
}

#[derive(Deserialize)]
struct CreatedServer {
    id: String,
}

#[derive(Deserialize)]
struct ListResponse {
    servers: Vec<NovaServer>,
}

#[derive(Deserialize)]
struct NovaServer {
    id: String,
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    flavor: serde_json::Value,
    /// `""` rather than an object for boot-from-volume servers.
    #[serde(default)]
    image: serde_json::Value,
}

fn ref_id(value: &serde_json::Value) -> Option<String> {
    value.get("id").and_then(|id| id.as_str()).map(str::to_string)
}

impl NovaServer {
    fn into_instance(self) -> Instance {
        Instance {
            id: self.id,
            name: self.name,
            flavor: ref_id(&self.flavor),
            image: ref_id(&self.image),
            status: nova_status(&self.status),
        }
    }
}

fn nova_status(status: &str) -> InstanceStatus {
    match status.to_ascii_uppercase().as_str() {
        "ACTIVE" => InstanceStatus::Active,
        "BUILD" | "REBUILD" => InstanceStatus::Building,
        "ERROR" => InstanceStatus::Error,
        _ => InstanceStatus::Unknown,
    }
}

impl OpenStackProvider {
    pub fn new(endpoint: &str, token: &str, name_prefix: &str) -> ProviderResult<Self> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        endpoint
            .parse::<http::Uri>()
            .map_err(|e| ProviderError::Misconfigured(format!("invalid endpoint {endpoint}: {e}")))?;
        let client = Client::builder(TokioExecutor::new()).build_http();
        Ok(Self {
            client,
            endpoint,
            token: token.to_string(),
            name_prefix: name_prefix.to_string(),
        })
    }

    async fn send(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> ProviderResult<(StatusCode, Bytes)> {
        let uri = format!("{}{}", self.endpoint, path);
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(&uri)
            .header(AUTH_HEADER, &self.token)
            .header("accept", "application/json")
            .header("user-agent", "fleetscale/0.1");
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let req = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let resp = self
            .client
            .request(req)
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?
            .to_bytes();

        debug!(%method, %uri, status = status.as_u16(), "nova request");
        Ok((status, bytes))
    }

    async fn create_server(&self, spec: &InstanceSpec) -> ProviderResult<Instance> {
        if let Some(existing) = self.find_server(&spec.name).await? {
            debug!(name = %spec.name, id = %existing.id, "server already exists, not creating");
            return Ok(existing);
        }

        let body = serde_json::to_vec(&CreateRequest {
            server: CreateServer {
                name: &spec.name,
                flavor_ref: &spec.flavor,
                image_ref: &spec.image,
            },
        })
        .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let (status, bytes) = self.send(Method::POST, "/servers", Some(body)).await?;
        check(status, &bytes)?;
        let created: CreateResponse =
            serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(Instance {
            id: created.server.id,
            name: spec.name.clone(),
            flavor: Some(spec.flavor.clone()),
            image: Some(spec.image.clone()),
            status: InstanceStatus::Building,
        })
    }

    async fn delete_server(&self, id: &str) -> ProviderResult<()> {
        let (status, bytes) = self
            .send(Method::DELETE, &format!("/servers/{id}"), None)
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(id.to_string()));
        }
        check(status, &bytes)
    }

    async fn list_servers(&self) -> ProviderResult<Vec<Instance>> {
        let pattern = format!("^{}-", regex::escape(&self.name_prefix));
        Ok(self
            .query_servers(&pattern)
            .await?
            .into_iter()
            .filter(|s| instance_index(&self.name_prefix, &s.name).is_some())
            .map(NovaServer::into_instance)
            .collect())
    }

    async fn find_server(&self, name: &str) -> ProviderResult<Option<Instance>> {
        let pattern = format!("^{}$", regex::escape(name));
        Ok(self
            .query_servers(&pattern)
            .await?
            .into_iter()
            .find(|s| s.name == name)
            .map(NovaServer::into_instance))
    }

    /// `GET /servers/detail` filtered by a Nova name regex. Results are
    /// only as exact as Nova's regex support; callers re-check names.
    async fn query_servers(&self, pattern: &str) -> ProviderResult<Vec<NovaServer>> {
        let path = format!("/servers/detail?name={}", percent_encode(pattern));
        let (status, bytes) = self.send(Method::GET, &path, None).await?;
        check(status, &bytes)?;
        let listed: ListResponse =
            serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(listed.servers)
    }
}

/// Percent-encode everything outside RFC 3986's unreserved set.
fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

fn check(status: StatusCode, body: &Bytes) -> ProviderResult<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ProviderError::Http {
            status: status.as_u16(),
            body: String::from_utf8_lossy(body).into_owned(),
        })
    }
}

impl ComputeProvider for OpenStackProvider {
    fn kind(&self) -> &'static str {
        "openstack"
    }

    fn create<'a>(&'a self, spec: &'a InstanceSpec) -> ProviderFuture<'a, Instance> {
        Box::pin(self.create_server(spec))
    }

    fn delete<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(self.delete_server(id))
    }

    fn list(&self) -> ProviderFuture<'_, Vec<Instance>> {
        Box::pin(self.list_servers())
    }
}
