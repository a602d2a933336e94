use crate::config::{ProxmoxAuth, ProxmoxConfig};
use crate::http::{build_client, check_status, decode_json, transport_error};
use cloug_common::{ComputeError, Result, SessionCache};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::sync::Arc;

const API_PREFIX: &str = "/api2/json";

/// Proxmox API response wrapper.
#[derive(Deserialize, Debug)]
struct ProxmoxResponse<T> {
    data: T,
}

/// Ticket session obtained from `/access/ticket`.
#[derive(Deserialize, Debug)]
pub(crate) struct Ticket {
    ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    csrf_prevention_token: String,
}

/// Task UPID response (for async operations like create, start).
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum TaskResponse {
    Upid(String),
    Object { upid: String },
}

impl TaskResponse {
    fn upid(self) -> String {
        match self {
            TaskResponse::Upid(upid) => upid,
            TaskResponse::Object { upid } => upid,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct Node {
    pub node: String,
    #[serde(default)]
    pub disk: i64,
    #[serde(default)]
    pub maxdisk: i64,
    #[serde(default)]
    pub mem: i64,
    #[serde(default)]
    pub maxmem: i64,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct Vm {
    #[serde(default)]
    pub vmid: u32,
    pub name: Option<String>,
    pub status: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct TaskStatus {
    pub status: String,
    pub exitstatus: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub(crate) enum Port {
    Number(u16),
    Text(String),
}

impl std::fmt::Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Port::Number(port) => write!(f, "{}", port),
            Port::Text(port) => f.write_str(port),
        }
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct VncProxy {
    pub port: Port,
    pub ticket: String,
}

/// Network interfaces response from QEMU guest agent.
#[derive(Deserialize, Debug)]
struct NetworkResponse {
    result: Vec<NetworkInterface>,
}

#[derive(Deserialize, Debug)]
struct NetworkInterface {
    name: String,
    #[serde(rename = "ip-addresses")]
    ip_addresses: Option<Vec<IpAddress>>,
}

#[derive(Deserialize, Debug)]
struct IpAddress {
    #[serde(rename = "ip-address")]
    ip_address: String,
}

#[derive(Debug, Clone)]
pub(crate) struct CreateVmOptions {
    pub vmid: u32,
    pub node: String,
    pub name: String,
    pub cores: u32,
    pub memory_mb: u32,
    pub disk_gb: u32,
    pub iso: String,
    pub storage: String,
    pub bridge: Option<String>,
}

impl CreateVmOptions {
    fn params(&self) -> Vec<(&'static str, String)> {
        let net0 = match &self.bridge {
            Some(bridge) => format!("e1000,bridge={}", bridge),
            None => "e1000".to_string(),
        };
        let mut params = vec![
            ("vmid", self.vmid.to_string()),
            ("cores", self.cores.to_string()),
            ("memory", self.memory_mb.to_string()),
            ("ostype", "l26".to_string()),
            ("ide0", format!("{}:{}", self.storage, self.disk_gb)),
            ("cdrom", format!("{},media=cdrom", self.iso)),
            ("net0", net0),
        ];
        if !self.name.is_empty() {
            params.push(("name", self.name.clone()));
        }
        params
    }
}

enum Credential<'a> {
    Token(&'a str, &'a str),
    Ticket(&'a Ticket),
    None,
}

pub(crate) struct ProxmoxClient {
    client: Client,
    base_url: String,
    auth: ProxmoxAuth,
    session: SessionCache<Ticket>,
}

impl ProxmoxClient {
    pub fn new(config: &ProxmoxConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(config.insecure)?,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            auth: config.auth()?,
            session: SessionCache::new(),
        })
    }

    fn build(
        &self,
        method: &Method,
        path: &str,
        params: &[(&str, String)],
        credential: Credential<'_>,
    ) -> RequestBuilder {
        let url = format!("{}{}{}", self.base_url, API_PREFIX, path);
        let mut request = self
            .client
            .request(method.clone(), url)
            .header("Accept", "application/json");

        request = match credential {
            Credential::Token(id, secret) => {
                request.header("Authorization", format!("PVEAPIToken={}={}", id, secret))
            }
            Credential::Ticket(ticket) => request
                .header("Cookie", format!("PVEAuthCookie={}", ticket.ticket))
                .header("CSRFPreventionToken", &ticket.csrf_prevention_token),
            Credential::None => request,
        };

        if params.is_empty() {
            request
        } else if *method == Method::GET || *method == Method::DELETE {
            request.query(params)
        } else {
            request.form(params)
        }
    }

    async fn send(
        &self,
        method: &Method,
        path: &str,
        params: &[(&str, String)],
        credential: Credential<'_>,
    ) -> Result<Response> {
        self.build(method, path, params, credential)
            .send()
            .await
            .map_err(|e| transport_error(&format!("{} {}", method, path), e))
    }

    async fn authenticate(&self) -> Result<Ticket> {
        let ProxmoxAuth::Ticket { username, password } = &self.auth else {
            return Err(ComputeError::validation("ticket requested for token auth"));
        };
        tracing::debug!("Requesting Proxmox ticket for {}", username);
        let params = [("username", username.clone()), ("password", password.clone())];
        let response = self
            .send(&Method::POST, "/access/ticket", &params, Credential::None)
            .await?;
        let response = check_status("POST /access/ticket", response).await?;
        let body: ProxmoxResponse<Ticket> = decode_json("POST /access/ticket", response).await?;
        Ok(body.data)
    }

    async fn ticket(&self) -> Result<Arc<Ticket>> {
        let this = self;
        self.session
            .get_or_refresh(move || this.authenticate())
            .await
    }

    /// Sends an authenticated request and unwraps the `data` field.
    ///
    /// A ticket rejected with 401 is dropped and the request retried once
    /// with a fresh one.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let what = format!("{} {}", method, path);
        let response = match &self.auth {
            ProxmoxAuth::Token { id, secret } => {
                self.send(&method, path, params, Credential::Token(id, secret))
                    .await?
            }
            ProxmoxAuth::Ticket { .. } => {
                let ticket = self.ticket().await?;
                let response = self
                    .send(&method, path, params, Credential::Ticket(&ticket))
                    .await?;
                if response.status() == StatusCode::UNAUTHORIZED {
                    tracing::debug!("Proxmox ticket rejected on {}, re-authenticating", what);
                    self.session.invalidate(&ticket).await;
                    let ticket = self.ticket().await?;
                    self.send(&method, path, params, Credential::Ticket(&ticket))
                        .await?
                } else {
                    response
                }
            }
        };

        let response = check_status(&what, response).await?;
        let body: ProxmoxResponse<T> = decode_json(&what, response).await?;
        Ok(body.data)
    }

    pub async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.request(Method::GET, "/nodes", &[]).await
    }

    pub async fn list_vms(&self, node: &str) -> Result<Vec<Vm>> {
        self.request(Method::GET, &format!("/nodes/{}/qemu", node), &[])
            .await
    }

    pub async fn create_vm(&self, options: &CreateVmOptions) -> Result<String> {
        let path = format!("/nodes/{}/qemu", options.node);
        let task: TaskResponse = self
            .request(Method::POST, &path, &options.params())
            .await?;
        Ok(task.upid())
    }

    pub async fn delete_vm(&self, node: &str, vmid: u32) -> Result<String> {
        let path = format!("/nodes/{}/qemu/{}", node, vmid);
        let task: TaskResponse = self.request(Method::DELETE, &path, &[]).await?;
        Ok(task.upid())
    }

    pub async fn vm_status(&self, node: &str, vmid: u32) -> Result<Vm> {
        let path = format!("/nodes/{}/qemu/{}/status/current", node, vmid);
        self.request(Method::GET, &path, &[]).await
    }

    /// `action` is one of `start`, `stop`, `reset`.
    pub async fn vm_power(&self, node: &str, vmid: u32, action: &str) -> Result<String> {
        let path = format!("/nodes/{}/qemu/{}/status/{}", node, vmid, action);
        let task: TaskResponse = self.request(Method::POST, &path, &[]).await?;
        Ok(task.upid())
    }

    pub async fn vnc_proxy(&self, node: &str, vmid: u32) -> Result<VncProxy> {
        let path = format!("/nodes/{}/qemu/{}/vncproxy", node, vmid);
        self.request(Method::POST, &path, &[]).await
    }

    pub async fn task_status(&self, upid: &str) -> Result<TaskStatus> {
        let parts: Vec<&str> = upid.split(':').collect();
        if parts.len() < 2 {
            return Err(ComputeError::invalid_id(format!(
                "Invalid UPID format: {}",
                upid
            )));
        }
        let path = format!(
            "/nodes/{}/tasks/{}/status",
            parts[1],
            urlencoding::encode(upid)
        );
        self.request(Method::GET, &path, &[]).await
    }

    /// Addresses reported by the QEMU guest agent; empty when the agent is
    /// not reachable.
    pub async fn guest_addresses(&self, node: &str, vmid: u32) -> Vec<String> {
        let path = format!("/nodes/{}/qemu/{}/agent/network-get-interfaces", node, vmid);
        let response: NetworkResponse = match self.request(Method::GET, &path, &[]).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Guest agent unavailable for {}/{}: {}", node, vmid, e);
                return Vec::new();
            }
        };

        response
            .result
            .into_iter()
            .filter(|interface| interface.name != "lo")
            .flat_map(|interface| interface.ip_addresses.unwrap_or_default())
            .map(|ip| ip.ip_address)
            .filter(|ip| ip != "127.0.0.1" && !ip.starts_with("::1") && !ip.starts_with("fe80"))
            .collect()
    }
}
