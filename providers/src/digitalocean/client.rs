use crate::config::DigitalOceanConfig;
use crate::http::{build_client, check_status, decode_json, transport_error};
use cloug_common::Result;
use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

const PER_PAGE: &str = "200";

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct Droplet {
    pub id: u64,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub networks: Networks,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct Region {
    pub slug: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub(crate) struct Networks {
    #[serde(default)]
    pub v4: Vec<NetworkV4>,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct NetworkV4 {
    pub ip_address: String,
    #[serde(rename = "type")]
    pub network_type: String,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct Action {
    pub id: u64,
    pub status: String,
    #[serde(rename = "type", default)]
    pub action_type: String,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct ApiImage {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub distribution: String,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub min_disk_size: i64,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct Size {
    pub slug: String,
    #[serde(default)]
    pub regions: Vec<String>,
    pub vcpus: u32,
    pub disk: u32,
    pub memory: u32,
    /// Terabytes.
    #[serde(default)]
    pub transfer: f64,
}

#[derive(Deserialize, Debug)]
struct SshKey {
    id: u64,
}

#[derive(Serialize, Debug)]
pub(crate) struct CreateDropletRequest {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: u64,
    pub ipv6: bool,
    pub private_networking: bool,
    pub user_data: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
}

/// Body of `POST /v2/droplets/{id}/actions`.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum DropletAction {
    PowerOn,
    PowerOff,
    Reboot,
    Rename { name: String },
    Rebuild { image: u64 },
    Resize { size: String, disk: bool },
    Snapshot { name: String },
}

#[derive(Deserialize)]
struct DropletEnvelope {
    droplet: Droplet,
}

#[derive(Deserialize)]
struct DropletsEnvelope {
    droplets: Vec<Droplet>,
}

#[derive(Deserialize)]
struct ActionEnvelope {
    action: Action,
}

#[derive(Deserialize)]
struct ActionsEnvelope {
    actions: Vec<Action>,
}

#[derive(Deserialize)]
struct ImageEnvelope {
    image: ApiImage,
}

#[derive(Deserialize)]
struct ImagesEnvelope {
    images: Vec<ApiImage>,
}

#[derive(Deserialize)]
struct SizesEnvelope {
    sizes: Vec<Size>,
}

#[derive(Deserialize)]
struct SshKeyEnvelope {
    ssh_key: SshKey,
}

/// Bearer-token client for the DigitalOcean v2 API.
pub(crate) struct DigitalOceanClient {
    client: Client,
    base_url: String,
    token: String,
}

impl DigitalOceanClient {
    pub fn new(config: &DigitalOceanConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(false)?,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn build(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/v2{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
    }

    async fn send(&self, what: &str, request: RequestBuilder) -> Result<reqwest::Response> {
        tracing::debug!("DigitalOcean {}", what);
        let response = request.send().await.map_err(|e| transport_error(what, e))?;
        check_status(what, response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let what = format!("GET {}", path);
        let response = self
            .send(&what, self.build(Method::GET, path).query(query))
            .await?;
        decode_json(&what, response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let what = format!("POST {}", path);
        let response = self
            .send(&what, self.build(Method::POST, path).json(body))
            .await?;
        decode_json(&what, response).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let what = format!("DELETE {}", path);
        self.send(&what, self.build(Method::DELETE, path)).await?;
        Ok(())
    }

    pub async fn create_droplet(&self, request: &CreateDropletRequest) -> Result<Droplet> {
        let envelope: DropletEnvelope = self.post("/droplets", request).await?;
        Ok(envelope.droplet)
    }

    pub async fn delete_droplet(&self, id: u64) -> Result<()> {
        self.delete(&format!("/droplets/{}", id)).await
    }

    pub async fn list_droplets(&self) -> Result<Vec<Droplet>> {
        let envelope: DropletsEnvelope = self.get("/droplets", &[("per_page", PER_PAGE)]).await?;
        Ok(envelope.droplets)
    }

    pub async fn get_droplet(&self, id: u64) -> Result<Droplet> {
        let envelope: DropletEnvelope = self.get(&format!("/droplets/{}", id), &[]).await?;
        Ok(envelope.droplet)
    }

    pub async fn list_droplet_actions(&self, id: u64) -> Result<Vec<Action>> {
        let envelope: ActionsEnvelope = self
            .get(&format!("/droplets/{}/actions", id), &[("per_page", PER_PAGE)])
            .await?;
        Ok(envelope.actions)
    }

    pub async fn droplet_action(&self, id: u64, action: &DropletAction) -> Result<Action> {
        let envelope: ActionEnvelope = self
            .post(&format!("/droplets/{}/actions", id), action)
            .await?;
        Ok(envelope.action)
    }

    pub async fn get_droplet_action(&self, id: u64, action_id: u64) -> Result<Action> {
        let envelope: ActionEnvelope = self
            .get(&format!("/droplets/{}/actions/{}", id, action_id), &[])
            .await?;
        Ok(envelope.action)
    }

    pub async fn list_distribution_images(&self) -> Result<Vec<ApiImage>> {
        let envelope: ImagesEnvelope = self
            .get("/images", &[("type", "distribution"), ("per_page", PER_PAGE)])
            .await?;
        Ok(envelope.images)
    }

    pub async fn list_user_images(&self) -> Result<Vec<ApiImage>> {
        let envelope: ImagesEnvelope = self
            .get("/images", &[("private", "true"), ("per_page", PER_PAGE)])
            .await?;
        Ok(envelope.images)
    }

    pub async fn get_image(&self, id: u64) -> Result<ApiImage> {
        let envelope: ImageEnvelope = self.get(&format!("/images/{}", id), &[]).await?;
        Ok(envelope.image)
    }

    pub async fn delete_image(&self, id: u64) -> Result<()> {
        self.delete(&format!("/images/{}", id)).await
    }

    pub async fn list_sizes(&self) -> Result<Vec<Size>> {
        let envelope: SizesEnvelope = self.get("/sizes", &[("per_page", PER_PAGE)]).await?;
        Ok(envelope.sizes)
    }

    pub async fn create_ssh_key(&self, name: &str, public_key: &str) -> Result<String> {
        let body = serde_json::json!({ "name": name, "public_key": public_key });
        let envelope: SshKeyEnvelope = self.post("/account/keys", &body).await?;
        Ok(envelope.ssh_key.id.to_string())
    }

    pub async fn delete_ssh_key(&self, id: &str) -> Result<()> {
        self.delete(&format!("/account/keys/{}", id)).await
    }
}
