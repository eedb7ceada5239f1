// Docker Registry HTTP API v2 client used for both ends of a promotion.
// Each client serves one registry and caches the authorization it last
// negotiated, replaying a rejected request once with fresh credentials.

use crate::config::{AuthConfig, RegistryConfig};
use crate::error::{RegistryError, Result};
use crate::image::manifest::{MEDIA_TYPE_SIGNED, MEDIA_TYPE_UNSIGNED};
use crate::image::{Digest, SignedManifest};
use crate::registry::auth::{Challenge, basic_header};
use crate::registry::{BlobStream, RegistryClient};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use regex::Regex;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LINK, LOCATION, WWW_AUTHENTICATE};
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::sync::{LazyLock, RwLock};
use tracing::debug;
use url::Url;

static NEXT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<([^>]+)>\s*;\s*rel="?next"?"#).expect("static link regex")
});

#[derive(Debug, Deserialize)]
struct TagList {
    tags: Option<Vec<String>>,
}

pub struct RegistryClientBuilder {
    address: String,
    auth_config: AuthConfig,
    insecure: bool,
}

impl RegistryClientBuilder {
    pub fn new(address: String) -> Self {
        Self {
            address,
            auth_config: AuthConfig::default(),
            insecure: false,
        }
    }

    pub fn with_auth(mut self, auth_config: AuthConfig) -> Self {
        self.auth_config = auth_config;
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn build(self) -> Result<HttpRegistryClient> {
        let client = if self.insecure {
            Client::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()?
        } else {
            Client::builder().build()?
        };

        let base = Url::parse(self.address.trim_end_matches('/'))?;

        Ok(HttpRegistryClient {
            client,
            base,
            auth_config: self.auth_config,
            authorization: RwLock::new(None),
        })
    }
}

pub struct HttpRegistryClient {
    client: Client,
    base: Url,
    auth_config: AuthConfig,
    authorization: RwLock<Option<String>>,
}

impl HttpRegistryClient {
    pub fn builder(address: String) -> RegistryClientBuilder {
        RegistryClientBuilder::new(address)
    }

    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        Self::builder(config.base_url())
            .with_auth(config.auth.clone())
            .with_insecure(config.insecure)
            .build()
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(&format!("/v2/{}", path))?)
    }

    fn current_authorization(&self) -> Option<String> {
        self.authorization.read().ok().and_then(|guard| guard.clone())
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.current_authorization() {
            Some(value) => request.header(AUTHORIZATION, value),
            None => request,
        }
    }

    /// Send a request built by `build`, answering one authentication
    /// challenge if the registry issues it.
    async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.authorized(build(&self.client)).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .and_then(Challenge::parse);

        let Some(challenge) = challenge else {
            return Ok(response);
        };

        let value = match challenge {
            Challenge::Basic => basic_header(&self.auth_config).ok_or_else(|| {
                RegistryError::Auth("registry requires credentials but none were provided".into())
            })?,
            bearer => bearer.authorize(&self.client, &self.auth_config).await?,
        };

        if let Ok(mut guard) = self.authorization.write() {
            *guard = Some(value.clone());
        }

        // The cache is shared between requests; retry with this challenge's answer.
        Ok(build(&self.client).header(AUTHORIZATION, value).send().await?)
    }

    async fn expect_success(response: Response, context: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => RegistryError::NotFound(context.to_string()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                RegistryError::Auth(format!("{} rejected with status {}: {}", context, status, body))
            }
            _ => RegistryError::Registry {
                status: status.as_u16(),
                message: format!("{}: {}", context, body.trim()),
            },
        })
    }

    fn next_page(&self, response: &Response) -> Result<Option<Url>> {
        let Some(link) = response.headers().get(LINK).and_then(|v| v.to_str().ok()) else {
            return Ok(None);
        };
        match NEXT_LINK.captures(link) {
            Some(caps) => Ok(Some(self.base.join(&caps[1])?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn tags(&self, image: &str) -> Result<Vec<String>> {
        let mut url = self.endpoint(&format!("{}/tags/list", image))?;
        let mut tags = Vec::new();

        loop {
            let response = self.send(|client| client.get(url.clone())).await?;
            let response = Self::expect_success(response, &format!("tag list of {}", image)).await?;
            let next = self.next_page(&response)?;

            let page: TagList = response
                .json()
                .await
                .map_err(|e| RegistryError::Parse(format!("tag list of {}: {}", image, e)))?;
            tags.extend(page.tags.unwrap_or_default());

            match next {
                Some(next) => url = next,
                None => break,
            }
        }

        debug!(image, count = tags.len(), "listed tags");
        Ok(tags)
    }

    async fn manifest(&self, image: &str, tag: &str) -> Result<SignedManifest> {
        let url = self.endpoint(&format!("{}/manifests/{}", image, tag))?;
        let accept = format!("{}, {}", MEDIA_TYPE_SIGNED, MEDIA_TYPE_UNSIGNED);

        let response = self
            .send(|client| client.get(url.clone()).header(ACCEPT, accept.as_str()))
            .await?;
        let response = Self::expect_success(response, &format!("manifest {}:{}", image, tag)).await?;
        let raw = response.bytes().await?;

        SignedManifest::from_bytes(raw.to_vec())
    }

    async fn blob_size(&self, image: &str, digest: &Digest) -> Result<u64> {
        let url = self.endpoint(&format!("{}/blobs/{}", image, digest))?;
        let response = self.send(|client| client.head(url.clone())).await?;
        let response = Self::expect_success(response, &format!("blob {}", digest)).await?;

        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .ok_or_else(|| RegistryError::Parse(format!("blob {} has no Content-Length", digest)))
    }

    async fn has_blob(&self, image: &str, digest: &Digest) -> Result<bool> {
        let url = self.endpoint(&format!("{}/blobs/{}", image, digest))?;
        let response = self.send(|client| client.head(url.clone())).await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Self::expect_success(response, &format!("blob {}", digest))
                .await
                .map(|_| false),
        }
    }

    async fn download_blob(&self, image: &str, digest: &Digest) -> Result<BlobStream> {
        let url = self.endpoint(&format!("{}/blobs/{}", image, digest))?;
        let response = self.send(|client| client.get(url.clone())).await?;
        let response = Self::expect_success(response, &format!("blob {}", digest)).await?;

        Ok(response.bytes_stream().map_err(RegistryError::from).boxed())
    }

    async fn upload_blob(&self, image: &str, digest: &Digest, body: BlobStream) -> Result<()> {
        let start = self.endpoint(&format!("{}/blobs/uploads/", image))?;
        let response = self.send(|client| client.post(start.clone())).await?;
        let response = Self::expect_success(response, &format!("upload session for {}", digest)).await?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| RegistryError::Upload("no Location header in upload response".into()))?;

        let mut target = self.base.join(location)?;
        target.query_pairs_mut().append_pair("digest", digest.as_str());

        // The body is consumed by the first attempt, so no challenge replay here.
        let response = self
            .authorized(self.client.put(target))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Body::wrap_stream(body))
            .send()
            .await
            .map_err(|e| RegistryError::Upload(format!("blob {}: {}", digest, e)))?;

        Self::expect_success(response, &format!("blob upload {}", digest)).await?;
        debug!(image, digest = %digest, "blob uploaded");
        Ok(())
    }

    async fn put_manifest(&self, image: &str, tag: &str, manifest: &SignedManifest) -> Result<()> {
        let url = self.endpoint(&format!("{}/manifests/{}", image, tag))?;
        let body = manifest.raw().to_vec();

        let response = self
            .send(|client| {
                client
                    .put(url.clone())
                    .header(CONTENT_TYPE, MEDIA_TYPE_SIGNED)
                    .body(body.clone())
            })
            .await?;

        Self::expect_success(response, &format!("manifest {}:{}", image, tag)).await?;
        Ok(())
    }
}
