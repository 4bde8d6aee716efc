//! Authenticated client for the bridge REST service.

use crate::types::{
    Bucket, BucketRequest, BucketToken, Contact, ContactQuery, RegisteredKey, TokenOperation, User,
};
use async_trait::async_trait;
use ferry_core::{
    AuthConfig, ClientConfig, FileEntry, Frame, FrameId, Pointer, PointerRecord,
    ShardDestination, ShardMeta, StoreFileRequest, pointers_from_records,
};
use ferry_signer::{KeyPair, Payload, RequestSigner, SignableRequest, hash_password};
use ferry_transfer::{BridgeApi, TransferError, TransferResult};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

/// Header carrying a bucket token.
pub const TOKEN_HEADER: &str = "x-token";

#[derive(Clone, Debug)]
pub struct BridgeClient {
    http: reqwest::Client,
    base_url: Url,
    signer: RequestSigner,
}

impl BridgeClient {
    pub fn new(base_url: &str, signer: RequestSigner) -> TransferResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TransferError::Config(format!("invalid bridge URL {base_url}: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            signer,
        })
    }

    /// Build a client from configuration, loading the configured credentials.
    pub fn from_config(config: &ClientConfig) -> TransferResult<Self> {
        let signer = match &config.auth {
            None => RequestSigner::default(),
            Some(AuthConfig::KeyPair { secret_key }) => {
                RequestSigner::with_keypair(Arc::new(KeyPair::from_hex_secret(secret_key)?))
            }
            Some(AuthConfig::Basic { email, password }) => {
                RequestSigner::with_basic(email.clone(), password)
            }
        };
        Self::new(&config.bridge_url, signer)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn signer(&self) -> &RequestSigner {
        &self.signer
    }

    fn url(&self, path: &str) -> TransferResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| TransferError::Config(format!("failed to build bridge URL: {e}")))
    }

    /// Build an authenticated request. The body or query string sent is
    /// exactly the payload that was signed.
    pub(crate) fn build_request(
        &self,
        method: Method,
        path: &str,
        params: Value,
        token: Option<&str>,
    ) -> TransferResult<reqwest::Request> {
        let mut url = self.url(path)?;
        let mut signable = SignableRequest::new(
            method.as_str(),
            url.as_str(),
            Payload::for_method(method.as_str(), params),
        );
        let auth = self.signer.authenticate(&mut signable);

        let serialized = signable.payload.serialize();
        let mut builder = match &signable.payload {
            Payload::Json(_) => self
                .http
                .request(method, url)
                .header(CONTENT_TYPE, "application/json")
                .body(serialized),
            Payload::Query(pairs) => {
                if !pairs.is_empty() {
                    url.set_query(Some(&serialized));
                }
                self.http.request(method, url)
            }
        };

        for (name, value) in auth.signature_headers() {
            builder = builder.header(name, value);
        }
        if let ferry_signer::AuthHeaders::Basic { user, password } = &auth {
            builder = builder.basic_auth(user, Some(password));
        }
        if let Some(token) = token {
            builder = builder.header(TOKEN_HEADER, token);
        }

        builder
            .build()
            .map_err(|e| TransferError::Config(format!("failed to build request: {e}")))
    }

    /// Send an authenticated request and decode the response.
    ///
    /// Connection failures surface as `Transport`; non-2xx responses as
    /// `Protocol` carrying the server's `error` field, or the raw body when
    /// there is none.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: Value,
        token: Option<&str>,
    ) -> TransferResult<T> {
        let request = self.build_request(method.clone(), path, params, token)?;
        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| TransferError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransferError::Transport(e.to_string()))?;
        debug!(%method, path, status = status.as_u16(), "bridge response");

        if !status.is_success() {
            return Err(TransferError::Protocol(error_message(status, &body)));
        }

        let body = if body.trim().is_empty() { "null" } else { &body };
        serde_json::from_str(body)
            .map_err(|e| TransferError::Protocol(format!("invalid response from bridge: {e}")))
    }

    fn params<P: Serialize>(value: &P) -> TransferResult<Value> {
        serde_json::to_value(value)
            .map_err(|e| TransferError::Protocol(format!("failed to encode request: {e}")))
    }

    pub async fn get_info(&self) -> TransferResult<Value> {
        self.request(Method::GET, "/", json!({}), None).await
    }

    pub async fn get_contact_list(&self, query: &ContactQuery) -> TransferResult<Vec<Contact>> {
        self.request(Method::GET, "/contacts", Self::params(query)?, None)
            .await
    }

    pub async fn get_contact_by_node_id(&self, node_id: &str) -> TransferResult<Contact> {
        self.request(Method::GET, &format!("/contacts/{node_id}"), json!({}), None)
            .await
    }

    /// Register a user. The password is hashed before it is sent.
    pub async fn create_user(&self, email: &str, password: &str) -> TransferResult<User> {
        let params = json!({ "email": email, "password": hash_password(password) });
        self.request(Method::POST, "/users", params, None).await
    }

    pub async fn get_public_keys(&self) -> TransferResult<Vec<RegisteredKey>> {
        self.request(Method::GET, "/keys", json!({}), None).await
    }

    pub async fn add_public_key(&self, key: &str) -> TransferResult<RegisteredKey> {
        self.request(Method::POST, "/keys", json!({ "key": key }), None)
            .await
    }

    pub async fn destroy_public_key(&self, key: &str) -> TransferResult<()> {
        self.request(Method::DELETE, &format!("/keys/{key}"), json!({}), None)
            .await
    }

    pub async fn get_buckets(&self) -> TransferResult<Vec<Bucket>> {
        self.request(Method::GET, "/buckets", json!({}), None).await
    }

    pub async fn get_bucket_by_id(&self, id: &str) -> TransferResult<Bucket> {
        self.request(Method::GET, &format!("/buckets/{id}"), json!({}), None)
            .await
    }

    pub async fn create_bucket(&self, request: &BucketRequest) -> TransferResult<Bucket> {
        self.request(Method::POST, "/buckets", Self::params(request)?, None)
            .await
    }

    pub async fn destroy_bucket_by_id(&self, id: &str) -> TransferResult<()> {
        self.request(Method::DELETE, &format!("/buckets/{id}"), json!({}), None)
            .await
    }

    pub async fn update_bucket_by_id(
        &self,
        id: &str,
        request: &BucketRequest,
    ) -> TransferResult<Bucket> {
        self.request(
            Method::PATCH,
            &format!("/buckets/{id}"),
            Self::params(request)?,
            None,
        )
        .await
    }

    pub async fn list_files_in_bucket(&self, id: &str) -> TransferResult<Vec<FileEntry>> {
        self.request(Method::GET, &format!("/buckets/{id}/files"), json!({}), None)
            .await
    }

    pub async fn create_token(
        &self,
        bucket: &str,
        operation: TokenOperation,
    ) -> TransferResult<BucketToken> {
        self.request(
            Method::POST,
            &format!("/buckets/{bucket}/tokens"),
            json!({ "operation": operation }),
            None,
        )
        .await
    }

    pub async fn remove_file_from_bucket(&self, bucket: &str, file: &str) -> TransferResult<()> {
        self.request(
            Method::DELETE,
            &format!("/buckets/{bucket}/files/{file}"),
            json!({}),
            None,
        )
        .await
    }

    pub async fn get_file_pointers(
        &self,
        bucket: &str,
        token: &str,
        file: &str,
    ) -> TransferResult<Vec<Pointer>> {
        let records: Vec<PointerRecord> = self
            .request(
                Method::GET,
                &format!("/buckets/{bucket}/files/{file}"),
                json!({}),
                Some(token),
            )
            .await?;
        Ok(pointers_from_records(records))
    }

    /// Commit a staged frame as a file entry in `bucket`.
    pub async fn store_file_in_bucket(
        &self,
        bucket: &str,
        token: &str,
        request: &StoreFileRequest,
    ) -> TransferResult<FileEntry> {
        self.request(
            Method::PUT,
            &format!("/buckets/{bucket}/files"),
            Self::params(request)?,
            Some(token),
        )
        .await
    }

    pub async fn create_frame(&self) -> TransferResult<Frame> {
        self.request(Method::POST, "/frames", json!({}), None).await
    }

    pub async fn get_frames(&self) -> TransferResult<Vec<Frame>> {
        self.request(Method::GET, "/frames", json!({}), None).await
    }

    pub async fn get_frame_by_id(&self, id: &FrameId) -> TransferResult<Frame> {
        self.request(Method::GET, &format!("/frames/{id}"), json!({}), None)
            .await
    }

    pub async fn destroy_frame_by_id(&self, id: &FrameId) -> TransferResult<()> {
        self.request(Method::DELETE, &format!("/frames/{id}"), json!({}), None)
            .await
    }

    pub async fn add_shard_to_frame(
        &self,
        id: &FrameId,
        shard: &ShardMeta,
    ) -> TransferResult<ShardDestination> {
        self.request(
            Method::PUT,
            &format!("/frames/{id}"),
            Self::params(shard)?,
            None,
        )
        .await
    }
}

/// Message for a non-2xx response: the `error` field of a JSON body, a bare
/// JSON string, or the raw body.
fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => {
            if let Some(Value::String(message)) = map.get("error") {
                return message.clone();
            }
        }
        Ok(Value::String(message)) => return message,
        _ => {}
    }
    let body = body.trim();
    if body.is_empty() {
        status.to_string()
    } else {
        body.to_string()
    }
}

#[async_trait]
impl BridgeApi for BridgeClient {
    async fn create_frame(&self) -> TransferResult<FrameId> {
        Ok(BridgeClient::create_frame(self).await?.id)
    }

    async fn add_shard(
        &self,
        frame: &FrameId,
        shard: &ShardMeta,
    ) -> TransferResult<ShardDestination> {
        self.add_shard_to_frame(frame, shard).await
    }

    async fn store_file(
        &self,
        bucket: &str,
        token: &str,
        request: &StoreFileRequest,
    ) -> TransferResult<FileEntry> {
        self.store_file_in_bucket(bucket, token, request).await
    }

    async fn get_file_pointers(
        &self,
        bucket: &str,
        token: &str,
        file_id: &str,
    ) -> TransferResult<Vec<Pointer>> {
        BridgeClient::get_file_pointers(self, bucket, token, file_id).await
    }

    async fn destroy_frame(&self, frame: &FrameId) -> TransferResult<()> {
        self.destroy_frame_by_id(frame).await
    }
}
