//! S3-compatible blob store (AWS S3, MinIO, R2, ...).

use std::collections::HashMap;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::primitives::ByteStream as S3ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};

use crate::{
    BatchDeleteResult, BlobError, BlobId, BlobListing, BlobMetadata, BlobResult, BlobStore,
    FailedDelete, StoreCapabilities, StoredBlob,
};

/// S3 limits `DeleteObjects` to 1000 keys per request.
const S3_MAX_BATCH: usize = 1000;

/// Concurrent `HeadObject` calls while listing a folder
const HEAD_CONCURRENCY: usize = 16;

/// User metadata key holding the comma-joined tags
const TAGS_KEY: &str = "tags";

/// Connection settings for [`S3CompatibleStore`]
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Base for public URLs; defaults to `<endpoint>/<bucket>`
    pub public_base_url: Option<String>,
}

impl S3Config {
    /// Read `S3_BUCKET`, `S3_REGION`, `S3_ENDPOINT`, `S3_ACCESS_KEY_ID`,
    /// `S3_SECRET_ACCESS_KEY` and `S3_PUBLIC_BASE_URL`.
    pub fn from_env() -> BlobResult<Self> {
        fn required(name: &str) -> BlobResult<String> {
            std::env::var(name).map_err(|_| BlobError::invalid(format!("{} is not set", name)))
        }

        Ok(Self {
            bucket: required("S3_BUCKET")?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            endpoint: std::env::var("S3_ENDPOINT").ok(),
            access_key_id: required("S3_ACCESS_KEY_ID")?,
            secret_access_key: required("S3_SECRET_ACCESS_KEY")?,
            public_base_url: std::env::var("S3_PUBLIC_BASE_URL").ok(),
        })
    }
}

/// Blob store backed by any S3-compatible service
pub struct S3CompatibleStore {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3CompatibleStore {
    pub fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "clinic-blob",
        );

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint.clone());
        }

        let public_base_url = config.public_base_url.clone().unwrap_or_else(|| {
            let endpoint = config
                .endpoint
                .clone()
                .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", config.region));
            format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket)
        });

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
            public_base_url,
        }
    }

    pub fn from_env() -> BlobResult<Self> {
        Ok(Self::new(S3Config::from_env()?))
    }

    /// Build from the default AWS credential/region chain
    pub async fn from_default_chain(bucket: String) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let region = shared
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "us-east-1".to_string());
        Self {
            client: Client::new(&shared),
            public_base_url: format!("https://{}.s3.{}.amazonaws.com", bucket, region),
            bucket,
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), key)
    }

    /// `None` when the object vanished after it was listed
    async fn head_listing(&self, key: String) -> BlobResult<Option<BlobListing>> {
        match self.client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(head) => {
                let url = self.url_for(&key);
                Ok(Some(listing_from_metadata(key, url, head.metadata())))
            }
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
            Err(e) => Err(BlobError::backend(e)),
        }
    }
}

/// S3 user metadata must be US-ASCII, so every value is percent-encoded.
fn encode_metadata(metadata: &BlobMetadata) -> Vec<(String, String)> {
    let mut out = Vec::with_capacity(metadata.context.len() + 1);
    if !metadata.tags.is_empty() {
        let tags: Vec<String> = metadata
            .tags
            .iter()
            .map(|t| urlencoding::encode(t).into_owned())
            .collect();
        out.push((TAGS_KEY.to_string(), tags.join(",")));
    }
    for (k, v) in &metadata.context {
        out.push((k.clone(), urlencoding::encode(v).into_owned()));
    }
    out
}

fn decode_value(value: &str) -> String {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

fn listing_from_metadata(key: String, url: String, metadata: Option<&HashMap<String, String>>) -> BlobListing {
    let mut listing = BlobListing {
        id: BlobId::from(key),
        url,
        tags: Vec::new(),
        context: Default::default(),
    };
    for (k, v) in metadata.into_iter().flatten() {
        if k == TAGS_KEY {
            listing.tags = v.split(',').filter(|t| !t.is_empty()).map(decode_value).collect();
        } else {
            listing.context.insert(k.clone(), decode_value(v));
        }
    }
    listing
}

#[async_trait]
impl BlobStore for S3CompatibleStore {
    async fn upload(
        &self,
        key: &str,
        body: Bytes,
        metadata: &BlobMetadata,
    ) -> BlobResult<StoredBlob> {
        let size_bytes = body.len() as u64;
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&metadata.content_type)
            .body(S3ByteStream::from(body));

        for (k, v) in encode_metadata(metadata) {
            request = request.metadata(k, v);
        }

        request
            .send()
            .await
            .map_err(|e| BlobError::upload_failed(e.to_string()))?;

        Ok(StoredBlob {
            id: BlobId::from(key),
            url: self.url_for(key),
            size_bytes,
        })
    }

    async fn delete(&self, id: &BlobId) -> BlobResult<()> {
        // S3 reports success for keys that do not exist.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(id.as_str())
            .send()
            .await
            .map_err(BlobError::backend)?;
        Ok(())
    }

    async fn batch_delete(&self, ids: &[BlobId]) -> BlobResult<BatchDeleteResult> {
        let objects = ids
            .iter()
            .map(|id| ObjectIdentifier::builder().key(id.as_str()).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(BlobError::backend)?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(false)
            .build()
            .map_err(BlobError::backend)?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(BlobError::backend)?;

        let mut result = BatchDeleteResult::default();
        for deleted in output.deleted() {
            if let Some(key) = deleted.key() {
                result.deleted.push(BlobId::from(key));
            }
        }
        for error in output.errors() {
            if let Some(key) = error.key() {
                result.failed.push(FailedDelete {
                    id: BlobId::from(key),
                    reason: error.message().unwrap_or("unknown error").to_string(),
                });
            }
        }
        Ok(result)
    }

    async fn list_by_folder(&self, prefix: &str) -> BlobResult<Vec<BlobListing>> {
        let folder = format!("{}/", prefix.trim_end_matches('/'));
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&folder)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(BlobError::backend)?;

            keys.extend(output.contents().iter().filter_map(|o| o.key()).map(str::to_string));

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        // listing responses carry no user metadata; fetch it per key
        let listing: Vec<Option<BlobListing>> = stream::iter(keys)
            .map(|key| async move { self.head_listing(key).await })
            .buffered(HEAD_CONCURRENCY)
            .try_collect()
            .await?;
        Ok(listing.into_iter().flatten().collect())
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::basic()
            .with_batch_delete(Some(S3_MAX_BATCH))
            .with_listing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> BlobMetadata {
        BlobMetadata {
            tenant_id: "clinic-a".to_string(),
            folder: "คลินิก_ทันตกรรม/HN0001".to_string(),
            filename: Some("ฟิล์ม x-ray.png".to_string()),
            content_type: "image/png".to_string(),
            tags: vec!["patient-document".to_string(), "a,b".to_string()],
            context: [
                ("tenant_id".to_string(), "clinic-a".to_string()),
                ("filename".to_string(), "ฟิล์ม x-ray.png".to_string()),
            ]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn metadata_values_are_sent_as_ascii() {
        let encoded = encode_metadata(&metadata());

        assert!(encoded.iter().all(|(k, v)| k.is_ascii() && v.is_ascii()));
        let tags = encoded.iter().find(|(k, _)| k == TAGS_KEY).map(|(_, v)| v.as_str());
        assert_eq!(tags, Some("patient-document,a%2Cb"));
    }

    #[test]
    fn listing_restores_tags_and_context() {
        let sent: HashMap<String, String> = encode_metadata(&metadata()).into_iter().collect();

        let listing = listing_from_metadata(
            "f/HN0001/x.png".to_string(),
            "https://cdn/f/HN0001/x.png".to_string(),
            Some(&sent),
        );

        assert_eq!(listing.tags, vec!["patient-document".to_string(), "a,b".to_string()]);
        assert_eq!(listing.context.get("tenant_id").map(String::as_str), Some("clinic-a"));
        assert_eq!(listing.context.get("filename").map(String::as_str), Some("ฟิล์ม x-ray.png"));
        assert!(!listing.context.contains_key(TAGS_KEY));
    }

    #[test]
    fn listing_without_metadata_has_no_tenant() {
        let listing = listing_from_metadata("k".to_string(), "u".to_string(), None);
        assert!(listing.tags.is_empty());
        assert!(listing.context.is_empty());
    }
}
