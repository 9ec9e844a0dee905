use anyhow::anyhow;
use bodega_core::{
    AdapterFeatures, BlobAdapter, BlobHead, BlobObject, BlobReceipt, ChildStat, Error, Result,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use s3::error::S3Error;
use s3::{Bucket, Region, creds::Credentials};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct S3StoreConfig {
    endpoint: String,
    #[serde(default)]
    region: String,
    bucket_name: String,
    access_key: String,
    secret_key: String,
}

#[derive(Debug, Clone)]
pub struct S3Store {
    bucket: Box<Bucket>,
}

impl S3Store {
    pub fn create(config: S3StoreConfig) -> Self {
        let bucket = Bucket::new(
            &config.bucket_name,
            Region::Custom {
                endpoint: config.endpoint,
                region: config.region,
            },
            Credentials::new(
                Some(&config.access_key),
                Some(&config.secret_key),
                None,
                None,
                None,
            )
            .unwrap(),
        )
        .unwrap()
        .with_path_style();
        s3::set_retries(5);
        Self { bucket }
    }
}

fn trim_etag(tag: &str) -> String {
    tag.trim_matches('"').to_string()
}

/// Object heads carry HTTP dates, list responses RFC 3339 stamps.
fn parse_http_date(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.timestamp_millis())
}

fn parse_rfc3339(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|date| date.timestamp_millis())
}

#[async_trait::async_trait]
impl BlobAdapter for S3Store {
    fn features(&self) -> AdapterFeatures {
        AdapterFeatures {
            supplies_etag: true,
            derives_listings: true,
        }
    }

    async fn store(&self, path: &str, body: Bytes, content_type: &str) -> Result<BlobReceipt> {
        let response = self
            .bucket
            .put_object_with_content_type(path, &body, content_type)
            .await
            .map_err(Error::backend)?;
        let etag = response.headers().get("etag").map(|tag| trim_etag(tag));
        Ok(BlobReceipt {
            etag,
            modified: Utc::now().timestamp_millis(),
        })
    }

    async fn fetch(&self, path: &str) -> Result<Option<BlobObject>> {
        let response = match self.bucket.get_object(path).await {
            Ok(response) => response,
            Err(S3Error::HttpFailWithBody(404, _)) => return Ok(None),
            Err(e) => return Err(Error::backend(e)),
        };

        let headers = response.headers();
        let content_type = headers
            .get("content-type")
            .cloned()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let etag = headers.get("etag").map(|tag| trim_etag(tag));
        let modified = headers
            .get("last-modified")
            .and_then(|value| parse_http_date(value))
            .unwrap_or_default();

        Ok(Some(BlobObject {
            body: response.into_bytes(),
            content_type,
            etag,
            modified,
        }))
    }

    async fn remove(&self, path: &str) -> Result<bool> {
        match self.bucket.head_object(path).await {
            Ok((_, 200)) => {}
            Ok((_, 404)) => return Ok(false),
            Ok((_, code)) => return Err(Error::backend(anyhow!("unexpected http status code {code}"))),
            Err(e) => return Err(Error::backend(e)),
        }
        self.bucket
            .delete_object(path)
            .await
            .map_err(Error::backend)?;
        Ok(true)
    }

    async fn head(&self, path: &str) -> Result<Option<BlobHead>> {
        match self.bucket.head_object(path).await {
            Ok((head, 200)) => {
                let length = head
                    .content_length
                    .ok_or_else(|| Error::backend(anyhow!("missing content-length")))?;
                Ok(Some(BlobHead {
                    etag: head.e_tag.as_deref().map(trim_etag),
                    content_type: head
                        .content_type
                        .unwrap_or_else(|| "application/octet-stream".to_string()),
                    size: u64::try_from(length).map_err(Error::backend)?,
                    modified: head
                        .last_modified
                        .as_deref()
                        .and_then(parse_http_date)
                        .unwrap_or_default(),
                }))
            }
            Ok((_, 404)) => Ok(None),
            Ok((_, code)) => Err(Error::backend(anyhow!("unexpected http status code {code}"))),
            Err(e) => Err(Error::backend(e)),
        }
    }

    /// One delimited list call; common prefixes come back as directories.
    async fn list_children(&self, path: &str) -> Result<Vec<ChildStat>> {
        let results = self
            .bucket
            .list(path.to_string(), Some("/".to_string()))
            .await
            .map_err(Error::backend)?;

        let mut entries = Vec::new();
        for page in results {
            for object in page.contents {
                let Some(name) = object.key.strip_prefix(path) else {
                    continue;
                };
                if name.is_empty() {
                    continue;
                }
                entries.push(ChildStat {
                    name: name.to_string(),
                    etag: object.e_tag.as_deref().map(trim_etag),
                    content_type: None,
                    size: Some(object.size),
                    modified: parse_rfc3339(&object.last_modified),
                });
            }
            for common in page.common_prefixes.into_iter().flatten() {
                let Some(name) = common.prefix.strip_prefix(path) else {
                    continue;
                };
                entries.push(ChildStat {
                    name: name.to_string(),
                    etag: None,
                    content_type: None,
                    size: None,
                    modified: None,
                });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
