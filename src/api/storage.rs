use crate::api::client::{check, FirebaseClient};
use crate::error::{Error, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use url::Url;

/// Folder that chat photos are uploaded into.
pub const PHOTOS_PATH: &str = "chat_photos";

const STORAGE_ROOT: &str = "https://firebasestorage.googleapis.com/v0/b";

/// Where picked photos go before their URL is posted to the feed.
pub trait PhotoStore: Send + Sync + 'static {
    /// Uploads a local file and resolves to its download URL.
    fn upload(&self, path: PathBuf) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    name: String,
    #[serde(default)]
    download_tokens: Option<String>,
}

#[derive(Clone)]
pub struct ObjectStorage {
    client: FirebaseClient,
    bucket: String,
}

impl ObjectStorage {
    pub fn new(client: FirebaseClient) -> Self {
        let bucket = client.config().storage_bucket.trim().to_string();
        Self { client, bucket }
    }
}

impl PhotoStore for ObjectStorage {
    async fn upload(&self, path: PathBuf) -> Result<String> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Config(format!("not a file: {}", path.display())))?;
        let object = format!("{}/{}", PHOTOS_PATH, file_name);
        let bytes = tokio::fs::read(&path).await?;
        log::debug!("uploading {} ({} bytes)", object, bytes.len());

        let mut url = Url::parse(&format!("{}/{}/o", STORAGE_ROOT, self.bucket))?;
        url.query_pairs_mut().append_pair("name", &object);
        let mut req = self
            .client
            .http
            .post(url)
            .header(CONTENT_TYPE, content_type(&path))
            .body(bytes);
        if let Some(token) = self.client.id_token() {
            req = req.header(AUTHORIZATION, format!("Firebase {}", token));
        }
        let meta: ObjectMetadata = check(req.send().await?).await?.json().await?;
        download_url(&self.bucket, &meta.name, meta.download_tokens.as_deref())
    }
}

/// Public download URL of an uploaded object.
pub fn download_url(bucket: &str, object: &str, token: Option<&str>) -> Result<String> {
    let mut url = Url::parse(&format!("{}/{}/o/", STORAGE_ROOT, bucket))?;
    url.path_segments_mut()
        .map_err(|_| Error::Config(format!("bad storage bucket: {}", bucket)))?
        .pop_if_empty()
        .push(object);
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("alt", "media");
        if let Some(token) = token {
            query.append_pair("token", token);
        }
    }
    Ok(url.into())
}

fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Fetches photo bytes for display; decoding is left to the view.
#[derive(Clone)]
pub struct PhotoLoader {
    http: reqwest::Client,
}

impl PhotoLoader {
    pub fn new(client: &FirebaseClient) -> Self {
        Self {
            http: client.http.clone(),
        }
    }

    pub async fn load(&self, url: &str) -> Result<Vec<u8>> {
        let resp = check(self.http.get(url).send().await?).await?;
        Ok(resp.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_url_encodes_object_path() {
        let url = download_url("demo.appspot.com", "chat_photos/cat 1.jpg", Some("tok")).unwrap();
        assert_eq!(
            url,
            "https://firebasestorage.googleapis.com/v0/b/demo.appspot.com/o/chat_photos%2Fcat%201.jpg?alt=media&token=tok"
        );
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type(Path::new("/tmp/a.JPG")), "image/jpeg");
        assert_eq!(content_type(Path::new("b.png")), "image/png");
        assert_eq!(content_type(Path::new("noext")), "application/octet-stream");
    }
}
