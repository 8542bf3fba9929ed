//! Storage key resolution
//!
//! A `storage_key` is an opaque locator stored on the image row. Three shapes
//! exist in the corpus: absolute URLs (hotlinked/seeded content), local public
//! paths (browser-only, served by the web tier), and opaque object keys that
//! need a signed URL minted for them. Actual signing is the object store's
//! concern; this module picks the right URL shape and TTL for the consumer.

use crate::{Error, Result};

/// Who the resolved URL is for. Drives the TTL: a model fetch needs only a
/// short-lived URL, a browser render a longer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumer {
    Browser,
    Server,
    Model,
}

impl Consumer {
    /// Signed-URL lifetime in seconds.
    pub fn ttl_secs(&self) -> u64 {
        match self {
            Consumer::Browser => 86_400,
            Consumer::Server => 3_600,
            Consumer::Model => 300,
        }
    }
}

/// Maps a storage key to a fetchable URL for a given consumer.
///
/// Search tolerates failures here (falls back to the raw key); the worker
/// does not — without a model-fetchable URL there is nothing to tag.
pub trait StorageResolver: Send + Sync {
    fn resolve(&self, storage_key: &str, consumer: Consumer) -> Result<String>;
}

/// Default resolver covering the three storage-key shapes.
#[derive(Debug, Clone, Default)]
pub struct UrlOrPathResolver {
    /// Base for local public paths, e.g. `https://cdn.example.com`.
    pub public_url_base: Option<String>,
    /// Base of the signed-URL endpoint for opaque object keys.
    pub signed_url_base: Option<String>,
}

impl UrlOrPathResolver {
    pub fn new(public_url_base: Option<String>, signed_url_base: Option<String>) -> Self {
        Self {
            public_url_base,
            signed_url_base,
        }
    }
}

impl StorageResolver for UrlOrPathResolver {
    fn resolve(&self, storage_key: &str, consumer: Consumer) -> Result<String> {
        // Absolute URLs pass through for any consumer.
        if storage_key.starts_with("http://") || storage_key.starts_with("https://") {
            return Ok(storage_key.to_string());
        }

        // Local public paths are served by the web tier and reachable only
        // from a browser context.
        if storage_key.starts_with('/') {
            if consumer != Consumer::Browser {
                return Err(Error::Storage(format!(
                    "local path {storage_key} is browser-only"
                )));
            }
            return match &self.public_url_base {
                Some(base) => Ok(format!("{}{}", base.trim_end_matches('/'), storage_key)),
                None => Ok(storage_key.to_string()),
            };
        }

        // Opaque object key: needs a signed URL with a consumer-scoped TTL.
        let base = self.signed_url_base.as_ref().ok_or_else(|| {
            Error::Storage("signed URL base not configured for object keys".to_string())
        })?;
        Ok(format!(
            "{}/{}?ttl={}",
            base.trim_end_matches('/'),
            storage_key,
            consumer.ttl_secs()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> UrlOrPathResolver {
        UrlOrPathResolver::new(
            Some("https://cdn.example.com/".to_string()),
            Some("https://sign.example.com".to_string()),
        )
    }

    #[test]
    fn absolute_urls_pass_through() {
        let url = "https://elsewhere.net/pic.jpg";
        assert_eq!(
            resolver().resolve(url, Consumer::Model).unwrap(),
            url.to_string()
        );
    }

    #[test]
    fn local_paths_are_browser_only() {
        let r = resolver();
        assert_eq!(
            r.resolve("/uploads/x.png", Consumer::Browser).unwrap(),
            "https://cdn.example.com/uploads/x.png"
        );
        assert!(r.resolve("/uploads/x.png", Consumer::Model).is_err());
    }

    #[test]
    fn object_keys_get_consumer_scoped_ttl() {
        let r = resolver();
        let model = r.resolve("images/abc.jpg", Consumer::Model).unwrap();
        let browser = r.resolve("images/abc.jpg", Consumer::Browser).unwrap();
        assert_eq!(model, "https://sign.example.com/images/abc.jpg?ttl=300");
        assert_eq!(browser, "https://sign.example.com/images/abc.jpg?ttl=86400");
    }

    #[test]
    fn object_key_without_signing_base_errors() {
        let r = UrlOrPathResolver::default();
        assert!(r.resolve("images/abc.jpg", Consumer::Browser).is_err());
    }
}
