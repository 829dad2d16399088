//! Short-lived store of passthrough payloads keyed by receipt reference.
//!
//! The agent only ever sees the reference. Content is redeemed at most once;
//! unredeemed payloads lapse at the TTL. There is deliberately no
//! enumeration API.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use trikhub_core::ids::ContentRef;
use trikhub_core::skill::PassthroughContent;

pub const DEFAULT_CONTENT_TTL: Duration = Duration::from_secs(10 * 60);

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Clone, Debug)]
struct StoredContent {
    trik_id: String,
    action: String,
    content: PassthroughContent,
    expires_at: i64,
}

/// Receipt returned alongside delivered content.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceipt {
    pub delivered: bool,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct DeliveredContent {
    pub content: PassthroughContent,
    pub receipt: DeliveryReceipt,
}

/// Non-content metadata about a stored reference.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentInfo {
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

pub struct ContentStore {
    entries: Mutex<HashMap<ContentRef, StoredContent>>,
    ttl: Duration,
}

impl ContentStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Store a payload and mint a fresh opaque reference for it.
    pub fn put(&self, trik_id: &str, action: &str, content: PassthroughContent) -> ContentRef {
        let mut entries = self.entries.lock();
        let now = now_ms();
        entries.retain(|_, stored| stored.expires_at > now);

        let content_ref = ContentRef::new();
        entries.insert(
            content_ref.clone(),
            StoredContent {
                trik_id: trik_id.to_string(),
                action: action.to_string(),
                content,
                expires_at: now + self.ttl.as_millis() as i64,
            },
        );
        content_ref
    }

    /// Redeem a reference: removes and returns the payload. `None` when the
    /// reference is unknown, already delivered, or expired.
    pub fn take(&self, content_ref: &ContentRef) -> Option<DeliveredContent> {
        let mut entries = self.entries.lock();
        let stored = entries.remove(content_ref)?;
        if stored.expires_at <= now_ms() {
            return None;
        }
        let receipt = DeliveryReceipt {
            delivered: true,
            content_type: stored.content.content_type.clone(),
            metadata: stored.content.metadata.clone(),
        };
        Some(DeliveredContent { content: stored.content, receipt })
    }

    /// Peek at non-content metadata without redeeming.
    pub fn info(&self, content_ref: &ContentRef) -> Option<ContentInfo> {
        let entries = self.entries.lock();
        let stored = entries.get(content_ref)?;
        if stored.expires_at <= now_ms() {
            return None;
        }
        Some(ContentInfo {
            content_type: stored.content.content_type.clone(),
            metadata: stored.content.metadata.clone(),
        })
    }

    pub fn contains(&self, content_ref: &ContentRef) -> bool {
        self.info(content_ref).is_some()
    }

    /// Owner of a stored reference (for diagnostics).
    pub fn owner(&self, content_ref: &ContentRef) -> Option<(String, String)> {
        let entries = self.entries.lock();
        entries
            .get(content_ref)
            .map(|stored| (stored.trik_id.clone(), stored.action.clone()))
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONTENT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(content: &str) -> PassthroughContent {
        PassthroughContent {
            content_type: "article".into(),
            content: content.into(),
            metadata: None,
        }
    }

    #[test]
    fn put_take_round_trip() {
        let store = ContentStore::default();
        let content_ref = store.put("@demo/t", "read", article("body"));
        let delivered = store.take(&content_ref).unwrap();
        assert_eq!(delivered.content.content, "body");
        assert!(delivered.receipt.delivered);
        assert_eq!(delivered.receipt.content_type, "article");
    }

    #[test]
    fn second_take_returns_none() {
        let store = ContentStore::default();
        let content_ref = store.put("@demo/t", "read", article("once"));
        assert!(store.take(&content_ref).is_some());
        assert!(store.take(&content_ref).is_none());
    }

    #[test]
    fn unknown_ref_is_none() {
        let store = ContentStore::default();
        assert!(store.take(&ContentRef::new()).is_none());
    }

    #[test]
    fn refs_are_fresh_and_opaque() {
        let store = ContentStore::default();
        let a = store.put("@demo/t", "read", article("a"));
        let b = store.put("@demo/t", "read", article("a"));
        assert_ne!(a, b);
    }

    #[test]
    fn ttl_expiry_hides_content() {
        let store = ContentStore::new(Duration::from_millis(1));
        let content_ref = store.put("@demo/t", "read", article("stale"));
        std::thread::sleep(Duration::from_millis(10));
        assert!(store.take(&content_ref).is_none());
        assert!(!store.contains(&content_ref));
    }

    #[test]
    fn info_does_not_redeem() {
        let store = ContentStore::default();
        let metadata = serde_json::json!({"source": "feed"});
        let content_ref = store.put(
            "@demo/t",
            "read",
            PassthroughContent {
                content_type: "article".into(),
                content: "secret body".into(),
                metadata: Some(metadata.clone()),
            },
        );
        let info = store.info(&content_ref).unwrap();
        assert_eq!(info.content_type, "article");
        assert_eq!(info.metadata.unwrap(), metadata);
        // Still redeemable afterwards.
        assert!(store.take(&content_ref).is_some());
    }

    #[test]
    fn owner_is_recorded() {
        let store = ContentStore::default();
        let content_ref = store.put("@demo/t", "read", article("x"));
        assert_eq!(
            store.owner(&content_ref).unwrap(),
            ("@demo/t".to_string(), "read".to_string())
        );
    }

    #[test]
    fn put_sweeps_expired_entries() {
        let store = ContentStore::new(Duration::from_millis(1));
        store.put("@demo/t", "read", article("a"));
        std::thread::sleep(Duration::from_millis(5));
        store.put("@demo/t", "read", article("b"));
        assert_eq!(store.len(), 1);
    }
}
