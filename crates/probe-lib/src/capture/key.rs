//! Request keys: storage prefix and listing handle of one capture

use crate::models::{
    CaptureTarget, RenderKind, SampleKind, StoredArtifactEntry, ADDRESS_NAMESPACE,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `<cluster-or-addr>/<namespace-or-custom>/<pod-or-addr>_<millis>`
///
/// Uniqueness rests on the millisecond timestamp; two captures of the same
/// subject within one millisecond share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(scope: &str, group: &str, subject: &str, submitted_at_millis: i64) -> Self {
        Self(format!("{scope}/{group}/{subject}_{submitted_at_millis}"))
    }

    /// Derive the key for a validated target submitted at the given time
    pub fn for_target(target: &CaptureTarget, submitted_at_millis: i64) -> Self {
        match target {
            CaptureTarget::Pod {
                cluster_name,
                namespace,
                pod_name,
                ..
            } => Self::new(cluster_name, namespace, pod_name, submitted_at_millis),
            CaptureTarget::Address { cluster_name, addr } => {
                let subject = strip_scheme(addr);
                let scope = if cluster_name.is_empty() {
                    subject
                } else {
                    cluster_name.as_str()
                };
                Self::new(scope, ADDRESS_NAMESPACE, subject, submitted_at_millis)
            }
        }
    }

    /// Wrap an existing key string, e.g. one received in a graph query
    pub fn from_string(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key of the raw dump for `kind`
    pub fn raw_artifact(&self, kind: SampleKind) -> String {
        format!("{}/{}.bin", self.0, kind)
    }

    /// Storage key of the rendered image for `kind`
    pub fn image_artifact(&self, kind: SampleKind, render: RenderKind) -> String {
        format!("{}/{}_{}.svg", self.0, kind, render.file_suffix())
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RequestKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Addresses may carry a scheme; keys never do
fn strip_scheme(addr: &str) -> &str {
    let addr = addr
        .strip_prefix("http://")
        .or_else(|| addr.strip_prefix("https://"))
        .unwrap_or(addr);
    addr.trim_end_matches('/')
}

/// Recover a listing entry from a child name `<subject>_<millis>` under `prefix`
///
/// The subject may itself contain `_`; only the last one separates the
/// timestamp.
pub fn parse_listing_entry(prefix: &str, name: &str) -> Option<StoredArtifactEntry> {
    let (subject, millis) = name.rsplit_once('_')?;
    if subject.is_empty() {
        return None;
    }
    let millis: i64 = millis.parse().ok()?;

    let prefix = prefix.trim_matches('/');
    let key = if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    };

    Some(StoredArtifactEntry {
        key,
        subject_name: subject.to_string(),
        ctime: millis / 1000,
    })
}
