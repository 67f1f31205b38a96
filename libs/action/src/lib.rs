//! Unary action calls for netfault.
//!
//! The echo server and client only need one call shape: invoke a named
//! action with an opaque payload and optional call-scoped metadata, and get
//! back zero or more opaque results. [`ActionTransport`] is that shape;
//! [`HttpActionClient`] binds it to HTTP (see [`wire`]).

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;

mod error;
mod http;
pub mod wire;

pub use error::ActionError;
pub use http::HttpActionClient;

/// A named action with an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub kind: String,
    pub body: Bytes,
}

impl Action {
    pub fn new(kind: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            kind: kind.into(),
            body: body.into(),
        }
    }
}

/// One opaque result of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub body: Bytes,
}

impl ActionResult {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }
}

/// Call-scoped key/value metadata. Keys are stored lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallMetadata {
    entries: BTreeMap<String, String>,
}

impl CallMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for CallMetadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = CallMetadata::new();
        for (key, value) in iter {
            metadata.insert(key, value);
        }
        metadata
    }
}

/// Anything that can carry a unary action call.
#[async_trait]
pub trait ActionTransport: Send + Sync {
    async fn do_action(
        &self,
        action: Action,
        metadata: &CallMetadata,
    ) -> Result<Vec<ActionResult>, ActionError>;
}
