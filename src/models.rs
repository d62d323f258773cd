//! Data models for scraped headlines and the documents persisted from them.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ObjectId`]: Store-assigned document identity
//! - [`Headline`]: A raw `{title, link}` pair as extracted from the front page
//! - [`Article`]: A persisted headline, optionally pointing at a [`Note`]
//! - [`Note`]: A schema-less document attached to an article
//! - [`PopulatedArticle`]: An article whose note reference has been resolved
//!
//! Documents serialize their identity under `_id`, the shape document-store
//! clients expect.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Store-assigned identity of a document.
///
/// Twelve bytes rendered as 24 lowercase hex characters. The first eight bytes
/// hold a store-wide monotonic counter, the last four the big-endian creation
/// time in seconds. Byte order follows the counter alone, i.e. the order in
/// which ids were allocated, whatever the wall clock does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

/// Returned when a string is not a valid 24-character hex [`ObjectId`].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid object id: {0:?}")]
pub struct ParseObjectIdError(pub String);

impl ObjectId {
    /// Build an id from a creation timestamp and a monotonic counter.
    pub fn from_parts(seconds: u32, counter: u64) -> Self {
        let mut bytes = [0u8; 12];
        bytes[..8].copy_from_slice(&counter.to_be_bytes());
        bytes[8..].copy_from_slice(&seconds.to_be_bytes());
        Self(bytes)
    }

    /// The raw key bytes used by the store.
    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for ObjectId {
    type Err = ParseObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 24 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseObjectIdError(s.to_string()));
        }
        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| ParseObjectIdError(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A headline as extracted from the front page, before it is persisted.
///
/// Missing anchors produce empty strings rather than errors.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Headline {
    /// Visible text of the heading's anchor.
    pub title: String,
    /// The anchor's `href`, stored verbatim (often relative).
    pub link: String,
}

/// A persisted headline.
///
/// Articles are never deleted and are only mutated to replace their note
/// reference. Re-scraping the same page creates duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Store-assigned identity.
    #[serde(rename = "_id")]
    pub id: ObjectId,
    /// Headline text.
    pub title: String,
    /// Headline link.
    pub link: String,
    /// The most recently attached note, if any. Not checked for existence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<ObjectId>,
}

/// A free-form note.
///
/// Every request-supplied field is kept verbatim next to the store-assigned
/// `_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Store-assigned identity.
    #[serde(rename = "_id")]
    pub id: ObjectId,
    /// Arbitrary request-supplied fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// An [`Article`] with its note reference resolved.
///
/// `note` is omitted when the article has no reference, holds the full note
/// when the reference resolves, and serializes as `null` when it dangles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulatedArticle {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<Option<Note>>,
}
