//! Image spec types: per-chapter image generation specifications.

use crate::SlotKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a reference asset (character sheet render, artifact render)
/// handed to the image provider.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
pub struct AssetId(pub String);

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Per-chapter image generation spec.
///
/// Invariant: `refs` keys exactly match the reference slots required by the
/// chapter's on-stage set (enforced by the image-spec validator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    /// 1-based chapter number
    pub chapter: u32,
    /// Exactly the characters shown, by display name
    pub on_stage_exact: Vec<String>,
    /// Reference assets per on-stage slot
    pub refs: BTreeMap<SlotKey, AssetId>,
    /// Props that must be visible
    pub props_visible: Vec<String>,
    /// Negative prompt tokens
    pub negatives: Vec<String>,
    /// The rendered prompt handed to the image provider
    pub final_prompt_text: String,
}

/// Machine-readable lint codes for image specs.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[allow(missing_docs)]
pub enum ImageSpecIssueCode {
    MissingCountPhrase,
    MissingFullBodyFraming,
    PortraitFraming,
    CameraFacing,
    ArtifactNotVisible,
    RefCountMismatch,
    UnexpectedRef,
    SchemaInvalid,
}

/// One lint finding against a single image spec.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageSpecIssue {
    /// Chapter the spec belongs to
    pub chapter: u32,
    /// Machine-readable code
    pub code: ImageSpecIssueCode,
    /// Human-readable explanation
    pub message: String,
}

/// A generated chapter illustration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    /// 1-based chapter number
    pub chapter: u32,
    /// MIME type of the image data
    pub mime: String,
    /// Binary image data
    pub data: Vec<u8>,
}
