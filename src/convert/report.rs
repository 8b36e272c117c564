//! Loss reporting
//!
//! Lists every field that does not survive a round trip between a spoke and
//! the hub, so lossy mappings are visible instead of silent.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::registry::{GroupVersionKind, Section};

/// Outcome of mapping one spoke against the hub
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossReport {
    /// Fields that lose data in at least one direction
    pub losses: Vec<FieldLoss>,
}

/// One field that is not carried across
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLoss {
    pub kind: LossKind,
    pub section: Section,
    /// Wire tag of the affected field
    pub field: String,
    /// Human-readable description
    pub description: String,
}

/// Type of loss
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    /// Spoke field with no hub counterpart: dropped on the way to storage
    SpokeOnly,
    /// Hub field with no spoke counterpart: invisible to clients of this spoke
    HubOnly,
    /// Required destination field left at its zero value
    ZeroFilled,
    /// Section present on one side only
    SectionMissing,
}

impl LossKind {
    /// Whether stored data can be lost through this spoke
    pub fn is_lossy(&self) -> bool {
        matches!(self, LossKind::SpokeOnly | LossKind::SectionMissing)
    }
}

impl LossReport {
    pub fn push(&mut self, kind: LossKind, section: Section, field: impl Into<String>, description: impl Into<String>) {
        self.losses.push(FieldLoss {
            kind,
            section,
            field: field.into(),
            description: description.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.losses.is_empty()
    }

    /// Whether a spoke value can lose data on a round trip through storage
    pub fn is_lossy(&self) -> bool {
        self.losses.iter().any(|l| l.kind.is_lossy())
    }

    pub fn count(&self, kind: LossKind) -> usize {
        self.losses.iter().filter(|l| l.kind == kind).count()
    }

    /// Wire tags of a given loss kind in one section
    pub fn fields(&self, kind: LossKind, section: Section) -> Vec<&str> {
        self.losses
            .iter()
            .filter(|l| l.kind == kind && l.section == section)
            .map(|l| l.field.as_str())
            .collect()
    }

    pub fn summary(&self) -> String {
        if self.losses.is_empty() {
            return "lossless".to_string();
        }
        format!(
            "{} spoke-only, {} hub-only, {} zero-filled",
            self.count(LossKind::SpokeOnly) + self.count(LossKind::SectionMissing),
            self.count(LossKind::HubOnly),
            self.count(LossKind::ZeroFilled)
        )
    }

    /// Emit a warning per lossy entry
    pub fn log(&self, gvk: &GroupVersionKind) {
        for loss in self.losses.iter().filter(|l| l.kind.is_lossy()) {
            warn!(gvk = %gvk, section = %loss.section, field = %loss.field, "{}", loss.description);
        }
    }
}
