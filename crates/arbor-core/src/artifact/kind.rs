//! Artifact kinds.

use std::fmt;

/// The kind of a merge artifact.
///
/// Tags are stored in artifact keys and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    /// A cell-level merge conflict.
    Conflict,
    /// A foreign key violation.
    ForeignKeyViolation,
    /// A unique index violation.
    UniqueKeyViolation,
    /// A check constraint violation.
    CheckConstraintViolation,
    /// A NOT NULL violation.
    NotNullViolation,
}

impl ArtifactKind {
    /// Stable tag byte.
    pub fn tag(&self) -> u8 {
        match self {
            ArtifactKind::Conflict => 1,
            ArtifactKind::ForeignKeyViolation => 2,
            ArtifactKind::UniqueKeyViolation => 3,
            ArtifactKind::CheckConstraintViolation => 4,
            ArtifactKind::NotNullViolation => 5,
        }
    }

    /// Kind for a tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ArtifactKind::Conflict),
            2 => Some(ArtifactKind::ForeignKeyViolation),
            3 => Some(ArtifactKind::UniqueKeyViolation),
            4 => Some(ArtifactKind::CheckConstraintViolation),
            5 => Some(ArtifactKind::NotNullViolation),
            _ => None,
        }
    }

    /// Check if the kind records a constraint violation.
    pub fn is_constraint_violation(&self) -> bool {
        !matches!(self, ArtifactKind::Conflict)
    }

    /// User-facing name of the violation type.
    pub fn name(&self) -> &'static str {
        match self {
            ArtifactKind::Conflict => "conflict",
            ArtifactKind::ForeignKeyViolation => "foreign key",
            ArtifactKind::UniqueKeyViolation => "unique index",
            ArtifactKind::CheckConstraintViolation => "check constraint",
            ArtifactKind::NotNullViolation => "not null",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
