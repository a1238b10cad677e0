//! The artifact ledger.
//!
//! Artifacts live in a table's artifact index, keyed by the offending row's
//! key followed by the provenance hash and the kind tag. All artifacts of one
//! row therefore share a key prefix and can be found with a single prefix
//! scan.

use arbor_store::{Context, Hash, KeyRange, MapEditor, OrderedMap, Tuple};
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::artifact::kind::ArtifactKind;
use crate::error::{Error, Result};

/// Stored value of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct ViolationPayload {
    /// Opaque metadata describing the violation.
    pub info: Vec<u8>,
    /// Encoded value tuple of the offending row.
    pub value: Vec<u8>,
}

impl ViolationPayload {
    /// Serialize the payload to bytes using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a payload from bytes using rkyv.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// Key of an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKey {
    /// Key tuple of the offending row.
    pub row_key: Tuple,
    /// Hash identifying the merge source that produced the artifact.
    pub provenance: Hash,
    pub kind: ArtifactKind,
}

impl ArtifactKey {
    pub fn new(row_key: Tuple, provenance: Hash, kind: ArtifactKind) -> Self {
        Self {
            row_key,
            provenance,
            kind,
        }
    }

    /// Encode the key. The encoded row key is a prefix of the result.
    pub fn encode(&self) -> Vec<u8> {
        let mut tuple = self.row_key.clone();
        tuple.push(Some(self.provenance.as_bytes().to_vec()));
        tuple.push(Some(vec![self.kind.tag()]));
        tuple.encode()
    }

    /// Decode an encoded artifact key.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let tuple = Tuple::decode(bytes)?;
        let count = tuple.count();
        if count < 2 {
            return Err(Error::Deserialization(format!(
                "artifact key has {} fields",
                count
            )));
        }

        let provenance = tuple
            .field(count - 2)
            .and_then(Hash::from_slice)
            .ok_or_else(|| Error::Deserialization("artifact key has no provenance".into()))?;
        let kind = match tuple.field(count - 1) {
            Some([tag]) => ArtifactKind::from_tag(*tag),
            _ => None,
        }
        .ok_or_else(|| Error::Deserialization("artifact key has no valid kind".into()))?;

        Ok(Self {
            row_key: tuple.prefix(count - 2),
            provenance,
            kind,
        })
    }

    /// Range holding every artifact of `row_key`.
    pub fn row_range(row_key: &Tuple) -> KeyRange {
        KeyRange::prefix(&row_key.encode())
    }
}

/// Outcome of [`ArtifactLedger::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// No artifact of the kind existed for the row.
    Inserted,
    /// An artifact with the same metadata but a different provenance or row
    /// value was replaced.
    Replaced,
    /// An identical artifact already existed.
    AlreadyPresent,
}

/// Accumulates artifact writes against a table's artifact index.
///
/// A row carries at most one artifact of each kind. Recording a second
/// artifact of the same kind with different metadata fails with
/// [`Error::ArtifactCollision`].
pub struct ArtifactLedger {
    editor: MapEditor,
    recorded: usize,
}

impl ArtifactLedger {
    /// Start a ledger over `artifacts`.
    pub fn new(artifacts: &OrderedMap) -> Self {
        Self {
            editor: artifacts.editor(),
            recorded: 0,
        }
    }

    /// Record an artifact for the row keyed by `row_key`.
    pub fn record(
        &mut self,
        ctx: &Context,
        row_key: &Tuple,
        provenance: Hash,
        kind: ArtifactKind,
        info: &[u8],
        row_value: &[u8],
    ) -> Result<Recorded> {
        let key = ArtifactKey::new(row_key.clone(), provenance, kind);
        let payload = ViolationPayload {
            info: info.to_vec(),
            value: row_value.to_vec(),
        };

        let mut outcome = Recorded::Inserted;
        for (existing_key, existing_value) in self.editor.scan(ctx, &ArtifactKey::row_range(row_key))? {
            let existing = ArtifactKey::decode(&existing_key)?;
            if existing.kind != kind {
                continue;
            }

            let existing_payload = ViolationPayload::from_bytes(&existing_value)?;
            if existing_payload.info != payload.info {
                warn!(
                    key = ?row_key,
                    kind = %kind,
                    "Conflicting artifact for row"
                );
                return Err(Error::ArtifactCollision {
                    key: row_key.clone(),
                    existing_info: existing_payload.info,
                    new_info: payload.info,
                });
            }
            if existing == key && existing_payload == payload {
                return Ok(Recorded::AlreadyPresent);
            }

            self.editor.delete(existing_key);
            outcome = Recorded::Replaced;
        }

        self.editor.put(key.encode(), payload.to_bytes()?);
        self.recorded += 1;
        debug!(key = ?row_key, kind = %kind, provenance = %provenance, "Recorded artifact");
        Ok(outcome)
    }

    /// Number of artifacts written through this ledger.
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// Materialize the recorded artifacts as a new artifact index.
    pub fn flush(self, ctx: &Context) -> Result<OrderedMap> {
        Ok(self.editor.flush(ctx)?)
    }
}
