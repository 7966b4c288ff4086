//! State fingerprints.
//!
//! A fingerprint is a BLAKE3 digest over a canonical, tag-prefixed encoding of
//! owned state. Equal state always yields equal fingerprints; encoding is
//! independent of map iteration order because every snapshot is a `BTreeMap`.

use std::fmt;

use blake3::Hasher;
use serde::{Deserialize, Serialize};

use crate::belief::SubsystemId;
use crate::descriptor::Descriptor;
use crate::target::{CapabilitySnapshot, StateSnapshot};

const DOMAIN_SUBSYSTEM: &[u8] = b"vantage/subsystem/v1";
const DOMAIN_OBSERVATION: &[u8] = b"vantage/observation/v1";
const DOMAIN_SNAPSHOT: &[u8] = b"vantage/snapshot/v1";

/// Fixed-size hash summarizing a piece of state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Wraps raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Fingerprint of a single subsystem's state. `None` (absent) hashes distinctly
    /// from every present descriptor, including `Descriptor::Null`.
    #[must_use]
    pub fn of_subsystem(id: &SubsystemId, descriptor: Option<&Descriptor>) -> Self {
        let mut enc = Encoder::new(DOMAIN_SUBSYSTEM);
        enc.text(id.as_str());
        enc.optional_descriptor(descriptor);
        enc.finish()
    }

    /// Behavioral fingerprint for one perspective's capture.
    #[must_use]
    pub fn of_observation(state: &StateSnapshot, capabilities: &CapabilitySnapshot) -> Self {
        let mut enc = Encoder::new(DOMAIN_OBSERVATION);
        enc.state(state);
        enc.capabilities(capabilities);
        enc.finish()
    }

    /// Fingerprint of a merged snapshot.
    #[must_use]
    pub fn of_snapshot(state: &StateSnapshot, capabilities: &CapabilitySnapshot) -> Self {
        let mut enc = Encoder::new(DOMAIN_SNAPSHOT);
        enc.state(state);
        enc.capabilities(capabilities);
        enc.finish()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

struct Encoder {
    hasher: Hasher,
}

impl Encoder {
    fn new(domain: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(&(domain.len() as u64).to_le_bytes());
        hasher.update(domain);
        Self { hasher }
    }

    fn len(&mut self, n: usize) {
        self.hasher.update(&(n as u64).to_le_bytes());
    }

    fn text(&mut self, s: &str) {
        self.len(s.len());
        self.hasher.update(s.as_bytes());
    }

    fn optional_descriptor(&mut self, descriptor: Option<&Descriptor>) {
        match descriptor {
            None => {
                self.hasher.update(&[0]);
            }
            Some(d) => {
                self.hasher.update(&[1]);
                self.descriptor(d);
            }
        }
    }

    fn descriptor(&mut self, descriptor: &Descriptor) {
        match descriptor {
            Descriptor::Bool(v) => {
                self.hasher.update(&[b'b', u8::from(*v)]);
            }
            Descriptor::Int(v) => {
                self.hasher.update(&[b'i']);
                self.hasher.update(&v.to_le_bytes());
            }
            Descriptor::Float(v) => {
                self.hasher.update(&[b'f']);
                self.hasher.update(&v.to_bits().to_le_bytes());
            }
            Descriptor::Text(v) => {
                self.hasher.update(&[b't']);
                self.text(v);
            }
            Descriptor::Structured(v) => {
                // serde_json's default map is ordered, so Display is canonical.
                self.hasher.update(&[b's']);
                self.text(&v.to_string());
            }
            Descriptor::Null => {
                self.hasher.update(&[b'n']);
            }
        }
    }

    fn state(&mut self, state: &StateSnapshot) {
        self.len(state.len());
        for (id, descriptor) in state {
            self.text(id.as_str());
            self.descriptor(descriptor);
        }
    }

    fn capabilities(&mut self, capabilities: &CapabilitySnapshot) {
        self.len(capabilities.len());
        for cap in capabilities {
            self.text(cap);
        }
    }

    fn finish(self) -> Fingerprint {
        Fingerprint(*self.hasher.finalize().as_bytes())
    }
}
