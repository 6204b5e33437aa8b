//! Task fingerprints used as entity tags.
//!
//! A fingerprint is a SHA-256 digest over every visible field of a task,
//! fed to the hasher in a fixed order with length prefixes so that no two
//! distinct states share an encoding. It is rendered as a quoted strong
//! entity tag (`"<hex>"`) and compared byte for byte against `If-Match`.

use sha2::{Digest, Sha256};

use super::task::Task;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of the task's current state.
    #[must_use]
    pub fn of(task: &Task) -> Self {
        let mut hasher = Sha256::new();
        update_field(&mut hasher, task.id.value().to_be_bytes().as_slice());
        update_field(&mut hasher, task.created_at.to_rfc3339().as_bytes());
        update_field(&mut hasher, task.updated_at.to_rfc3339().as_bytes());
        update_field(&mut hasher, task.owner.id.value().to_be_bytes().as_slice());
        update_field(&mut hasher, task.owner.username.as_bytes());
        update_field(&mut hasher, task.name.as_bytes());
        match &task.description {
            Some(description) => {
                hasher.update([1u8]);
                update_field(&mut hasher, description.as_bytes());
            }
            None => hasher.update([0u8]),
        }
        update_field(&mut hasher, task.progression.to_be_bytes().as_slice());

        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
        Self(format!("\"{hex}\""))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if `candidate` is exactly this fingerprint.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        self.0 == candidate
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0)
    }
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}
