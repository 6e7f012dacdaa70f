use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeKey(Arc<str>);

impl NodeKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives node keys from the structural path of a node: parent key, sibling
/// index and token type. Owned by one tokenizer, never shared globally.
#[derive(Clone, Debug)]
pub struct KeyHasher {
    seed: u64,
}

impl Default for KeyHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyHasher {
    pub fn new() -> Self {
        Self {
            seed: OFFSET_BASIS,
        }
    }

    pub fn with_namespace(namespace: &str) -> Self {
        Self {
            seed: fnv1a64_from(OFFSET_BASIS, namespace.as_bytes()),
        }
    }

    pub fn root_key(&self) -> NodeKey {
        NodeKey(format!("root-{:016x}", self.seed).into())
    }

    pub fn child_key(&self, parent: &NodeKey, index: usize, kind: &str) -> NodeKey {
        let mut hash = fnv1a64_from(self.seed, parent.as_str().as_bytes());
        hash = fnv1a64_from(hash, &(index as u64).to_le_bytes());
        hash = fnv1a64_from(hash, kind.as_bytes());
        NodeKey(format!("{kind}-{hash:016x}").into())
    }
}

const OFFSET_BASIS: u64 = 0xcbf29ce484222325;

pub fn fnv1a64(bytes: &[u8]) -> u64 {
    fnv1a64_from(OFFSET_BASIS, bytes)
}

fn fnv1a64_from(mut hash: u64, bytes: &[u8]) -> u64 {
    const PRIME: u64 = 0x00000100000001b3;

    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_key_is_stable_for_same_path() {
        let hasher = KeyHasher::new();
        let root = hasher.root_key();
        let keys = (0..3)
            .map(|_| hasher.child_key(&root, 2, "paragraph"))
            .collect::<Vec<_>>();
        assert!(keys.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn child_key_differs_by_index_and_kind() {
        let hasher = KeyHasher::new();
        let root = hasher.root_key();
        let first = hasher.child_key(&root, 0, "paragraph");
        assert_ne!(first, hasher.child_key(&root, 1, "paragraph"));
        assert_ne!(first, hasher.child_key(&root, 0, "heading"));
        assert!(first.as_str().starts_with("paragraph-"));
    }

    #[test]
    fn namespaces_do_not_collide() {
        let left = KeyHasher::with_namespace("left");
        let right = KeyHasher::with_namespace("right");
        assert_ne!(left.root_key(), right.root_key());
    }

    #[test]
    fn fnv_matches_reference_vector() {
        assert_eq!(fnv1a64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a64(b"a"), 0xaf63dc4c8601ec8c);
    }
}
