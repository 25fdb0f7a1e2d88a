use crate::error::Error;
use crate::vector::Vector;

/// External collaborator: given an id, yields the vector for that id.
/// A pure function from the engine's perspective — the engine caches
/// nothing of its own in front of it, and any caching an integration wants
/// belongs behind this trait, invisible to the graph logic.
pub trait VectorProvider: Send + Sync {
    fn fetch(&self, id: u64) -> Result<Vector, Error>;
}

/// An in-memory provider over a fixed table, used by tests and by any
/// caller that has already materialized every vector.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorProvider {
    vectors: std::collections::HashMap<u64, Vector>,
}

impl InMemoryVectorProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u64, vector: Vector) {
        self.vectors.insert(id, vector);
    }
}

impl FromIterator<(u64, Vector)> for InMemoryVectorProvider {
    fn from_iter<T: IntoIterator<Item = (u64, Vector)>>(iter: T) -> Self {
        Self {
            vectors: iter.into_iter().collect(),
        }
    }
}

impl VectorProvider for InMemoryVectorProvider {
    fn fetch(&self, id: u64) -> Result<Vector, Error> {
        self.vectors.get(&id).cloned().ok_or(Error::VectorUnavailable {
            id,
            reason: "id not present in provider table".to_string(),
        })
    }
}
