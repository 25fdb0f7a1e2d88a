use std::sync::Arc;

/// Shared-ownership vector used as the canonical currency type across the
/// index. Cloning is a cheap pointer bump, which matters because candidate
/// sets during construction and search pass vectors around constantly.
#[derive(Debug, Clone)]
pub struct Vector(pub Arc<[f32]>);

impl Vector {
    pub fn new(data: Vec<f32>) -> Self {
        Self(Arc::from(data))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<f32>> for Vector {
    fn from(v: Vec<f32>) -> Self {
        Self::new(v)
    }
}

impl AsRef<[f32]> for Vector {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}
