/// Exact nearest-neighbour index under squared Euclidean distance.
///
/// Vectors are scanned linearly; schema sizes stay in the thousands so an
/// approximate structure buys nothing.
#[derive(Debug, Clone)]
pub struct FlatL2Index {
    dims: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatL2Index {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            vectors: Vec::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Appends a vector. Returns false if its length differs from the index.
    pub fn add(&mut self, vector: Vec<f32>) -> bool {
        if vector.len() != self.dims {
            return false;
        }
        self.vectors.push(vector);
        true
    }

    /// The `k` closest vectors as `(position, distance)`, closest first.
    /// Equal distances keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, squared_l2(v, query)))
            .collect();

        // sort_by is stable, so ties stay in insertion order. NaN of either
        // sign sorts last.
        scored.sort_by(|a, b| match (a.1.is_nan(), b.1.is_nan()) {
            (false, false) => a.1.total_cmp(&b.1),
            (a_nan, b_nan) => a_nan.cmp(&b_nan),
        });
        scored.truncate(k.min(self.vectors.len()));
        scored
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
