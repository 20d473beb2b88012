//! Legacy embedding retrieval: half-precision blobs, brute-force top-k.
//!
//! Each index root may carry:
//! - `vectors.f16`: row-major little-endian f16 values, `dim` per row
//! - `rowmap.json`: JSON array mapping row → document id
//! - `chunks.jsonl`: line *i* holds row *i* as `{"id", "text", "name"?}`
//!
//! Blobs and row maps are decoded once per (index identity, path) and
//! cached until the engine is re-initialized. Chunk text is read per
//! question, keeping only the requested lines.

use crate::manifest::{IndexMeta, Metric, join};
use half::f16;
use rulebook_core::error::{Error, RetrievalError};
use rulebook_core::reader::PackReader;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub const VECTORS_FILE: &str = "vectors.f16";
pub const ROW_MAP_FILE: &str = "rowmap.json";
pub const CHUNKS_FILE: &str = "chunks.jsonl";

/// Decoded vectors for one index.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    pub name: String,
    pub dim: usize,
    pub rows: usize,
    normalize_query: bool,
    data: Vec<f32>,
}

/// A search hit: row number and Euclidean distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: usize,
    pub distance: f32,
}

impl Eq for Neighbor {}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.row.cmp(&other.row))
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl VectorIndex {
    /// Decode a little-endian f16 blob against the index metadata.
    pub fn decode(name: &str, bytes: &[u8], meta: &IndexMeta) -> Result<Self, RetrievalError> {
        let malformed = |reason: String| RetrievalError::MalformedVectorData {
            index: name.into(),
            reason,
        };

        if bytes.len() % 2 != 0 {
            return Err(malformed(format!("odd blob length {}", bytes.len())));
        }
        let values = bytes.len() / 2;
        if values % meta.dim != 0 {
            return Err(malformed(format!(
                "{values} values is not a multiple of dim {}",
                meta.dim
            )));
        }
        let rows = values / meta.dim;
        if let Some(max_rows) = meta.max_rows {
            if rows > max_rows {
                return Err(RetrievalError::RowCapExceeded {
                    index: name.into(),
                    rows,
                    max_rows,
                });
            }
        }

        let data = bytes
            .chunks_exact(2)
            .map(|b| f16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect();

        Ok(Self {
            name: name.into(),
            dim: meta.dim,
            rows,
            normalize_query: meta.normalize || meta.metric == Metric::Cosine,
            data,
        })
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.dim..(row + 1) * self.dim]
    }

    /// The `k` nearest rows by Euclidean distance, ascending; ties by row.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, RetrievalError> {
        if query.len() != self.dim {
            return Err(RetrievalError::DimensionMismatch {
                index: self.name.clone(),
                expected: self.dim,
                found: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = if self.normalize_query {
            l2_normalize(query)
        } else {
            query.to_vec()
        };

        // Max-heap bounded at k: the worst kept neighbour sits on top.
        let mut heap: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(k + 1);
        for row in 0..self.rows {
            let distance = euclidean(self.row(row), &query);
            heap.push(Neighbor { row, distance });
            if heap.len() > k {
                heap.pop();
            }
        }

        Ok(heap.into_sorted_vec())
    }
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < 1e-12 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// Vectors plus their row → document id map.
#[derive(Debug)]
pub struct LegacyIndex {
    pub vectors: VectorIndex,
    pub row_map: Vec<String>,
    pub chunks_path: String,
}

impl LegacyIndex {
    /// Read and decode an index's vector files.
    pub async fn load(
        reader: &dyn PackReader,
        name: &str,
        root: &str,
        meta: &IndexMeta,
    ) -> Result<Self, Error> {
        let bytes = reader.read_bytes(&join(root, VECTORS_FILE)).await?;
        let vectors = VectorIndex::decode(name, &bytes, meta)?;

        let row_map_text = reader.read_text(&join(root, ROW_MAP_FILE)).await?;
        let row_map: Vec<String> =
            serde_json::from_str(&row_map_text).map_err(|e| RetrievalError::MalformedVectorData {
                index: name.into(),
                reason: format!("row map: {e}"),
            })?;

        if row_map.len() != vectors.rows {
            return Err(RetrievalError::MalformedVectorData {
                index: name.into(),
                reason: format!(
                    "row map has {} entries for {} vector rows",
                    row_map.len(),
                    vectors.rows
                ),
            }
            .into());
        }

        debug!(index = name, rows = vectors.rows, dim = vectors.dim, "Decoded vector index");
        Ok(Self {
            vectors,
            row_map,
            chunks_path: join(root, CHUNKS_FILE),
        })
    }

    pub fn document_id(&self, row: usize) -> Option<&str> {
        self.row_map.get(row).map(String::as_str)
    }
}

/// One line of `chunks.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Read only the requested rows of a line-oriented chunk file.
pub async fn fetch_chunks(
    reader: &dyn PackReader,
    index: &str,
    path: &str,
    rows: &[usize],
) -> Result<BTreeMap<usize, Chunk>, Error> {
    let wanted: BTreeSet<usize> = rows.iter().copied().collect();
    let text = reader.read_text(path).await?;

    let mut found = BTreeMap::new();
    for (row, line) in text.lines().enumerate() {
        if !wanted.contains(&row) {
            continue;
        }
        let chunk: Chunk =
            serde_json::from_str(line).map_err(|e| RetrievalError::MalformedVectorData {
                index: index.into(),
                reason: format!("chunk line {row}: {e}"),
            })?;
        found.insert(row, chunk);
        if found.len() == wanted.len() {
            break;
        }
    }
    Ok(found)
}

/// Cache key: which index, decoded from which file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub identity: String,
    pub path: String,
}

/// Decoded indices that persist across questions.
#[derive(Default)]
pub struct VectorCache {
    entries: Mutex<HashMap<CacheKey, Arc<LegacyIndex>>>,
}

impl VectorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached index or load it. The lock is held across the load
    /// so concurrent callers never decode the same blob twice.
    pub async fn get_or_load(
        &self,
        reader: &dyn PackReader,
        identity: &str,
        name: &str,
        root: &str,
        meta: &IndexMeta,
    ) -> Result<Arc<LegacyIndex>, Error> {
        let key = CacheKey {
            identity: identity.to_string(),
            path: join(root, VECTORS_FILE),
        };

        let mut entries = self.entries.lock().await;
        if let Some(index) = entries.get(&key) {
            return Ok(index.clone());
        }

        let index = Arc::new(LegacyIndex::load(reader, name, root, meta).await?);
        entries.insert(key, index.clone());
        Ok(index)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}
