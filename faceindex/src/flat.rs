use parking_lot::RwLock;

use crate::error::IndexError;
use crate::index::{
    Entry, FaceIndex, IndexConfig, Neighbor, by_distance_then_id, check_batch, check_embedding,
    check_entry,
};

/// FlatIndex is an exact FaceIndex using a linear scan.
///
/// O(n) per query. Serves as ground truth for [`crate::HnswIndex`].
pub struct FlatIndex {
    cfg: IndexConfig,
    entries: RwLock<Vec<(String, Vec<f32>)>>,
}

impl FlatIndex {
    pub fn new(cfg: IndexConfig) -> Result<Self, IndexError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            entries: RwLock::new(Vec::new()),
        })
    }
}

impl FaceIndex for FlatIndex {
    fn enroll(&self, label: &str, embedding: &[f32]) -> Result<u64, IndexError> {
        check_entry(label, embedding, self.cfg.dim)?;
        let mut entries = self.entries.write();
        entries.push((label.to_string(), embedding.to_vec()));
        Ok(entries.len() as u64 - 1)
    }

    fn enroll_batch(&self, labels: &[&str], embeddings: &[&[f32]]) -> Result<Vec<u64>, IndexError> {
        check_batch(labels, embeddings, self.cfg.dim)?;
        let mut entries = self.entries.write();
        let start = entries.len() as u64;
        for (label, emb) in labels.iter().zip(embeddings.iter()) {
            entries.push((label.to_string(), emb.to_vec()));
        }
        Ok((start..entries.len() as u64).collect())
    }

    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        check_embedding(embedding, self.cfg.dim)?;
        let entries = self.entries.read();
        if entries.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        let metric = self.cfg.metric;
        let mut results: Vec<(u64, f32)> = entries
            .iter()
            .enumerate()
            .map(|(i, (_, vec))| (i as u64, metric.distance(embedding, vec)))
            .collect();

        results.sort_by(by_distance_then_id);
        results.truncate(k);

        Ok(results
            .into_iter()
            .map(|(id, distance)| Neighbor {
                id,
                label: entries[id as usize].0.clone(),
                distance,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn config(&self) -> &IndexConfig {
        &self.cfg
    }

    fn entries(&self) -> Vec<Entry> {
        self.entries
            .read()
            .iter()
            .enumerate()
            .map(|(i, (label, embedding))| Entry {
                id: i as u64,
                label: label.clone(),
                embedding: embedding.clone(),
            })
            .collect()
    }
}
