use std::collections::{BinaryHeap, HashMap, HashSet};

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use visage_metric::Metric;

use crate::error::IndexError;
use crate::index::{
    Entry, FaceIndex, IndexConfig, Neighbor, by_distance_then_id, check_batch, check_embedding,
    check_entry,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// HnswConfig tunes graph construction and search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Max connections per node per layer (layer 0 allows 2*M).
    /// Default: 16.
    #[serde(default)]
    pub m: usize,
    /// Size of the dynamic candidate list during insertion.
    /// Default: 200.
    #[serde(default)]
    pub ef_construction: usize,
    /// Default size of the dynamic candidate list during search.
    /// Default: 50.
    #[serde(default)]
    pub ef_search: usize,
    /// Seed for level assignment. Same seed and insertion order build the
    /// same graph.
    #[serde(default)]
    pub seed: u64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            seed: 0,
        }
    }
}

impl HnswConfig {
    fn set_defaults(&mut self) {
        if self.m < 2 {
            self.m = 16;
        }
        if self.ef_construction == 0 {
            self.ef_construction = 200;
        }
        if self.ef_search == 0 {
            self.ef_search = 50;
        }
    }

    fn max_conns(&self, layer: usize) -> usize {
        if layer == 0 { self.m * 2 } else { self.m }
    }
}

// ---------------------------------------------------------------------------
// Internal priority-queue types
// ---------------------------------------------------------------------------

/// Min-heap entry: closest first, lower id first among equals.
#[derive(Clone, Copy)]
struct Near {
    id: u32,
    dist: f32,
}

impl Ord for Near {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .dist
            .total_cmp(&self.dist)
            .then(other.id.cmp(&self.id))
    }
}
impl PartialOrd for Near {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for Near {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}
impl Eq for Near {}

/// Max-heap entry: farthest first, higher id first among equals.
#[derive(Clone, Copy)]
struct Far {
    id: u32,
    dist: f32,
}

impl Ord for Far {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then(self.id.cmp(&other.id))
    }
}
impl PartialOrd for Far {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for Far {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}
impl Eq for Far {}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

struct Node {
    label: String,
    vector: Vec<f32>,
    friends: Vec<Vec<u32>>, // friends[layer] = neighbor node ids
}

impl Node {
    fn level(&self) -> usize {
        self.friends.len() - 1
    }
}

struct Graph {
    cfg: HnswConfig,
    metric: Metric,
    nodes: Vec<Node>,
    entry: Option<u32>,
    max_level: usize,
    level_mul: f64,
    rng: StdRng,
    /// Bit pattern of each stored vector -> node ids holding it. Guarantees
    /// exact-match queries find every copy regardless of graph recall.
    exact: HashMap<Vec<u32>, Vec<u32>>,
}

fn exact_key(v: &[f32]) -> Vec<u32> {
    // -0.0 and 0.0 compare equal, so they must hash equal.
    v.iter()
        .map(|&x| if x == 0.0 { 0 } else { x.to_bits() })
        .collect()
}

impl Graph {
    fn dist(&self, query: &[f32], id: u32) -> f32 {
        self.metric.distance(query, &self.nodes[id as usize].vector)
    }

    fn random_level(&mut self) -> usize {
        let r: f64 = self.rng.r#gen::<f64>().max(f64::MIN_POSITIVE);
        let level = (-r.ln() * self.level_mul) as usize;
        level.min(31)
    }

    /// Greedy walk towards `query` on one layer.
    fn greedy(&self, query: &[f32], mut cur: u32, layer: usize) -> u32 {
        let mut cur_dist = self.dist(query, cur);
        let mut changed = true;
        while changed {
            changed = false;
            let node = &self.nodes[cur as usize];
            if layer >= node.friends.len() {
                break;
            }
            for &f in &node.friends[layer] {
                let d = self.dist(query, f);
                if d < cur_dist || (d == cur_dist && f < cur) {
                    cur = f;
                    cur_dist = d;
                    changed = true;
                }
            }
        }
        cur
    }

    fn search_layer(&self, query: &[f32], entry_points: &[u32], ef: usize, layer: usize) -> Vec<u32> {
        let mut visited = HashSet::with_capacity(ef * 2);
        let mut candidates: BinaryHeap<Near> = BinaryHeap::new();
        let mut results: BinaryHeap<Far> = BinaryHeap::new();

        for &ep in entry_points {
            if visited.insert(ep) {
                let d = self.dist(query, ep);
                candidates.push(Near { id: ep, dist: d });
                results.push(Far { id: ep, dist: d });
            }
        }

        while let Some(closest) = candidates.pop() {
            if results.len() >= ef {
                if let Some(farthest) = results.peek() {
                    if closest.dist > farthest.dist {
                        break;
                    }
                }
            }

            let node = &self.nodes[closest.id as usize];
            if layer >= node.friends.len() {
                continue;
            }
            for &f in &node.friends[layer] {
                if !visited.insert(f) {
                    continue;
                }
                let d = self.dist(query, f);
                let should_add = results.len() < ef || results.peek().is_none_or(|far| d < far.dist);
                if should_add {
                    candidates.push(Near { id: f, dist: d });
                    results.push(Far { id: f, dist: d });
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_iter().map(|item| item.id).collect()
    }

    fn select_closest(&self, query: &[f32], candidates: &[u32], max_n: usize) -> Vec<u32> {
        let mut items: Vec<(u64, f32)> = candidates
            .iter()
            .map(|&c| (c as u64, self.dist(query, c)))
            .collect();
        items.sort_by(by_distance_then_id);
        items.truncate(max_n);
        items.into_iter().map(|(id, _)| id as u32).collect()
    }

    fn insert(&mut self, label: &str, vector: &[f32]) -> u64 {
        let idx = self.nodes.len() as u32;
        let level = self.random_level();
        self.nodes.push(Node {
            label: label.to_string(),
            vector: vector.to_vec(),
            friends: vec![Vec::new(); level + 1],
        });
        self.exact.entry(exact_key(vector)).or_default().push(idx);

        let Some(entry) = self.entry else {
            self.entry = Some(idx);
            self.max_level = level;
            return idx as u64;
        };

        // Phase 1: greedy descent from the top layer to level+1.
        let mut cur = entry;
        for layer in (level + 1..=self.max_level).rev() {
            cur = self.greedy(vector, cur, layer);
        }

        // Phase 2: beam search and connect on every shared layer.
        let mut ep = vec![cur];
        for layer in (0..=level.min(self.max_level)).rev() {
            let candidates = self.search_layer(vector, &ep, self.cfg.ef_construction, layer);
            let max_c = self.cfg.max_conns(layer);
            let neighbors = self.select_closest(vector, &candidates, max_c);
            self.nodes[idx as usize].friends[layer] = neighbors.clone();

            for &n in &neighbors {
                self.nodes[n as usize].friends[layer].push(idx);
                if self.nodes[n as usize].friends[layer].len() > max_c {
                    let nn_vec = self.nodes[n as usize].vector.clone();
                    let nn_friends = self.nodes[n as usize].friends[layer].clone();
                    let pruned = self.select_closest(&nn_vec, &nn_friends, max_c);
                    self.nodes[n as usize].friends[layer] = pruned;
                }
            }

            ep = candidates;
        }

        if level > self.max_level {
            self.entry = Some(idx);
            self.max_level = level;
        }
        idx as u64
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(u64, f32)> {
        let Some(entry) = self.entry else {
            return Vec::new();
        };
        let ef = self.cfg.ef_search.max(k);

        let mut cur = entry;
        for layer in (1..=self.max_level).rev() {
            cur = self.greedy(query, cur, layer);
        }
        let mut ids = self.search_layer(query, &[cur], ef, 0);

        if let Some(copies) = self.exact.get(&exact_key(query)) {
            ids.extend(copies.iter().copied());
            ids.sort_unstable();
            ids.dedup();
        }

        let mut results: Vec<(u64, f32)> = ids
            .into_iter()
            .map(|id| (id as u64, self.dist(query, id)))
            .collect();
        results.sort_by(by_distance_then_id);
        results.truncate(k);
        results
    }
}

// ---------------------------------------------------------------------------
// HnswIndex
// ---------------------------------------------------------------------------

/// HnswIndex is a Hierarchical Navigable Small World graph implementing
/// [`FaceIndex`].
///
/// Insertion is incremental: each enrollment links one node into the graph
/// under the write lock; nothing is ever rebuilt.
pub struct HnswIndex {
    cfg: IndexConfig,
    graph: RwLock<Graph>,
}

impl HnswIndex {
    /// Create an empty index.
    pub fn new(cfg: IndexConfig, mut hnsw: HnswConfig) -> Result<Self, IndexError> {
        cfg.validate()?;
        hnsw.set_defaults();
        let level_mul = 1.0 / (hnsw.m as f64).ln();
        let rng = StdRng::seed_from_u64(hnsw.seed);
        let metric = cfg.metric;
        Ok(Self {
            cfg,
            graph: RwLock::new(Graph {
                cfg: hnsw,
                metric,
                nodes: Vec::new(),
                entry: None,
                max_level: 0,
                level_mul,
                rng,
                exact: HashMap::new(),
            }),
        })
    }

    /// Adjust the search-time candidate list size.
    pub fn set_ef_search(&self, ef: usize) {
        self.graph.write().cfg.ef_search = ef.max(1);
    }

    pub fn hnsw_config(&self) -> HnswConfig {
        self.graph.read().cfg.clone()
    }
}

impl FaceIndex for HnswIndex {
    fn enroll(&self, label: &str, embedding: &[f32]) -> Result<u64, IndexError> {
        check_entry(label, embedding, self.cfg.dim)?;
        Ok(self.graph.write().insert(label, embedding))
    }

    fn enroll_batch(&self, labels: &[&str], embeddings: &[&[f32]]) -> Result<Vec<u64>, IndexError> {
        check_batch(labels, embeddings, self.cfg.dim)?;
        let mut graph = self.graph.write();
        Ok(labels
            .iter()
            .zip(embeddings.iter())
            .map(|(label, emb)| graph.insert(label, emb))
            .collect())
    }

    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        check_embedding(embedding, self.cfg.dim)?;
        if k == 0 {
            return Ok(vec![]);
        }
        let graph = self.graph.read();
        Ok(graph
            .search(embedding, k)
            .into_iter()
            .map(|(id, distance)| Neighbor {
                id,
                label: graph.nodes[id as usize].label.clone(),
                distance,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.graph.read().nodes.len()
    }

    fn config(&self) -> &IndexConfig {
        &self.cfg
    }

    fn entries(&self) -> Vec<Entry> {
        self.graph
            .read()
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| Entry {
                id: i as u64,
                label: n.label.clone(),
                embedding: n.vector.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MAX_STRING_LEN;

    fn new_test_hnsw(dim: usize) -> HnswIndex {
        HnswIndex::new(
            IndexConfig {
                model_id: "test".into(),
                dim,
                metric: Metric::Euclidean,
            },
            HnswConfig {
                m: 8,
                ef_construction: 64,
                ef_search: 32,
                seed: 1,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_enroll_and_query() {
        let h = new_test_hnsw(4);
        h.enroll("a", &[1.0, 0.0, 0.0, 0.0]).unwrap();
        h.enroll("b", &[0.0, 1.0, 0.0, 0.0]).unwrap();
        h.enroll("c", &[0.9, 0.1, 0.0, 0.0]).unwrap();

        let matches = h.query(&[1.0, 0.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].label, "a");
        assert_eq!(matches[1].label, "c");
    }

    #[test]
    fn test_enroll_batch() {
        let h = new_test_hnsw(3);
        let ids = h
            .enroll_batch(
                &["a", "b", "c"],
                &[&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0], &[0.0, 0.0, 1.0]],
            )
            .unwrap();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(h.len(), 3);

        let matches = h.query(&[1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(matches[0].label, "a");
    }

    #[test]
    fn test_batch_length_mismatch() {
        let h = new_test_hnsw(3);
        assert!(h.enroll_batch(&["a", "b"], &[&[1.0, 0.0, 0.0]]).is_err());
        assert!(h.is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let h = new_test_hnsw(4);
        assert!(h.enroll("a", &[1.0, 0.0, 0.0]).is_err());
        h.enroll("b", &[1.0, 0.0, 0.0, 0.0]).unwrap();
        assert!(h.query(&[1.0, 0.0], 1).is_err());
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn test_long_label_rejected() {
        let h = new_test_hnsw(3);
        let long = "y".repeat(MAX_STRING_LEN + 1);
        assert!(h.enroll(&long, &[1.0, 0.0, 0.0]).is_err());
        assert!(
            h.enroll_batch(&[long.as_str()], &[&[1.0, 0.0, 0.0]])
                .is_err()
        );
        assert!(h.is_empty());
        assert!(h.query(&[1.0, 0.0, 0.0], 1).unwrap().is_empty());
    }

    #[test]
    fn test_duplicates_kept() {
        let h = new_test_hnsw(3);
        h.enroll("x", &[0.0, 0.0, 1.0]).unwrap();
        h.enroll("a", &[1.0, 0.0, 0.0]).unwrap();
        h.enroll("a", &[1.0, 0.0, 0.0]).unwrap();

        assert_eq!(h.len(), 3);
        let matches = h.query(&[1.0, 0.0, 0.0], 2).unwrap();
        let ids: Vec<u64> = matches.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(matches.iter().all(|m| m.distance == 0.0));
    }

    #[test]
    fn test_query_empty() {
        let h = new_test_hnsw(3);
        assert!(h.query(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_query_top_k_zero() {
        let h = new_test_hnsw(3);
        h.enroll("a", &[1.0, 0.0, 0.0]).unwrap();
        assert!(h.query(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_single_node() {
        let h = new_test_hnsw(3);
        h.enroll("only", &[0.5, 0.5, 0.5]).unwrap();
        let matches = h.query(&[1.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].label, "only");
    }

    #[test]
    fn test_zero_dim_rejected() {
        let res = HnswIndex::new(
            IndexConfig {
                model_id: "test".into(),
                dim: 0,
                metric: Metric::Euclidean,
            },
            HnswConfig::default(),
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_defaults_fill_zero_fields() {
        let h = HnswIndex::new(
            IndexConfig {
                model_id: "test".into(),
                dim: 2,
                metric: Metric::Euclidean,
            },
            HnswConfig {
                m: 0,
                ef_construction: 0,
                ef_search: 0,
                seed: 0,
            },
        )
        .unwrap();
        assert_eq!(h.hnsw_config(), HnswConfig::default());
        h.set_ef_search(0);
        assert_eq!(h.hnsw_config().ef_search, 1);
    }

    #[test]
    fn test_same_seed_same_graph() {
        let a = new_test_hnsw(8);
        let b = new_test_hnsw(8);
        let mut rng = StdRng::seed_from_u64(3);
        for i in 0..200 {
            let v: Vec<f32> = (0..8).map(|_| rng.gen_range(-1.0..1.0)).collect();
            a.enroll(&format!("p{i}"), &v).unwrap();
            b.enroll(&format!("p{i}"), &v).unwrap();
        }
        let q = vec![0.1f32; 8];
        assert_eq!(a.query(&q, 10).unwrap(), b.query(&q, 10).unwrap());
    }

    #[test]
    fn test_recall() {
        let dim = 32;
        let n = 2000;
        let queries = 50;
        let top_k = 10;

        let mut rng = StdRng::seed_from_u64(42);
        let h = HnswIndex::new(
            IndexConfig {
                model_id: "test".into(),
                dim,
                metric: Metric::Euclidean,
            },
            HnswConfig {
                m: 16,
                ef_construction: 128,
                ef_search: 64,
                seed: 7,
            },
        )
        .unwrap();

        let mut vecs = Vec::with_capacity(n);
        for i in 0..n {
            let v = rand_unit_vec(&mut rng, dim);
            h.enroll(&format!("v-{i}"), &v).unwrap();
            vecs.push(v);
        }

        let mut total_recall = 0.0;
        for _ in 0..queries {
            let query = rand_unit_vec(&mut rng, dim);

            // Brute-force ground truth.
            let mut truth: Vec<(u64, f32)> = vecs
                .iter()
                .enumerate()
                .map(|(i, v)| (i as u64, Metric::Euclidean.distance(&query, v)))
                .collect();
            truth.sort_by(by_distance_then_id);
            let truth_set: HashSet<u64> = truth.iter().take(top_k).map(|(i, _)| *i).collect();

            let matches = h.query(&query, top_k).unwrap();
            let hits = matches.iter().filter(|m| truth_set.contains(&m.id)).count();
            total_recall += hits as f64 / top_k as f64;
        }

        let avg_recall = total_recall / queries as f64;
        assert!(
            avg_recall >= 0.80,
            "recall {avg_recall:.3} is below 0.80 threshold"
        );
    }

    fn rand_unit_vec(rng: &mut impl Rng, dim: usize) -> Vec<f32> {
        let v: Vec<f32> = (0..dim).map(|_| rng.r#gen::<f32>() - 0.5).collect();
        let norm: f64 = v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
        if norm > 0.0 {
            v.into_iter().map(|x| x / norm as f32).collect()
        } else {
            v
        }
    }
}
