use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};
use visage_metric::Metric;

use crate::error::IndexError;
use crate::index::{Backend, Entry, FaceIndex, IndexConfig, MAX_STRING_LEN};

const VIDX_MAGIC: [u8; 4] = [b'V', b'I', b'D', b'X'];
const VIDX_VERSION: u32 = 1;

/// Contents of a persisted index, independent of the backend that wrote it.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub config: IndexConfig,
    pub entries: Vec<Entry>,
}

impl Snapshot {
    /// Rebuilds an index by re-enrolling every entry in order, so entry ids
    /// survive the round trip.
    pub fn into_index(self, backend: &Backend) -> Result<Arc<dyn FaceIndex>, IndexError> {
        let index = backend.build(self.config)?;
        let labels: Vec<&str> = self.entries.iter().map(|e| e.label.as_str()).collect();
        let embeddings: Vec<&[f32]> = self.entries.iter().map(|e| e.embedding.as_slice()).collect();
        index.enroll_batch(&labels, &embeddings)?;
        debug!(
            "faceindex: rebuilt {} entries into {:?} backend",
            index.len(),
            backend
        );
        Ok(index)
    }
}

/// Save writes every entry of `index` in enrollment order.
///
/// ```text
/// [4B magic "VIDX"] [4B version=1]
/// [4B modelLen] [modelLen bytes model id]
/// [1B metric tag] [4B dim] [8B count]
/// For each entry:
///   [4B labelLen] [labelLen bytes label]
///   [dim x 4B float32 embedding]
/// ```
///
/// All multi-byte values are little-endian.
pub fn save(index: &dyn FaceIndex, w: &mut dyn Write) -> Result<(), IndexError> {
    let cfg = index.config();
    let entries = index.entries();
    let mut bw = BufWriter::new(w);
    let write_err = |e: std::io::Error| IndexError::Io(e.to_string());

    bw.write_all(&VIDX_MAGIC).map_err(write_err)?;
    bw.write_all(&VIDX_VERSION.to_le_bytes()).map_err(write_err)?;

    write_string(&mut bw, &cfg.model_id)?;
    bw.write_all(&[cfg.metric.tag()]).map_err(write_err)?;
    bw.write_all(&(cfg.dim as u32).to_le_bytes()).map_err(write_err)?;
    bw.write_all(&(entries.len() as u64).to_le_bytes()).map_err(write_err)?;

    for entry in &entries {
        write_string(&mut bw, &entry.label)?;
        for &v in &entry.embedding {
            bw.write_all(&v.to_le_bytes()).map_err(write_err)?;
        }
    }

    bw.flush().map_err(write_err)?;
    debug!(
        "faceindex: saved {} entries (model {:?}, dim {})",
        entries.len(),
        cfg.model_id,
        cfg.dim
    );
    Ok(())
}

/// Load reads a snapshot written by [`save`].
///
/// Fails with [`IndexError::ModelMismatch`] when the stored model id differs
/// from `active_model`: distances between embeddings of different models
/// are meaningless.
pub fn load(r: &mut dyn Read, active_model: &str) -> Result<Snapshot, IndexError> {
    let mut br = BufReader::new(r);

    let magic: [u8; 4] = read_array(&mut br)?;
    if magic != VIDX_MAGIC {
        return Err(IndexError::InvalidFormat(format!("invalid magic {magic:?}")));
    }
    let version = u32::from_le_bytes(read_array(&mut br)?);
    if version != VIDX_VERSION {
        return Err(IndexError::InvalidFormat(format!(
            "unsupported version {version} (want {VIDX_VERSION})"
        )));
    }

    let model_id = read_string(&mut br)?;
    if model_id != active_model {
        warn!(
            "faceindex: refusing index for model {:?}, active model is {:?}",
            model_id, active_model
        );
        return Err(IndexError::ModelMismatch {
            stored: model_id,
            active: active_model.to_string(),
        });
    }

    let [tag] = read_array::<1>(&mut br)?;
    let metric = Metric::from_tag(tag)
        .ok_or_else(|| IndexError::InvalidFormat(format!("unknown metric tag {tag}")))?;
    let dim = u32::from_le_bytes(read_array(&mut br)?) as usize;
    if dim == 0 {
        return Err(IndexError::InvalidFormat("invalid dimension 0".into()));
    }
    let count = u64::from_le_bytes(read_array(&mut br)?);

    let mut entries = Vec::new();
    for id in 0..count {
        let label = read_string(&mut br)?;
        let mut embedding = vec![0.0f32; dim];
        for v in &mut embedding {
            *v = f32::from_le_bytes(read_array(&mut br)?);
        }
        entries.push(Entry {
            id,
            label,
            embedding,
        });
    }

    debug!(
        "faceindex: loaded {} entries (model {:?}, dim {}, metric {})",
        entries.len(),
        model_id,
        dim,
        metric
    );
    Ok(Snapshot {
        config: IndexConfig {
            model_id,
            dim,
            metric,
        },
        entries,
    })
}

/// Save to `path`, replacing any existing file.
pub fn save_file(index: &dyn FaceIndex, path: impl AsRef<Path>) -> Result<(), IndexError> {
    let mut f = File::create(path.as_ref()).map_err(|e| IndexError::Io(e.to_string()))?;
    save(index, &mut f)
}

/// Load from `path`.
pub fn load_file(path: impl AsRef<Path>, active_model: &str) -> Result<Snapshot, IndexError> {
    let mut f = File::open(path.as_ref()).map_err(|e| IndexError::Io(e.to_string()))?;
    load(&mut f, active_model)
}

fn read_array<const N: usize>(r: &mut impl Read) -> Result<[u8; N], IndexError> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)
        .map_err(|e| IndexError::Io(e.to_string()))?;
    Ok(buf)
}

/// Refuses strings that [`read_string`] would reject.
fn write_string(w: &mut impl Write, s: &str) -> Result<(), IndexError> {
    if s.len() > MAX_STRING_LEN {
        return Err(IndexError::InvalidFormat(format!(
            "string length {} exceeds maximum {MAX_STRING_LEN}",
            s.len()
        )));
    }
    let write_err = |e: std::io::Error| IndexError::Io(e.to_string());
    w.write_all(&(s.len() as u32).to_le_bytes()).map_err(write_err)?;
    w.write_all(s.as_bytes()).map_err(write_err)
}

fn read_string(r: &mut impl Read) -> Result<String, IndexError> {
    let len = u32::from_le_bytes(read_array(r)?) as usize;
    if len > MAX_STRING_LEN {
        return Err(IndexError::InvalidFormat(format!(
            "string length {len} exceeds maximum {MAX_STRING_LEN}"
        )));
    }
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes)
        .map_err(|e| IndexError::Io(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| IndexError::InvalidFormat(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::HnswConfig;

    fn sample(backend: &Backend) -> Arc<dyn FaceIndex> {
        let idx = backend
            .build(IndexConfig {
                model_id: "facenet-v1".into(),
                dim: 3,
                metric: Metric::Cosine,
            })
            .unwrap();
        idx.enroll("alice", &[1.0, 0.0, 0.0]).unwrap();
        idx.enroll("bob", &[0.0, 1.0, 0.0]).unwrap();
        idx.enroll("alice", &[0.9, 0.1, 0.0]).unwrap();
        idx
    }

    #[test]
    fn save_load_preserves_entries() {
        let idx = sample(&Backend::Flat);
        let mut buf = Vec::new();
        save(idx.as_ref(), &mut buf).unwrap();

        let snap = load(&mut buf.as_slice(), "facenet-v1").unwrap();
        assert_eq!(snap.config, *idx.config());
        assert_eq!(snap.entries, idx.entries());
    }

    #[test]
    fn rebuild_into_other_backend() {
        let idx = sample(&Backend::Flat);
        let mut buf = Vec::new();
        save(idx.as_ref(), &mut buf).unwrap();

        let snap = load(&mut buf.as_slice(), "facenet-v1").unwrap();
        let rebuilt = snap
            .into_index(&Backend::Hnsw(HnswConfig::default()))
            .unwrap();
        assert_eq!(rebuilt.len(), 3);
        let top = rebuilt.query(&[0.9, 0.1, 0.0], 1).unwrap();
        assert_eq!(top[0].id, 2);
        assert_eq!(top[0].label, "alice");
    }

    #[test]
    fn model_mismatch_rejected() {
        let idx = sample(&Backend::Flat);
        let mut buf = Vec::new();
        save(idx.as_ref(), &mut buf).unwrap();

        match load(&mut buf.as_slice(), "arcface-v2") {
            Err(IndexError::ModelMismatch { stored, active }) => {
                assert_eq!(stored, "facenet-v1");
                assert_eq!(active, "arcface-v2");
            }
            other => panic!("expected ModelMismatch, got {other:?}"),
        }
    }

    #[test]
    fn bad_magic_and_truncation() {
        assert!(matches!(
            load(&mut &b"NOPE\x01\x00\x00\x00"[..], "m"),
            Err(IndexError::InvalidFormat(_))
        ));

        let idx = sample(&Backend::Flat);
        let mut buf = Vec::new();
        save(idx.as_ref(), &mut buf).unwrap();
        buf.truncate(buf.len() - 5);
        assert!(matches!(
            load(&mut buf.as_slice(), "facenet-v1"),
            Err(IndexError::Io(_))
        ));
    }

    #[test]
    fn longest_label_round_trips() {
        let idx = sample(&Backend::Flat);
        let edge = "z".repeat(MAX_STRING_LEN);
        idx.enroll(&edge, &[0.0, 0.0, 1.0]).unwrap();
        assert!(idx.enroll(&format!("{edge}z"), &[0.0, 0.0, 1.0]).is_err());

        let mut buf = Vec::new();
        save(idx.as_ref(), &mut buf).unwrap();
        let snap = load(&mut buf.as_slice(), "facenet-v1").unwrap();
        assert_eq!(snap.entries.len(), 4);
        assert_eq!(snap.entries[3].label, edge);
    }

    #[test]
    fn write_string_refuses_unreadable_length() {
        let mut buf = Vec::new();
        let long = "q".repeat(MAX_STRING_LEN + 1);
        assert!(matches!(
            write_string(&mut buf, &long),
            Err(IndexError::InvalidFormat(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_index_round_trip() {
        let idx = Backend::Flat
            .build(IndexConfig {
                model_id: "m".into(),
                dim: 4,
                metric: Metric::Euclidean,
            })
            .unwrap();
        let mut buf = Vec::new();
        save(idx.as_ref(), &mut buf).unwrap();
        let snap = load(&mut buf.as_slice(), "m").unwrap();
        assert!(snap.entries.is_empty());
        assert_eq!(snap.config.dim, 4);
    }

    #[test]
    fn file_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.vidx");
        let idx = sample(&Backend::Hnsw(HnswConfig::default()));
        save_file(idx.as_ref(), &path).unwrap();

        let snap = load_file(&path, "facenet-v1").unwrap();
        assert_eq!(snap.entries.len(), 3);
        assert!(load_file(dir.path().join("missing.vidx"), "facenet-v1").is_err());
    }
}
