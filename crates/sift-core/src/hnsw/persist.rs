//! Binary persistence for the HNSW graph.
//!
//! Little-endian throughout. Layout:
//!
//! ```text
//! [4]byte  magic = "SHNW"
//! u16      version = 1
//! u32      node_count
//! u32      entry_point
//! u8       max_layer
//! u16      m
//! u16      ef_construction
//! u16      ef_search
//! --- per node ---
//! u8       layer_count (= this node's top layer + 1)
//! u16      vec_len
//! f32      vec[vec_len]
//! --- per layer in node ---
//! u16      neighbor_count
//! u32      neighbor[neighbor_count]
//! ```
//!
//! Save is a full rewrite. Load rejects a wrong magic with `CorruptIndex`
//! and a wrong version with `UnsupportedVersion`.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{Graph, Node};
use crate::config::GRAPH_RNG_SEED;
use crate::error::GraphError;

const MAGIC: [u8; 4] = *b"SHNW";
const FORMAT_VERSION: u16 = 1;

impl Graph {
    /// Serializes the graph to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<(), GraphError> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);

        w.write_all(&MAGIC)?;
        write_u16(&mut w, FORMAT_VERSION)?;
        write_u32(&mut w, self.nodes.len() as u32)?;
        write_u32(&mut w, self.entry_point)?;
        write_u8(&mut w, self.max_layer as u8)?;
        write_u16(&mut w, self.m as u16)?;
        write_u16(&mut w, self.ef_construction as u16)?;
        write_u16(&mut w, self.ef_search as u16)?;

        for node in &self.nodes {
            write_u8(&mut w, node.neighbors.len() as u8)?;
            write_u16(&mut w, node.vec.len() as u16)?;
            for &v in &node.vec {
                write_f32(&mut w, v)?;
            }
            for layer in &node.neighbors {
                write_u16(&mut w, layer.len() as u16)?;
                for &nb in layer {
                    write_u32(&mut w, nb)?;
                }
            }
        }

        w.flush()?;
        Ok(())
    }

    /// Deserializes a graph previously written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, GraphError> {
        let file = File::open(path)?;
        let mut r = BufReader::new(file);

        let mut magic = [0u8; 4];
        read_exact(&mut r, &mut magic)?;
        if magic != MAGIC {
            return Err(GraphError::CorruptIndex(format!(
                "bad magic bytes in {}",
                path.display()
            )));
        }

        let version = read_u16(&mut r)?;
        if version != FORMAT_VERSION {
            return Err(GraphError::UnsupportedVersion {
                found: version,
                expected: FORMAT_VERSION,
            });
        }

        let node_count = read_u32(&mut r)? as usize;
        let entry_point = read_u32(&mut r)?;
        let max_layer = read_u8(&mut r)? as usize;
        let m = read_u16(&mut r)? as usize;
        let ef_construction = read_u16(&mut r)? as usize;
        let ef_search = read_u16(&mut r)? as usize;

        if node_count > 0 && entry_point as usize >= node_count {
            return Err(GraphError::CorruptIndex(format!(
                "entry point {entry_point} out of range for {node_count} nodes"
            )));
        }
        if m < 2 {
            return Err(GraphError::CorruptIndex(format!("invalid m = {m}")));
        }

        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let layer_count = read_u8(&mut r)? as usize;
            let vec_len = read_u16(&mut r)? as usize;
            let mut vec = Vec::with_capacity(vec_len);
            for _ in 0..vec_len {
                vec.push(read_f32(&mut r)?);
            }
            let mut neighbors = Vec::with_capacity(layer_count);
            for _ in 0..layer_count {
                let count = read_u16(&mut r)? as usize;
                let mut layer = Vec::with_capacity(count);
                for _ in 0..count {
                    let nb = read_u32(&mut r)?;
                    if nb as usize >= node_count {
                        return Err(GraphError::CorruptIndex(format!(
                            "neighbor id {nb} out of range for {node_count} nodes"
                        )));
                    }
                    layer.push(nb);
                }
                neighbors.push(layer);
            }
            nodes.push(Node { vec, neighbors });
        }

        Ok(Graph {
            nodes,
            entry_point,
            max_layer,
            m,
            ef_construction,
            ef_search,
            ml: 1.0 / (m as f64).ln(),
            rng: StdRng::seed_from_u64(GRAPH_RNG_SEED),
        })
    }
}

/// `read_exact` with short reads reported as corruption rather than raw I/O:
/// a truncated file is a bad file, not a failing disk.
fn read_exact<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<(), GraphError> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            GraphError::CorruptIndex("unexpected end of file".to_string())
        } else {
            GraphError::Io(e)
        }
    })
}

fn read_u8<R: Read>(r: &mut R) -> Result<u8, GraphError> {
    let mut buf = [0u8; 1];
    read_exact(r, &mut buf)?;
    Ok(buf[0])
}

fn read_u16<R: Read>(r: &mut R) -> Result<u16, GraphError> {
    let mut buf = [0u8; 2];
    read_exact(r, &mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32, GraphError> {
    let mut buf = [0u8; 4];
    read_exact(r, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f32<R: Read>(r: &mut R) -> Result<f32, GraphError> {
    let mut buf = [0u8; 4];
    read_exact(r, &mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

fn write_u16<W: Write>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_f32<W: Write>(w: &mut W, v: f32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::super::tests::random_unit_vec;
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;

    fn build_graph(n: usize, dim: usize, seed: u64) -> Graph {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut g = Graph::new(16, 200, 50);
        for _ in 0..n {
            g.insert(random_unit_vec(&mut rng, dim)).unwrap();
        }
        g
    }

    #[test]
    fn test_round_trip_preserves_results() {
        let g = build_graph(100, 64, 7);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.hnsw");

        g.save(&path).unwrap();
        let loaded = Graph::load(&path).unwrap();

        assert_eq!(loaded.len(), g.len());
        assert_eq!(loaded.entry_point, g.entry_point);
        assert_eq!(loaded.max_layer, g.max_layer);

        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..5 {
            let q = random_unit_vec(&mut rng, 64);
            let before: Vec<u32> = g.search(&q, 10).unwrap().iter().map(|h| h.id).collect();
            let after: Vec<u32> = loaded.search(&q, 10).unwrap().iter().map(|h| h.id).collect();
            assert_eq!(before, after, "loaded graph must answer identically");
        }
    }

    #[test]
    fn test_round_trip_empty_graph() {
        let g = Graph::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.hnsw");

        g.save(&path).unwrap();
        let loaded = Graph::load(&path).unwrap();
        assert_eq!(loaded.len(), 0);
        assert!(loaded.search(&[0.0; 4], 3).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.hnsw");
        fs::write(&path, b"XXXXsome trailing garbage").unwrap();

        let err = Graph::load(&path).unwrap_err();
        assert!(matches!(err, GraphError::CorruptIndex(_)), "got {err:?}");
    }

    #[test]
    fn test_rejects_unknown_version() {
        let g = build_graph(5, 8, 1);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v2.hnsw");
        g.save(&path).unwrap();

        // Bump the version field in place (offset 4, u16 LE).
        let mut bytes = fs::read(&path).unwrap();
        bytes[4] = 2;
        bytes[5] = 0;
        fs::write(&path, &bytes).unwrap();

        let err = Graph::load(&path).unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnsupportedVersion {
                found: 2,
                expected: 1
            }
        ));
    }

    #[test]
    fn test_rejects_truncated_file() {
        let g = build_graph(20, 16, 2);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trunc.hnsw");
        g.save(&path).unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        let err = Graph::load(&path).unwrap_err();
        assert!(matches!(err, GraphError::CorruptIndex(_)), "got {err:?}");
    }

    #[test]
    fn test_rejects_out_of_range_entry_point() {
        let g = build_graph(3, 4, 3);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ep.hnsw");
        g.save(&path).unwrap();

        // entry_point lives at offset 10 (u32 LE).
        let mut bytes = fs::read(&path).unwrap();
        bytes[10..14].copy_from_slice(&99u32.to_le_bytes());
        fs::write(&path, &bytes).unwrap();

        let err = Graph::load(&path).unwrap_err();
        assert!(matches!(err, GraphError::CorruptIndex(_)));
    }

    #[test]
    fn test_loaded_graph_accepts_inserts() {
        let g = build_graph(30, 16, 5);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grow.hnsw");
        g.save(&path).unwrap();

        let mut loaded = Graph::load(&path).unwrap();
        let mut rng = StdRng::seed_from_u64(6);
        let v = random_unit_vec(&mut rng, 16);
        let id = loaded.insert(v.clone()).unwrap();
        assert_eq!(id, 30);

        let hits = loaded.search(&v, 1).unwrap();
        assert_eq!(hits[0].id, 30);
    }
}
