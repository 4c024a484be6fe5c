//! Hierarchical Navigable Small World graph for approximate nearest-neighbour
//! search.
//!
//! Vectors are pre-normalised (L2), so similarity is a plain dot product,
//! which equals cosine similarity. Higher layers form sparse long-range
//! graphs; layer 0 contains every node. Node identifiers are insertion
//! indices, so the graph carries no pointers and persists as flat arrays.
//!
//! Parameters (defaults in [`crate::config`]):
//!
//! - `m = 16` — max neighbours per node per layer; layer 0 allows `2 * m`
//! - `ef_construction = 200` — candidate pool size during insertion
//! - `ef_search = 50` — candidate pool size during query
//!
//! The level-sampling RNG is seeded with a fixed value, so identical insert
//! sequences produce bit-identical graphs across runs.

mod persist;

use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{
    DEFAULT_EF_CONSTRUCTION, DEFAULT_EF_SEARCH, DEFAULT_M, GRAPH_RNG_SEED,
};
use crate::error::GraphError;

/// A single search hit: node identifier and cosine similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// Node identifier (insertion index)
    pub id: u32,
    /// Cosine similarity in [-1, 1], practically [0, 1] for embedder output
    pub score: f32,
}

/// A vertex in the graph. `neighbors[layer]` lists the adjacent node ids at
/// that layer; the outer length is the node's top layer + 1.
#[derive(Debug, Clone)]
struct Node {
    vec: Vec<f32>,
    neighbors: Vec<Vec<u32>>,
}

/// The HNSW index.
#[derive(Debug)]
pub struct Graph {
    nodes: Vec<Node>,
    entry_point: u32,
    max_layer: usize,
    m: usize,
    ef_construction: usize,
    ef_search: usize,
    /// Level generation factor, `1 / ln(m)`.
    ml: f64,
    rng: StdRng,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(DEFAULT_M, DEFAULT_EF_CONSTRUCTION, DEFAULT_EF_SEARCH)
    }
}

impl Graph {
    /// Creates an empty graph with the given parameters. `m` must be at
    /// least 2 (the level factor is `1 / ln(m)`).
    pub fn new(m: usize, ef_construction: usize, ef_search: usize) -> Self {
        debug_assert!(m >= 2);
        Self {
            nodes: Vec::new(),
            entry_point: 0,
            max_layer: 0,
            m,
            ef_construction,
            ef_search,
            ml: 1.0 / (m as f64).ln(),
            rng: StdRng::seed_from_u64(GRAPH_RNG_SEED),
        }
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the graph holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dimension established by the first inserted vector, if any.
    pub fn dim(&self) -> Option<usize> {
        self.nodes.first().map(|n| n.vec.len())
    }

    /// Draws a random level with the HNSW exponential law
    /// `⌊-ln(U) * ml⌋`, `U` uniform on (0, 1].
    fn random_level(&mut self) -> usize {
        let u: f64 = 1.0 - self.rng.gen::<f64>();
        (-u.ln() * self.ml).floor() as usize
    }

    /// Inserts a pre-normalised vector, returning the new node's identifier
    /// (the insertion index).
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if `vec` does not match the dimension established
    /// by the first insert.
    pub fn insert(&mut self, vec: Vec<f32>) -> Result<u32, GraphError> {
        if let Some(expected) = self.dim() {
            if vec.len() != expected {
                return Err(GraphError::DimensionMismatch {
                    expected,
                    actual: vec.len(),
                });
            }
        }

        let id = self.nodes.len() as u32;
        let level = self.random_level();

        let mut neighbors = Vec::with_capacity(level + 1);
        for layer in 0..=level {
            neighbors.push(Vec::with_capacity(self.capacity_at(layer)));
        }

        // The query borrows would alias the node we are wiring up, so the
        // new vector is cloned for the descent.
        let query = vec.clone();
        self.nodes.push(Node { vec, neighbors });

        if id == 0 {
            self.entry_point = 0;
            self.max_layer = level;
            return Ok(0);
        }

        let top = self.max_layer;
        let mut ep = self.entry_point;

        // Greedy one-best descent through the layers above `level`.
        for layer in (level + 1..=top).rev() {
            ep = self.greedy_search_layer(&query, ep, layer);
        }

        // Full beam search and wiring on layers [min(level, top) .. 0].
        for layer in (0..=level.min(top)).rev() {
            let candidates = self.search_layer(&query, ep, self.ef_construction, layer);

            let selected: Vec<u32> = candidates.iter().take(self.m).map(|c| c.id).collect();
            self.nodes[id as usize].neighbors[layer] = selected.clone();

            let cap = self.capacity_at(layer);
            for &nb in &selected {
                self.nodes[nb as usize].neighbors[layer].push(id);
                if self.nodes[nb as usize].neighbors[layer].len() > cap {
                    self.prune_neighbors(nb, layer, cap);
                }
            }

            if let Some(best) = candidates.first() {
                ep = best.id;
            }
        }

        if level > top {
            self.entry_point = id;
            self.max_layer = level;
        }
        Ok(id)
    }

    /// Returns the `k` nearest neighbours of `query` (pre-normalised),
    /// descending by similarity.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if the query dimension differs from the graph's.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, GraphError> {
        if self.nodes.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.dim() {
            if query.len() != expected {
                return Err(GraphError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }

        let mut ep = self.entry_point;
        for layer in (1..=self.max_layer).rev() {
            ep = self.greedy_search_layer(query, ep, layer);
        }

        let ef = self.ef_search.max(k);
        let mut candidates = self.search_layer(query, ep, ef, 0);
        candidates.truncate(k);

        Ok(candidates
            .into_iter()
            .map(|c| SearchHit {
                id: c.id,
                score: c.sim,
            })
            .collect())
    }

    /// Max neighbour-list length at `layer`.
    fn capacity_at(&self, layer: usize) -> usize {
        if layer == 0 {
            2 * self.m
        } else {
            self.m
        }
    }

    /// Navigates `layer` from `ep`, repeatedly moving to the most similar
    /// neighbour until no neighbour improves. Ties keep the first-seen node.
    fn greedy_search_layer(&self, query: &[f32], ep: u32, layer: usize) -> u32 {
        let mut best = ep;
        let mut best_sim = dot(query, &self.nodes[ep as usize].vec);

        loop {
            let mut changed = false;
            let node = &self.nodes[best as usize];
            if let Some(neighbors) = node.neighbors.get(layer) {
                for &nb in neighbors {
                    let s = dot(query, &self.nodes[nb as usize].vec);
                    if s > best_sim {
                        best_sim = s;
                        best = nb;
                        changed = true;
                    }
                }
            }
            if !changed {
                return best;
            }
        }
    }

    /// Bounded best-first beam search at `layer`.
    ///
    /// `to_explore` is a max-heap of unexplored candidates; `results` is the
    /// working set bounded to `ef`, with its minimum similarity tracked in
    /// `worst`. The search stops when the best unexplored candidate cannot
    /// improve a full result set. Returns candidates sorted descending by
    /// similarity, ties broken by lower id.
    fn search_layer(&self, query: &[f32], ep: u32, ef: usize, layer: usize) -> Vec<Candidate> {
        let mut visited = vec![false; self.nodes.len()];
        visited[ep as usize] = true;

        let ep_sim = dot(query, &self.nodes[ep as usize].vec);
        let mut to_explore = BinaryHeap::new();
        to_explore.push(Candidate { id: ep, sim: ep_sim });
        let mut results = vec![Candidate { id: ep, sim: ep_sim }];
        let mut worst = ep_sim;

        while let Some(current) = to_explore.pop() {
            if results.len() >= ef && current.sim < worst {
                break;
            }

            let node = &self.nodes[current.id as usize];
            let Some(neighbors) = node.neighbors.get(layer) else {
                continue;
            };
            for &nb in neighbors {
                if visited[nb as usize] {
                    continue;
                }
                visited[nb as usize] = true;
                let sim = dot(query, &self.nodes[nb as usize].vec);

                if results.len() < ef || sim > worst {
                    to_explore.push(Candidate { id: nb, sim });
                    results.push(Candidate { id: nb, sim });
                    if results.len() > ef {
                        drop_worst(&mut results);
                    }
                    worst = results
                        .iter()
                        .map(|c| c.sim)
                        .fold(f32::INFINITY, f32::min);
                }
            }
        }

        results.sort_by(|a, b| b.sim.total_cmp(&a.sim).then_with(|| a.id.cmp(&b.id)));
        results
    }

    /// Reduces `id`'s neighbour list at `layer` to the `cap` entries most
    /// similar to `id`'s own vector. Dropped edges are removed from both
    /// sides, keeping the neighbour relation symmetric.
    fn prune_neighbors(&mut self, id: u32, layer: usize, cap: usize) {
        let scored = {
            let node_vec = &self.nodes[id as usize].vec;
            let mut scored: Vec<Candidate> = self.nodes[id as usize].neighbors[layer]
                .iter()
                .map(|&nb| Candidate {
                    id: nb,
                    sim: dot(node_vec, &self.nodes[nb as usize].vec),
                })
                .collect();
            scored.sort_by(|a, b| b.sim.total_cmp(&a.sim).then_with(|| a.id.cmp(&b.id)));
            scored
        };

        let kept: Vec<u32> = scored.iter().take(cap).map(|c| c.id).collect();
        let dropped: Vec<u32> = scored.iter().skip(cap).map(|c| c.id).collect();
        self.nodes[id as usize].neighbors[layer] = kept;
        for d in dropped {
            let back = &mut self.nodes[d as usize].neighbors[layer];
            if let Some(pos) = back.iter().position(|&x| x == id) {
                back.remove(pos);
            }
        }
    }
}

/// Removes the element with the lowest similarity (highest id on ties).
fn drop_worst(results: &mut Vec<Candidate>) {
    let mut worst_idx = 0;
    for i in 1..results.len() {
        let worse = results[i]
            .sim
            .total_cmp(&results[worst_idx].sim)
            .then_with(|| results[worst_idx].id.cmp(&results[i].id))
            .is_lt();
        if worse {
            worst_idx = i;
        }
    }
    results.swap_remove(worst_idx);
}

/// Dot-product similarity between two pre-normalised vectors.
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// A (node, similarity) pair ordered for the explore heap: higher similarity
/// first, lower id first on ties.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    id: u32,
    sim: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.sim.total_cmp(&other.sim).is_eq() && self.id == other.id
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sim
            .total_cmp(&other.sim)
            .then_with(|| other.id.cmp(&self.id))
    }
}
