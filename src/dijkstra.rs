//! Multi-source, multi-sink shortest paths over a non-negative cost graph,
//! optionally guided by an admissible heuristic (A*).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::graph::{EdgeIdx, Graph, NodeIdx};

/// Costs at or above this value are treated as absent edges.
pub const SOFT_INF: f64 = 1e10;

#[derive(Debug, Clone, PartialEq)]
pub struct ShortestPath {
    /// Traversed edges in source → sink order.
    pub edges: Vec<EdgeIdx>,
    pub cost: f64,
    pub source: NodeIdx,
    pub sink: NodeIdx,
}

#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    est: f64,
    cost: f64,
    node: NodeIdx,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for lowest-estimate-first and
        // break ties on cost, then node index, for deterministic pops.
        other
            .est
            .partial_cmp(&self.est)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                other
                    .cost
                    .partial_cmp(&self.cost)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shortest path from any node in `sources` to any node in `sinks`.
///
/// `cost` yields the edge weight (values >= `SOFT_INF` are skipped) and
/// `heur` an admissible estimate of the remaining cost at a node; pass
/// `|_| 0.0` for plain Dijkstra. Returns `None` when every sink is
/// unreachable.
pub fn shortest_path<N, E>(
    g: &Graph<N, E>,
    sources: &[NodeIdx],
    sinks: &[NodeIdx],
    cost: impl Fn(EdgeIdx) -> f64,
    heur: impl Fn(NodeIdx) -> f64,
) -> Option<ShortestPath> {
    if sources.is_empty() || sinks.is_empty() {
        return None;
    }

    let slots = g.nd_slots();
    let mut dist = vec![f64::INFINITY; slots];
    let mut prev: Vec<Option<EdgeIdx>> = vec![None; slots];
    let mut origin: Vec<Option<NodeIdx>> = vec![None; slots];
    let mut is_sink = vec![false; slots];
    for &t in sinks {
        is_sink[t.index()] = true;
    }

    let mut heap = BinaryHeap::new();
    for &s in sources {
        dist[s.index()] = 0.0;
        origin[s.index()] = Some(s);
        heap.push(HeapEntry {
            est: heur(s),
            cost: 0.0,
            node: s,
        });
    }

    while let Some(entry) = heap.pop() {
        let n = entry.node;
        if entry.cost > dist[n.index()] {
            continue;
        }
        if is_sink[n.index()] {
            // Reconstruct the edge chain back to the originating source.
            let mut edges = Vec::new();
            let mut cur = n;
            while let Some(e) = prev[cur.index()] {
                edges.push(e);
                cur = g.from(e);
            }
            edges.reverse();
            return Some(ShortestPath {
                edges,
                cost: entry.cost,
                source: origin[n.index()].unwrap_or(cur),
                sink: n,
            });
        }

        for &e in g.adj_out(n) {
            let w = cost(e);
            if w >= SOFT_INF {
                continue;
            }
            let m = g.to(e);
            let new_cost = entry.cost + w;
            if new_cost < dist[m.index()] {
                dist[m.index()] = new_cost;
                prev[m.index()] = Some(e);
                origin[m.index()] = origin[n.index()];
                heap.push(HeapEntry {
                    est: new_cost + heur(m),
                    cost: new_cost,
                    node: m,
                });
            }
        }
    }

    None
}
