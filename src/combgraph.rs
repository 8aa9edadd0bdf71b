//! Combinatorial graph: the routing-level view of the input network.
//! Chains of degree-2 stations are contracted into single edges whose
//! child list remembers the original line edges for later splitting.

use std::collections::BTreeMap;

use crate::error::LayoutError;
use crate::geo::{dist, Point, PolyLine};
use crate::ir::{Line, LineGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildEdge {
    /// Index into `LineGraph::edges`.
    pub line_edge: usize,
    /// True when the child runs against its stored geometry direction.
    pub reversed: bool,
}

#[derive(Debug, Clone)]
pub struct CombNode {
    pub id: String,
    pub pos: Point,
    /// Incident comb edges, unordered.
    pub edges: Vec<usize>,
    /// Incident comb edges in the clockwise order the input declares at
    /// this station. The drawing must preserve this cyclic order.
    pub ordering: Vec<usize>,
}

impl CombNode {
    pub fn deg(&self) -> usize {
        self.edges.len()
    }
}

#[derive(Debug, Clone)]
pub struct CombEdge {
    pub from: usize,
    pub to: usize,
    /// Original line edges in from → to order.
    pub children: Vec<ChildEdge>,
    pub geom: PolyLine,
}

#[derive(Debug, Clone, Default)]
pub struct CombGraph {
    pub nodes: Vec<CombNode>,
    pub edges: Vec<CombEdge>,
}

impl CombGraph {
    /// Build the comb graph from a line graph, contracting chains of
    /// degree-2 stations. Node and edge indices are deterministic for a
    /// given input (stations in id order, chains walked from their lower
    /// endpoint). Fails when a junction of degree ≥ 3 comes without a
    /// usable clockwise adjacency list.
    pub fn build(lg: &LineGraph) -> Result<Self, LayoutError> {
        let mut cg = CombGraph::default();
        let mut node_idx: BTreeMap<&str, usize> = BTreeMap::new();

        // Stations that survive contraction: everything except interior
        // degree-2 stations. Isolated stations survive too.
        for (id, node) in &lg.nodes {
            if lg.node_deg(id) == 2 {
                continue;
            }
            node_idx.insert(id, cg.nodes.len());
            cg.nodes.push(CombNode {
                id: node.id.clone(),
                pos: node.pos,
                edges: Vec::new(),
                ordering: Vec::new(),
            });
        }

        // Degree-2 cycles have no surviving endpoint; anchor each at its
        // smallest station id.
        let mut visited = vec![false; lg.edges.len()];
        for (id, node) in &lg.nodes {
            if lg.node_deg(id) != 2 || node_idx.contains_key(id.as_str()) {
                continue;
            }
            if Self::reaches_terminal(lg, id, &node_idx) {
                continue;
            }
            node_idx.insert(id, cg.nodes.len());
            cg.nodes.push(CombNode {
                id: node.id.clone(),
                pos: node.pos,
                edges: Vec::new(),
                ordering: Vec::new(),
            });
        }

        // Walk chains outward from every surviving station.
        let start_ids: Vec<String> = cg.nodes.iter().map(|n| n.id.clone()).collect();
        for id in &start_ids {
            for le in lg.incident(id) {
                if visited[le] {
                    continue;
                }
                cg.walk_chain(lg, id, le, &node_idx, &mut visited);
            }
        }

        cg.write_orderings(lg)?;
        Ok(cg)
    }

    fn reaches_terminal(lg: &LineGraph, start: &str, node_idx: &BTreeMap<&str, usize>) -> bool {
        // Follow the chain in one direction; a chain not ending in a
        // surviving station is a pure degree-2 cycle.
        let mut cur = start.to_string();
        let mut last_edge = usize::MAX;
        loop {
            if node_idx.contains_key(cur.as_str()) {
                return true;
            }
            let inc = lg.incident(&cur);
            let next = inc.iter().copied().find(|&e| e != last_edge);
            let Some(e) = next else { return false };
            let edge = &lg.edges[e];
            cur = if edge.from == cur {
                edge.to.clone()
            } else {
                edge.from.clone()
            };
            last_edge = e;
            if cur == start {
                return false;
            }
        }
    }

    fn walk_chain(
        &mut self,
        lg: &LineGraph,
        start: &str,
        first_edge: usize,
        node_idx: &BTreeMap<&str, usize>,
        visited: &mut [bool],
    ) {
        let mut children = Vec::new();
        let mut geom = PolyLine::new();
        let mut cur = start.to_string();
        let mut edge = first_edge;

        loop {
            visited[edge] = true;
            let le = &lg.edges[edge];
            let reversed = le.to == cur && le.from != cur;
            children.push(ChildEdge {
                line_edge: edge,
                reversed,
            });
            append_oriented(&mut geom, lg, edge, reversed);
            cur = if reversed {
                le.from.clone()
            } else {
                le.to.clone()
            };

            if node_idx.contains_key(cur.as_str()) {
                break;
            }
            let inc = lg.incident(&cur);
            let next = inc.iter().copied().find(|&e| e != edge && !visited[e]);
            match next {
                Some(e) => edge = e,
                None => break,
            }
        }

        let from = node_idx[start];
        let to = node_idx[cur.as_str()];
        let ce = self.edges.len();
        self.edges.push(CombEdge { from, to, children, geom });
        self.nodes[from].edges.push(ce);
        if to != from {
            self.nodes[to].edges.push(ce);
        }
    }

    /// Resolve each station's declared clockwise adjacency list into an
    /// ordering over comb edges: a chain is represented by its child edge
    /// touching the station. The ordering is taken verbatim from the
    /// input; this layer never derives it from geometry. Junctions of
    /// degree ≥ 3 must be fully covered.
    fn write_orderings(&mut self, lg: &LineGraph) -> Result<(), LayoutError> {
        for n in 0..self.nodes.len() {
            let mut by_line: BTreeMap<&str, usize> = BTreeMap::new();
            for &ce in &self.nodes[n].edges {
                let edge = &self.edges[ce];
                if edge.from == n {
                    let child = edge.children.first().expect("comb edge without children");
                    by_line.insert(lg.edges[child.line_edge].id.as_str(), ce);
                }
                if edge.to == n {
                    let child = edge.children.last().expect("comb edge without children");
                    by_line.insert(lg.edges[child.line_edge].id.as_str(), ce);
                }
            }

            let station = &lg.nodes[self.nodes[n].id.as_str()];
            let mut ordering = Vec::with_capacity(self.nodes[n].edges.len());
            for edge_id in &station.adjacent {
                if let Some(&ce) = by_line.get(edge_id.as_str()) {
                    if !ordering.contains(&ce) {
                        ordering.push(ce);
                    }
                }
            }

            if ordering.len() < self.nodes[n].edges.len() {
                if self.nodes[n].deg() >= 3 {
                    return Err(LayoutError::InvalidInput(format!(
                        "station '{}' needs a clockwise adjacency list covering its edges",
                        self.nodes[n].id
                    )));
                }
                // Below degree 3 the cyclic order cannot be violated;
                // fill in the unlisted edges.
                for &ce in &self.nodes[n].edges {
                    if !ordering.contains(&ce) {
                        ordering.push(ce);
                    }
                }
            }
            self.nodes[n].ordering = ordering;
        }
        Ok(())
    }

    /// Number of lines shared by two comb edges, taken from their child
    /// edges nearest to the common node.
    pub fn shared_lines(&self, lg: &LineGraph, a: usize, b: usize) -> usize {
        let la = self.end_lines(lg, a);
        let lb = self.end_lines(lg, b);
        la.iter().filter(|l| lb.contains(l)).count()
    }

    fn end_lines<'a>(&self, lg: &'a LineGraph, ce: usize) -> &'a [Line] {
        let child = &self.edges[ce].children[0];
        &lg.edges[child.line_edge].lines
    }

    /// The other endpoint of `ce` as seen from `n`.
    pub fn other(&self, ce: usize, n: usize) -> usize {
        let e = &self.edges[ce];
        if e.from == n {
            e.to
        } else {
            e.from
        }
    }
}

fn append_oriented(geom: &mut PolyLine, lg: &LineGraph, edge: usize, reversed: bool) {
    let le = &lg.edges[edge];
    let mut part = if le.geom.len() >= 2 {
        le.geom.clone()
    } else {
        // Synthesize a straight geometry from the endpoint stations.
        let a = lg.nodes[&le.from].pos;
        let b = lg.nodes[&le.to].pos;
        PolyLine::from_points(vec![a, b])
    };
    if reversed {
        part.reverse();
    }
    for &p in part.points() {
        if geom.last().map(|q| dist(q, p) > 1e-9).unwrap_or(true) {
            geom.push(p);
        }
    }
}
