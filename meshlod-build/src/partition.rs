//! Balanced graph partitioning contract and a greedy implementation

use anyhow::Result;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Weighted undirected adjacency: `adjacency[n]` lists `(neighbour,
/// weight)` pairs. An unweighted graph uses weight 1 everywhere.
pub type WeightedAdjacency = [Vec<(u32, u32)>];

/// Splits a weighted graph into `n_parts` balanced parts while keeping
/// heavily connected nodes together.
///
/// Implementations may return fewer labels than requested when the
/// graph cannot support the count (tiny or fragmented inputs); callers
/// must read the actual part count from the membership.
pub trait Partitioner: Sync {
    fn partition(&self, n_parts: usize, adjacency: &WeightedAdjacency) -> Result<Vec<u32>>;
}

/// Deterministic balanced region growing.
///
/// Parts are grown one at a time from the lowest-index unassigned node,
/// always absorbing the frontier node with the strongest accumulated
/// connection to the part (ties to the lowest index) until the part
/// reaches ⌈n/k⌉ nodes or its component is exhausted. Fragmented graphs
/// can overshoot the requested count; excess parts are merged into their
/// most strongly connected neighbour afterwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyGrowPartitioner;

impl Partitioner for GreedyGrowPartitioner {
    fn partition(&self, n_parts: usize, adjacency: &WeightedAdjacency) -> Result<Vec<u32>> {
        let n = adjacency.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        let k = n_parts.clamp(1, n);
        let target = n.div_ceil(k);

        let mut membership = vec![u32::MAX; n];
        // Accumulated connection weight to the part currently growing,
        // reset between parts via the touched list.
        let mut gain = vec![0u64; n];
        let mut touched: Vec<u32> = Vec::new();
        let mut heap: BinaryHeap<(u64, Reverse<u32>)> = BinaryHeap::new();

        let mut part = 0u32;
        let mut next_seed = 0usize;
        let mut assigned = 0usize;

        while assigned < n {
            while membership[next_seed] != u32::MAX {
                next_seed += 1;
            }

            heap.clear();
            for &t in &touched {
                gain[t as usize] = 0;
            }
            touched.clear();

            let seed = next_seed as u32;
            gain[seed as usize] = 1;
            touched.push(seed);
            heap.push((1, Reverse(seed)));

            let mut size = 0usize;
            while size < target {
                let Some((g, Reverse(node))) = heap.pop() else {
                    break;
                };
                let node_idx = node as usize;
                // Stale entries: already assigned, or superseded by a
                // later push with a larger gain.
                if membership[node_idx] != u32::MAX || g != gain[node_idx] {
                    continue;
                }
                membership[node_idx] = part;
                assigned += 1;
                size += 1;

                for &(nbr, w) in &adjacency[node_idx] {
                    let nbr_idx = nbr as usize;
                    if membership[nbr_idx] != u32::MAX {
                        continue;
                    }
                    if gain[nbr_idx] == 0 {
                        touched.push(nbr);
                    }
                    gain[nbr_idx] += w as u64;
                    heap.push((gain[nbr_idx], Reverse(nbr)));
                }
            }
            part += 1;
        }

        let mut part_count = part as usize;
        while part_count > k {
            merge_smallest_part(&mut membership, adjacency, &mut part_count);
        }
        Ok(membership)
    }
}

/// Fold the smallest part into the neighbouring part it shares the most
/// boundary weight with (or the next-smallest part if it is isolated),
/// then compact the labels.
fn merge_smallest_part(
    membership: &mut [u32],
    adjacency: &WeightedAdjacency,
    part_count: &mut usize,
) {
    let mut sizes = vec![0usize; *part_count];
    for &m in membership.iter() {
        sizes[m as usize] += 1;
    }
    let smallest = sizes
        .iter()
        .enumerate()
        .min_by_key(|&(i, &s)| (s, i))
        .map(|(i, _)| i as u32)
        .unwrap();

    let mut boundary = vec![0u64; *part_count];
    for (node, &m) in membership.iter().enumerate() {
        if m != smallest {
            continue;
        }
        for &(nbr, w) in &adjacency[node] {
            let other = membership[nbr as usize];
            if other != smallest {
                boundary[other as usize] += w as u64;
            }
        }
    }
    let into = boundary
        .iter()
        .enumerate()
        .filter(|&(i, _)| i as u32 != smallest)
        .max_by_key(|&(i, &w)| (w, Reverse(sizes[i])))
        .map(|(i, _)| i as u32)
        .unwrap();

    let last = (*part_count - 1) as u32;
    for m in membership.iter_mut() {
        if *m == smallest {
            *m = into;
        }
        // Keep labels dense by moving the last label into the hole.
        if *m == last && smallest != last {
            *m = smallest;
        }
    }
    *part_count -= 1;
}
