//! Dual graphs of a triangle mesh
//!
//! Two adjacency views feed the partitioner: triangle adjacency (which
//! triangles share an edge) and cluster adjacency (how many shared edges
//! connect two clusters, i.e. their shared boundary length).

use std::collections::HashMap;

/// Unordered vertex pair identifying a mesh edge.
#[inline]
fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// For each triangle, the triangles sharing at least one edge with it.
///
/// Edges are bucketed by their unordered vertex pair; every bucket with
/// two or more triangles connects all pairs in it, so non-manifold fans
/// are fully connected. Each neighbour appears once per triangle even
/// when two triangles share two edges.
pub fn triangle_adjacency(tris: &[[u32; 3]]) -> Vec<Vec<u32>> {
    let mut edge_to_tris: HashMap<(u32, u32), Vec<u32>> = HashMap::with_capacity(tris.len() * 3 / 2);
    for (i, tri) in tris.iter().enumerate() {
        for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            edge_to_tris.entry(edge_key(a, b)).or_default().push(i as u32);
        }
    }

    let mut adjacency = vec![Vec::new(); tris.len()];
    for bucket in edge_to_tris.values() {
        if bucket.len() < 2 {
            continue;
        }
        for (k, &a) in bucket.iter().enumerate() {
            for &b in &bucket[k + 1..] {
                adjacency[a as usize].push(b);
                adjacency[b as usize].push(a);
            }
        }
    }
    for list in &mut adjacency {
        list.sort_unstable();
        list.dedup();
    }
    adjacency
}

/// Weighted adjacency between clusters.
///
/// The weight of edge (a, b) counts the triangle-adjacency edges crossing
/// the cluster boundary, so grouping by maximum weight keeps clusters
/// with long shared borders together. Self-edges are excluded and the
/// result is symmetric.
pub fn cluster_adjacency(tri_adj: &[Vec<u32>], tri_cluster: &[u32]) -> Vec<Vec<(u32, u32)>> {
    assert_eq!(tri_adj.len(), tri_cluster.len());
    let cluster_count = tri_cluster.iter().copied().max().map_or(0, |m| m as usize + 1);

    let mut weights: HashMap<(u32, u32), u32> = HashMap::new();
    for (i, neighbours) in tri_adj.iter().enumerate() {
        let ca = tri_cluster[i];
        for &j in neighbours {
            // Count each undirected triangle pair once.
            if j as usize <= i {
                continue;
            }
            let cb = tri_cluster[j as usize];
            if ca != cb {
                *weights.entry(edge_key(ca, cb)).or_insert(0) += 1;
            }
        }
    }

    let mut adjacency = vec![Vec::new(); cluster_count];
    for (&(a, b), &w) in &weights {
        adjacency[a as usize].push((b, w));
        adjacency[b as usize].push((a, w));
    }
    for list in &mut adjacency {
        list.sort_unstable();
    }
    adjacency
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two triangles forming a quad: they share edge (0, 2).
    #[test]
    fn quad_triangles_are_adjacent() {
        let tris = [[0, 1, 2], [0, 2, 3]];
        let adj = triangle_adjacency(&tris);
        assert_eq!(adj[0], vec![1]);
        assert_eq!(adj[1], vec![0]);
    }

    #[test]
    fn disjoint_triangles_have_no_neighbours() {
        let tris = [[0, 1, 2], [3, 4, 5]];
        let adj = triangle_adjacency(&tris);
        assert!(adj[0].is_empty());
        assert!(adj[1].is_empty());
    }

    #[test]
    fn grid_interior_triangle_has_three_neighbours() {
        // 3x3 vertex grid, 8 triangles; each quad split along its diagonal.
        let mut tris = Vec::new();
        for y in 0u32..2 {
            for x in 0u32..2 {
                let i = x + y * 3;
                tris.push([i, i + 1, i + 3]);
                tris.push([i + 1, i + 4, i + 3]);
            }
        }
        let adj = triangle_adjacency(&tris);
        let max_degree = adj.iter().map(|a| a.len()).max().unwrap();
        assert_eq!(max_degree, 3);
        // Every triangle in a connected grid touches at least one other.
        assert!(adj.iter().all(|a| !a.is_empty()));
    }

    #[test]
    fn cluster_weights_count_boundary_edges() {
        // Strip of four triangles; first two in cluster 0, rest in cluster 1.
        let tris = [[0, 1, 2], [1, 3, 2], [2, 3, 4], [3, 5, 4]];
        let tri_adj = triangle_adjacency(&tris);
        let membership = [0, 0, 1, 1];
        let adj = cluster_adjacency(&tri_adj, &membership);

        assert_eq!(adj.len(), 2);
        assert_eq!(adj[0], vec![(1, 1)]);
        assert_eq!(adj[1], vec![(0, 1)]);
    }

    #[test]
    fn self_edges_are_excluded() {
        let tris = [[0, 1, 2], [0, 2, 3]];
        let tri_adj = triangle_adjacency(&tris);
        let adj = cluster_adjacency(&tri_adj, &[0, 0]);
        assert_eq!(adj, vec![Vec::new()]);
    }
}
