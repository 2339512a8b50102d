//! Convex hull of a surface cluster, used to outline planar patches.

use nalgebra::{Point2, Point3, Vector3};

use crate::colorizer::TriangleCluster;
use crate::mesh::Mesh3d;

/// 2D cross product of `(a - o)` and `(b - o)`.
fn cross(o: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Indices of the convex hull of `points`, counter-clockwise (monotone chain).
///
/// Collinear points on the hull boundary are dropped. Fewer than three
/// distinct points return them as-is.
pub fn convex_hull_2d(points: &[Point2<f64>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&a, &b| {
        points[a]
            .x
            .total_cmp(&points[b].x)
            .then(points[a].y.total_cmp(&points[b].y))
    });
    order.dedup_by(|a, b| points[*a] == points[*b]);

    if order.len() < 3 {
        return order;
    }

    let mut hull: Vec<usize> = Vec::with_capacity(order.len() * 2);

    // Lower hull
    for &i in &order {
        while hull.len() >= 2
            && cross(&points[hull[hull.len() - 2]], &points[hull[hull.len() - 1]], &points[i]) <= 0.0
        {
            hull.pop();
        }
        hull.push(i);
    }

    // Upper hull
    let lower_len = hull.len() + 1;
    for &i in order.iter().rev().skip(1) {
        while hull.len() >= lower_len
            && cross(&points[hull[hull.len() - 2]], &points[hull[hull.len() - 1]], &points[i]) <= 0.0
        {
            hull.pop();
        }
        hull.push(i);
    }

    // Last point repeats the first
    hull.pop();
    hull
}

/// Two unit vectors spanning the plane orthogonal to `normal`.
fn plane_basis(normal: &Vector3<f64>) -> Option<(Vector3<f64>, Vector3<f64>)> {
    let n = normal.try_normalize(1e-12)?;
    let helper = if n.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let u = n.cross(&helper).normalize();
    let v = n.cross(&u);
    Some((u, v))
}

/// Closed outline of a cluster: hull vertices in 3D with the first repeated.
///
/// Returns `None` when the cluster has no normal, no valid vertices, or a
/// degenerate hull.
pub fn cluster_hull(mesh: &Mesh3d, cluster: &TriangleCluster) -> Option<Vec<Point3<f64>>> {
    let normal = cluster.normal?;
    let (u, v) = plane_basis(&normal)?;

    let vertices: Vec<Point3<f64>> = cluster
        .vertex_indices
        .iter()
        .filter_map(|&i| mesh.vertices.get(i).copied())
        .collect();

    let projected: Vec<Point2<f64>> = vertices
        .iter()
        .map(|p| Point2::new(p.coords.dot(&u), p.coords.dot(&v)))
        .collect();

    let hull = convex_hull_2d(&projected);
    if hull.len() < 3 {
        return None;
    }

    let mut outline: Vec<Point3<f64>> = hull.iter().map(|&i| vertices[i]).collect();
    outline.push(vertices[hull[0]]);
    Some(outline)
}
