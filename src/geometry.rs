//! Geometry kernel over `(lat, lng)` rings, backed by `geo`.
//!
//! Rings are converted to `geo` types with longitude as x and latitude as y.
//! Containment and overlap are planar, which is accurate enough at zone
//! scale. Boundary points count as inside.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{
    Area, Bearing, ChamberlainDuquetteArea, ConvexHull, Coord, Destination, Haversine, Intersects,
    Line, LineString, MultiPoint, Point, Polygon,
};

/// Appends the first vertex when the ring is open. Empty rings stay empty.
pub fn close_ring(mut ring: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
        if ring.len() > 1 && first != last {
            ring.push(first);
        }
    }
    ring
}

/// Vertices of a ring without the closing duplicate.
pub fn open_vertices(ring: &[(f64, f64)]) -> &[(f64, f64)] {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) if ring.len() > 1 && first == last => &ring[..ring.len() - 1],
        _ => ring,
    }
}

/// Number of distinct vertices in the ring.
pub fn distinct_vertex_count(ring: &[(f64, f64)]) -> usize {
    let mut distinct: Vec<(f64, f64)> = Vec::new();
    for vertex in open_vertices(ring) {
        if !distinct.contains(vertex) {
            distinct.push(*vertex);
        }
    }
    distinct.len()
}

fn coord((lat, lng): (f64, f64)) -> Coord {
    Coord { x: lng, y: lat }
}

fn point(location: (f64, f64)) -> Point {
    Point::from(coord(location))
}

fn location(point: Point) -> (f64, f64) {
    (point.y(), point.x())
}

fn polygon(ring: &[(f64, f64)]) -> Polygon {
    let exterior: LineString = open_vertices(ring).iter().copied().map(coord).collect();
    Polygon::new(exterior, Vec::new())
}

fn edges(ring: &[(f64, f64)]) -> Vec<Line> {
    let vertices = open_vertices(ring);
    let n = vertices.len();
    (0..n)
        .map(|i| Line::new(coord(vertices[i]), coord(vertices[(i + 1) % n])))
        .collect()
}

/// Containment test; points on an edge or vertex count as inside.
pub fn point_in_polygon(location: (f64, f64), ring: &[(f64, f64)]) -> bool {
    distinct_vertex_count(ring) >= 3 && polygon(ring).intersects(&point(location))
}

/// Counts the points contained by `ring`.
pub fn count_points_in_polygon(points: &[(f64, f64)], ring: &[(f64, f64)]) -> usize {
    if distinct_vertex_count(ring) < 3 {
        return 0;
    }
    let shape = polygon(ring);
    points
        .iter()
        .filter(|location| shape.intersects(&point(**location)))
        .count()
}

/// True when the rings share any point: crossing edges, touching edges or
/// one ring containing the other.
pub fn polygons_overlap(ring_a: &[(f64, f64)], ring_b: &[(f64, f64)]) -> bool {
    polygon(ring_a).intersects(&polygon(ring_b))
}

/// True when no two non-adjacent edges of the ring touch and no adjacent
/// edges fold back onto each other.
pub fn is_simple(ring: &[(f64, f64)]) -> bool {
    let edges = edges(ring);
    let n = edges.len();
    if n < 3 {
        return false;
    }
    for i in 0..n {
        for j in i + 1..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(edges[i], edges[j]) {
                None => {}
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(LineIntersection::Collinear { intersection }) if adjacent => {
                    if intersection.start != intersection.end {
                        return false;
                    }
                }
                Some(_) => return false,
            }
        }
    }
    true
}

/// Arithmetic mean of the distinct vertices.
pub fn centroid(ring: &[(f64, f64)]) -> (f64, f64) {
    mean_point(open_vertices(ring))
}

/// Arithmetic mean of a point set; `(0, 0)` for an empty set.
pub fn mean_point(points: &[(f64, f64)]) -> (f64, f64) {
    if points.is_empty() {
        return (0.0, 0.0);
    }
    let n = points.len() as f64;
    let (lat, lng) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lng), point| (lat + point.0, lng + point.1));
    (lat / n, lng / n)
}

/// Spherical ring area in km².
pub fn area_km2(ring: &[(f64, f64)]) -> f64 {
    if distinct_vertex_count(ring) < 3 {
        return 0.0;
    }
    polygon(ring).chamberlain_duquette_unsigned_area() / 1_000_000.0
}

/// Initial bearing from `from` to `to`, in degrees within `[0, 360)`.
pub fn bearing_degrees(from: (f64, f64), to: (f64, f64)) -> f64 {
    Haversine.bearing(point(from), point(to)).rem_euclid(360.0)
}

/// Point reached travelling `distance_km` from `origin` on `bearing` degrees.
pub fn destination_point(origin: (f64, f64), bearing: f64, distance_km: f64) -> (f64, f64) {
    location(Haversine.destination(point(origin), bearing, distance_km * 1000.0))
}

/// Convex hull as a closed ring, or `None` for fewer than three
/// non-collinear points.
pub fn convex_hull(points: &[(f64, f64)]) -> Option<Vec<(f64, f64)>> {
    let hull = MultiPoint::new(points.iter().copied().map(point).collect()).convex_hull();
    if hull.unsigned_area() <= 0.0 {
        return None;
    }
    let ring = hull.exterior().points().map(location).collect();
    Some(close_ring(ring))
}

/// Approximates a circle of `radius_km` around `center` with `segments` vertices.
pub fn circle(center: (f64, f64), radius_km: f64, segments: usize) -> Vec<(f64, f64)> {
    let segments = segments.max(3);
    (0..segments)
        .map(|i| destination_point(center, 360.0 * i as f64 / segments as f64, radius_km))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(lat: f64, lng: f64, size: f64) -> Vec<(f64, f64)> {
        close_ring(vec![
            (lat, lng),
            (lat, lng + size),
            (lat + size, lng + size),
            (lat + size, lng),
        ])
    }

    #[test]
    fn test_point_inside_and_outside() {
        let ring = square(0.0, 0.0, 1.0);
        assert!(point_in_polygon((0.5, 0.5), &ring));
        assert!(!point_in_polygon((1.5, 0.5), &ring));
        assert!(!point_in_polygon((-0.1, 0.5), &ring));
    }

    #[test]
    fn test_boundary_points_are_inside() {
        let ring = square(0.0, 0.0, 1.0);
        assert!(point_in_polygon((0.0, 0.5), &ring), "edge point");
        assert!(point_in_polygon((1.0, 1.0), &ring), "vertex");
    }

    #[test]
    fn test_degenerate_ring_contains_nothing() {
        let ring = close_ring(vec![(0.0, 0.0), (1.0, 1.0)]);
        assert!(!point_in_polygon((0.0, 0.0), &ring));
        assert_eq!(count_points_in_polygon(&[(0.5, 0.5)], &ring), 0);
    }

    #[test]
    fn test_count_points() {
        let ring = square(0.0, 0.0, 1.0);
        let points = vec![(0.2, 0.2), (0.8, 0.8), (2.0, 2.0), (0.0, 0.0)];
        assert_eq!(count_points_in_polygon(&points, &ring), 3);
    }

    #[test]
    fn test_crossing_polygons_overlap() {
        let a = square(0.0, 0.0, 1.0);
        let b = square(0.5, 0.5, 1.0);
        assert!(polygons_overlap(&a, &b));
    }

    #[test]
    fn test_touching_polygons_overlap() {
        let a = square(0.0, 0.0, 1.0);
        let b = square(0.0, 1.0, 1.0);
        assert!(polygons_overlap(&a, &b));
    }

    #[test]
    fn test_contained_polygon_overlaps() {
        let outer = square(0.0, 0.0, 4.0);
        let inner = square(1.0, 1.0, 1.0);
        assert!(polygons_overlap(&outer, &inner));
        assert!(polygons_overlap(&inner, &outer));
    }

    #[test]
    fn test_disjoint_polygons_do_not_overlap() {
        let a = square(0.0, 0.0, 1.0);
        let b = square(3.0, 3.0, 1.0);
        assert!(!polygons_overlap(&a, &b));
    }

    #[test]
    fn test_bowtie_is_not_simple() {
        let bowtie = close_ring(vec![(0.0, 0.0), (1.0, 1.0), (1.0, 0.0), (0.0, 1.0)]);
        assert!(!is_simple(&bowtie));
        assert!(is_simple(&square(0.0, 0.0, 1.0)));
    }

    #[test]
    fn test_folded_ring_is_not_simple() {
        let folded = close_ring(vec![(0.0, 0.0), (0.0, 2.0), (0.0, 1.0), (1.0, 1.0)]);
        assert!(!is_simple(&folded));
    }

    #[test]
    fn test_area_of_one_degree_square_at_equator() {
        let area = area_km2(&square(0.0, 0.0, 1.0));
        assert!((area - 12_364.0).abs() < 50.0, "got {}", area);
    }

    #[test]
    fn test_centroid_ignores_closing_vertex() {
        let c = centroid(&square(0.0, 0.0, 2.0));
        assert!((c.0 - 1.0).abs() < 1e-12 && (c.1 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        assert!((bearing_degrees((0.0, 0.0), (1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((bearing_degrees((0.0, 0.0), (0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((bearing_degrees((0.0, 0.0), (-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((bearing_degrees((0.0, 0.0), (0.0, -1.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_destination_point_round_trips_distance() {
        let origin = (24.7136, 46.6753);
        let target = destination_point(origin, 45.0, 10.0);
        let km = crate::haversine::haversine_km(origin, target);
        assert!((km - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_convex_hull_drops_interior_points() {
        let points = vec![(0.0, 0.0), (0.0, 2.0), (2.0, 2.0), (2.0, 0.0), (1.0, 1.0)];
        let hull = convex_hull(&points).unwrap();
        assert_eq!(hull.len(), 5);
        assert!(!open_vertices(&hull).contains(&(1.0, 1.0)));
    }

    #[test]
    fn test_convex_hull_of_collinear_points_is_none() {
        assert!(convex_hull(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]).is_none());
    }
}
