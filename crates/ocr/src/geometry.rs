//! Polygon math over pixel contours, delegating to `imageproc::geometry`.

use imageproc::contours::Contour;
use imageproc::geometry::{approximate_polygon_dp, contour_area};
use imageproc::point::Point as PixelPoint;
use ticket_core::{BoundingRect, Point, Space};

/// Convert an imageproc contour into points of the given space.
pub fn contour_points<S: Space>(contour: &Contour<i32>) -> Vec<Point<S>> {
    contour.points.iter().map(|p| Point::new(p.x, p.y)).collect()
}

pub fn bounding_rect<S: Space>(points: &[Point<S>]) -> Option<BoundingRect<S>> {
    BoundingRect::enclosing(points)
}

fn pixels<S: Space>(points: &[Point<S>]) -> Vec<PixelPoint<i32>> {
    points.iter().map(|p| PixelPoint::new(p.x, p.y)).collect()
}

/// Area of a closed polygon (shoelace), never negative.
pub fn shoelace_area<S: Space>(polygon: &[Point<S>]) -> f64 {
    contour_area(&pixels(polygon))
}

/// Length of a curve; `closed` adds the segment from the last point back to the first.
pub fn arc_length<S: Space>(curve: &[Point<S>], closed: bool) -> f64 {
    imageproc::geometry::arc_length(&pixels(curve), closed)
}

/// Douglas-Peucker simplification of a closed contour.
///
/// The walk is rotated to start on an extreme point first: the closed
/// simplification always keeps its starting point, so starting mid-edge would
/// add a spurious vertex. The result lists each vertex once.
pub fn approximate_polygon<S: Space>(contour: &[Point<S>], epsilon: f64) -> Vec<Point<S>> {
    if contour.len() < 3 || !(epsilon > 0.0) {
        return contour.to_vec();
    }

    let far = farthest_from(contour, contour[0]);
    let start = farthest_from(contour, contour[far]);
    if contour[start] == contour[far] {
        return vec![contour[0]];
    }

    let ring: Vec<PixelPoint<i32>> = pixels(&contour[start..])
        .into_iter()
        .chain(pixels(&contour[..start]))
        .collect();
    approximate_polygon_dp(&ring, epsilon, true)
        .into_iter()
        .map(|p| Point::new(p.x, p.y))
        .collect()
}

fn farthest_from<S: Space>(points: &[Point<S>], origin: Point<S>) -> usize {
    let dist_sq = |p: &Point<S>| {
        let (dx, dy) = ((p.x - origin.x) as i64, (p.y - origin.y) as i64);
        dx * dx + dy * dy
    };
    points
        .iter()
        .enumerate()
        .max_by_key(|(_, p)| dist_sq(p))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
