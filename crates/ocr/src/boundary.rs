use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use imageproc::contours::find_contours;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;
use ticket_core::{DetectionConfig, Detection, Point, Quadrilateral, ScaleRatio};

use crate::geometry::{approximate_polygon, arc_length, contour_points, shoelace_area};

/// A document outline found in the detection copy, with the ratio needed to
/// map it back onto the full-resolution image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedBoundary {
    pub quad: Quadrilateral<Detection>,
    pub scale: ScaleRatio,
    /// Size of the detection copy the quad was measured in.
    pub detection_size: (u32, u32),
}

/// Downscaled, blurred edge map of `image` and the ratio used to produce it.
pub fn edge_map(image: &DynamicImage, config: &DetectionConfig) -> (GrayImage, ScaleRatio) {
    let scale = ScaleRatio::fit(image.width(), image.height(), config.max_dimension);
    let (w, h) = scale.detection_size(image.width(), image.height());
    let small = image::imageops::resize(&image.to_luma8(), w, h, FilterType::Triangle);
    let blurred = gaussian_blur_f32(&small, config.blur_sigma);
    let edges = canny(&blurred, config.canny_low, config.canny_high);
    if config.edge_dilation > 0 {
        (dilate(&edges, Norm::LInf, config.edge_dilation), scale)
    } else {
        (edges, scale)
    }
}

/// Find the largest four-sided outline covering at least `min_area_ratio`
/// of the detection copy, or `None` if there is none.
pub fn detect_boundary(image: &DynamicImage, config: &DetectionConfig) -> Option<DetectedBoundary> {
    let (edges, scale) = edge_map(image, config);
    let detection_size = edges.dimensions();
    let quad = find_quadrilateral(&edges, config)?;
    tracing::debug!(
        ratio = scale.value(),
        top_right = %quad.top_right(),
        top_left = %quad.top_left(),
        bottom_left = %quad.bottom_left(),
        bottom_right = %quad.bottom_right(),
        "document boundary found"
    );
    Some(DetectedBoundary { quad, scale, detection_size })
}

/// Contour search over an edge map in detection space.
pub fn find_quadrilateral(edges: &GrayImage, config: &DetectionConfig) -> Option<Quadrilateral<Detection>> {
    let total_area = edges.width() as f64 * edges.height() as f64;
    let min_area = total_area * config.min_area_ratio;

    let contours = find_contours::<i32>(edges);
    let mut candidates: Vec<(f64, Vec<Point<Detection>>)> = contours
        .iter()
        .map(|c| {
            let points = contour_points::<Detection>(c);
            (shoelace_area(&points), points)
        })
        .filter(|(area, _)| *area >= min_area)
        .collect();
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

    tracing::debug!(
        contours = contours.len(),
        large = candidates.len(),
        min_area,
        "edge contours collected"
    );

    candidates.into_iter().find_map(|(area, points)| {
        let epsilon = config.epsilon_ratio * arc_length(&points, true);
        let approx = approximate_polygon(&points, epsilon);
        tracing::trace!(area, vertices = approx.len(), "contour simplified");
        let vertices: [Point<Detection>; 4] = approx.try_into().ok()?;
        // Simplification can cut corners off a large outline.
        (shoelace_area(&vertices) >= min_area).then(|| Quadrilateral::from_vertices(vertices))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};
    use imageproc::drawing::{draw_filled_rect_mut, draw_polygon_mut};
    use imageproc::point::Point as DrawPoint;
    use imageproc::rect::Rect;

    fn backdrop(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([40, 40, 40]))
    }

    fn near(p: Point<Detection>, x: f64, y: f64, tol: f64) -> bool {
        ((p.x as f64 - x).powi(2) + (p.y as f64 - y).powi(2)).sqrt() <= tol
    }

    #[test]
    fn finds_tilted_sheet_and_orders_corners() {
        let mut img = backdrop(400, 300);
        let sheet = [
            DrawPoint::new(330, 40),  // top-right
            DrawPoint::new(60, 30),   // top-left
            DrawPoint::new(50, 260),  // bottom-left
            DrawPoint::new(345, 270), // bottom-right
        ];
        draw_polygon_mut(&mut img, &sheet, Rgb([230, 230, 230]));

        let config = DetectionConfig::default();
        let found = detect_boundary(&DynamicImage::ImageRgb8(img), &config).expect("boundary");

        assert_eq!(found.scale.value(), 2.5);
        assert_eq!(found.detection_size, (1000, 750));
        let q = found.quad;
        let tol = 12.0;
        assert!(near(q.top_right(), 825.0, 100.0, tol), "{:?}", q);
        assert!(near(q.top_left(), 150.0, 75.0, tol), "{:?}", q);
        assert!(near(q.bottom_left(), 125.0, 650.0, tol), "{:?}", q);
        assert!(near(q.bottom_right(), 862.5, 675.0, tol), "{:?}", q);
    }

    #[test]
    fn returned_quad_always_covers_min_area() {
        let mut img = backdrop(300, 300);
        draw_filled_rect_mut(&mut img, Rect::at(20, 20).of_size(260, 250), Rgb([220, 220, 220]));
        let config = DetectionConfig::default();
        let found = detect_boundary(&DynamicImage::ImageRgb8(img), &config).expect("boundary");

        let (w, h) = found.detection_size;
        let corners = found.quad.corners();
        assert_eq!(corners.len(), 4);
        assert!(shoelace_area(corners) >= 0.3 * w as f64 * h as f64);
    }

    #[test]
    fn small_document_is_ignored() {
        let mut img = backdrop(400, 400);
        draw_filled_rect_mut(&mut img, Rect::at(150, 150).of_size(80, 60), Rgb([230, 230, 230]));
        assert!(detect_boundary(&DynamicImage::ImageRgb8(img), &DetectionConfig::default()).is_none());
    }

    #[test]
    fn uniform_image_has_no_boundary() {
        let img = GrayImage::from_pixel(120, 80, Luma([200]));
        assert!(detect_boundary(&DynamicImage::ImageLuma8(img), &DetectionConfig::default()).is_none());
    }

    #[test]
    fn large_round_shape_is_not_a_document() {
        let mut img = backdrop(300, 300);
        imageproc::drawing::draw_filled_circle_mut(&mut img, (150, 150), 140, Rgb([230, 230, 230]));
        assert!(detect_boundary(&DynamicImage::ImageRgb8(img), &DetectionConfig::default()).is_none());
    }

    #[test]
    fn edge_map_scales_longest_side_to_target() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(2000, 500));
        let (edges, scale) = edge_map(&img, &DetectionConfig::default());
        assert_eq!(edges.dimensions(), (1000, 250));
        assert_eq!(scale.value(), 0.5);
    }
}
