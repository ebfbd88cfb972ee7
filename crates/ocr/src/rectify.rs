use image::{DynamicImage, Rgb};
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use ticket_core::{BoundingRect, Full, Point};

use crate::boundary::DetectedBoundary;
use crate::geometry::shoelace_area;

/// Homography taking the detected corners onto the corners of their bounding
/// rectangle, both expressed at full resolution.
pub fn perspective_projection(boundary: &DetectedBoundary) -> Option<Projection> {
    let scale = boundary.scale;
    let quad = &boundary.quad;
    if shoelace_area(quad.corners()) < 1.0 {
        return None;
    }
    let rect = quad.bounding_rect();

    let src = [
        scale.to_full_f32(quad.top_right()),
        scale.to_full_f32(quad.top_left()),
        scale.to_full_f32(quad.bottom_left()),
        scale.to_full_f32(quad.bottom_right()),
    ];
    let dest = [
        scale.to_full_f32(Point::new(rect.right(), rect.y)),
        scale.to_full_f32(Point::new(rect.x, rect.y)),
        scale.to_full_f32(Point::new(rect.x, rect.bottom())),
        scale.to_full_f32(Point::new(rect.right(), rect.bottom())),
    ];
    Projection::from_control_points(src, dest)
}

/// Flatten the document face. The result has the same size as `image`;
/// areas with no source pixel are white.
pub fn warp_to_rectangle(image: &DynamicImage, boundary: &DetectedBoundary) -> Option<DynamicImage> {
    let projection = perspective_projection(boundary)?;
    let warped = warp(&image.to_rgb8(), &projection, Interpolation::Bilinear, Rgb([255, 255, 255]));
    Some(DynamicImage::ImageRgb8(warped))
}

/// Full-resolution region the flattened document occupies.
pub fn document_region(boundary: &DetectedBoundary) -> BoundingRect<Full> {
    boundary.scale.rect_to_full(boundary.quad.bounding_rect())
}

/// Warp and crop to the document. Falls back to the unmodified image when the
/// corners are degenerate or the region falls outside the image.
pub fn rectify(image: &DynamicImage, boundary: &DetectedBoundary) -> DynamicImage {
    let Some(warped) = warp_to_rectangle(image, boundary) else {
        tracing::warn!("degenerate document corners; skipping rectification");
        return image.clone();
    };

    let region = document_region(boundary);
    let Some(crop) = region.clamp_to(warped.width(), warped.height()) else {
        tracing::warn!(?region, "document region outside image; skipping rectification");
        return image.clone();
    };

    tracing::debug!(
        x = crop.x,
        y = crop.y,
        width = crop.width,
        height = crop.height,
        "document cropped"
    );
    warped.crop_imm(crop.x as u32, crop.y as u32, crop.width, crop.height)
}
