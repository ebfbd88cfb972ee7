use image::{GrayImage, ImageBuffer, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::morphology::{grayscale_dilate, Mask};
use ticket_core::{BoundingRect, CellIndex, Document, SegmentationConfig, Space};

use crate::clean::invert;
use crate::geometry::{bounding_rect, contour_points};

/// One cropped cell, padded with white, and where it came from.
#[derive(Debug, Clone)]
pub struct Segment {
    pub index: CellIndex,
    pub bounds: BoundingRect<Document>,
    pub image: GrayImage,
}

#[derive(Debug, Clone)]
pub struct SegmentRow {
    pub index: usize,
    pub cells: Vec<Segment>,
}

/// Split a cleaned (black ink on white) document into rows of cells.
pub fn segment(cleaned: &GrayImage, config: &SegmentationConfig) -> Vec<SegmentRow> {
    let kernel = (cleaned.width() / config.dilation_divisor).max(1);
    let dilated = dilate_horizontal(&invert(cleaned), kernel);
    let blobs = blob_bounds(&dilated);
    let rows = group_rows(blobs, config.row_tolerance);

    tracing::debug!(kernel, rows = rows.len(), "document segmented");

    rows.into_iter()
        .enumerate()
        .map(|(r, rects)| SegmentRow {
            index: r,
            cells: rects
                .into_iter()
                .enumerate()
                .map(|(c, bounds)| Segment {
                    index: CellIndex { row: r, column: c },
                    bounds,
                    image: pad_cell(cleaned, bounds, config.cell_padding),
                })
                .collect(),
        })
        .collect()
}

/// Widest structuring element `Mask::from_image` accepts.
const MAX_KERNEL_WIDTH: u32 = 511;

/// Dilate white pixels with a `width` x 1 rectangle anchored at its centre.
/// Widths beyond 511 px are clamped.
pub fn dilate_horizontal(binary: &GrayImage, width: u32) -> GrayImage {
    let width = width.clamp(1, MAX_KERNEL_WIDTH);
    let kernel = GrayImage::from_pixel(width, 1, Luma([255]));
    let mask = Mask::from_image(&kernel, (width / 2) as u8, 0);
    grayscale_dilate(binary, &mask)
}

/// Bounding rectangles of the outermost white blobs; holes are ignored.
pub fn blob_bounds(binary: &GrayImage) -> Vec<BoundingRect<Document>> {
    find_contours::<i32>(binary)
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| bounding_rect(&contour_points::<Document>(c)))
        .collect()
}

/// Group rectangles into rows by top edge, then order each row left to right.
///
/// Rectangles are visited top-down; one joins the open row while its top is
/// within `tolerance` of the mean top of the row's members.
pub fn group_rows<S: Space>(mut rects: Vec<BoundingRect<S>>, tolerance: f64) -> Vec<Vec<BoundingRect<S>>> {
    rects.sort_by_key(|r| (r.y, r.x));

    let mut rows: Vec<Vec<BoundingRect<S>>> = Vec::new();
    for rect in rects {
        match rows.last_mut() {
            Some(row) if (rect.y as f64 - mean_top(row)).abs() < tolerance => row.push(rect),
            _ => rows.push(vec![rect]),
        }
    }
    for row in &mut rows {
        row.sort_by_key(|r| r.x);
    }
    rows
}

fn mean_top<S: Space>(row: &[BoundingRect<S>]) -> f64 {
    row.iter().map(|r| r.y as f64).sum::<f64>() / row.len() as f64
}

/// Crop `bounds` out of the cleaned image and surround it with white.
pub fn pad_cell(cleaned: &GrayImage, bounds: BoundingRect<Document>, padding: u32) -> GrayImage {
    let Some(area) = bounds.clamp_to(cleaned.width(), cleaned.height()) else {
        return GrayImage::from_pixel(2 * padding, 2 * padding, Luma([255]));
    };
    let crop = image::imageops::crop_imm(cleaned, area.x as u32, area.y as u32, area.width, area.height)
        .to_image();
    let mut padded: GrayImage =
        ImageBuffer::from_pixel(area.width + 2 * padding, area.height + 2 * padding, Luma([255]));
    image::imageops::replace(&mut padded, &crop, padding as i64, padding as i64);
    padded
}
