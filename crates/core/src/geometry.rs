use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// A pixel coordinate space. Points and rectangles carry their space in the
/// type so a detection-scale coordinate can never index a full-size buffer.
pub trait Space: Copy + Eq + Hash + Default + fmt::Debug + 'static {
    const NAME: &'static str;
}

/// The downscaled copy used for edge and contour detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Detection;

/// The full-resolution input image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Full;

/// The rectified document crop that cleaning and segmentation work on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Document;

impl Space for Detection {
    const NAME: &'static str = "detection";
}

impl Space for Full {
    const NAME: &'static str = "full";
}

impl Space for Document {
    const NAME: &'static str = "document";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point<S: Space> {
    pub x: i32,
    pub y: i32,
    space: PhantomData<S>,
}

impl<S: Space> Point<S> {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y, space: PhantomData }
    }
}

impl<S: Space> fmt::Display for Point<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})@{}", self.x, self.y, S::NAME)
    }
}

/// Axis-aligned rectangle. `right()`/`bottom()` are exclusive edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingRect<S: Space> {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    space: PhantomData<S>,
}

impl<S: Space> BoundingRect<S> {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height, space: PhantomData }
    }

    /// Smallest rectangle containing every point, or `None` for an empty slice.
    pub fn enclosing(points: &[Point<S>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(
            min_x,
            min_y,
            (max_x - min_x + 1) as u32,
            (max_y - min_y + 1) as u32,
        ))
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Intersect with an image of the given size. `None` when nothing remains.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let x0 = self.x.clamp(0, width as i32);
        let y0 = self.y.clamp(0, height as i32);
        let x1 = self.right().clamp(0, width as i32);
        let y1 = self.bottom().clamp(0, height as i32);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

/// Four document corners in the fixed order top-right, top-left,
/// bottom-left, bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quadrilateral<S: Space> {
    corners: [Point<S>; 4],
}

impl<S: Space> Quadrilateral<S> {
    /// Build from four vertices in any traversal order.
    pub fn from_vertices(vertices: [Point<S>; 4]) -> Self {
        let cx = vertices.iter().map(|p| p.x as f64).sum::<f64>() / 4.0;
        let cy = vertices.iter().map(|p| p.y as f64).sum::<f64>() / 4.0;

        // With y pointing down, descending atan2 walks counter-clockwise on
        // screen: top-right -> top-left -> bottom-left -> bottom-right.
        let mut sorted = vertices;
        sorted.sort_by(|a, b| {
            let ta = (a.y as f64 - cy).atan2(a.x as f64 - cx);
            let tb = (b.y as f64 - cy).atan2(b.x as f64 - cx);
            tb.total_cmp(&ta)
        });

        let start = (0..4)
            .max_by(|&i, &j| {
                let ki = (sorted[i].x as f64 - cx) - (sorted[i].y as f64 - cy);
                let kj = (sorted[j].x as f64 - cx) - (sorted[j].y as f64 - cy);
                ki.total_cmp(&kj)
            })
            .unwrap_or(0);
        sorted.rotate_left(start);

        Self { corners: sorted }
    }

    pub fn corners(&self) -> &[Point<S>; 4] {
        &self.corners
    }

    pub fn top_right(&self) -> Point<S> {
        self.corners[0]
    }

    pub fn top_left(&self) -> Point<S> {
        self.corners[1]
    }

    pub fn bottom_left(&self) -> Point<S> {
        self.corners[2]
    }

    pub fn bottom_right(&self) -> Point<S> {
        self.corners[3]
    }

    pub fn bounding_rect(&self) -> BoundingRect<S> {
        let c = &self.corners;
        let min_x = c.iter().map(|p| p.x).min().unwrap_or(0);
        let min_y = c.iter().map(|p| p.y).min().unwrap_or(0);
        let max_x = c.iter().map(|p| p.x).max().unwrap_or(0);
        let max_y = c.iter().map(|p| p.y).max().unwrap_or(0);
        BoundingRect::new(
            min_x,
            min_y,
            (max_x - min_x + 1) as u32,
            (max_y - min_y + 1) as u32,
        )
    }
}

/// Ratio between the detection copy and the full-resolution image
/// (`detection = full * ratio`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleRatio(f64);

impl ScaleRatio {
    /// Ratio that brings the larger of `width`/`height` to `target`.
    pub fn fit(width: u32, height: u32, target: u32) -> Self {
        let longest = width.max(height).max(1);
        ScaleRatio(target as f64 / longest as f64)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Dimensions of the detection copy for a full image of the given size.
    pub fn detection_size(self, width: u32, height: u32) -> (u32, u32) {
        let w = (width as f64 * self.0).round().max(1.0) as u32;
        let h = (height as f64 * self.0).round().max(1.0) as u32;
        (w, h)
    }

    /// Sub-pixel full-resolution position of a detection point.
    pub fn to_full_f32(self, p: Point<Detection>) -> (f32, f32) {
        ((p.x as f64 / self.0) as f32, (p.y as f64 / self.0) as f32)
    }

    pub fn rect_to_full(self, rect: BoundingRect<Detection>) -> BoundingRect<Full> {
        BoundingRect::new(
            (rect.x as f64 / self.0) as i32,
            (rect.y as f64 / self.0) as i32,
            (rect.width as f64 / self.0) as u32,
            (rect.height as f64 / self.0) as u32,
        )
    }
}
