pub mod config;
pub mod filter;
pub mod geometry;
pub mod types;

pub use config::{
    CleaningConfig, ConfigError, DetectionConfig, OcrConfig, PipelineConfig, SegmentationConfig,
};
pub use filter::{filter_row, tokenize, validate_row, FilterStrategy};
pub use geometry::{BoundingRect, Detection, Document, Full, Point, Quadrilateral, ScaleRatio, Space};
pub use types::{CellIndex, ExtractionResult, OcrToken, Row, ValidatedRow};
