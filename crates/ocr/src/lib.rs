pub mod boundary;
pub mod clean;
pub mod geometry;
pub mod pipeline;
pub mod recognizer;
pub mod rectify;
pub mod scratch;
pub mod segment;

pub use boundary::{detect_boundary, DetectedBoundary};
pub use clean::clean;
pub use pipeline::{arrivals, spawn_intake_watcher, PipelineError, TicketPipeline};
pub use recognizer::{default_backend, MockRecognizer, OcrBackend, OcrError, OcrSession};
pub use rectify::rectify;
pub use scratch::ScratchFile;
pub use segment::{segment, Segment, SegmentRow};

#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractRecognizer;
