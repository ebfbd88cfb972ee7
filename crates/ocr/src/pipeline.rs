use image::DynamicImage;
use std::path::{Path, PathBuf};
use thiserror::Error;
use ticket_core::{validate_row, ExtractionResult, OcrToken, PipelineConfig, Row};
use tokio::sync::mpsc;

use crate::boundary::detect_boundary;
use crate::clean::clean;
use crate::recognizer::{OcrBackend, OcrError, OcrSession};
use crate::rectify::rectify;
use crate::scratch::ScratchFile;
use crate::segment::{segment, SegmentRow};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unreadable image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("OCR session failed: {0}")]
    Ocr(#[from] OcrError),
}

/// Orchestrates: decode → boundary → rectify → clean → segment → OCR → filter.
///
/// Holds no per-image state, so one instance can serve concurrent requests.
pub struct TicketPipeline<R: OcrBackend> {
    recognizer: R,
    config: PipelineConfig,
}

impl<R: OcrBackend> TicketPipeline<R> {
    pub fn new(recognizer: R, config: PipelineConfig) -> Self {
        Self { recognizer, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage on a decoded image.
    pub fn extract(&self, image: &DynamicImage) -> Result<ExtractionResult, PipelineError> {
        let boundary = detect_boundary(image, &self.config.detection);
        let rectified = boundary.is_some();
        let document = match &boundary {
            Some(b) => rectify(image, b),
            None => {
                tracing::warn!(
                    width = image.width(),
                    height = image.height(),
                    "no document boundary found; using the whole image"
                );
                image.clone()
            }
        };

        let cleaned = clean(&document, &self.config.cleaning);
        let segments = segment(&cleaned, &self.config.segmentation);

        let rows = if segments.is_empty() {
            Vec::new()
        } else {
            let mut session = self.recognizer.open_session()?;
            recognize_rows(session.as_mut(), &segments)
        };

        let result = ExtractionResult {
            rows: rows.iter().map(|row| validate_row(row, self.config.filter)).collect(),
            rectified,
        };
        tracing::info!(
            rectified,
            rows = result.rows.len(),
            numbers = result.number_count(),
            "ticket extracted"
        );
        Ok(result)
    }

    /// Decode raw bytes (a downloaded attachment) and extract.
    pub fn process_bytes(&self, data: &[u8]) -> Result<ExtractionResult, PipelineError> {
        let image = image::load_from_memory(data)?;
        self.extract(&image)
    }

    /// Extract from a scratch file. The file is removed before this returns,
    /// on success and on failure alike.
    pub fn process_scratch(&self, scratch: ScratchFile) -> Result<ExtractionResult, PipelineError> {
        let data = scratch.read()?;
        self.process_bytes(&data)
    }
}

/// Recognise every cell through one session. A failed cell reads as empty.
fn recognize_rows(session: &mut dyn OcrSession, segments: &[SegmentRow]) -> Vec<Row> {
    segments
        .iter()
        .map(|seg_row| {
            let mut row = Row::new(seg_row.index);
            for cell in &seg_row.cells {
                let token = session.recognize(&cell.image).unwrap_or_else(|e| {
                    tracing::warn!(
                        row = cell.index.row,
                        column = cell.index.column,
                        error = %e,
                        "cell recognition failed"
                    );
                    OcrToken::empty()
                });
                row.tokens.push(token);
            }
            row
        })
        .collect()
}

// ── Watch-folder integration ──────────────────────────────────────────────────

/// Paths an event announces as (possibly) ready to read: creations, files
/// closed after writing, and files renamed into the folder.
pub fn arrivals(event: notify::Event) -> Vec<PathBuf> {
    use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
    use notify::EventKind;

    match event.kind {
        EventKind::Create(_) | EventKind::Access(AccessKind::Close(AccessMode::Write)) => event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths,
        // Both carries [from, to].
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.into_iter().last().into_iter().collect()
        }
        _ => Vec::new(),
    }
}

/// Spawn a notify watcher on `watch_dir` that sends arriving file paths to `tx`.
/// A file can be reported more than once (created, then closed), so the
/// receiver de-duplicates. The returned watcher must be kept alive.
pub fn spawn_intake_watcher(
    watch_dir: &Path,
    tx: mpsc::Sender<PathBuf>,
) -> notify::Result<impl notify::Watcher> {
    use notify::{RecursiveMode, Watcher};

    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        match event {
            Ok(ev) => {
                for path in arrivals(ev) {
                    if let Err(e) = tx.try_send(path) {
                        tracing::warn!(error = %e, "intake queue full; dropping file event");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "intake watcher error"),
        }
    })?;

    watcher.watch(watch_dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::MockRecognizer;
    use image::{ImageBuffer, Luma, Rgb, RgbImage};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;
    use std::io::Cursor;
    use std::time::Duration;

    /// White page, three ink blobs near y=50 and two near y=200.
    fn grid_page() -> DynamicImage {
        let mut img = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
        for (x, y) in [(300, 50), (40, 53), (170, 48), (250, 200), (60, 202)] {
            draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(40, 20), Rgb([10, 10, 10]));
        }
        DynamicImage::ImageRgb8(img)
    }

    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png).unwrap();
        buf
    }

    fn pipeline(recognizer: MockRecognizer) -> TicketPipeline<MockRecognizer> {
        TicketPipeline::new(recognizer, PipelineConfig::default())
    }

    fn rows(result: &ExtractionResult) -> Vec<Vec<&str>> {
        result
            .rows
            .iter()
            .map(|r| r.numbers().iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn page_without_boundary_is_segmented_directly() {
        // Cells are recognised row by row, left to right.
        let p = pipeline(MockRecognizer::scripted(["04", "12", "7", "09 23", "55"]));
        let result = p.extract(&grid_page()).unwrap();

        assert!(!result.rectified);
        assert_eq!(rows(&result), vec![vec!["04", "12"], vec!["09", "23", "55"]]);
        assert_eq!(result.to_reply(), "04 12\n09 23 55");
    }

    #[test]
    fn empty_ocr_keeps_empty_rows() {
        let result = pipeline(MockRecognizer::new("")).extract(&grid_page()).unwrap();
        assert_eq!(result.rows.len(), 2);
        assert!(result.rows.iter().all(|r| r.is_empty()));
        assert_eq!(result.to_reply(), "\n");
    }

    #[test]
    fn failed_cells_read_as_empty() {
        let p = pipeline(MockRecognizer::scripted_with_failures(vec![
            Some("04"),
            None,
            Some("23"),
            Some("31"),
            None,
        ]));
        let result = p.extract(&grid_page()).unwrap();
        assert_eq!(rows(&result), vec![vec!["04", "23"], vec!["31"]]);
    }

    #[test]
    fn unavailable_engine_fails_the_invocation() {
        let err = pipeline(MockRecognizer::unavailable()).extract(&grid_page()).unwrap_err();
        assert!(matches!(err, PipelineError::Ocr(_)));
    }

    #[test]
    fn blank_page_needs_no_engine() {
        let blank = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(200, 150, Luma([255u8])));
        let result = pipeline(MockRecognizer::unavailable()).extract(&blank).unwrap();
        assert!(result.rows.is_empty());
        assert_eq!(result.to_reply(), "");
    }

    #[test]
    fn trailing_maximum_strategy_is_configurable() {
        let mut config = PipelineConfig::default();
        config.filter = ticket_core::FilterStrategy::TrailingMaximum;
        let p = TicketPipeline::new(MockRecognizer::scripted(["10", "30", "20", "05", "50"]), config);
        let result = p.extract(&grid_page()).unwrap();
        // Row 0 ends in 20, not its maximum, so 20 is dropped.
        assert_eq!(rows(&result), vec![vec!["10", "30"], vec!["05", "50"]]);
    }

    #[test]
    fn sheet_on_dark_background_is_rectified() {
        let mut img = RgbImage::from_pixel(400, 300, Rgb([60, 60, 60]));
        draw_filled_rect_mut(&mut img, Rect::at(40, 30).of_size(320, 240), Rgb([255, 255, 255]));
        draw_filled_rect_mut(&mut img, Rect::at(120, 120).of_size(40, 20), Rgb([0, 0, 0]));
        let result = pipeline(MockRecognizer::new("42")).extract(&DynamicImage::ImageRgb8(img)).unwrap();

        assert!(result.rectified);
        assert!(!result.rows.is_empty());
        assert!(result.rows.iter().flat_map(|r| r.numbers()).all(|n| n == "42"));
    }

    #[test]
    fn process_bytes_decodes_png() {
        let p = pipeline(MockRecognizer::new("11"));
        let result = p.process_bytes(&png_bytes(&grid_page())).unwrap();
        // Equal values are non-decreasing, so repeats survive.
        assert_eq!(rows(&result), vec![vec!["11", "11", "11"], vec!["11", "11"]]);
    }

    #[test]
    fn unreadable_bytes_are_a_decode_error() {
        let err = pipeline(MockRecognizer::new("11")).process_bytes(b"definitely not an image").unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
        assert!(err.to_string().starts_with("Unreadable image"));
    }

    #[test]
    fn scratch_file_is_removed_on_success_and_failure() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(MockRecognizer::new("11"));

        let good = ScratchFile::persist(dir.path(), &png_bytes(&grid_page()), "png").unwrap();
        let good_path = good.path().to_path_buf();
        assert!(p.process_scratch(good).is_ok());
        assert!(!good_path.exists());

        let bad = ScratchFile::persist(dir.path(), b"garbage", "jpg").unwrap();
        let bad_path = bad.path().to_path_buf();
        assert!(matches!(p.process_scratch(bad), Err(PipelineError::Decode(_))));
        assert!(!bad_path.exists());
    }

    #[test]
    fn missing_scratch_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::adopt(dir.path().join("never-written.png"));
        let err = pipeline(MockRecognizer::new("11")).process_scratch(scratch).unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }

    #[test]
    fn arrivals_cover_creation_close_and_rename_in() {
        use notify::event::{AccessKind, AccessMode, CreateKind, DataChange, ModifyKind, RenameMode};
        use notify::{Event, EventKind};

        let p = PathBuf::from("/intake/ticket.png");
        let old = PathBuf::from("/intake/.ticket.part");
        let ev = |kind| Event::new(kind).add_path(p.clone());

        assert_eq!(arrivals(ev(EventKind::Create(CreateKind::File))), vec![p.clone()]);
        assert_eq!(
            arrivals(ev(EventKind::Access(AccessKind::Close(AccessMode::Write)))),
            vec![p.clone()]
        );
        assert_eq!(arrivals(ev(EventKind::Modify(ModifyKind::Name(RenameMode::To)))), vec![p.clone()]);
        let both = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(old.clone())
            .add_path(p.clone());
        assert_eq!(arrivals(both), vec![p.clone()]);

        assert!(arrivals(ev(EventKind::Modify(ModifyKind::Data(DataChange::Content)))).is_empty());
        assert!(arrivals(ev(EventKind::Modify(ModifyKind::Name(RenameMode::From)))).is_empty());
        assert!(arrivals(ev(EventKind::Access(AccessKind::Close(AccessMode::Read)))).is_empty());
    }

    #[tokio::test]
    async fn intake_watcher_reports_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let _watcher = spawn_intake_watcher(dir.path(), tx).unwrap();

        let path = dir.path().join("ticket.png");
        tokio::fs::write(&path, png_bytes(&grid_page())).await.unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher event")
            .expect("channel open");
        assert_eq!(seen.file_name(), path.file_name());
    }
}
