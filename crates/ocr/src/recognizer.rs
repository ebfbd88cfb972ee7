use image::{DynamicImage, GrayImage};
use std::io::Cursor;
use thiserror::Error;
use ticket_core::{OcrConfig, OcrToken};

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image encode error: {0}")]
    ImageEncode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Tesseract not available; build with the `tesseract` feature")]
    NotAvailable,
}

/// Abstraction over an OCR engine. A session is opened for one image's batch
/// of cells and dropped when the batch is done.
pub trait OcrBackend: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn OcrSession + '_>, OcrError>;
}

/// A live engine handle. Recognises one cell image at a time.
pub trait OcrSession {
    fn recognize(&mut self, cell: &GrayImage) -> Result<OcrToken, OcrError>;
}

impl<B: OcrBackend + ?Sized> OcrBackend for Box<B> {
    fn open_session(&self) -> Result<Box<dyn OcrSession + '_>, OcrError> {
        (**self).open_session()
    }
}

/// PNG bytes of a cell, the format handed to engines that read from memory.
pub fn encode_png(cell: &GrayImage) -> Result<Vec<u8>, OcrError> {
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(cell.clone())
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| OcrError::ImageEncode(e.to_string()))?;
    Ok(buf)
}

/// The engine compiled into this build.
pub fn default_backend(config: &OcrConfig) -> Result<Box<dyn OcrBackend>, OcrError> {
    #[cfg(feature = "tesseract")]
    {
        Ok(Box::new(tesseract_backend::TesseractRecognizer::new(config.clone())))
    }
    #[cfg(not(feature = "tesseract"))]
    {
        let _ = config;
        Err(OcrError::NotAvailable)
    }
}

// ── Mock backend (always available, used for tests) ───────────────────────────

#[derive(Debug, Clone)]
enum Script {
    /// Same text for every cell.
    Constant(String),
    /// One entry per cell in recognition order; empty once exhausted.
    /// `None` makes that call fail.
    Sequence(Vec<Option<String>>),
    /// Opening a session fails.
    Unavailable,
}

/// Returns pre-set text, so the pipeline can be tested without Tesseract.
#[derive(Debug, Clone)]
pub struct MockRecognizer {
    script: Script,
    confidence: f32,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { script: Script::Constant(text.into()), confidence: 0.9 }
    }

    /// Answer each cell of a session in turn.
    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let seq = responses.into_iter().map(|s| Some(s.into())).collect();
        Self { script: Script::Sequence(seq), confidence: 0.9 }
    }

    /// Like `scripted`, but `None` entries fail with an engine error.
    pub fn scripted_with_failures(responses: Vec<Option<&str>>) -> Self {
        let seq = responses.into_iter().map(|r| r.map(str::to_string)).collect();
        Self { script: Script::Sequence(seq), confidence: 0.9 }
    }

    pub fn unavailable() -> Self {
        Self { script: Script::Unavailable, confidence: 0.0 }
    }
}

struct MockSession<'a> {
    recognizer: &'a MockRecognizer,
    calls: usize,
}

impl OcrBackend for MockRecognizer {
    fn open_session(&self) -> Result<Box<dyn OcrSession + '_>, OcrError> {
        match self.script {
            Script::Unavailable => Err(OcrError::Engine("mock engine unavailable".to_string())),
            _ => Ok(Box::new(MockSession { recognizer: self, calls: 0 })),
        }
    }
}

impl OcrSession for MockSession<'_> {
    fn recognize(&mut self, _cell: &GrayImage) -> Result<OcrToken, OcrError> {
        let call = self.calls;
        self.calls += 1;
        let confidence = self.recognizer.confidence;
        match &self.recognizer.script {
            Script::Constant(text) => Ok(OcrToken::new(text.clone(), confidence)),
            Script::Sequence(seq) => match seq.get(call) {
                Some(Some(text)) => Ok(OcrToken::new(text.clone(), confidence)),
                Some(None) => Err(OcrError::Engine(format!("mock failure on cell {call}"))),
                None => Ok(OcrToken::empty()),
            },
            Script::Unavailable => Err(OcrError::NotAvailable),
        }
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{encode_png, OcrBackend, OcrError, OcrSession};
    use image::GrayImage;
    use leptess::{LepTess, Variable};
    use ticket_core::{OcrConfig, OcrToken};

    pub struct TesseractRecognizer {
        config: OcrConfig,
    }

    impl TesseractRecognizer {
        pub fn new(config: OcrConfig) -> Self {
            Self { config }
        }
    }

    struct TesseractSession {
        engine: LepTess,
    }

    impl OcrBackend for TesseractRecognizer {
        fn open_session(&self) -> Result<Box<dyn OcrSession + '_>, OcrError> {
            let mut engine = LepTess::new(self.config.data_path.as_deref(), &self.config.language)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            if !self.config.whitelist.is_empty() {
                engine
                    .set_variable(Variable::TesseditCharWhitelist, &self.config.whitelist)
                    .map_err(|e| OcrError::Engine(e.to_string()))?;
            }
            Ok(Box::new(TesseractSession { engine }))
        }
    }

    impl OcrSession for TesseractSession {
        fn recognize(&mut self, cell: &GrayImage) -> Result<OcrToken, OcrError> {
            let png = encode_png(cell)?;
            self.engine
                .set_image_from_mem(&png)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            let text = self.engine.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))?;
            let confidence = self.engine.mean_text_conf() as f32 / 100.0;
            Ok(OcrToken::new(text, confidence))
        }
    }
}
