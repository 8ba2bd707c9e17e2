//! The generation run behind [`BatchJob::confirm`](super::BatchJob::confirm).
//!
//! Phases run one after another and, within a phase, one record at a time:
//! AI calls are never issued concurrently. Per-record enrichment failures are
//! logged and skipped; a capture or packaging failure ends the run.

use std::sync::Arc;

use tokio::sync::watch;

use super::package::{Artifact, package};
use super::{
    DONE_LABEL, EnhancementOptions, GenerationProgress, PACKAGING_LABEL, Phase, PhaseWeights,
    compute_weights, progress_at,
};
use crate::error::CardError;
use crate::record::{ImageField, Record, RecordKind};
use crate::render::raster::Raster;
use crate::render::{QrImageService, render};
use crate::template::TemplateDefinition;

pub use crate::enrich::{PhotoEnhancer, TaglineGenerator};
pub use crate::render::raster::CardCapture;

/// Cards are captured at twice their CSS size.
pub const DEFAULT_PIXEL_RATIO: f32 = 2.0;

/// Everything a run needs, handed out when the job enters `Generating`.
#[derive(Debug)]
pub struct GenerationPlan {
    pub kind: RecordKind,
    pub template: TemplateDefinition,
    pub records: Vec<Record>,
    pub options: EnhancementOptions,
    pub progress: watch::Sender<GenerationProgress>,
}

/// Enriched records plus the packaged download.
#[derive(Debug)]
pub struct GenerationOutput {
    pub records: Vec<Record>,
    pub artifact: Artifact,
}

/// Drives a plan through its collaborators.
#[derive(Clone)]
pub struct Generator {
    taglines: Arc<dyn TaglineGenerator>,
    enhancer: Arc<dyn PhotoEnhancer>,
    capture: Arc<dyn CardCapture>,
    qr: Arc<dyn QrImageService>,
    pixel_ratio: f32,
}

struct Reporter<'a> {
    tx: &'a watch::Sender<GenerationProgress>,
    weights: PhaseWeights,
}

impl Reporter<'_> {
    fn phase(&self, phase: Phase) {
        tracing::info!(phase = ?phase, "{}", phase.label());
        self.send(phase.label(), self.weights.offset(phase));
    }

    fn step(&self, phase: Phase, completed: usize, total: usize) {
        self.send(phase.label(), progress_at(&self.weights, phase, completed, total));
    }

    fn send(&self, status: &str, percent: f32) {
        self.tx.send_replace(GenerationProgress {
            percent,
            status: status.to_string(),
        });
    }
}

impl Generator {
    pub fn new(
        taglines: Arc<dyn TaglineGenerator>,
        enhancer: Arc<dyn PhotoEnhancer>,
        capture: Arc<dyn CardCapture>,
        qr: Arc<dyn QrImageService>,
    ) -> Self {
        Self {
            taglines,
            enhancer,
            capture,
            qr,
            pixel_ratio: DEFAULT_PIXEL_RATIO,
        }
    }

    pub fn with_pixel_ratio(mut self, pixel_ratio: f32) -> Self {
        self.pixel_ratio = pixel_ratio;
        self
    }

    pub fn qr(&self) -> &dyn QrImageService {
        self.qr.as_ref()
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    /// Render and capture a single card.
    pub async fn capture_one(
        &self,
        record: &Record,
        template: &TemplateDefinition,
    ) -> Result<image::RgbaImage, CardError> {
        let card = render(record, template, self.qr.as_ref());
        self.capture.capture(&card, self.pixel_ratio).await
    }

    pub async fn run(&self, plan: GenerationPlan) -> Result<GenerationOutput, CardError> {
        let GenerationPlan {
            kind,
            template,
            mut records,
            options,
            progress,
        } = plan;
        let phases = options.phases(kind);
        let reporter = Reporter {
            tx: &progress,
            weights: compute_weights(&phases),
        };
        let total = records.len();

        if phases.contains(&Phase::Taglines) {
            reporter.phase(Phase::Taglines);
            for (i, record) in records.iter_mut().enumerate() {
                let role = record.field("role").unwrap_or_default().to_string();
                let event_name = record.field("eventName").unwrap_or_default().to_string();
                match self.taglines.tagline(&role, &event_name).await {
                    Ok(tagline) => record.set_field("tagline", tagline),
                    Err(e) => {
                        tracing::warn!(name = %record.name(), error = %e, "Failed to generate tagline");
                    }
                }
                reporter.step(Phase::Taglines, i + 1, total);
            }
        }

        if phases.contains(&Phase::Photos) {
            reporter.phase(Phase::Photos);
            for (i, record) in records.iter_mut().enumerate() {
                if let Some(photo) = record.photo().cloned() {
                    match self.enhancer.enhance(&photo).await {
                        Ok(enhanced) => record.set_image(ImageField::Photo, Some(enhanced)),
                        Err(e) => {
                            tracing::warn!(name = %record.name(), error = %e, "Failed to enhance photo");
                        }
                    }
                }
                reporter.step(Phase::Photos, i + 1, total);
            }
        }

        reporter.phase(Phase::Raster);
        let mut rasters = Vec::with_capacity(total);
        for (i, record) in records.iter().enumerate() {
            let image = self.capture_one(record, &template).await?;
            rasters.push(Raster {
                name: record.name().to_string(),
                image,
            });
            reporter.step(Phase::Raster, i + 1, total);
        }

        reporter.send(PACKAGING_LABEL, 100.0);
        let card_size = (template.width, template.height);
        let artifact = tokio::task::spawn_blocking(move || {
            package(options.format, kind, card_size, &rasters)
        })
        .await
        .map_err(|e| CardError::Packaging(format!("Packaging task failed: {}", e)))??;

        reporter.send(DONE_LABEL, 100.0);
        Ok(GenerationOutput { records, artifact })
    }
}
