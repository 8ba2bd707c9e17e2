//! Bulk card generation.
//!
//! A [`BatchJob`] walks one import through review, template choice and
//! enhancement options to a packaged download:
//!
//! ```text
//! Idle -> Imported -> Reviewing -> TemplateSelected -> EnhancementConfigured
//!      -> Generating -> Done
//! ```
//!
//! `Error` is reachable from a failed import and from a failed run. Every
//! transition except `Generating -> Done/Error` is operator driven; the run
//! itself happens in [`pipeline::Generator`] outside the job so the job can
//! stay behind a lock while the run reports progress through a watch channel.

pub mod import;
pub mod package;
pub mod photos;
pub mod pipeline;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::CardError;
use crate::record::{ImageField, ImageSource, Record, RecordKind};
use crate::render::raster::ImageLoader;
use crate::template::TemplateDefinition;

pub use import::{ImportError, ImportOptions, parse_records};
pub use package::{Artifact, CardFormat, OutputFormat, package};
pub use photos::{PhotoProgress, PhotoTasks, PhotoWatch, PlaceholderStyle, placeholder};
pub use pipeline::{GenerationOutput, GenerationPlan, Generator};

/// Shown for any failure during generation or packaging.
pub const GENERATION_FAILED: &str = "An error occurred while generating the files.";

// ============================================================================
// Progress
// ============================================================================

/// Generation phases in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Taglines,
    Photos,
    Raster,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Taglines => "Generating AI taglines...",
            Phase::Photos => "Enhancing photos...",
            Phase::Raster => "Creating ID cards...",
        }
    }
}

pub const PACKAGING_LABEL: &str = "Packaging files...";
pub const DONE_LABEL: &str = "Download complete!";

/// Base weight of each phase before renormalisation.
const PHASE_WEIGHTS: [(Phase, f32); 3] = [
    (Phase::Taglines, 40.0),
    (Phase::Photos, 40.0),
    (Phase::Raster, 20.0),
];

/// Share of the 0..100 progress bar each enabled phase owns.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseWeights {
    /// (phase, offset, weight) in run order.
    spans: Vec<(Phase, f32, f32)>,
}

impl PhaseWeights {
    pub fn weight(&self, phase: Phase) -> f32 {
        self.span(phase).map(|(_, w)| w).unwrap_or(0.0)
    }

    pub fn offset(&self, phase: Phase) -> f32 {
        self.span(phase).map(|(o, _)| o).unwrap_or(0.0)
    }

    fn span(&self, phase: Phase) -> Option<(f32, f32)> {
        self.spans
            .iter()
            .find(|(p, _, _)| *p == phase)
            .map(|(_, o, w)| (*o, *w))
    }
}

/// Renormalise the base weights of `enabled` phases to sum to 100.
pub fn compute_weights(enabled: &[Phase]) -> PhaseWeights {
    let active: Vec<(Phase, f32)> = PHASE_WEIGHTS
        .iter()
        .copied()
        .filter(|(phase, _)| enabled.contains(phase))
        .collect();
    let total: f32 = active.iter().map(|(_, w)| w).sum();
    let mut offset = 0.0;
    let spans = active
        .into_iter()
        .map(|(phase, base)| {
            let weight = if total > 0.0 { base / total * 100.0 } else { 0.0 };
            let span = (phase, offset, weight);
            offset += weight;
            span
        })
        .collect();
    PhaseWeights { spans }
}

/// Progress after `completed` of `total` records in `phase`.
pub fn progress_at(weights: &PhaseWeights, phase: Phase, completed: usize, total: usize) -> f32 {
    let fraction = if total == 0 {
        1.0
    } else {
        completed.min(total) as f32 / total as f32
    };
    weights.offset(phase) + fraction * weights.weight(phase)
}

/// Published while a run is in flight.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationProgress {
    pub percent: f32,
    pub status: String,
}

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnhancementOptions {
    /// Generate taglines (event batches only).
    pub taglines: bool,
    pub enhance_photos: bool,
    pub format: OutputFormat,
}

impl EnhancementOptions {
    /// Phases a run with these options goes through, in order.
    pub fn phases(&self, kind: RecordKind) -> Vec<Phase> {
        let mut phases = Vec::with_capacity(3);
        if self.taglines && kind == RecordKind::Event {
            phases.push(Phase::Taglines);
        }
        if self.enhance_photos {
            phases.push(Phase::Photos);
        }
        phases.push(Phase::Raster);
        phases
    }
}

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "camelCase")]
pub enum BatchState {
    #[default]
    Idle,
    Imported,
    Reviewing,
    TemplateSelected,
    EnhancementConfigured,
    Generating,
    Done,
    Error(String),
}

impl BatchState {
    pub fn name(&self) -> &'static str {
        match self {
            BatchState::Idle => "idle",
            BatchState::Imported => "imported",
            BatchState::Reviewing => "reviewing",
            BatchState::TemplateSelected => "template selected",
            BatchState::EnhancementConfigured => "enhancement configured",
            BatchState::Generating => "generating",
            BatchState::Done => "done",
            BatchState::Error(_) => "in error",
        }
    }

    /// Records may still be edited and the run reconfigured.
    fn is_editable(&self) -> bool {
        matches!(
            self,
            BatchState::Imported
                | BatchState::Reviewing
                | BatchState::TemplateSelected
                | BatchState::EnhancementConfigured
        )
    }
}

/// Snapshot served to the review UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub state: BatchState,
    pub kind: RecordKind,
    pub records: usize,
    pub photos: PhotoProgress,
    pub template_id: Option<String>,
    pub options: EnhancementOptions,
    pub progress: GenerationProgress,
    pub download: Option<String>,
}

/// One bulk run, from import to download.
pub struct BatchJob {
    state: BatchState,
    kind: RecordKind,
    records: Vec<Record>,
    template: Option<TemplateDefinition>,
    options: EnhancementOptions,
    placeholder_style: PlaceholderStyle,
    photos: Option<PhotoTasks>,
    progress: Option<watch::Receiver<GenerationProgress>>,
    artifact: Option<Artifact>,
}

impl Default for BatchJob {
    fn default() -> Self {
        Self::new(PlaceholderStyle::default())
    }
}

impl BatchJob {
    pub fn new(placeholder_style: PlaceholderStyle) -> Self {
        Self {
            state: BatchState::Idle,
            kind: RecordKind::Student,
            records: Vec::new(),
            template: None,
            options: EnhancementOptions::default(),
            placeholder_style,
            photos: None,
            progress: None,
            artifact: None,
        }
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn template(&self) -> Option<&TemplateDefinition> {
        self.template.as_ref()
    }

    pub fn options(&self) -> EnhancementOptions {
        self.options
    }

    pub fn placeholder_style(&self) -> &PlaceholderStyle {
        &self.placeholder_style
    }

    fn invalid(&self, action: &'static str) -> CardError {
        CardError::InvalidTransition {
            action,
            state: self.state.name(),
        }
    }

    /// Start over from CSV text. Any previous job is dropped wholesale,
    /// including photo fetches still in flight. Must run inside a tokio
    /// runtime.
    pub fn import(
        &mut self,
        kind: RecordKind,
        csv: &str,
        options: &ImportOptions,
        loader: Arc<dyn ImageLoader>,
    ) -> Result<usize, CardError> {
        if self.state == BatchState::Generating {
            return Err(self.invalid("import"));
        }
        *self = Self::new(self.placeholder_style.clone());
        self.kind = kind;
        match parse_records(kind, csv, options) {
            Ok(records) => {
                self.photos = Some(PhotoTasks::spawn(&records, loader, &self.placeholder_style));
                self.records = records;
                self.state = BatchState::Imported;
                Ok(self.records.len())
            }
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "Import failed");
                self.state = BatchState::Error(e.to_string());
                Err(e.into())
            }
        }
    }

    pub fn begin_review(&mut self) -> Result<(), CardError> {
        match self.state {
            BatchState::Imported | BatchState::Reviewing => {
                self.state = BatchState::Reviewing;
                self.poll_photos();
                Ok(())
            }
            _ => Err(self.invalid("review")),
        }
    }

    fn apply_photos(&mut self, results: Vec<(usize, photos::PhotoOutcome)>) {
        for (index, outcome) in results {
            if let Some(record) = self.records.get_mut(index) {
                record.set_image(ImageField::Photo, Some(outcome.into_image()));
            }
        }
    }

    /// Apply photo fetches that have finished and report the count.
    pub fn poll_photos(&mut self) -> PhotoProgress {
        let results = self.photos.as_mut().map(PhotoTasks::poll).unwrap_or_default();
        self.apply_photos(results);
        self.photo_progress()
    }

    /// Wait for every outstanding photo fetch.
    pub async fn settle_photos(&mut self) -> PhotoProgress {
        let results = match self.photos.as_mut() {
            Some(tasks) => tasks.wait().await,
            None => Vec::new(),
        };
        self.apply_photos(results);
        self.photo_progress()
    }

    /// Signal for the outstanding photo fetches, for callers that must not
    /// hold the job while waiting.
    pub fn photo_watch(&self) -> Option<PhotoWatch> {
        self.photos.as_ref().map(PhotoTasks::watch)
    }

    pub fn photo_progress(&self) -> PhotoProgress {
        self.photos.as_ref().map(PhotoTasks::progress).unwrap_or(PhotoProgress {
            resolved: self.records.len(),
            total: self.records.len(),
        })
    }

    /// Replace one record's photo by hand. A fetch still running for that
    /// row is ignored when it lands.
    pub fn replace_photo(&mut self, index: usize, image: ImageSource) -> Result<(), CardError> {
        if !self.state.is_editable() {
            return Err(self.invalid("replace a photo"));
        }
        let record = self
            .records
            .get_mut(index)
            .ok_or(CardError::UnknownRecord(index))?;
        record.set_image(ImageField::Photo, Some(image));
        if let Some(tasks) = self.photos.as_mut() {
            tasks.claim(index);
        }
        Ok(())
    }

    /// Change the placeholder colour settings and redraw the placeholder of
    /// every record imported without a photo URL.
    pub fn regenerate_placeholders(&mut self, style: PlaceholderStyle) -> usize {
        self.placeholder_style = style;
        let mut count = 0;
        for (index, record) in self.records.iter_mut().enumerate() {
            if record.photo_url().is_some() {
                continue;
            }
            let image = placeholder(record.name(), &self.placeholder_style);
            record.set_image(ImageField::Photo, Some(image));
            if let Some(tasks) = self.photos.as_mut() {
                tasks.claim(index);
            }
            count += 1;
        }
        count
    }

    /// Pick the card layout. Review cannot be left while photo fetches are
    /// still outstanding; a manual replacement counts as resolved.
    pub fn select_template(&mut self, template: TemplateDefinition) -> Result<(), CardError> {
        match self.state {
            BatchState::Reviewing
            | BatchState::TemplateSelected
            | BatchState::EnhancementConfigured => {
                template.ensure_kind(self.kind)?;
                self.poll_photos();
                if self.photos.as_ref().is_some_and(|p| !p.is_complete()) {
                    return Err(CardError::InvalidTransition {
                        action: "select a template",
                        state: "loading photos",
                    });
                }
                tracing::info!(template = %template.id, "Batch template selected");
                self.template = Some(template);
                self.state = BatchState::TemplateSelected;
                Ok(())
            }
            _ => Err(self.invalid("select a template")),
        }
    }

    /// Set AI toggles and output format. Taglines only apply to events.
    pub fn configure(&mut self, mut options: EnhancementOptions) -> Result<(), CardError> {
        match self.state {
            BatchState::TemplateSelected | BatchState::EnhancementConfigured => {
                if self.kind != RecordKind::Event {
                    options.taglines = false;
                }
                self.options = options;
                self.state = BatchState::EnhancementConfigured;
                Ok(())
            }
            _ => Err(self.invalid("configure enhancements")),
        }
    }

    /// Enter `Generating` and hand out everything a run needs. Records are
    /// copied with whatever photos have resolved so far.
    pub fn confirm(&mut self) -> Result<GenerationPlan, CardError> {
        if self.state != BatchState::EnhancementConfigured {
            return Err(self.invalid("generate"));
        }
        let Some(template) = self.template.clone() else {
            return Err(self.invalid("generate"));
        };
        self.poll_photos();
        let (tx, rx) = watch::channel(GenerationProgress::default());
        self.progress = Some(rx);
        self.artifact = None;
        self.state = BatchState::Generating;
        tracing::info!(records = self.records.len(), phases = ?self.options.phases(self.kind), "Batch generation started");
        Ok(GenerationPlan {
            kind: self.kind,
            template,
            records: self.records.clone(),
            options: self.options,
            progress: tx,
        })
    }

    /// Record the outcome of a run. Failures collapse to one generic message
    /// and nothing is offered for download.
    pub fn finish(&mut self, result: Result<GenerationOutput, CardError>) -> Result<(), CardError> {
        if self.state != BatchState::Generating {
            return Err(self.invalid("finish"));
        }
        match result {
            Ok(output) => {
                tracing::info!(file = %output.artifact.file_name, "Batch generation complete");
                self.records = output.records;
                self.artifact = Some(output.artifact);
                self.state = BatchState::Done;
            }
            Err(e) => {
                tracing::error!(error = %e, "Batch generation failed");
                self.artifact = None;
                self.state = BatchState::Error(GENERATION_FAILED.to_string());
            }
        }
        Ok(())
    }

    pub fn progress(&self) -> GenerationProgress {
        self.progress
            .as_ref()
            .map(|rx| rx.borrow().clone())
            .unwrap_or_default()
    }

    /// The packaged file, once the run is done.
    pub fn artifact(&self) -> Option<&Artifact> {
        match self.state {
            BatchState::Done => self.artifact.as_ref(),
            _ => None,
        }
    }

    /// Drop everything and go back to `Idle`.
    pub fn reset(&mut self) {
        *self = Self::new(self.placeholder_style.clone());
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            state: self.state.clone(),
            kind: self.kind,
            records: self.records.len(),
            photos: self.photo_progress(),
            template_id: self.template.as_ref().map(|t| t.id.clone()),
            options: self.options,
            progress: self.progress(),
            download: self.artifact().map(|a| a.file_name.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::catalog;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use tokio::sync::Semaphore;

    struct NoFetch;

    #[async_trait]
    impl ImageLoader for NoFetch {
        async fn load(&self, src: &str) -> Result<ImageSource, CardError> {
            Err(CardError::Image(format!("offline: {}", src)))
        }
    }

    const EVENTS: &str = "name,role,eventName,eventDate,photoURL\n\
        Priya,Speaker,TechFest,2025-12-05,https://x/p.png\n\
        Ravi,Volunteer,TechFest,2025-12-05,\n";

    fn imported() -> BatchJob {
        let mut job = BatchJob::default();
        job.import(RecordKind::Event, EVENTS, &ImportOptions::default(), Arc::new(NoFetch))
            .unwrap();
        job
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_weights_all_phases() {
        let w = compute_weights(&[Phase::Taglines, Phase::Photos, Phase::Raster]);
        assert!(approx(w.weight(Phase::Taglines), 40.0));
        assert!(approx(w.offset(Phase::Photos), 40.0));
        assert!(approx(w.offset(Phase::Raster), 80.0));
    }

    #[test]
    fn test_weights_renormalise_skipped_phases() {
        let w = compute_weights(&[Phase::Photos, Phase::Raster]);
        assert!(approx(w.weight(Phase::Taglines), 0.0));
        assert!(approx(w.weight(Phase::Photos), 200.0 / 3.0));
        assert!(approx(w.weight(Phase::Raster), 100.0 / 3.0));

        let raster_only = compute_weights(&[Phase::Raster]);
        assert!(approx(raster_only.weight(Phase::Raster), 100.0));
        assert!(approx(progress_at(&raster_only, Phase::Raster, 5, 10), 50.0));
    }

    #[test]
    fn test_progress_formula() {
        let w = compute_weights(&[Phase::Taglines, Phase::Photos, Phase::Raster]);
        assert!(approx(progress_at(&w, Phase::Taglines, 5, 10), 20.0));
        assert!(approx(progress_at(&w, Phase::Photos, 10, 10), 80.0));
        assert!(approx(progress_at(&w, Phase::Raster, 3, 4), 95.0));
        assert!(approx(progress_at(&w, Phase::Raster, 0, 0), 100.0));
    }

    #[test]
    fn test_phases_skip_taglines_for_students() {
        let opts = EnhancementOptions { taglines: true, enhance_photos: false, format: OutputFormat::Zip };
        assert_eq!(opts.phases(RecordKind::Student), vec![Phase::Raster]);
        assert_eq!(opts.phases(RecordKind::Event), vec![Phase::Taglines, Phase::Raster]);
    }

    #[tokio::test]
    async fn test_full_walk_to_generating() {
        let mut job = imported();
        assert_eq!(job.state(), &BatchState::Imported);
        assert_eq!(job.records().len(), 2);

        job.begin_review().unwrap();
        let photos = job.settle_photos().await;
        assert_eq!(photos, PhotoProgress { resolved: 2, total: 2 });
        assert!(job.records().iter().all(|r| r.photo().is_some()));

        job.select_template(catalog::by_id("modern").unwrap().clone()).unwrap();
        job.configure(EnhancementOptions { taglines: true, ..Default::default() }).unwrap();
        let plan = job.confirm().unwrap();
        assert_eq!(job.state(), &BatchState::Generating);
        assert_eq!(plan.records.len(), 2);
        assert!(plan.options.taglines);

        plan.progress.send_replace(GenerationProgress { percent: 42.0, status: "x".into() });
        assert_eq!(job.progress().percent, 42.0);
    }

    #[tokio::test]
    async fn test_import_failure_leaves_no_records() {
        let mut job = imported();
        let err = job
            .import(RecordKind::Event, "name,role\nA,B\n", &ImportOptions::default(), Arc::new(NoFetch))
            .unwrap_err();
        assert!(matches!(err, CardError::Import(ImportError::MissingHeader { header: "eventname", .. })));
        assert!(job.records().is_empty());
        assert!(matches!(job.state(), BatchState::Error(_)));
        assert!(job.begin_review().is_err());
    }

    #[tokio::test]
    async fn test_template_kind_must_match() {
        let mut job = imported();
        job.begin_review().unwrap();
        let student = catalog::by_id("nandha-student").unwrap().clone();
        assert!(job.select_template(student).is_err());
        assert_eq!(job.state(), &BatchState::Reviewing);
    }

    #[tokio::test]
    async fn test_out_of_order_transitions_rejected() {
        let mut job = BatchJob::default();
        let err = job.confirm().unwrap_err();
        assert_eq!(err.to_string(), "Invalid batch transition: cannot generate while idle");
        let mut job = imported();
        assert!(job.configure(EnhancementOptions::default()).is_err());
    }

    #[tokio::test]
    async fn test_students_never_get_taglines() {
        let mut job = BatchJob::default();
        job.import(RecordKind::Student, "name,regNo,dept\nA,1,CSE\n", &ImportOptions::default(), Arc::new(NoFetch))
            .unwrap();
        job.begin_review().unwrap();
        job.settle_photos().await;
        job.select_template(catalog::default_for(RecordKind::Student).clone()).unwrap();
        job.configure(EnhancementOptions { taglines: true, enhance_photos: true, format: OutputFormat::Pdf })
            .unwrap();
        assert!(!job.options().taglines);
        assert!(job.options().enhance_photos);
    }

    /// Holds every fetch until permits are added.
    struct GatedFetch {
        gate: Semaphore,
    }

    #[async_trait]
    impl ImageLoader for GatedFetch {
        async fn load(&self, _src: &str) -> Result<ImageSource, CardError> {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| CardError::Image(e.to_string()))?;
            Ok(ImageSource::embedded("image/png", vec![1]))
        }
    }

    fn gated() -> (BatchJob, Arc<GatedFetch>) {
        let loader = Arc::new(GatedFetch { gate: Semaphore::new(0) });
        let mut job = BatchJob::default();
        job.import(RecordKind::Event, EVENTS, &ImportOptions::default(), loader.clone())
            .unwrap();
        job.begin_review().unwrap();
        (job, loader)
    }

    #[tokio::test]
    async fn test_template_waits_for_photos() {
        let (mut job, loader) = gated();
        let modern = catalog::by_id("modern").unwrap().clone();
        let err = job.select_template(modern.clone()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid batch transition: cannot select a template while loading photos"
        );
        assert_eq!(job.state(), &BatchState::Reviewing);

        loader.gate.add_permits(1);
        job.settle_photos().await;
        job.select_template(modern).unwrap();
        assert_eq!(job.state(), &BatchState::TemplateSelected);
    }

    #[tokio::test]
    async fn test_manual_photo_unblocks_template() {
        let (mut job, _loader) = gated();
        for index in 0..2 {
            job.replace_photo(index, ImageSource::embedded("image/png", vec![7])).unwrap();
        }
        job.select_template(catalog::by_id("modern").unwrap().clone()).unwrap();
    }

    #[tokio::test]
    async fn test_photo_watch_does_not_borrow_job() {
        let (mut job, loader) = gated();
        let settled = tokio::spawn(job.photo_watch().unwrap().settled());
        tokio::task::yield_now().await;
        assert!(!settled.is_finished());
        assert_eq!(job.poll_photos().total, 2);

        loader.gate.add_permits(1);
        settled.await.unwrap();
        assert_eq!(job.poll_photos(), PhotoProgress { resolved: 2, total: 2 });
    }

    #[tokio::test]
    async fn test_manual_photo_replacement_wins() {
        let mut job = imported();
        let manual = ImageSource::embedded("image/png", vec![9]);
        job.replace_photo(0, manual.clone()).unwrap();
        job.settle_photos().await;
        assert_eq!(job.records()[0].photo(), Some(&manual));
        assert!(matches!(job.replace_photo(7, manual), Err(CardError::UnknownRecord(7))));
    }

    #[tokio::test]
    async fn test_regenerate_only_touches_rows_without_url() {
        let mut job = imported();
        job.settle_photos().await;
        let before = job.records()[0].photo().cloned();
        let style = PlaceholderStyle { color: "#000000".into(), randomize: false };
        assert_eq!(job.regenerate_placeholders(style.clone()), 1);
        assert_eq!(job.records()[0].photo().cloned(), before);
        assert_eq!(job.records()[1].photo(), Some(&placeholder("Ravi", &style)));
    }

    #[tokio::test]
    async fn test_failed_run_has_generic_error_and_no_download() {
        let mut job = imported();
        job.begin_review().unwrap();
        job.settle_photos().await;
        job.select_template(catalog::by_id("modern").unwrap().clone()).unwrap();
        job.configure(EnhancementOptions::default()).unwrap();
        job.confirm().unwrap();
        job.finish(Err(CardError::Packaging("disk full".into()))).unwrap();
        assert_eq!(job.state(), &BatchState::Error(GENERATION_FAILED.into()));
        assert!(job.artifact().is_none());

        job.reset();
        assert_eq!(job.state(), &BatchState::Idle);
        assert!(job.records().is_empty());
    }
}
