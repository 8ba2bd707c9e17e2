//! End-to-end tests: CSV import through capture, packaging and check-in.

use std::io::{Cursor, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use pretty_assertions::assert_eq;

use cardsmith::batch::import::ImportOptions;
use cardsmith::batch::{
    BatchJob, BatchState, EnhancementOptions, Generator, OutputFormat, PlaceholderStyle,
};
use cardsmith::enrich::{NoEnhancement, StockTaglines};
use cardsmith::error::CardError;
use cardsmith::record::{ImageSource, RecordKind, STOCK_TAGLINE};
use cardsmith::render::raster::{ImageLoader, Rasterizer};
use cardsmith::render::{LocalQrService, QrPayload};
use cardsmith::template::catalog;
use cardsmith::verify::{NoCamera, NoDecoder, ScanState, Scanner};

/// Serves a small orange PNG for every remote URL and counts fetches.
#[derive(Default)]
struct FakeLoader {
    fetches: AtomicUsize,
}

#[async_trait]
impl ImageLoader for FakeLoader {
    async fn load(&self, src: &str) -> Result<ImageSource, CardError> {
        if src.starts_with("data:") {
            return Ok(ImageSource::parse(src));
        }
        if !src.starts_with("http") {
            return Err(CardError::Image(format!("no asset {}", src)));
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let image = RgbaImage::from_pixel(8, 8, Rgba([255, 128, 0, 255]));
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| CardError::Image(e.to_string()))?;
        Ok(ImageSource::embedded("image/png", png))
    }
}

fn generator(loader: Arc<FakeLoader>) -> Generator {
    Generator::new(
        Arc::new(StockTaglines),
        Arc::new(NoEnhancement),
        Arc::new(Rasterizer::new(loader)),
        Arc::new(LocalQrService),
    )
    .with_pixel_ratio(1.0)
}

fn import_options() -> ImportOptions {
    ImportOptions {
        organization: Some("Analytical Society".into()),
        ..ImportOptions::default()
    }
}

const EVENT_CSV: &str = "\
Name,Role,Event Name,Event Date,Photo URL
Ada Lovelace,Speaker,Engines Expo,2025-12-05,https://example.com/ada.png
Grace Hopper,Guest,Engines Expo,2025-12-05,
Ada Lovelace,Volunteer,Engines Expo,2025-12-05,https://example.com/ada2.png
";

#[tokio::test]
async fn test_event_batch_to_zip() {
    let loader = Arc::new(FakeLoader::default());
    let mut job = BatchJob::new(PlaceholderStyle::default());

    let count = job
        .import(RecordKind::Event, EVENT_CSV, &import_options(), loader.clone())
        .unwrap();
    assert_eq!(count, 3);
    job.begin_review().unwrap();

    let photos = job.settle_photos().await;
    assert_eq!(photos.resolved, 3);
    assert_eq!(loader.fetches.load(Ordering::SeqCst), 2);
    assert!(job.records().iter().all(|r| r.photo().is_some()));

    job.select_template(catalog::by_id("modern").unwrap().clone())
        .unwrap();
    job.configure(EnhancementOptions {
        taglines: true,
        enhance_photos: false,
        format: OutputFormat::Zip,
    })
    .unwrap();

    let plan = job.confirm().unwrap();
    let mut progress = plan.progress.subscribe();
    let result = generator(loader).run(plan).await;
    job.finish(result).unwrap();

    assert_eq!(job.state(), &BatchState::Done);
    assert_eq!(progress.borrow_and_update().percent, 100.0);

    let artifact = job.artifact().unwrap();
    assert_eq!(artifact.file_name, "Generated_event_IDs.zip");
    assert_eq!(artifact.content_type, "application/zip");

    let mut archive = zip::ZipArchive::new(Cursor::new(artifact.bytes.clone())).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(
        names,
        vec!["Ada_Lovelace.png", "Ada_Lovelace_2.png", "Grace_Hopper.png"]
    );

    let template = catalog::by_id("modern").unwrap();
    let mut png = Vec::new();
    archive
        .by_name("Grace_Hopper.png")
        .unwrap()
        .read_to_end(&mut png)
        .unwrap();
    let card = image::load_from_memory(&png).unwrap();
    assert_eq!((card.width(), card.height()), (template.width, template.height));

    // Stock taglines leave every record with a tagline.
    assert!(
        job.records()
            .iter()
            .all(|r| r.field("tagline") == Some(STOCK_TAGLINE))
    );
}

#[tokio::test]
async fn test_student_batch_to_pdf() {
    let loader = Arc::new(FakeLoader::default());
    let mut job = BatchJob::new(PlaceholderStyle::default());
    let csv = "name,regNo,dept\nAAKASH,23CS067,CSE\nBHAVANA,23CS068,ECE\n";

    job.import(RecordKind::Student, csv, &import_options(), loader.clone())
        .unwrap();
    job.begin_review().unwrap();
    job.settle_photos().await;
    job.select_template(catalog::by_id("generic-student").unwrap().clone())
        .unwrap();
    job.configure(EnhancementOptions {
        // Ignored for students.
        taglines: true,
        enhance_photos: false,
        format: OutputFormat::Pdf,
    })
    .unwrap();
    assert!(!job.options().taglines);

    let plan = job.confirm().unwrap();
    let result = generator(loader).run(plan).await;
    job.finish(result).unwrap();

    let artifact = job.artifact().unwrap();
    assert_eq!(artifact.file_name, "Generated_student_IDs.pdf");
    assert!(artifact.bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn test_template_for_wrong_kind_is_rejected() {
    let loader = Arc::new(FakeLoader::default());
    let mut job = BatchJob::new(PlaceholderStyle::default());
    job.import(RecordKind::Student, "name,regNo,dept\nA,1,X\n", &import_options(), loader)
        .unwrap();
    job.begin_review().unwrap();

    let err = job
        .select_template(catalog::by_id("modern").unwrap().clone())
        .unwrap_err();
    assert!(matches!(err, CardError::Template(_)));
    assert!(job.template().is_none());
}

#[tokio::test]
async fn test_generated_card_payload_checks_in() {
    let loader = Arc::new(FakeLoader::default());
    let mut job = BatchJob::new(PlaceholderStyle::default());
    job.import(RecordKind::Student, "name,regNo,dept\nAAKASH,23CS067,CSE\n", &import_options(), loader)
        .unwrap();

    let payload = QrPayload::for_record(&job.records()[0]);
    let mut scanner = Scanner::new(Arc::new(NoCamera), Arc::new(NoDecoder));
    scanner.handle_decoded(&payload.to_json()).await;
    assert_eq!(scanner.state(), &ScanState::Verified(payload.clone()));

    let checked_in = scanner.check_in(std::time::Instant::now()).unwrap();
    assert_eq!(checked_in.id, "23CS067");
    assert_eq!(checked_in.org, "Analytical Society");
}
