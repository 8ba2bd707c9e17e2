//! Rasterization: rendered card -> RGBA pixels.
//!
//! Capture is two steps. [`load_resources`] fetches and decodes every image
//! the card references, concurrently, and only returns once all of them have
//! settled; a failed load counts as settled and paints as a blank marker.
//! [`rasterize`] then paints the card synchronously at a pixel ratio.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use image::{ImageFormat, RgbaImage};
use tokio::sync::RwLock;

use super::font::{self, TextStyle};
use super::paint::{self, Canvas, Rect};
use super::{NodeContent, RenderedBackground, RenderedCard};
use crate::error::CardError;
use crate::record::{ImageField, ImageSource};

/// Fetches image bytes for a `src` string.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    /// Load `src` as embedded image data. Content that is not an image is an
    /// error.
    async fn load(&self, src: &str) -> Result<ImageSource, CardError>;
}

/// Loads `data:` URLs inline, `http(s)` URLs with reqwest and anything else
/// as a path relative to the asset directory.
#[derive(Clone)]
pub struct HttpImageLoader {
    client: reqwest::Client,
    asset_dir: Option<PathBuf>,
}

impl HttpImageLoader {
    pub fn new(client: reqwest::Client, asset_dir: Option<PathBuf>) -> Self {
        Self { client, asset_dir }
    }

    async fn fetch_remote(&self, url: &str) -> Result<ImageSource, CardError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CardError::Image(format!("Failed to download {}: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(CardError::Image(format!(
                "Failed to download {}: HTTP {}",
                url,
                response.status()
            )));
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .unwrap_or_default();
        if !mime.starts_with("image/") {
            return Err(CardError::Image(format!(
                "{} is not an image (content type '{}')",
                url, mime
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CardError::Image(format!("Failed to read image data: {}", e)))?;
        Ok(ImageSource::embedded(mime, bytes.to_vec()))
    }

    /// Resolve `path` under the asset directory (or the working directory).
    /// Absolute paths and `..` are rejected.
    fn asset_path(&self, path: &str) -> Result<PathBuf, CardError> {
        let relative = Path::new(path);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained {
            return Err(CardError::Image(format!(
                "{} is outside the asset directory",
                path
            )));
        }
        Ok(match &self.asset_dir {
            Some(dir) => dir.join(relative),
            None => relative.to_path_buf(),
        })
    }

    async fn read_asset(&self, path: &str) -> Result<ImageSource, CardError> {
        let full = self.asset_path(path)?;
        let data = tokio::fs::read(&full)
            .await
            .map_err(|e| CardError::Image(format!("Failed to read {}: {}", full.display(), e)))?;
        let mime = ImageFormat::from_path(&full)
            .or_else(|_| image::guess_format(&data))
            .map(|f| f.to_mime_type().to_string())
            .map_err(|e| CardError::Image(format!("{} is not an image: {}", full.display(), e)))?;
        Ok(ImageSource::embedded(mime, data))
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, src: &str) -> Result<ImageSource, CardError> {
        match ImageSource::parse(src) {
            embedded @ ImageSource::Embedded { .. } => {
                if embedded.mime().is_some_and(|m| m.starts_with("image/")) {
                    Ok(embedded)
                } else {
                    Err(CardError::Image("data URL is not an image".into()))
                }
            }
            ImageSource::Url(url) if url.starts_with("http://") || url.starts_with("https://") => {
                self.fetch_remote(&url).await
            }
            ImageSource::Url(path) => self.read_asset(&path).await,
        }
    }
}

/// Decode embedded image data to RGBA.
pub fn decode(source: &ImageSource) -> Result<RgbaImage, CardError> {
    match source {
        ImageSource::Embedded { data, .. } => image::load_from_memory(data)
            .map(|img| img.to_rgba8())
            .map_err(|e| CardError::Image(format!("Failed to decode image: {}", e))),
        ImageSource::Url(url) => Err(CardError::Image(format!("{} has not been loaded", url))),
    }
}

/// Outcome of loading one image.
#[derive(Debug, Clone)]
pub enum Loaded {
    Ready(Arc<RgbaImage>),
    Broken,
}

/// Every image a card needs, keyed by `src`.
pub type Resources = HashMap<String, Loaded>;

fn image_sources(card: &RenderedCard) -> Vec<&str> {
    let mut sources: Vec<&str> = Vec::new();
    if let RenderedBackground::Image { src } = &card.background {
        sources.push(src.as_str());
    }
    for node in &card.nodes {
        match &node.content {
            NodeContent::Image { src, .. } | NodeContent::Qr { src, .. } => {
                sources.push(src.as_str())
            }
            _ => {}
        }
    }
    sources.sort_unstable();
    sources.dedup();
    sources
}

/// Sources likely shared across a batch: logos, signatures and the
/// background image. Photos and QR codes differ per record and are never
/// cached. A subject-photo background is per record too; [`CACHE_LIMIT`]
/// bounds those.
fn shared_sources(card: &RenderedCard) -> HashSet<&str> {
    let mut shared = HashSet::new();
    if let RenderedBackground::Image { src } = &card.background {
        shared.insert(src.as_str());
    }
    for node in &card.nodes {
        if let NodeContent::Image { src, image_type, .. } = &node.content {
            if *image_type != ImageField::Photo {
                shared.insert(src.as_str());
            }
        }
    }
    shared.retain(|src| !src.starts_with("data:"));
    shared
}

/// Load every image the card references. Always returns a complete map.
pub async fn load_resources(card: &RenderedCard, loader: &dyn ImageLoader) -> Resources {
    load_all(&image_sources(card), loader).await
}

async fn load_all(sources: &[&str], loader: &dyn ImageLoader) -> Resources {
    let loads = sources.iter().map(|src| async move {
        if src.is_empty() {
            return (src.to_string(), Loaded::Broken);
        }
        let loaded = match loader.load(src).await.and_then(|s| decode(&s)) {
            Ok(img) => Loaded::Ready(Arc::new(img)),
            Err(e) => {
                tracing::warn!(src = %truncate(src), error = %e, "Image failed to load");
                Loaded::Broken
            }
        };
        (src.to_string(), loaded)
    });
    join_all(loads).await.into_iter().collect()
}

fn truncate(src: &str) -> &str {
    match src.char_indices().nth(64) {
        Some((i, _)) => &src[..i],
        None => src,
    }
}

/// Paint a card at `pixel_ratio` device pixels per card pixel.
pub fn rasterize(card: &RenderedCard, resources: &Resources, pixel_ratio: f32) -> RgbaImage {
    let ratio = if pixel_ratio > 0.0 { pixel_ratio } else { 1.0 };
    let width = (card.width as f32 * ratio).round() as u32;
    let height = (card.height as f32 * ratio).round() as u32;
    let mut canvas = Canvas::new(width, height);
    let full = Rect::new(0.0, 0.0, width as f32, height as f32);

    match &card.background {
        RenderedBackground::Solid { color } => {
            canvas.fill(full, 0.0, paint::parse_color(color).unwrap_or(paint::WHITE));
        }
        RenderedBackground::Gradient { colors, angle } => {
            let from = paint::parse_color(&colors[0]).unwrap_or(paint::WHITE);
            let to = paint::parse_color(&colors[1]).unwrap_or(paint::WHITE);
            canvas.gradient(from, to, *angle);
        }
        RenderedBackground::Image { src } => {
            if let Some(Loaded::Ready(img)) = resources.get(src) {
                canvas.image(full, 0.0, img, crate::template::ObjectFit::Cover);
            }
        }
    }

    for node in &card.nodes {
        let g = node.geometry;
        let rect = Rect::new(
            g.x as f32 * ratio,
            g.y as f32 * ratio,
            g.width as f32 * ratio,
            g.height as f32 * ratio,
        );
        match &node.content {
            NodeContent::Text {
                text,
                font_size,
                font_weight,
                color,
                text_align,
                ..
            } => {
                let style = TextStyle {
                    size: font_size * ratio,
                    bold: font_weight.is_bold(),
                    color: paint::parse_color(color).unwrap_or(paint::BLACK),
                    align: *text_align,
                };
                font::draw_text(&mut canvas, rect, text, style);
            }
            NodeContent::Image {
                src,
                object_fit,
                border,
                ..
            } => {
                let radius = border.radius as f32 * ratio;
                let bw = border.width as f32 * ratio;
                let inner = rect.inset(bw);
                let inner_radius = (radius - bw).max(0.0);
                match resources.get(src) {
                    Some(Loaded::Ready(img)) => canvas.image(inner, inner_radius, img, *object_fit),
                    _ => canvas.broken(inner, inner_radius),
                }
                stroke_border(&mut canvas, rect, radius, bw, border.color.as_deref());
            }
            NodeContent::Placeholder { border, .. } => {
                let radius = border.radius as f32 * ratio;
                let bw = border.width as f32 * ratio;
                canvas.silhouette(rect.inset(bw), (radius - bw).max(0.0));
                stroke_border(&mut canvas, rect, radius, bw, border.color.as_deref());
            }
            NodeContent::Qr { src, .. } => {
                // QR images are always square, sized by the element width.
                let square = Rect::new(rect.x, rect.y, rect.w, rect.w);
                match resources.get(src) {
                    Some(Loaded::Ready(img)) => {
                        canvas.image(square, 0.0, img, crate::template::ObjectFit::Fill)
                    }
                    _ => canvas.broken(square, 0.0),
                }
            }
            NodeContent::Shape {
                background_color,
                border,
            } => {
                let radius = border.radius as f32 * ratio;
                if let Some(fill) = paint::parse_color(background_color) {
                    canvas.fill(rect, radius, fill);
                }
                stroke_border(&mut canvas, rect, radius, border.width as f32 * ratio, border.color.as_deref());
            }
        }
    }

    canvas.into_image()
}

fn stroke_border(canvas: &mut Canvas, rect: Rect, radius: f32, width: f32, color: Option<&str>) {
    if width <= 0.0 {
        return;
    }
    let color = color.and_then(paint::parse_color).unwrap_or(paint::BLACK);
    canvas.stroke(rect, radius, width, color);
}

/// A captured card with the name it is packaged under.
#[derive(Debug, Clone)]
pub struct Raster {
    pub name: String,
    pub image: RgbaImage,
}

impl Raster {
    pub fn to_png(&self) -> Result<Vec<u8>, CardError> {
        encode_png(&self.image)
    }
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, CardError> {
    let mut png_bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
        .map_err(|e| CardError::Render(format!("PNG encode failed: {}", e)))?;
    Ok(png_bytes)
}

/// Turns a rendered card into pixels.
#[async_trait]
pub trait CardCapture: Send + Sync {
    /// Wait for every sub-resource, then capture at `pixel_ratio`.
    async fn capture(&self, card: &RenderedCard, pixel_ratio: f32) -> Result<RgbaImage, CardError>;
}

/// Most shared images the [`Rasterizer`] keeps decoded.
const CACHE_LIMIT: usize = 32;

/// [`CardCapture`] backed by an [`ImageLoader`], with a bounded cache for
/// images shared across a batch.
pub struct Rasterizer {
    loader: Arc<dyn ImageLoader>,
    cache: Arc<RwLock<HashMap<String, Arc<RgbaImage>>>>,
}

impl Rasterizer {
    pub fn new(loader: Arc<dyn ImageLoader>) -> Self {
        Self {
            loader,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl CardCapture for Rasterizer {
    async fn capture(&self, card: &RenderedCard, pixel_ratio: f32) -> Result<RgbaImage, CardError> {
        let shared = shared_sources(card);
        let mut resources = Resources::new();
        let mut missing = Vec::new();
        {
            let cache = self.cache.read().await;
            for src in image_sources(card) {
                match cache.get(src) {
                    Some(img) => {
                        resources.insert(src.to_string(), Loaded::Ready(img.clone()));
                    }
                    None => missing.push(src),
                }
            }
        }

        let fetched = load_all(&missing, self.loader.as_ref()).await;
        {
            let mut cache = self.cache.write().await;
            for (src, loaded) in &fetched {
                let Loaded::Ready(img) = loaded else { continue };
                if !shared.contains(src.as_str()) {
                    continue;
                }
                if cache.len() >= CACHE_LIMIT {
                    cache.clear();
                }
                cache.insert(src.clone(), img.clone());
            }
        }
        resources.extend(fetched);

        let card = card.clone();
        tokio::task::spawn_blocking(move || rasterize(&card, &resources, pixel_ratio))
            .await
            .map_err(|e| CardError::Render(format!("Rasterizer task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, RecordKind};
    use crate::render::{LocalQrService, QrImageService, RemoteQrService, render};
    use crate::template::catalog;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a solid 4x4 PNG for every http URL and fails everything else.
    struct FakeLoader {
        calls: AtomicUsize,
    }

    fn red_png() -> Vec<u8> {
        encode_png(&RgbaImage::from_pixel(4, 4, image::Rgba([255, 0, 0, 255]))).unwrap()
    }

    #[async_trait]
    impl ImageLoader for FakeLoader {
        async fn load(&self, src: &str) -> Result<ImageSource, CardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if src.starts_with("https://") {
                Ok(ImageSource::embedded("image/png", red_png()))
            } else {
                Err(CardError::Image(format!("no such file: {}", src)))
            }
        }
    }

    #[tokio::test]
    async fn test_load_resources_settles_failures() {
        let card = render(
            &Record::sample(RecordKind::Student),
            catalog::by_id("nandha-student").unwrap(),
            &RemoteQrService,
        );
        let loader = FakeLoader { calls: AtomicUsize::new(0) };
        let resources = load_resources(&card, &loader).await;
        // photo, logo, signature (local paths) and the QR URL
        assert_eq!(resources.len(), 4);
        assert!(matches!(resources.get("logo.jpg"), Some(Loaded::Broken)));
        let qr_ready = resources
            .iter()
            .any(|(k, v)| k.starts_with("https://api.qrserver.com") && matches!(v, Loaded::Ready(_)));
        assert!(qr_ready);
    }

    #[tokio::test]
    async fn test_capture_at_pixel_ratio() {
        let template = catalog::by_id("modern").unwrap();
        let card = render(&Record::sample(RecordKind::Event), template, &RemoteQrService);
        let rasterizer = Rasterizer::new(Arc::new(FakeLoader { calls: AtomicUsize::new(0) }));
        let img = rasterizer.capture(&card, 2.0).await.unwrap();
        assert_eq!((img.width(), img.height()), (700, 1040));
    }

    #[tokio::test]
    async fn test_capture_oversized_qr_element() {
        let mut template = catalog::by_id("modern").unwrap().clone();
        for element in template.elements.iter_mut().filter(|e| e.kind.type_name() == "qr") {
            element.geometry.width = 200_000;
            element.geometry.height = 200_000;
        }
        template.validate().unwrap();
        let rasterizer = Rasterizer::new(Arc::new(FakeLoader { calls: AtomicUsize::new(0) }));
        let services: [&dyn QrImageService; 2] = [&RemoteQrService, &LocalQrService];
        for qr in services {
            let card = render(&Record::sample(RecordKind::Event), &template, qr);
            let img = rasterizer.capture(&card, 2.0).await.unwrap();
            assert_eq!((img.width(), img.height()), (700, 1040));
        }
    }

    #[tokio::test]
    async fn test_capture_caches_shared_images_only() {
        let loader = Arc::new(FakeLoader { calls: AtomicUsize::new(0) });
        let rasterizer = Rasterizer::new(loader.clone());
        let mut record = Record::sample(RecordKind::Student);
        record.set_image(ImageField::Logo, Some(ImageSource::Url("https://x/logo.png".into())));
        record.set_image(ImageField::Photo, Some(ImageSource::Url("https://x/p.png".into())));
        let card = render(&record, catalog::by_id("nandha-student").unwrap(), &RemoteQrService);

        // logo, photo, signature and QR
        rasterizer.capture(&card, 1.0).await.unwrap();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 4);
        // Only the logo is served from the cache.
        rasterizer.capture(&card, 1.0).await.unwrap();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 7);
        assert_eq!(rasterizer.cache.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cache_does_not_grow_per_record() {
        let rasterizer = Rasterizer::new(Arc::new(FakeLoader { calls: AtomicUsize::new(0) }));
        let template = catalog::by_id("nandha-student").unwrap();
        let mut sizes = Vec::new();
        for i in 0..5 {
            let mut record = Record::student(&format!("Student {}", i), &format!("S-{}", i), "CSE");
            record.set_image(ImageField::Logo, Some(ImageSource::Url("https://x/logo.png".into())));
            let photo = format!("https://x/photo-{}.png", i);
            record.set_image(ImageField::Photo, Some(ImageSource::Url(photo)));
            let card = render(&record, template, &RemoteQrService);
            rasterizer.capture(&card, 1.0).await.unwrap();
            sizes.push(rasterizer.cache.read().await.len());
        }
        assert_eq!(sizes, vec![1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_rasterize_paints_shapes() {
        let template = catalog::by_id("nandha-student").unwrap();
        let card = render(&Record::student("A", "1", "CSE"), template, &RemoteQrService);
        let img = rasterize(&card, &Resources::new(), 1.0);
        assert_eq!((img.width(), img.height()), (450, 284));
        // header band is #0f4c81
        assert_eq!(img.get_pixel(200, 5).0, [15, 76, 129, 255]);
    }

    #[tokio::test]
    async fn test_http_loader_decodes_data_urls() {
        let loader = HttpImageLoader::new(reqwest::Client::new(), None);
        let src = ImageSource::embedded("image/png", red_png()).to_src();
        let loaded = loader.load(&src).await.unwrap();
        let img = decode(&loaded).unwrap();
        assert_eq!(img.dimensions(), (4, 4));

        let text = ImageSource::embedded("text/plain", b"hi".to_vec()).to_src();
        assert!(loader.load(&text).await.is_err());
    }

    #[tokio::test]
    async fn test_assets_stay_inside_asset_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("logo.png"), red_png()).unwrap();
        let loader = HttpImageLoader::new(reqwest::Client::new(), Some(dir.path().to_path_buf()));

        let logo = loader.load("logo.png").await.unwrap();
        assert_eq!(logo.mime(), Some("image/png"));
        assert_eq!(decode(&logo).unwrap().dimensions(), (4, 4));

        let outside = dir.path().join("logo.png").display().to_string();
        for path in ["../logo.png", "nested/../../logo.png", outside.as_str()] {
            let err = loader.load(path).await.unwrap_err();
            assert!(err.to_string().contains("outside the asset directory"), "{}", err);
        }
    }
}
