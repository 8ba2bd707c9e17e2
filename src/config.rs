//! Runtime configuration.
//!
//! Every option can come from the command line or the environment (a `.env`
//! file is loaded first by the binary). [`AppConfig`] also wires the
//! collaborators the rest of the crate is written against.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Args, ValueEnum};

use crate::batch::import::ImportOptions;
use crate::batch::photos::{DEFAULT_PLACEHOLDER_COLOR, PlaceholderStyle};
use crate::batch::pipeline::{DEFAULT_PIXEL_RATIO, Generator};
use crate::enrich::{GeminiClient, NoEnhancement, PhotoEnhancer, StockTaglines, TaglineGenerator};
use crate::error::CardError;
use crate::render::raster::{HttpImageLoader, ImageLoader, Rasterizer};
use crate::render::{LocalQrService, QrImageService, RemoteQrService};

/// Where QR images come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum QrMode {
    /// api.qrserver.com image URLs
    #[default]
    Remote,
    /// In-process encoder producing PNG data URLs
    Local,
}

#[derive(Debug, Clone, Args)]
pub struct AppConfig {
    /// Address the HTTP server listens on
    #[arg(long, global = true, env = "CARDSMITH_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Gemini API key; without one, taglines and photos are left as imported
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// QR image source
    #[arg(long, global = true, env = "CARDSMITH_QR_SERVICE", value_enum, default_value_t = QrMode::Remote)]
    pub qr_service: QrMode,

    /// Placeholder photo colour when randomisation is off
    #[arg(long, global = true, env = "CARDSMITH_PLACEHOLDER_COLOR", default_value = DEFAULT_PLACEHOLDER_COLOR)]
    pub placeholder_color: String,

    /// Pick placeholder colours from the palette by name
    #[arg(long, global = true, env = "CARDSMITH_RANDOMIZE_PLACEHOLDERS", action = ArgAction::Set, default_value_t = true)]
    pub randomize_placeholders: bool,

    /// Organisation written into every imported record
    #[arg(long, global = true, env = "CARDSMITH_ORGANIZATION")]
    pub organization: Option<String>,

    /// Device pixels per card pixel when capturing
    #[arg(long, global = true, env = "CARDSMITH_PIXEL_RATIO", default_value_t = DEFAULT_PIXEL_RATIO)]
    pub pixel_ratio: f32,

    /// Directory for relative image paths such as logo.jpg
    #[arg(long, global = true, env = "CARDSMITH_ASSET_DIR")]
    pub asset_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            gemini_api_key: None,
            qr_service: QrMode::Remote,
            placeholder_color: DEFAULT_PLACEHOLDER_COLOR.into(),
            randomize_placeholders: true,
            organization: None,
            pixel_ratio: DEFAULT_PIXEL_RATIO,
            asset_dir: None,
        }
    }
}

impl AppConfig {
    pub fn http_client(&self) -> Result<reqwest::Client, CardError> {
        reqwest::Client::builder()
            .user_agent(concat!("cardsmith/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| CardError::Transport(format!("HTTP client error: {}", e)))
    }

    pub fn qr(&self) -> Arc<dyn QrImageService> {
        match self.qr_service {
            QrMode::Remote => Arc::new(RemoteQrService),
            QrMode::Local => Arc::new(LocalQrService),
        }
    }

    pub fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle {
            color: self.placeholder_color.clone(),
            randomize: self.randomize_placeholders,
        }
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            organization: self.organization.clone(),
            ..ImportOptions::default()
        }
    }

    pub fn loader(&self, client: reqwest::Client) -> Arc<dyn ImageLoader> {
        Arc::new(HttpImageLoader::new(client, self.asset_dir.clone()))
    }

    pub fn gemini(&self, client: reqwest::Client) -> Option<GeminiClient> {
        self.gemini_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(|key| GeminiClient::new(client, key))
    }

    /// Generator wired to Gemini when a key is set, stock collaborators
    /// otherwise.
    pub fn generator(&self, client: reqwest::Client) -> Generator {
        let capture = Arc::new(Rasterizer::new(self.loader(client.clone())));
        let (taglines, enhancer): (Arc<dyn TaglineGenerator>, Arc<dyn PhotoEnhancer>) =
            match self.gemini(client) {
                Some(gemini) => (Arc::new(gemini.clone()), Arc::new(gemini)),
                None => {
                    tracing::info!("No Gemini API key configured, AI enrichment disabled");
                    (Arc::new(StockTaglines), Arc::new(NoEnhancement))
                }
            };
        Generator::new(taglines, enhancer, capture, self.qr()).with_pixel_ratio(self.pixel_ratio)
    }
}
