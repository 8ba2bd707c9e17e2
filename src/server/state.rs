//! Server state shared across handlers.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::batch::BatchJob;
use crate::batch::pipeline::Generator;
use crate::config::AppConfig;
use crate::enrich::GeminiClient;
use crate::error::CardError;
use crate::notify::{Notifier, SimulatedMailer};
use crate::render::raster::ImageLoader;
use crate::template::TemplateStore;
use crate::verify::{NoCamera, NoDecoder, Scanner};

/// Application state shared across handlers.
///
/// There is one batch job and one scanner per server; a new import replaces
/// the job wholesale.
pub struct AppState {
    pub config: AppConfig,
    pub templates: RwLock<TemplateStore>,
    pub batch: Mutex<BatchJob>,
    pub scanner: Mutex<Scanner>,
    pub generator: Generator,
    pub loader: Arc<dyn ImageLoader>,
    pub notifier: Arc<dyn Notifier>,
    pub gemini: Option<GeminiClient>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self, CardError> {
        let client = config.http_client()?;
        Ok(Self {
            templates: RwLock::new(TemplateStore::new()),
            batch: Mutex::new(BatchJob::new(config.placeholder_style())),
            // Browsers decode QR codes client-side and post the text.
            scanner: Mutex::new(Scanner::new(Arc::new(NoCamera), Arc::new(NoDecoder))),
            generator: config.generator(client.clone()),
            loader: config.loader(client.clone()),
            notifier: Arc::new(SimulatedMailer::default()),
            gemini: config.gemini(client),
            config,
        })
    }
}
