//! Per-row photo resolution.
//!
//! After an import, every row gets one background task that fetches its
//! `photoURL` (or goes straight to a placeholder). Results come back over a
//! channel and are applied when the owner polls, so the review stage can
//! show `resolved / total` while fetches are still running. Each slot is
//! resolved at most once: a manual replacement claims the slot and any late
//! fetch result for it is dropped.

use std::sync::Arc;

use image::Rgba;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::record::{ImageSource, Record};
use crate::render::font::{self, TextStyle};
use crate::render::paint::{self, Canvas, Rect};
use crate::render::raster::{ImageLoader, encode_png};
use crate::template::TextAlign;

/// Placeholder colours, picked by the first character of the name.
pub const PALETTE: [&str; 10] = [
    "#f87171", "#fb923c", "#fbbf24", "#a3e635", "#4ade80", "#34d399", "#22d3ee", "#60a5fa",
    "#818cf8", "#c084fc",
];

pub const DEFAULT_PLACEHOLDER_COLOR: &str = "#60a5fa";

const PLACEHOLDER_SIZE: u32 = 200;
const INITIALS_SIZE: f32 = 80.0;
const INITIALS_CENTER_Y: f32 = 105.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderStyle {
    pub color: String,
    /// Pick from [`PALETTE`] by name instead of using `color`.
    pub randomize: bool,
}

impl Default for PlaceholderStyle {
    fn default() -> Self {
        Self {
            color: DEFAULT_PLACEHOLDER_COLOR.into(),
            randomize: true,
        }
    }
}

impl PlaceholderStyle {
    pub fn color_for(&self, name: &str) -> &str {
        if self.randomize {
            let code = name.chars().next().map(|c| c as usize).unwrap_or(0);
            PALETTE[code % PALETTE.len()]
        } else {
            &self.color
        }
    }
}

/// Up to two initials from the first two space-separated words.
pub fn initials(name: &str) -> String {
    name.split(' ')
        .take(2)
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}

/// 200x200 PNG with white initials on a coloured square.
pub fn placeholder(name: &str, style: &PlaceholderStyle) -> ImageSource {
    let background = paint::parse_color(style.color_for(name))
        .unwrap_or(Rgba([96, 165, 250, 255]));
    let mut canvas = Canvas::new(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE);
    let size = PLACEHOLDER_SIZE as f32;
    canvas.fill(Rect::new(0.0, 0.0, size, size), 0.0, background);

    let line_height = INITIALS_SIZE * 1.2;
    let text_box = Rect::new(0.0, INITIALS_CENTER_Y - line_height / 2.0, size, line_height);
    let style = TextStyle {
        size: INITIALS_SIZE,
        bold: true,
        color: paint::WHITE,
        align: TextAlign::Center,
    };
    font::draw_text(&mut canvas, text_box, &initials(name), style);

    match encode_png(&canvas.into_image()) {
        Ok(png) => ImageSource::embedded("image/png", png),
        // Encoding an in-memory RGBA buffer does not fail in practice.
        Err(_) => ImageSource::Url(String::new()),
    }
}

/// How a row's photo was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum PhotoOutcome {
    Fetched(ImageSource),
    Placeholder(ImageSource),
}

impl PhotoOutcome {
    pub fn into_image(self) -> ImageSource {
        match self {
            PhotoOutcome::Fetched(img) | PhotoOutcome::Placeholder(img) => img,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhotoProgress {
    pub resolved: usize,
    pub total: usize,
}

/// Background photo fetches for one import.
pub struct PhotoTasks {
    resolved: Vec<bool>,
    rx: mpsc::UnboundedReceiver<(usize, PhotoOutcome)>,
    finished: watch::Receiver<usize>,
    // Dropping the set aborts any fetch still running.
    _tasks: JoinSet<()>,
}

impl PhotoTasks {
    /// Start one task per record. Must be called inside a tokio runtime.
    pub fn spawn(records: &[Record], loader: Arc<dyn ImageLoader>, style: &PlaceholderStyle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (finished_tx, finished) = watch::channel(0usize);
        let finished_tx = Arc::new(finished_tx);
        let mut tasks = JoinSet::new();
        for (index, record) in records.iter().enumerate() {
            let tx = tx.clone();
            let finished_tx = finished_tx.clone();
            let loader = loader.clone();
            let url = record.photo_url().map(str::to_string);
            let name = record.name().to_string();
            let style = style.clone();
            tasks.spawn(async move {
                let outcome = match url {
                    Some(url) => match loader.load(&url).await {
                        Ok(img) => PhotoOutcome::Fetched(img),
                        Err(e) => {
                            tracing::warn!(row = index, url = %url, error = %e, "Photo fetch failed, using placeholder");
                            PhotoOutcome::Placeholder(placeholder(&name, &style))
                        }
                    },
                    None => PhotoOutcome::Placeholder(placeholder(&name, &style)),
                };
                let _ = tx.send((index, outcome));
                finished_tx.send_modify(|n| *n += 1);
            });
        }
        Self {
            resolved: vec![false; records.len()],
            rx,
            finished,
            _tasks: tasks,
        }
    }

    pub fn progress(&self) -> PhotoProgress {
        PhotoProgress {
            resolved: self.resolved.iter().filter(|r| **r).count(),
            total: self.resolved.len(),
        }
    }

    /// Completion signal that can be awaited without borrowing the tasks.
    pub fn watch(&self) -> PhotoWatch {
        PhotoWatch {
            finished: self.finished.clone(),
            total: self.resolved.len(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.resolved.iter().all(|r| *r)
    }

    /// Mark a slot resolved without a fetch result (manual replacement).
    /// Returns false if it was already resolved.
    pub fn claim(&mut self, index: usize) -> bool {
        match self.resolved.get_mut(index) {
            Some(slot) if !*slot => {
                *slot = true;
                true
            }
            _ => false,
        }
    }

    fn accept(&mut self, index: usize, outcome: PhotoOutcome) -> Option<(usize, PhotoOutcome)> {
        self.claim(index).then_some((index, outcome))
    }

    /// Drain results that have arrived so far.
    pub fn poll(&mut self) -> Vec<(usize, PhotoOutcome)> {
        let mut out = Vec::new();
        while let Ok((index, outcome)) = self.rx.try_recv() {
            out.extend(self.accept(index, outcome));
        }
        out
    }

    /// Wait until every slot is resolved and return the remaining results.
    pub async fn wait(&mut self) -> Vec<(usize, PhotoOutcome)> {
        let mut out = self.poll();
        while !self.is_complete() {
            match self.rx.recv().await {
                Some((index, outcome)) => out.extend(self.accept(index, outcome)),
                None => break,
            }
        }
        out
    }
}

/// Resolves once every fetch task of a [`PhotoTasks`] has reported.
pub struct PhotoWatch {
    finished: watch::Receiver<usize>,
    total: usize,
}

impl PhotoWatch {
    /// Wait for every task to send its result. Also returns if the tasks are
    /// dropped first (the import was replaced).
    pub async fn settled(mut self) {
        let total = self.total;
        let _ = self.finished.wait_for(|n| *n >= total).await;
    }
}
