use std::sync::Arc;

use anyhow::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::select;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ImageSource, Params, SearchApi};
use crate::buffer::ResultBuffer;
use crate::config::Configuration;
use crate::events::{
    Command, ImageResolved, PageAck, PageDelivered, ResolvedImage, SearchKind, SearchRequest,
    UiEvent,
};
use crate::geo::GeoPoint;
use crate::record::PhotoRecord;
use crate::tasks::fetcher::{self, FetchRun, FetchSummary};

pub const NO_PHOTOS_FOUND: &str = "No photos found";
pub const EMPTY_TEXT: &str = "enter some search text";

/// Per-kind search state.
#[derive(Debug)]
struct Session {
    buffer: ResultBuffer<PhotoRecord>,
    /// Bumped on every new search; pages from older runs are dropped.
    generation: u64,
    /// Set by a changed-input press, cleared once a search actually starts.
    changed: bool,
    /// Last page accepted into the buffer for the current generation.
    page: u32,
}

impl Session {
    fn new(capacity: usize, auto_randomize: bool, seed: Option<u64>) -> Result<Self> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            buffer: ResultBuffer::with_rng(capacity, auto_randomize, rng)?,
            generation: 0,
            changed: false,
            page: 0,
        })
    }
}

/// Sole owner of both result buffers. Everything that touches them runs on
/// the coordinator task; fetch runs and image downloads report back through
/// channels and join sets.
pub struct SearchCoordinator {
    text: Session,
    geo: Session,
    awaiting: Option<SearchKind>,
    search_method: String,
    bbox_arcmin: f64,
    api: Arc<dyn SearchApi>,
    images: Arc<dyn ImageSource>,
    to_ui: Sender<UiEvent>,
    pages_tx: Sender<PageDelivered>,
    fetches: JoinSet<FetchSummary>,
    resolves: JoinSet<ImageResolved>,
    cancel: CancellationToken,
}

impl SearchCoordinator {
    fn new(
        cfg: &Configuration,
        api: Arc<dyn SearchApi>,
        images: Arc<dyn ImageSource>,
        to_ui: Sender<UiEvent>,
        pages_tx: Sender<PageDelivered>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let text_seed = cfg.shuffle_seed;
        let geo_seed = cfg.shuffle_seed.map(|s| s.wrapping_add(1));
        Ok(Self {
            text: Session::new(cfg.text_capacity, cfg.auto_randomize, text_seed)
                .context("text buffer")?,
            geo: Session::new(cfg.geo_capacity, cfg.auto_randomize, geo_seed)
                .context("geo buffer")?,
            awaiting: None,
            search_method: cfg.api.search_method.clone(),
            bbox_arcmin: cfg.bounding_box_arcmin,
            api,
            images,
            to_ui,
            pages_tx,
            fetches: JoinSet::new(),
            resolves: JoinSet::new(),
            cancel,
        })
    }

    fn session(&self, kind: SearchKind) -> &Session {
        match kind {
            SearchKind::Text => &self.text,
            SearchKind::Geo => &self.geo,
        }
    }

    fn session_mut(&mut self, kind: SearchKind) -> &mut Session {
        match kind {
            SearchKind::Text => &mut self.text,
            SearchKind::Geo => &mut self.geo,
        }
    }

    async fn emit(&self, event: UiEvent) -> Result<()> {
        self.to_ui.send(event).await.context("ui channel closed")
    }

    /// Handle one button press. Changed input starts a fresh search; an
    /// unchanged repeat press serves the next buffered result.
    async fn perform_action(&mut self, request: SearchRequest) -> Result<()> {
        let kind = request.kind();
        let session = self.session_mut(kind);
        session.changed |= request.changed();
        if !session.changed {
            return self.request_display(kind).await;
        }

        let params = match self.search_params(&request) {
            Ok(params) => params,
            Err(status) => {
                info!(%kind, %status, "search input rejected");
                return self.emit(UiEvent::Status(status)).await;
            }
        };

        let session = self.session_mut(kind);
        session.buffer.clear();
        session.generation += 1;
        session.page = 0;
        session.changed = false;
        let generation = session.generation;
        self.awaiting = Some(kind);
        self.emit(UiEvent::ClearStatus).await?;

        info!(%kind, generation, ?params, "starting search");
        let job = FetchRun {
            kind,
            generation,
            method: self.search_method.clone(),
            params,
        };
        self.fetches.spawn(fetcher::run(
            job,
            Arc::clone(&self.api),
            self.pages_tx.clone(),
            self.cancel.clone(),
        ));
        Ok(())
    }

    /// Query parameters for a new search, or the status text explaining why
    /// the input can't be searched.
    fn search_params(&self, request: &SearchRequest) -> Result<Params, String> {
        let mut params = Params::new();
        match request {
            SearchRequest::Text { text, .. } => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(EMPTY_TEXT.to_string());
                }
                params.insert("text".into(), text.to_string());
            }
            SearchRequest::Geo {
                latitude,
                longitude,
                ..
            } => {
                let point = GeoPoint::parse(latitude, longitude).map_err(|e| e.to_string())?;
                let bbox = point.bounding_box(self.bbox_arcmin);
                params.insert("bbox".into(), bbox.to_string());
            }
        }
        Ok(params)
    }

    /// Accept a page from a fetch run and tell the run whether to go on.
    async fn on_page(&mut self, delivered: PageDelivered) -> Result<()> {
        let PageDelivered {
            kind,
            generation,
            page,
            records,
            reply,
        } = delivered;

        let session = self.session_mut(kind);
        if generation != session.generation {
            debug!(%kind, generation, current = session.generation, "dropping stale page");
            let _ = reply.send(PageAck::Stale);
            return Ok(());
        }

        let offered = records.len();
        let added = session.buffer.add(records);
        session.page = page;
        let full = session.buffer.is_full();
        debug!(%kind, page, offered, added, held = session.buffer.len(), full, "page buffered");
        let _ = reply.send(PageAck::Accepted { full });

        self.on_buffer_updated(kind, generation).await
    }

    /// Show the first result of an awaited search. Anything else is a no-op:
    /// the UI either already has a result or moved on to another search.
    async fn on_buffer_updated(&mut self, kind: SearchKind, generation: u64) -> Result<()> {
        if self.session(kind).generation != generation || self.awaiting != Some(kind) {
            debug!(%kind, generation, awaiting = ?self.awaiting, "buffer update not awaited");
            return Ok(());
        }
        self.awaiting = None;
        self.request_display(kind).await
    }

    async fn request_display(&mut self, kind: SearchKind) -> Result<()> {
        let Some(record) = self.session_mut(kind).buffer.take() else {
            self.emit(UiEvent::Status(NO_PHOTOS_FOUND.to_string()))
                .await?;
            return self.emit(UiEvent::NoResultsIndicator(true)).await;
        };

        let title = record.display_title().to_string();
        debug!(%kind, id = %record.id, %title, "resolving image");
        let images = Arc::clone(&self.images);
        self.resolves.spawn(async move {
            let result = match record.image_url {
                Some(url) => resolve_image(images, url).await.map_err(|e| format!("{e:#}")),
                None => Err("record has no image url".to_string()),
            };
            ImageResolved {
                kind,
                title,
                result,
            }
        });
        Ok(())
    }

    async fn on_image(&mut self, resolved: ImageResolved) -> Result<()> {
        let ImageResolved {
            kind,
            title,
            result,
        } = resolved;
        match result {
            Ok(image) => {
                debug!(%kind, url = %image.url, width = image.width, height = image.height, "image ready");
                self.emit(UiEvent::ShowResult {
                    image: Some(image),
                    title,
                })
                .await?;
                self.emit(UiEvent::NoResultsIndicator(false)).await
            }
            Err(err) => {
                warn!(%kind, %title, error = %err, "image unavailable");
                self.emit(UiEvent::ShowResult {
                    image: None,
                    title: format!("{title} (image unavailable)"),
                })
                .await?;
                self.emit(UiEvent::NoResultsIndicator(true)).await
            }
        }
    }
}

/// Download and decode to RGBA8; decoding runs on the blocking pool.
async fn resolve_image(images: Arc<dyn ImageSource>, url: String) -> Result<ResolvedImage> {
    let bytes = images
        .fetch(&url)
        .await
        .with_context(|| format!("downloading {url}"))?;
    let rgba = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await
        .context("decode task panicked")?
        .with_context(|| format!("decoding {url}"))?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(ResolvedImage {
        url,
        width,
        height,
        pixels: rgba.into_raw(),
    })
}

/// Run the coordinator until `cancel` fires, the UI sends
/// [`Command::Shutdown`], or the command channel closes.
pub async fn run(
    cfg: Configuration,
    api: Arc<dyn SearchApi>,
    images: Arc<dyn ImageSource>,
    mut commands: Receiver<Command>,
    to_ui: Sender<UiEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    let (pages_tx, mut pages_rx) = mpsc::channel::<PageDelivered>(8);
    let mut coordinator =
        SearchCoordinator::new(&cfg, api, images, to_ui, pages_tx, cancel.clone())?;

    loop {
        select! {
            _ = cancel.cancelled() => break,

            maybe_cmd = commands.recv() => match maybe_cmd {
                Some(Command::Search(request)) => coordinator.perform_action(request).await?,
                Some(Command::Shutdown) | None => {
                    info!("ui closed; stopping coordinator");
                    break;
                }
            },

            Some(page) = pages_rx.recv() => coordinator.on_page(page).await?,

            Some(joined) = coordinator.resolves.join_next() => match joined {
                Ok(resolved) => coordinator.on_image(resolved).await?,
                Err(err) => warn!("image task failed: {err}"),
            },

            Some(joined) = coordinator.fetches.join_next() => match joined {
                Ok(summary) => debug!(
                    kind = %summary.kind,
                    generation = summary.generation,
                    current = coordinator.session(summary.kind).generation,
                    stop = ?summary.stop,
                    "fetch run joined"
                ),
                Err(err) => warn!("fetch task failed: {err}"),
            },
        }
    }

    coordinator.fetches.shutdown().await;
    coordinator.resolves.shutdown().await;
    Ok(())
}
