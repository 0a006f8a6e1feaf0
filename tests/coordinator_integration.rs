use async_trait::async_trait;
use photo_finder::api::{ImageSource, Params, SearchApi};
use photo_finder::config::Configuration;
use photo_finder::error::ApiError;
use photo_finder::events::{Command, SearchRequest, UiEvent};
use photo_finder::tasks::coordinator::{self, NO_PHOTOS_FOUND};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Photo service fake keyed by the `text` (or `bbox`) parameter.
#[derive(Default)]
struct ScriptedApi {
    pages: HashMap<String, Vec<Value>>,
    gates: HashMap<String, Arc<Notify>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, String)>>,
}

impl ScriptedApi {
    fn with_pages(mut self, query: &str, pages: Vec<Value>) -> Self {
        self.pages.insert(query.to_string(), pages);
        self
    }

    fn gated(mut self, query: &str, gate: Arc<Notify>) -> Self {
        self.gates.insert(query.to_string(), gate);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchApi for ScriptedApi {
    async fn call(&self, _method: &str, params: &Params) -> Result<Value, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let query = params
            .get("text")
            .or_else(|| params.get("bbox"))
            .cloned()
            .unwrap_or_default();
        let page: usize = params["page"].parse().unwrap();
        self.seen.lock().unwrap().push((query.clone(), page.to_string()));

        if let Some(gate) = self.gates.get(&query) {
            gate.notified().await;
        }
        self.pages
            .get(&query)
            .and_then(|pages| pages.get(page - 1))
            .cloned()
            .ok_or_else(|| ApiError::Parse(format!("no page {page} for {query}")))
    }
}

/// Serves a 1x1 PNG for every URL except ones containing "broken".
struct PngImages;

#[async_trait]
impl ImageSource for PngImages {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        if url.contains("broken") {
            return Err(ApiError::Status(404));
        }
        let img = image::RgbaImage::from_pixel(1, 1, image::Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        Ok(out.into_inner())
    }
}

fn page(prefix: &str, n: usize, pages: Value) -> Value {
    let photo: Vec<Value> = (0..n)
        .map(|i| {
            let id = format!("{prefix}-{i}");
            json!({"id": id, "title": id, "url_m": format!("https://img/{id}.jpg")})
        })
        .collect();
    json!({"photos": {"page": 1, "pages": pages, "photo": photo}, "stat": "ok"})
}

struct Harness {
    cmd_tx: mpsc::Sender<Command>,
    ui_rx: mpsc::Receiver<UiEvent>,
    cancel: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    fn start(cfg: Configuration, api: Arc<ScriptedApi>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (ui_tx, ui_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(coordinator::run(
            cfg,
            api,
            Arc::new(PngImages),
            cmd_rx,
            ui_tx,
            cancel.clone(),
        ));
        Self {
            cmd_tx,
            ui_rx,
            cancel,
            handle,
        }
    }

    async fn text(&self, text: &str, changed: bool) {
        self.cmd_tx
            .send(Command::Search(SearchRequest::Text {
                text: text.to_string(),
                changed,
            }))
            .await
            .unwrap();
    }

    async fn next_event(&mut self) -> UiEvent {
        tokio::time::timeout(Duration::from_secs(2), self.ui_rx.recv())
            .await
            .expect("timeout waiting for ui event")
            .expect("ui channel closed")
    }

    /// Next event that shows something: a result title or a status line.
    async fn next_shown(&mut self) -> String {
        loop {
            match self.next_event().await {
                UiEvent::ShowResult { title, .. } => return title,
                UiEvent::Status(status) => return format!("status: {status}"),
                UiEvent::NoResultsIndicator(_) | UiEvent::ClearStatus => {}
            }
        }
    }

    async fn assert_quiet(&mut self) {
        let got = tokio::time::timeout(Duration::from_millis(200), self.ui_rx.recv()).await;
        assert!(got.is_err(), "unexpected ui event: {got:?}");
    }

    async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

fn config(capacity: usize) -> Configuration {
    Configuration {
        text_capacity: capacity,
        geo_capacity: capacity,
        shuffle_seed: Some(42),
        ..Configuration::default()
    }
}

async fn wait_for_calls(api: &ScriptedApi, n: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while api.calls() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timeout waiting for api calls");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overflowing_page_is_truncated_and_fetching_stops_when_full() {
    let api = Arc::new(
        ScriptedApi::default().with_pages(
            "puffins",
            vec![page("a", 8, json!(5)), page("b", 8, json!(5)), page("c", 8, json!(5))],
        ),
    );
    let mut h = Harness::start(config(10), api.clone());

    h.text("puffins", true).await;
    assert!(matches!(h.next_event().await, UiEvent::ClearStatus));
    // The first result leaves the buffer before page 2 lands, so page 2
    // finds 3 free slots.
    let first = h.next_shown().await;
    assert!(first.starts_with("a-"), "got {first}");

    wait_for_calls(&api, 2).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(api.calls(), 2, "a full buffer must stop the run");

    let mut titles = vec![first];
    for _ in 0..10 {
        h.text("puffins", false).await;
        titles.push(h.next_shown().await);
    }
    h.text("puffins", false).await;
    assert_eq!(h.next_shown().await, format!("status: {NO_PHOTOS_FOUND}"));

    let distinct: HashSet<&String> = titles.iter().collect();
    assert_eq!(distinct.len(), 11);
    assert_eq!(titles.iter().filter(|t| t.starts_with("a-")).count(), 8);
    assert_eq!(titles.iter().filter(|t| t.starts_with("b-")).count(), 3);
    assert!(titles.iter().all(|t| !t.starts_with("c-")));

    h.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unchanged_press_with_empty_buffer_reports_no_photos() {
    let api = Arc::new(ScriptedApi::default());
    let mut h = Harness::start(config(10), api.clone());

    h.text("anything", false).await;
    assert_eq!(h.next_shown().await, format!("status: {NO_PHOTOS_FOUND}"));
    assert!(matches!(h.next_event().await, UiEvent::NoResultsIndicator(true)));
    assert_eq!(api.calls(), 0);

    h.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn search_with_no_hits_reports_no_photos() {
    let api = Arc::new(ScriptedApi::default().with_pages("zzz", vec![page("z", 0, json!(0))]));
    let mut h = Harness::start(config(10), api.clone());

    h.text("zzz", true).await;
    assert_eq!(h.next_shown().await, format!("status: {NO_PHOTOS_FOUND}"));
    assert_eq!(api.calls(), 1);

    h.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_latitude_never_reaches_the_api() {
    let api = Arc::new(ScriptedApi::default());
    let mut h = Harness::start(config(10), api.clone());

    h.cmd_tx
        .send(Command::Search(SearchRequest::Geo {
            latitude: "95".into(),
            longitude: "0".into(),
            changed: true,
        }))
        .await
        .unwrap();
    assert_eq!(
        h.next_shown().await,
        "status: latitude must be between -90 and 90"
    );
    h.assert_quiet().await;
    assert_eq!(api.calls(), 0);

    h.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn geo_search_sends_bounding_box() {
    let bbox = "-0.2033333333333333,51.416666666666664,-0.03666666666666667,51.583333333333336";
    let api = Arc::new(ScriptedApi::default().with_pages(bbox, vec![page("g", 1, json!(1))]));
    let mut h = Harness::start(config(10), api.clone());

    h.cmd_tx
        .send(Command::Search(SearchRequest::Geo {
            latitude: "51.5".into(),
            longitude: "-0.12".into(),
            changed: true,
        }))
        .await
        .unwrap();
    assert_eq!(h.next_shown().await, "g-0");
    assert_eq!(api.seen.lock().unwrap()[0].0, bbox);

    h.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_run_does_not_leak_into_new_search() {
    let gate = Arc::new(Notify::new());
    let api = Arc::new(
        ScriptedApi::default()
            .with_pages("slow", vec![page("slow", 5, json!(1))])
            .with_pages("fast", vec![page("fast", 2, json!(1))])
            .gated("slow", gate.clone()),
    );
    let mut h = Harness::start(config(10), api.clone());

    h.text("slow", true).await;
    assert!(matches!(h.next_event().await, UiEvent::ClearStatus));
    wait_for_calls(&api, 1).await;

    h.text("fast", true).await;
    assert!(matches!(h.next_event().await, UiEvent::ClearStatus));
    let first = h.next_shown().await;
    assert!(first.starts_with("fast-"), "got {first}");

    // Let the old run finish; its page must be dropped silently.
    gate.notify_one();
    h.assert_quiet().await;

    h.text("fast", false).await;
    let second = h.next_shown().await;
    assert!(second.starts_with("fast-"), "got {second}");
    assert_ne!(first, second);
    h.text("fast", false).await;
    assert_eq!(h.next_shown().await, format!("status: {NO_PHOTOS_FOUND}"));

    h.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broken_image_shows_annotated_title() {
    let body = json!({
        "photos": {
            "pages": 1,
            "photo": [{"id": "1", "title": "Cliff", "url_m": "https://img/broken.jpg"}]
        }
    });
    let api = Arc::new(ScriptedApi::default().with_pages("cliff", vec![body]));
    let mut h = Harness::start(config(10), api);

    h.text("cliff", true).await;
    assert!(matches!(h.next_event().await, UiEvent::ClearStatus));
    match h.next_event().await {
        UiEvent::ShowResult { image, title } => {
            assert!(image.is_none());
            assert_eq!(title, "Cliff (image unavailable)");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(matches!(h.next_event().await, UiEvent::NoResultsIndicator(true)));

    h.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resolved_image_clears_no_results_indicator() {
    let api = Arc::new(ScriptedApi::default().with_pages("gull", vec![page("gull", 1, json!(1))]));
    let mut h = Harness::start(config(10), api);

    h.text("gull", true).await;
    assert!(matches!(h.next_event().await, UiEvent::ClearStatus));
    match h.next_event().await {
        UiEvent::ShowResult {
            image: Some(image),
            title,
        } => {
            assert_eq!(title, "gull-0");
            assert_eq!((image.width, image.height), (1, 1));
            assert_eq!(image.pixels, vec![10, 20, 30, 255]);
            assert_eq!(image.url, "https://img/gull-0.jpg");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(matches!(h.next_event().await, UiEvent::NoResultsIndicator(false)));

    h.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_command_ends_coordinator() {
    let api = Arc::new(ScriptedApi::default());
    let h = Harness::start(config(10), api);
    h.cmd_tx.send(Command::Shutdown).await.unwrap();
    let res = tokio::time::timeout(Duration::from_secs(2), h.handle)
        .await
        .expect("coordinator did not stop");
    assert!(res.unwrap().is_ok());
}
