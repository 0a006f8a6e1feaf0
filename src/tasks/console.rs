//! Line-oriented stand-in for the search screen.
//!
//! Reads commands from stdin and prints what the screen would show. The
//! `changed` flag of each request is worked out here, by comparing the input
//! with the last input of the same kind.

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result};
use image::RgbaImage;
use tokio::select;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{Command, ResolvedImage, SearchKind, SearchRequest, UiEvent};

pub const HELP: &str = "\
commands:
  text <words>       search by keyword (t)
  geo <lat> <lon>    search around a point (g)
  next               another result from the last search (n, or empty line)
  quit               exit (q)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Search(SearchRequest),
    Help,
    Quit,
    Invalid(String),
}

/// Remembers the last input per kind, the way the text fields would.
#[derive(Debug, Default)]
pub struct InputTracker {
    text: Option<String>,
    geo: Option<(String, String)>,
    last_kind: Option<SearchKind>,
}

impl InputTracker {
    pub fn parse(&mut self, line: &str) -> ConsoleInput {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(w, r)| (w, r.trim()));

        match word.to_ascii_lowercase().as_str() {
            "" | "n" | "next" => self.repeat(),
            "t" | "text" => ConsoleInput::Search(self.text_request(rest.to_string())),
            "g" | "geo" => {
                let mut parts = rest.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(lat), Some(lon), None) => ConsoleInput::Search(
                        self.geo_request(lat.to_string(), lon.to_string()),
                    ),
                    _ => ConsoleInput::Invalid("usage: geo <lat> <lon>".to_string()),
                }
            }
            "h" | "help" | "?" => ConsoleInput::Help,
            "q" | "quit" | "exit" => ConsoleInput::Quit,
            other => ConsoleInput::Invalid(format!("unknown command `{other}`; try `help`")),
        }
    }

    fn text_request(&mut self, text: String) -> SearchRequest {
        let changed = self.text.as_deref() != Some(text.as_str());
        self.text = Some(text.clone());
        self.last_kind = Some(SearchKind::Text);
        SearchRequest::Text { text, changed }
    }

    fn geo_request(&mut self, latitude: String, longitude: String) -> SearchRequest {
        let input = (latitude, longitude);
        let changed = self.geo.as_ref() != Some(&input);
        self.geo = Some(input.clone());
        self.last_kind = Some(SearchKind::Geo);
        let (latitude, longitude) = input;
        SearchRequest::Geo {
            latitude,
            longitude,
            changed,
        }
    }

    fn repeat(&mut self) -> ConsoleInput {
        let request = match self.last_kind {
            Some(SearchKind::Text) => self.text.clone().map(|text| self.text_request(text)),
            Some(SearchKind::Geo) => self
                .geo
                .clone()
                .map(|(lat, lon)| self.geo_request(lat, lon)),
            None => None,
        };
        match request {
            Some(request) => ConsoleInput::Search(request),
            None => ConsoleInput::Invalid("nothing to repeat yet; try `help`".to_string()),
        }
    }
}

/// One line of screen output for a UI event, if it shows anything.
pub fn describe(event: &UiEvent) -> Option<String> {
    match event {
        UiEvent::ShowResult {
            image: Some(image),
            title,
        } => Some(format!("{title}  [{}x{}] {}", image.width, image.height, image.url)),
        UiEvent::ShowResult { image: None, title } => Some(title.clone()),
        UiEvent::Status(status) => Some(format!("-- {status}")),
        UiEvent::NoResultsIndicator(_) | UiEvent::ClearStatus => None,
    }
}

/// Bridge blocking stdin reads into an async channel. The reader thread is
/// detached; it ends at EOF or when the receiver is dropped.
pub fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel::<String>(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!("stdin read failed: {err}");
                    break;
                }
            }
        }
    });
    rx
}

/// Turn input lines into coordinator commands until the lines run out,
/// `quit`, or cancel.
pub async fn run_input(
    mut lines: Receiver<String>,
    commands: Sender<Command>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut tracker = InputTracker::default();
    println!("{HELP}");

    loop {
        let line = select! {
            _ = cancel.cancelled() => break,
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            info!("input closed");
            let _ = commands.send(Command::Shutdown).await;
            break;
        };
        match tracker.parse(&line) {
            ConsoleInput::Search(request) => {
                debug!(?request, "search request");
                if commands.send(Command::Search(request)).await.is_err() {
                    warn!("coordinator channel closed");
                    break;
                }
            }
            ConsoleInput::Help => println!("{HELP}"),
            ConsoleInput::Invalid(msg) => println!("-- {msg}"),
            ConsoleInput::Quit => {
                let _ = commands.send(Command::Shutdown).await;
                break;
            }
        }
    }
    Ok(())
}

/// Print UI events, saving shown images as PNGs under `save_dir` if given.
pub async fn run_output(
    mut events: Receiver<UiEvent>,
    save_dir: Option<PathBuf>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut shown: u32 = 0;
    loop {
        let event = select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        if let Some(line) = describe(&event) {
            println!("{line}");
        }
        if let (UiEvent::ShowResult { image: Some(image), .. }, Some(dir)) = (event, &save_dir) {
            shown += 1;
            let path = dir.join(format!("{shown:04}.png"));
            match save_png(image, path.clone()).await {
                Ok(()) => println!("   saved {}", path.display()),
                Err(err) => warn!(path = %path.display(), "failed to save image: {err:#}"),
            }
        }
    }
    Ok(())
}

async fn save_png(image: ResolvedImage, path: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        let ResolvedImage {
            width,
            height,
            pixels,
            ..
        } = image;
        let rgba = RgbaImage::from_raw(width, height, pixels)
            .context("pixel buffer does not match dimensions")?;
        rgba.save(&path)
            .with_context(|| format!("writing {}", path.display()))
    })
    .await
    .context("save task panicked")?
}
