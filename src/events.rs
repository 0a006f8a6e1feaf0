use std::fmt;

use tokio::sync::oneshot;

use crate::record::PhotoRecord;

/// The two independent searches the coordinator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchKind {
    Text,
    Geo,
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Geo => f.write_str("geo"),
        }
    }
}

/// A button press from the UI, carrying the current field contents and
/// whether they changed since the last press of the same kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchRequest {
    Text {
        text: String,
        changed: bool,
    },
    Geo {
        latitude: String,
        longitude: String,
        changed: bool,
    },
}

impl SearchRequest {
    pub const fn kind(&self) -> SearchKind {
        match self {
            Self::Text { .. } => SearchKind::Text,
            Self::Geo { .. } => SearchKind::Geo,
        }
    }

    pub const fn changed(&self) -> bool {
        match self {
            Self::Text { changed, .. } | Self::Geo { changed, .. } => *changed,
        }
    }
}

#[derive(Debug)]
pub enum Command {
    Search(SearchRequest),
    Shutdown,
}

/// Decoded RGBA8 image ready for display.
#[derive(Debug, Clone)]
pub struct ResolvedImage {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Notifications for the UI collaborator.
#[derive(Debug, Clone)]
pub enum UiEvent {
    ShowResult {
        image: Option<ResolvedImage>,
        title: String,
    },
    NoResultsIndicator(bool),
    Status(String),
    ClearStatus,
}

/// Fetcher -> Coordinator: one page of results for a run.
#[derive(Debug)]
pub struct PageDelivered {
    pub kind: SearchKind,
    pub generation: u64,
    pub page: u32,
    pub records: Vec<PhotoRecord>,
    pub reply: oneshot::Sender<PageAck>,
}

/// Coordinator -> Fetcher: what became of a delivered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAck {
    Accepted { full: bool },
    /// A newer search of the same kind has started.
    Stale,
}

/// Image resolution -> Coordinator.
#[derive(Debug)]
pub struct ImageResolved {
    pub kind: SearchKind,
    pub title: String,
    pub result: Result<ResolvedImage, String>,
}
