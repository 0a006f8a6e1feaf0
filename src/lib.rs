pub mod api;
pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod geo;
pub mod record;
pub mod tasks {
    pub mod console;
    pub mod coordinator;
    pub mod fetcher;
}
