use std::sync::Arc;

use config::Config;

pub mod bars;
pub mod config;
pub mod error;
pub mod geo;
pub mod matching;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod reaper;
pub mod routes;
pub mod store;
pub mod utils;

use bars::places::PlacesProvider;
use notify::Notifier;
use store::GroupStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn GroupStore>,
    pub places: Arc<dyn PlacesProvider>,
    pub notifier: Arc<dyn Notifier>,
}
