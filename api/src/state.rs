use std::sync::Arc;

use crate::config::Config;
use crate::oracle::Oracle;
use crate::push::PushSender;
use crate::queue::TaskQueue;
use crate::store::Store;

/// Shared handler state. The store, oracle, queue, and push dispatcher are
/// trait objects so tests can substitute fakes.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub oracle: Arc<dyn Oracle>,
    pub queue: Arc<dyn TaskQueue>,
    pub push: Arc<dyn PushSender>,
    pub config: Arc<Config>,
}
