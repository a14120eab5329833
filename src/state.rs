use std::sync::Arc;

use crate::config::Config;
use crate::intervention::HumanIntervention;
use crate::registry::Registry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<Registry>,
    pub intervention: HumanIntervention,
}
