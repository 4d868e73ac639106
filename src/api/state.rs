use std::sync::Arc;

use crate::jobs::JobService;
use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct AppState {
    pub jobs: JobService,
    pub scheduler: Arc<Scheduler>,
}
