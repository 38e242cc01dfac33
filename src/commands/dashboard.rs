use crate::feed::synchronizer::DashboardSnapshot;
use crate::state::AppState;

pub fn dashboard_snapshot(state: &AppState) -> DashboardSnapshot {
    state.synchronizer.lock().snapshot()
}
