//! Merges live instances and persisted history into one presentable view.
//!
//! Pure and deterministic: the same inputs always produce the same
//! `ProjectsView`, and nothing here touches the filesystem or the clock.
//! A project that is both live and in history intentionally appears in both
//! lists - `open` says what is running, `recent` says what the user has
//! worked on - correlated by normalized path via the `is_open` flag.

use std::collections::HashSet;

use benchmate_daemon_protocol::{OpenProject, ProjectsView, RecentProject};

use crate::paths::normalize_path_for_matching;
use crate::probe::LiveInstance;
use crate::recency::RecentProjectEntry;

/// Builds the unified view.
///
/// - `open` carries one entry per live instance, in the order given (the
///   scheduler passes probe-completion order); instances with no project
///   open are kept.
/// - `recent` preserves the store's most-recent-first order and is never
///   re-sorted by open-state; `is_open` is set when the entry's normalized
///   path matches any live instance's project path.
///
/// `refreshed_at` is left `None`; the scheduler stamps it when it publishes
/// the view.
pub fn reconcile(live: &[LiveInstance], recent: &[RecentProjectEntry]) -> ProjectsView {
    let open_paths: HashSet<String> = live
        .iter()
        .filter_map(|instance| instance.project_path.as_deref())
        .map(normalize_path_for_matching)
        .collect();

    let open = live
        .iter()
        .map(|instance| OpenProject {
            endpoint: instance.endpoint.clone(),
            version: instance.version.clone(),
            project_path: instance.project_path.clone(),
            display_name: instance.display_name.clone(),
        })
        .collect();

    let recent = recent
        .iter()
        .map(|entry| RecentProject {
            is_open: open_paths.contains(&normalize_path_for_matching(&entry.path)),
            path: entry.path.clone(),
            name: entry.name.clone(),
            last_opened: entry.last_opened.clone(),
        })
        .collect();

    ProjectsView {
        open,
        recent,
        refreshed_at: None,
    }
}
