//! Renderable projection of the monitor.
//!
//! The projection is kept current by one listener on the [`Monitor`]. It only
//! caches display cells; drawing happens on the UI task, which is woken
//! through the injected redraw function.

use std::sync::{Arc, Mutex, PoisonError};

use crate::monitor::{Monitor, MonitorEvent, RowView};
use crate::probe::model::LastStatus;

pub type RequestRedraw = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowCells {
    pub name: String,
    pub status: String,
    pub interval: String,
    pub failures: usize,
    pub dirty: bool,
}

impl RowCells {
    fn from_view(view: &RowView) -> RowCells {
        RowCells {
            name: view.name.clone(),
            status: status_text(&view.status),
            interval: view.interval.clone(),
            failures: view.failure_count,
            dirty: true,
        }
    }
}

/// Status cell text, including the colour tag.
pub fn status_text(status: &LastStatus) -> String {
    match status {
        LastStatus::Ok(code) => format!("[green]UP - {}", code),
        LastStatus::Err(code) => format!("[red]ERROR - {}", code),
        LastStatus::Down(_) => "[red]DOWN".to_owned(),
        LastStatus::Unknown => "[gray]UNK".to_owned(),
    }
}

pub struct UiState {
    rows: Mutex<Vec<RowCells>>,
    request_redraw: RequestRedraw,
}

impl UiState {
    pub fn new(request_redraw: RequestRedraw) -> Arc<UiState> {
        Arc::new(UiState {
            rows: Mutex::new(Vec::new()),
            request_redraw,
        })
    }

    /// Registers the projection's listener with `monitor`.
    pub fn attach(self: &Arc<Self>, monitor: &Monitor) {
        let state = self.clone();
        monitor.subscribe(Arc::new(move |event: &MonitorEvent| state.apply(event)));
    }

    pub fn apply(&self, event: &MonitorEvent) {
        let changed = {
            let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
            match event {
                MonitorEvent::Loaded { rows: views } => {
                    *rows = views.iter().map(RowCells::from_view).collect();
                    true
                }
                MonitorEvent::Added { index, row } => {
                    let index = (*index).min(rows.len());
                    rows.insert(index, RowCells::from_view(row));
                    true
                }
                MonitorEvent::Updated { index, row } => match rows.get_mut(*index) {
                    Some(cells) => {
                        *cells = RowCells::from_view(row);
                        true
                    }
                    None => false,
                },
                MonitorEvent::Removed { index } => {
                    if *index < rows.len() {
                        rows.remove(*index);
                        for cells in rows[*index..].iter_mut() {
                            cells.dirty = true;
                        }
                        true
                    } else {
                        false
                    }
                }
                MonitorEvent::Observed {
                    index,
                    status,
                    failure_count,
                } => match rows.get_mut(*index) {
                    Some(cells) => {
                        let status = status_text(status);
                        if cells.status == status && cells.failures == *failure_count {
                            false
                        } else {
                            cells.status = status;
                            cells.failures = *failure_count;
                            cells.dirty = true;
                            true
                        }
                    }
                    None => false,
                },
            }
        };
        if changed {
            (self.request_redraw)();
        }
    }

    /// Current cells; clears every dirty flag.
    pub fn render_rows(&self) -> Vec<RowCells> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let rendered = rows.clone();
        for cells in rows.iter_mut() {
            cells.dirty = false;
        }
        rendered
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
