pub mod app;
pub mod form;
pub mod ui;

use std::{io, path::PathBuf, sync::Arc, time::Duration};

use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::Notify;
use tracing::{info, warn};

use self::app::{Action, SyspollApp};
use crate::{config, errors::MonitorError, monitor::Monitor, ui_state::UiState};

const TICK_MS: u64 = 1000;

/// Sets up the panic hook to restore the terminal even on unexpected panics.
fn setup_panic_hook() {
    let original = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stderr(), LeaveAlternateScreen);
        original(info);
    }));
}

fn enter_tui() -> io::Result<Terminal<CrosstermBackend<io::Stderr>>> {
    enable_raw_mode()?;
    let mut stderr = io::stderr();
    execute!(stderr, EnterAlternateScreen)?;
    Terminal::new(CrosstermBackend::new(io::stderr()))
}

fn leave_tui(terminal: &mut Terminal<CrosstermBackend<io::Stderr>>) {
    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();
}

/// Runs the interactive front-end until the user quits.
///
/// Every monitor call is made from this task. The frame is redrawn when the
/// projection signals `redraw`, on key presses, and on a slow tick.
pub async fn run_tui(
    monitor: Arc<Monitor>,
    ui_state: Arc<UiState>,
    redraw: Arc<Notify>,
    spec_path: Option<PathBuf>,
) -> io::Result<()> {
    setup_panic_hook();
    let mut terminal = enter_tui()?;

    let result = event_loop(&mut terminal, &monitor, &ui_state, &redraw, spec_path).await;

    leave_tui(&mut terminal);
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stderr>>,
    monitor: &Arc<Monitor>,
    ui_state: &UiState,
    redraw: &Notify,
    spec_path: Option<PathBuf>,
) -> io::Result<()> {
    let mut app = SyspollApp::new(spec_path);
    if ui_state.is_empty() {
        app.open_create();
    }
    let mut event_stream = EventStream::new();
    let tick = Duration::from_millis(TICK_MS);

    loop {
        app.sync_rows(ui_state.render_rows());
        terminal.draw(|f| ui::draw(f, &app))?;

        tokio::select! {
            _ = redraw.notified() => {}

            maybe_event = event_stream.next() => match maybe_event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    let action = app.handle_key(key);
                    if action == Action::Quit {
                        info!("quit requested");
                        return Ok(());
                    }
                    perform(monitor, &mut app, action).await;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
                None => return Ok(()),
            },

            _ = tokio::time::sleep(tick) => {}
        }
    }
}

async fn perform(monitor: &Arc<Monitor>, app: &mut SyspollApp, action: Action) {
    match action {
        Action::None | Action::Quit => {}
        Action::Edit(index) => match monitor.snapshot().await.get(index) {
            Some(system) => app.open_edit(index, system),
            None => app.show_error(MonitorError::NotFound(index)),
        },
        Action::Add(system) => match monitor.add(system).await {
            Ok(index) => {
                app.close_page();
                app.selected = index;
            }
            Err(e @ MonitorError::InvalidInput(_)) => app.form_error(e),
            Err(e) => app.show_error(e),
        },
        Action::Update(index, system) => match monitor.update(index, system).await {
            Ok(()) => app.close_page(),
            Err(e @ MonitorError::InvalidInput(_)) => app.form_error(e),
            Err(e) => app.show_error(e),
        },
        Action::Remove(index) => {
            if let Err(e) = monitor.remove(index).await {
                app.show_error(e);
            }
        }
        Action::Save(path) => {
            let systems = monitor.snapshot().await;
            match config::save_systems(&path, &systems).await {
                Ok(()) => {
                    app.remember_path(&path);
                    app.close_page();
                }
                Err(e) => {
                    warn!(error = %e, "saving polling spec failed");
                    app.show_error(e);
                }
            }
        }
        Action::Load(path) => {
            let loaded = match config::load_systems(&path).await {
                Ok(systems) => monitor.load(systems).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match loaded {
                Ok(()) => {
                    app.remember_path(&path);
                    app.close_page();
                    app.selected = 0;
                }
                Err(e) => {
                    warn!(error = %e, "loading polling spec failed");
                    app.show_error(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tui_tests {
    use super::*;
    use crate::monitor::MonitorSettings;
    use crate::probe::model::System;
    use crate::test_utils::{closed_port_url, temp_dir};
    use crate::tui::app::Page;

    async fn fixture() -> (Arc<Monitor>, Arc<UiState>, SyspollApp) {
        let monitor = Monitor::new(MonitorSettings::default());
        let ui_state = UiState::new(Arc::new(|| {}));
        ui_state.attach(&monitor);
        (monitor, ui_state, SyspollApp::new(None))
    }

    // One probe per prober for the length of a test.
    fn system(name: &str) -> System {
        System::http(name, "1h", closed_port_url().as_str())
    }

    #[tokio::test]
    async fn add_edit_remove_through_the_monitor() {
        let (monitor, ui_state, mut app) = fixture().await;

        app.open_create();
        perform(&monitor, &mut app, Action::Add(system("one"))).await;
        assert_eq!(Page::Systems, app.page);
        assert_eq!(1, ui_state.len());

        perform(&monitor, &mut app, Action::Edit(0)).await;
        match &app.page {
            Page::Edit(form) => assert_eq!("one", form.name),
            other => panic!("unexpected page {:?}", other),
        }
        perform(&monitor, &mut app, Action::Update(0, system("renamed"))).await;
        assert_eq!(Page::Systems, app.page);
        assert_eq!("renamed", ui_state.render_rows()[0].name);

        perform(&monitor, &mut app, Action::Remove(0)).await;
        assert!(ui_state.is_empty());
        assert!(monitor.is_empty().await);
        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn failed_operations_open_the_error_modal() {
        let (monitor, _ui_state, mut app) = fixture().await;

        perform(&monitor, &mut app, Action::Remove(5)).await;
        assert_eq!(
            Page::Error("Error occurred:\nno system at index 5".to_owned()),
            app.page
        );

        let missing = temp_dir().await.join("missing.json");
        perform(&monitor, &mut app, Action::Load(missing.clone())).await;
        match &app.page {
            Page::Error(message) => assert!(message.starts_with(&format!(
                "Error occurred:\nFailed to open file '{}'",
                missing.display()
            ))),
            other => panic!("unexpected page {:?}", other),
        }
        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn save_then_load_round_trips_through_disk() {
        let (monitor, ui_state, mut app) = fixture().await;
        perform(&monitor, &mut app, Action::Add(system("a"))).await;
        perform(&monitor, &mut app, Action::Add(system("b"))).await;

        let path = temp_dir().await.join("systems.json");
        perform(&monitor, &mut app, Action::Save(path.clone())).await;
        assert_eq!(path.display().to_string(), app.spec_path);

        perform(&monitor, &mut app, Action::Remove(0)).await;
        perform(&monitor, &mut app, Action::Load(path)).await;
        assert_eq!(Page::Systems, app.page);
        let names: Vec<String> = ui_state.render_rows().into_iter().map(|r| r.name).collect();
        assert_eq!(vec!["a", "b"], names);
        monitor.shutdown().await;
    }
}
