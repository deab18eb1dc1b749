use std::path::PathBuf;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::style::Color;

use super::form::{EditForm, FormOutcome};
use crate::probe::model::System;
use crate::ui_state::RowCells;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptPurpose {
    Save,
    Load,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrompt {
    pub purpose: PromptPurpose,
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Systems,
    Edit(EditForm),
    Prompt(PathPrompt),
    Error(String),
}

/// What the UI loop must do with the monitor after a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
    Edit(usize),
    Add(System),
    Update(usize, System),
    Remove(usize),
    Save(PathBuf),
    Load(PathBuf),
}

pub struct SyspollApp {
    pub rows: Vec<RowCells>,
    pub selected: usize,
    pub page: Page,
    /// Last path used for saving or loading.
    pub spec_path: String,
}

impl SyspollApp {
    pub fn new(spec_path: Option<PathBuf>) -> Self {
        Self {
            rows: Vec::new(),
            selected: 0,
            page: Page::Systems,
            spec_path: spec_path
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    pub fn sync_rows(&mut self, rows: Vec<RowCells>) {
        self.rows = rows;
        if self.selected >= self.rows.len() {
            self.selected = self.rows.len().saturating_sub(1);
        }
    }

    pub fn open_create(&mut self) {
        self.page = Page::Edit(EditForm::create());
    }

    pub fn open_edit(&mut self, index: usize, system: &System) {
        self.page = Page::Edit(EditForm::edit(index, system));
    }

    pub fn show_error(&mut self, error: impl std::fmt::Display) {
        self.page = Page::Error(format!("Error occurred:\n{}", error));
    }

    /// Keeps the form open with `error` shown, or falls back to the modal.
    pub fn form_error(&mut self, error: impl std::fmt::Display) {
        match &mut self.page {
            Page::Edit(form) => form.set_error(error.to_string()),
            _ => self.show_error(error),
        }
    }

    pub fn close_page(&mut self) {
        self.page = Page::Systems;
    }

    pub fn remember_path(&mut self, path: &std::path::Path) {
        self.spec_path = path.display().to_string();
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Action::Quit;
        }
        match &mut self.page {
            Page::Systems => self.handle_systems_key(key),
            Page::Edit(form) => match form.handle_key(key) {
                FormOutcome::Pending => Action::None,
                FormOutcome::Cancelled => {
                    self.close_page();
                    Action::None
                }
                FormOutcome::Submitted(system) => match form.target {
                    Some(index) => Action::Update(index, system),
                    None => Action::Add(system),
                },
            },
            Page::Prompt(prompt) => match key.code {
                KeyCode::Esc => {
                    self.close_page();
                    Action::None
                }
                KeyCode::Enter => {
                    let path = prompt.input.trim();
                    if path.is_empty() {
                        return Action::None;
                    }
                    let path = PathBuf::from(path);
                    match prompt.purpose {
                        PromptPurpose::Save => Action::Save(path),
                        PromptPurpose::Load => Action::Load(path),
                    }
                }
                KeyCode::Backspace => {
                    prompt.input.pop();
                    Action::None
                }
                KeyCode::Char(c) => {
                    prompt.input.push(c);
                    Action::None
                }
                _ => Action::None,
            },
            Page::Error(_) => {
                if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                    self.close_page();
                }
                Action::None
            }
        }
    }

    fn handle_systems_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Char('q') => Action::Quit,
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
                Action::None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.rows.len() {
                    self.selected += 1;
                }
                Action::None
            }
            KeyCode::Char('a') => {
                self.open_create();
                Action::None
            }
            KeyCode::Char('e') | KeyCode::Enter if !self.rows.is_empty() => {
                Action::Edit(self.selected)
            }
            KeyCode::Char('d') | KeyCode::Delete if !self.rows.is_empty() => {
                Action::Remove(self.selected)
            }
            KeyCode::Char('s') => {
                self.open_prompt(PromptPurpose::Save);
                Action::None
            }
            KeyCode::Char('l') => {
                self.open_prompt(PromptPurpose::Load);
                Action::None
            }
            _ => Action::None,
        }
    }

    fn open_prompt(&mut self, purpose: PromptPurpose) {
        self.page = Page::Prompt(PathPrompt {
            purpose,
            input: self.spec_path.clone(),
        });
    }
}

/// Splits a leading colour tag off a cell, e.g. `[red]DOWN`.
pub fn split_colour_tag(text: &str) -> (Color, &str) {
    const TAGS: [(&str, Color); 3] = [
        ("[green]", Color::Green),
        ("[red]", Color::Red),
        ("[gray]", Color::DarkGray),
    ];
    for (tag, colour) in TAGS {
        if let Some(rest) = text.strip_prefix(tag) {
            return (colour, rest);
        }
    }
    (Color::Reset, text)
}
