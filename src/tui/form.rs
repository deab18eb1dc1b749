use crossterm::event::{KeyCode, KeyEvent};

use crate::errors::ValidationError;
use crate::probe::model::System;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    fn toggle(self) -> Protocol {
        match self {
            Protocol::Http => Protocol::Https,
            Protocol::Https => Protocol::Http,
        }
    }

    fn of_url(url: &str) -> Protocol {
        match url.split_once("://") {
            Some((scheme, _)) if scheme.eq_ignore_ascii_case("http") => Protocol::Http,
            _ => Protocol::Https,
        }
    }

    /// Replaces an http(s) scheme in `url`, or prefixes one when absent.
    /// Any other scheme is left for validation to reject.
    pub fn apply(&self, url: &str) -> String {
        let url = url.trim();
        match url.split_once("://") {
            Some((scheme, rest))
                if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") =>
            {
                format!("{}://{}", self.as_str(), rest)
            }
            Some(_) => url.to_owned(),
            None => format!("{}://{}", self.as_str(), url),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Interval,
    Protocol,
    Url,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Name, Field::Interval, Field::Protocol, Field::Url];

    pub fn label(&self) -> &'static str {
        match self {
            Field::Name => "System Name",
            Field::Interval => "Check Interval",
            Field::Protocol => "Protocol",
            Field::Url => "URL",
        }
    }

    fn next(self) -> Field {
        match self {
            Field::Name => Field::Interval,
            Field::Interval => Field::Protocol,
            Field::Protocol => Field::Url,
            Field::Url => Field::Name,
        }
    }

    fn prev(self) -> Field {
        match self {
            Field::Name => Field::Url,
            Field::Interval => Field::Name,
            Field::Protocol => Field::Interval,
            Field::Url => Field::Protocol,
        }
    }
}

pub enum FormOutcome {
    Pending,
    Cancelled,
    Submitted(System),
}

/// Create or edit form for one system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditForm {
    /// Row being edited; `None` when creating.
    pub target: Option<usize>,
    pub name: String,
    pub interval: String,
    pub protocol: Protocol,
    pub url: String,
    pub focus: Field,
    pub error: Option<String>,
}

impl EditForm {
    pub fn create() -> EditForm {
        EditForm {
            target: None,
            name: String::new(),
            interval: String::new(),
            protocol: Protocol::Https,
            url: String::new(),
            focus: Field::Name,
            error: None,
        }
    }

    pub fn edit(index: usize, system: &System) -> EditForm {
        let url = system
            .http
            .as_ref()
            .map(|http| http.url.clone())
            .unwrap_or_default();
        EditForm {
            target: Some(index),
            name: system.name.clone(),
            interval: system.check_interval.clone(),
            protocol: Protocol::of_url(&url),
            url,
            focus: Field::Name,
            error: None,
        }
    }

    pub fn value(&self, field: Field) -> &str {
        match field {
            Field::Name => &self.name,
            Field::Interval => &self.interval,
            Field::Protocol => self.protocol.as_str(),
            Field::Url => &self.url,
        }
    }

    fn text_mut(&mut self) -> Option<&mut String> {
        match self.focus {
            Field::Name => Some(&mut self.name),
            Field::Interval => Some(&mut self.interval),
            Field::Protocol => None,
            Field::Url => Some(&mut self.url),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> FormOutcome {
        match key.code {
            KeyCode::Esc => return FormOutcome::Cancelled,
            KeyCode::Enter => match self.build() {
                Ok(system) => return FormOutcome::Submitted(system),
                Err(e) => self.error = Some(e.to_string()),
            },
            KeyCode::Tab | KeyCode::Down => self.focus = self.focus.next(),
            KeyCode::BackTab | KeyCode::Up => self.focus = self.focus.prev(),
            KeyCode::Left | KeyCode::Right if self.focus == Field::Protocol => {
                self.protocol = self.protocol.toggle();
            }
            KeyCode::Backspace => {
                if let Some(text) = self.text_mut() {
                    text.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(text) = self.text_mut() {
                    text.push(c);
                }
            }
            _ => {}
        }
        FormOutcome::Pending
    }

    /// The system described by the form, validated.
    pub fn build(&self) -> Result<System, ValidationError> {
        let system = System::http(
            self.name.trim(),
            self.interval.trim(),
            self.protocol.apply(&self.url),
        );
        system.validate()?;
        Ok(system)
    }

    pub fn set_error(&mut self, error: String) {
        self.error = Some(error);
    }
}
