use ratatui::{
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
    Frame,
};

use super::app::{split_colour_tag, Page, PathPrompt, PromptPurpose, SyspollApp};
use super::form::{EditForm, Field};

const HELP: &str = "  a add · e edit · d delete · s save · l load · q quit";

pub fn draw(frame: &mut Frame, app: &SyspollApp) {
    let area = frame.area();

    let chunks = Layout::vertical([
        Constraint::Min(3),    // systems
        Constraint::Length(1), // help
    ])
    .split(area);

    draw_systems(frame, app, chunks[0]);
    draw_help(frame, chunks[1]);

    match &app.page {
        Page::Systems => {}
        Page::Edit(form) => draw_form(frame, form, area),
        Page::Prompt(prompt) => draw_prompt(frame, prompt, area),
        Page::Error(message) => draw_error(frame, message, area),
    }
}

fn draw_systems(frame: &mut Frame, app: &SyspollApp, area: Rect) {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let header = Row::new(["System", "Status", "Interval", "Failures"]).style(bold);

    let rows: Vec<Row> = app
        .rows
        .iter()
        .map(|cells| {
            let (colour, status) = split_colour_tag(&cells.status);
            // Rows changed since the previous frame are drawn bold.
            let style = if cells.dirty { bold } else { Style::default() };
            Row::new(vec![
                Cell::from(cells.name.as_str()),
                Cell::from(Span::styled(status, Style::default().fg(colour))),
                Cell::from(cells.interval.as_str()),
                Cell::from(cells.failures.to_string()),
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(40),
            Constraint::Percentage(25),
            Constraint::Percentage(15),
            Constraint::Percentage(20),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title("syspoll"))
    .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut state = TableState::default();
    if !app.rows.is_empty() {
        state.select(Some(app.selected));
    }
    frame.render_stateful_widget(table, area, &mut state);
}

fn draw_help(frame: &mut Frame, area: Rect) {
    let paragraph = Paragraph::new(HELP).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
}

fn draw_form(frame: &mut Frame, form: &EditForm, area: Rect) {
    let title = if form.target.is_some() {
        "Edit System"
    } else {
        "Add System"
    };
    let mut lines: Vec<Line> = Field::ALL
        .iter()
        .map(|field| {
            let focused = *field == form.focus;
            let label_style = if focused {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().add_modifier(Modifier::BOLD)
            };
            let value = match field {
                Field::Protocol => format!("< {} >", form.value(*field)),
                _ if focused => format!("{}_", form.value(*field)),
                _ => form.value(*field).to_owned(),
            };
            Line::from(vec![
                Span::styled(format!("{:>15}: ", field.label()), label_style),
                Span::raw(value),
            ])
        })
        .collect();
    lines.push(Line::raw(""));
    if let Some(error) = &form.error {
        lines.push(Line::styled(error.clone(), Style::default().fg(Color::Red)));
    }
    lines.push(Line::styled(
        "Enter save · Esc cancel · Tab next field · ←/→ protocol",
        Style::default().fg(Color::DarkGray),
    ));

    let popup = centered(area, 70, 11);
    frame.render_widget(Clear, popup);
    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(paragraph, popup);
}

fn draw_prompt(frame: &mut Frame, prompt: &PathPrompt, area: Rect) {
    let title = match prompt.purpose {
        PromptPurpose::Save => "Save",
        PromptPurpose::Load => "Load",
    };
    let lines = vec![
        Line::from(vec![
            Span::styled("File path: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(format!("{}_", prompt.input)),
        ]),
        Line::raw(""),
        Line::styled("Enter confirm · Esc cancel", Style::default().fg(Color::DarkGray)),
    ];

    let popup = centered(area, 60, 5);
    frame.render_widget(Clear, popup);
    let paragraph =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(paragraph, popup);
}

fn draw_error(frame: &mut Frame, message: &str, area: Rect) {
    let mut lines: Vec<Line> = message
        .lines()
        .map(|line| Line::styled(line.to_owned(), Style::default().fg(Color::Red)))
        .collect();
    lines.push(Line::raw(""));
    lines.push(Line::styled("Enter/Esc dismiss", Style::default().fg(Color::DarkGray)));

    let popup = centered(area, 70, 8);
    frame.render_widget(Clear, popup);
    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Error"));
    frame.render_widget(paragraph, popup);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height.min(area.height))])
        .flex(Flex::Center)
        .areas(area);
    let [popup] = Layout::horizontal([Constraint::Length(width.min(area.width))])
        .flex(Flex::Center)
        .areas(row);
    popup
}
