use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use std::time::Duration;

use crate::tracker::{JobStatus, StepStatus};

pub fn render_header(title: &str, frame: &mut Frame, area: Rect) {
    let header = Paragraph::new(title)
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(header, area);
}

pub fn render_footer(text: &str, frame: &mut Frame, area: Rect) {
    let footer = Paragraph::new(text)
        .style(Style::default().fg(Color::Gray))
        .block(Block::default().borders(Borders::ALL).title("Help"));
    frame.render_widget(footer, area);
}

/// Compact duration: `850ms`, `12.3s`, `4m 05s`, `1h 02m`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else if duration.as_millis() >= 1000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

pub fn job_status_display(status: JobStatus) -> (&'static str, Color) {
    match status {
        JobStatus::Pending => (".", Color::DarkGray),
        JobStatus::Running => ("~", Color::Cyan),
        JobStatus::Success => ("O", Color::Green),
        JobStatus::Failed => ("X", Color::Red),
        JobStatus::Skipped => ("-", Color::DarkGray),
        JobStatus::SkippedSecurity => ("!", Color::Yellow),
    }
}

pub fn step_status_display(status: StepStatus) -> (&'static str, Color) {
    match status {
        StepStatus::Pending => (".", Color::DarkGray),
        StepStatus::Running => ("~", Color::Cyan),
        StepStatus::Success => ("O", Color::Green),
        StepStatus::Failed => ("X", Color::Red),
        StepStatus::Skipped => ("-", Color::DarkGray),
        StepStatus::Cancelled => ("-", Color::Red),
    }
}
