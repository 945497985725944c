use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

use std::time::Instant;

use crate::tracker::{JobStatus, TrackedJob, Tracker};
use crate::ui::components;

const INDENT: &str = "  ";

pub fn render_jobs(tracker: &Tracker, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Jobs")
        .border_style(Style::default().fg(Color::Cyan));

    if tracker.jobs().is_empty() {
        let waiting = Paragraph::new("Waiting for the runner to report its jobs...")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(waiting, area);
        return;
    }

    let now = Instant::now();
    let items: Vec<ListItem> = tracker
        .jobs()
        .iter()
        .flat_map(|job| job_lines(job, now))
        .map(ListItem::new)
        .collect();

    frame.render_widget(List::new(items).block(block), area);
}

fn job_lines(job: &TrackedJob, now: Instant) -> Vec<Line<'_>> {
    let indent = INDENT.repeat(job.depth);
    let (symbol, color) = components::job_status_display(job.status);

    let mut spans = vec![
        Span::raw(indent.clone()),
        Span::styled(format!("{} ", symbol), Style::default().fg(color)),
        Span::styled(
            job.name.as_str(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
    ];
    if job.reusable {
        spans.push(Span::styled(" (reusable)", Style::default().fg(Color::DarkGray)));
    }
    if job.status == JobStatus::SkippedSecurity {
        spans.push(Span::styled(" (sensitive)", Style::default().fg(Color::Yellow)));
    }
    if let Some(elapsed) = job.elapsed(now) {
        spans.push(Span::styled(
            format!(" ({})", components::format_duration(elapsed)),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let mut lines = vec![Line::from(spans)];

    // Steps are only listed while they are interesting
    if matches!(job.status, JobStatus::Running | JobStatus::Failed) {
        for step in &job.steps {
            let (symbol, color) = components::step_status_display(step.status);
            lines.push(Line::from(vec![
                Span::raw(format!("{}{}", indent, INDENT)),
                Span::styled(format!("{} ", symbol), Style::default().fg(color)),
                Span::styled(step.name.as_str(), Style::default().fg(color)),
            ]));
        }
    }

    lines
}

pub fn render_output<'a>(lines: impl Iterator<Item = &'a String>, frame: &mut Frame, area: Rect) {
    let visible_height = area.height.saturating_sub(2) as usize;
    let lines: Vec<&String> = lines.collect();
    let start = lines.len().saturating_sub(visible_height);

    let visible: Vec<Line> = lines
        .into_iter()
        .skip(start)
        .map(|line| Line::from(line.as_str()))
        .collect();

    let output = Paragraph::new(visible)
        .block(Block::default().borders(Borders::ALL).title("Output"))
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: false });
    frame.render_widget(output, area);
}
