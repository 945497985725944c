pub mod components;
pub mod job_tree;
pub mod layout;

use ratatui::{
    style::{Color, Style},
    widgets::{Block, Borders, Gauge},
    Frame,
};

use crate::app::App;
use crate::tracker::RunPhase;

pub fn render(app: &App, frame: &mut Frame) {
    let chunks = layout::create_run_layout(frame.area());
    let tracker = app.tracker();

    components::render_header(&header_title(app), frame, chunks[0]);

    let (done, total) = tracker.progress();
    let ratio = if total > 0 {
        done as f64 / total as f64
    } else {
        0.0
    };

    let (label, color) = match tracker.phase() {
        RunPhase::Waiting => ("Starting runner...".to_string(), Color::Cyan),
        RunPhase::Running => {
            let step = tracker.current_step().unwrap_or("waiting for first step");
            (format!("{}/{} jobs | {}", done, total, step), Color::Cyan)
        }
        RunPhase::Finished(done_event) if done_event.has_errors() => (
            format!(
                "Failed with {} error(s) in {}",
                done_event.error_count,
                components::format_duration(done_event.duration)
            ),
            Color::Red,
        ),
        RunPhase::Finished(done_event) => (
            format!(
                "Completed in {}",
                components::format_duration(done_event.duration)
            ),
            Color::Green,
        ),
        RunPhase::Failed(message) => (format!("Error: {}", message), Color::Red),
    };

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .gauge_style(Style::default().fg(color))
        .label(label)
        .ratio(ratio.clamp(0.0, 1.0));
    frame.render_widget(gauge, chunks[1]);

    let main = layout::split_main(chunks[2]);
    job_tree::render_jobs(tracker, frame, main[0]);
    job_tree::render_output(tracker.output(), frame, main[1]);

    components::render_footer(app.footer_hint(), frame, chunks[3]);
}

fn header_title(app: &App) -> String {
    format!(
        "detent: {} ({})",
        app.title(),
        components::format_duration(app.tracker().elapsed())
    )
}
