use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Run layout: header, progress, jobs and output, footer
pub fn create_run_layout(area: Rect) -> Vec<Rect> {
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(3), // Progress bar
            Constraint::Min(1),    // Jobs/output area
            Constraint::Length(3), // Footer
        ])
        .split(area)
        .to_vec()
}

/// Job tree on the left, output on the right
pub fn split_main(area: Rect) -> Vec<Rect> {
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area)
        .to_vec()
}
