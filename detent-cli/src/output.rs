// Styled status lines for the CLI commands
//
// Status lines go to stderr so stdout stays usable for paths, JSON and
// runner output. Colour is dropped when stderr is not a terminal.

use std::io::IsTerminal;
use std::sync::LazyLock;

static COLOR: LazyLock<bool> = LazyLock::new(|| std::io::stderr().is_terminal());

fn paint(style: &str, text: &str) -> String {
    if *COLOR {
        format!("\x1b[{}m{}\x1b[0m", style, text)
    } else {
        text.to_string()
    }
}

/// Right-aligned action verb followed by a message
pub fn status(action: &str, message: &str) {
    eprintln!("{} {}", paint("1;36", &format!("{:>12}", action)), message);
}

pub fn success(message: &str) {
    eprintln!("{} {}", paint("1;32", "  \u{2713}"), message);
}

pub fn failure(message: &str) {
    eprintln!("{} {}", paint("1;31", "  \u{2717}"), message);
}

pub fn warning(message: &str) {
    eprintln!("{} {}", paint("33", "  !"), message);
}

pub fn error(message: &str) {
    eprintln!("{} {}", paint("1;31", "error:"), message);
}

pub fn info(message: &str) {
    eprintln!("{} {}", paint("36", "  i"), message);
}

pub fn dim(message: &str) {
    eprintln!("{}", paint("2", message));
}

pub fn header(message: &str) {
    eprintln!("{}", paint("1", &format!("==> {}", message)));
}

/// A runner output line, indented under the job lines
pub fn step_output(line: &str) {
    println!("        | {}", line);
}
