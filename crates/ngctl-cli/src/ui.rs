use colored::Colorize;

// ---------------------------------------------------------------------------
// Colored message helpers
// ---------------------------------------------------------------------------

fn prefix() -> String {
    "[ngctl]".bold().cyan().to_string()
}

/// Print an informational message: [ngctl] message
pub fn info(msg: &str) {
    println!("{} {}", prefix(), msg);
}

/// Print a success message: [ngctl] message (in green)
pub fn success(msg: &str) {
    println!("{} {}", prefix(), msg.green());
}

/// Print an error message: [ngctl] message (in red)
pub fn error(msg: &str) {
    eprintln!("{} {}", "[ngctl]".bold().red(), msg.red());
}

/// Print a warning message: [ngctl] message (in yellow)
pub fn warn(msg: &str) {
    println!("{} {}", prefix(), msg.yellow());
}

// ---------------------------------------------------------------------------
// Status table
// ---------------------------------------------------------------------------

pub fn status_header(title: &str) {
    println!("{}", title.bold());
    println!("{}", "-".repeat(title.len()).dimmed());
}

/// Print a status line with a bold label and a value colored by what it
/// says about the node group.
pub fn status_line(label: &str, value: &str) {
    let colored_value = match status_tone(value) {
        Tone::Good => value.green().to_string(),
        Tone::Bad => value.red().to_string(),
        Tone::Busy => value.yellow().to_string(),
        Tone::Empty => value.dimmed().to_string(),
        Tone::Plain => value.to_string(),
    };
    println!("{} {}", format!("{:<16}", label).bold(), colored_value);
}

#[derive(Debug, PartialEq, Eq)]
enum Tone {
    Good,
    Bad,
    Busy,
    Empty,
    Plain,
}

fn status_tone(value: &str) -> Tone {
    if value.is_empty() || value == "-" {
        Tone::Empty
    } else if value.contains("FAILED") || value.contains("ROLLBACK") || value.contains("error") {
        Tone::Bad
    } else if value.ends_with("_COMPLETE") || (value.ends_with(" READY") && ready_fraction_complete(value)) {
        Tone::Good
    } else if value.contains("IN_PROGRESS") || value.ends_with(" READY") || value.ends_with("_REQUESTED") {
        Tone::Busy
    } else {
        Tone::Plain
    }
}

/// `"3/3 READY"` → true, `"1/3 READY"` → false.
fn ready_fraction_complete(value: &str) -> bool {
    value
        .trim_end_matches(" READY")
        .split_once('/')
        .is_some_and(|(ready, expected)| ready == expected)
}
