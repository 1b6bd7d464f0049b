// Terminal output helpers. Everything goes to stderr.
use colored::Colorize;

pub fn eprint_header(text: &str) {
    eprintln!("\n{}", text.bold().cyan());
    eprintln!("{}", "=".repeat(text.len()).cyan());
}

pub fn eprint_success(text: &str) {
    eprintln!("{} {}", "✓".green().bold(), text);
}

pub fn eprint_error(text: &str) {
    eprintln!("{} {}", "✗".red().bold(), text.red());
}

pub fn eprint_warning(text: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), text.yellow());
}
