//! Terminal output helpers
//!
//! Command summaries are for the operator at a terminal; structured logs go
//! through tracing. These helpers never log.

use colored::Colorize;

const HEADER_WIDTH: usize = 60;

pub fn print_header(title: &str) {
    let rule = "═".repeat(HEADER_WIDTH);
    println!();
    println!("{}", format!("╔{}╗", rule).bright_blue());
    println!(
        "{}",
        format!("║  {:<width$}║", title, width = HEADER_WIDTH - 2).bright_blue()
    );
    println!("{}", format!("╚{}╝", rule).bright_blue());
    println!();
}

pub fn print_success(message: &str) {
    println!("{}", format!("✅ {}", message).bright_green().bold());
}

pub fn print_error(message: &str) {
    eprintln!("{}", format!("❌ {}", message).bright_red().bold());
}

pub fn print_info(message: &str) {
    println!("{}", format!("ℹ️  {}", message).bright_cyan());
}

pub fn print_warning(message: &str) {
    println!("{}", format!("⚠️  {}", message).bright_yellow());
}

/// Aligned key/value line for deployment summaries.
pub fn print_kv(key: &str, value: &str) {
    println!("   {:<28} {}", format!("{}:", key).bold(), value);
}
