//! Terminal styling utilities for the preprocessing CLI

use console::{style, Emoji};
use std::path::Path;

use crate::pipeline::PreprocessConfig;

// Emoji icons with fallbacks for terminals that don't support them
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[*] ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", ">> ");
pub static FOLDER: Emoji<'_, '_> = Emoji("📂 ", "");
pub static TEST: Emoji<'_, '_> = Emoji("🧪 ", "");
pub static SAVE: Emoji<'_, '_> = Emoji("💾 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!] ");

/// Print the application banner
pub fn print_banner(version: &str) {
    let banner = r#"
     ___ _ _    _
    / __| (_)__| |__ _ __ _ _ ___ _ __
   | (__| | / _| / /| '_ \ '_/ -_) '_ \
    \___|_|_\__|_\_\| .__/_| \___| .__/
                    |_|          |_|
    "#;

    println!();
    println!("{}", style(banner).cyan().bold());
    println!(
        "    {}",
        style("Click-log cleaning, imputation and feature generation").dim()
    );
    println!("    {}", style(format!("v{}", version)).dim());
    println!("    {}", style("━".repeat(50)).dim());
    println!();
}

/// Print configuration card
pub fn print_config(
    input: &Path,
    external: Option<&Path>,
    output: &Path,
    config: &PreprocessConfig,
) {
    let box_width = 56;
    let line = "─".repeat(box_width - 2);
    let external = external
        .map(|p| truncate_path(p, 38))
        .unwrap_or_else(|| "-".to_string());
    let flags = [
        ("outliers", config.remove_outliers),
        ("fillna", config.fillna),
        ("dummies", config.use_dummies),
        ("fill_cat", config.fill_cat),
    ]
    .iter()
    .filter(|(_, on)| *on)
    .map(|(name, _)| *name)
    .collect::<Vec<_>>()
    .join(", ");

    println!("    ┌{}┐", line);
    println!(
        "    │ {}{}│",
        style("Configuration").cyan().bold(),
        " ".repeat(box_width - 16)
    );
    println!("    ├{}┤", line);
    println!("    │  {} Input:    {:<37}│", FOLDER, truncate_path(input, 36));
    println!("    │  {} External: {:<37}│", TEST, truncate_string(&external, 36));
    println!("    │  {} Output:   {:<37}│", SAVE, truncate_path(output, 36));
    println!("    ├{}┤", line);
    println!(
        "    │  {} Mode: {:<10} Folds: {:<3} Holdout: {:<12}│",
        GEAR,
        style(config.mode).yellow(),
        style(config.n_folds).yellow(),
        style(format!("{:.0}%", config.holdout_fraction * 100.0)).yellow()
    );
    println!(
        "    │  {} Flags: {:<40}│",
        GEAR,
        truncate_string(if flags.is_empty() { "none" } else { &flags }, 39)
    );
    println!("    └{}┘", line);
    println!();
}

/// Print a step header with styling
pub fn print_step_header(step_num: u8, title: &str) {
    println!();
    println!(
        "    {} {} {}",
        style(format!("STEP {}", step_num)).cyan().bold(),
        style("│").dim(),
        style(title).white().bold()
    );
    println!("    {}", style("─".repeat(50)).dim());
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("    {} {}", style("✓").green().bold(), style(message).green());
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("    {} {}", INFO, message);
}

pub fn print_warning(message: &str) {
    println!("    {} {}", WARN, style(message).yellow());
}

/// Print the final completion message
pub fn print_completion() {
    println!();
    println!(
        "    {} {}",
        ROCKET,
        style("Preprocessing complete!").green().bold()
    );
    println!();
}

/// Print a styled count message
pub fn print_count(description: &str, count: usize, detail: Option<&str>) {
    if let Some(detail) = detail {
        println!(
            "      {} {} {}",
            style(count).yellow().bold(),
            description,
            style(detail).dim()
        );
    } else {
        println!("      {} {}", style(count).yellow().bold(), description);
    }
}

fn truncate_path(path: &Path, max_len: usize) -> String {
    let path_str = path.display().to_string();
    truncate_string(&path_str, max_len)
}

fn truncate_string(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        s.to_string()
    } else {
        let tail: String = chars[chars.len() - (max_len - 3)..].iter().collect();
        format!("...{}", tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("abcdefghijkl", 8), "...hijkl");
    }
}
