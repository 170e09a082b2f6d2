//! Colorful console output for optimizer and forecaster runs.

use num_format::{Locale, ToFormattedString};
use owo_colors::OwoColorize;
use std::time::{Duration, Instant};

/// ASCII art banner for server startup.
pub fn print_banner() {
    let banner = r#"
  ____        _            _                _     _   _
 |  _ \  __ _(_)_ __ _   _| |    ___   __ _(_)___| |_(_) ___ ___
 | | | |/ _` | | '__| | | | |   / _ \ / _` | / __| __| |/ __/ __|
 | |_| | (_| | | |  | |_| | |__| (_) | (_| | \__ \ |_| | (__\__ \
 |____/ \__,_|_|_|   \__, |_____\___/ \__, |_|___/\__|_|\___|___/
                     |___/            |___/
"#;
    println!("{}", banner.cyan().bold());
    println!(
        "  {} {}\n",
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black(),
        "Dairy Logistics".bright_cyan()
    );
}

/// Prints a phase start message.
pub fn print_phase_start(phase_name: &str, phase_index: usize) {
    println!(
        "{} {} {} {} phase ({}) started",
        timestamp().bright_black(),
        "INFO".bright_green(),
        format!("[{}]", phase_name).bright_cyan(),
        phase_name.white().bold(),
        phase_index.to_string().yellow()
    );
}

/// Prints a phase end message with metrics.
pub fn print_phase_end(
    phase_name: &str,
    phase_index: usize,
    duration: Duration,
    steps_accepted: u64,
    moves_evaluated: u64,
    best_score: &str,
) {
    let moves_per_sec = per_second(moves_evaluated, duration);
    let acceptance_rate = if moves_evaluated > 0 {
        (steps_accepted as f64 / moves_evaluated as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "{} {} {} {} phase ({}) ended: time spent ({}), best score ({}), move evaluation speed ({}/sec), step total ({}, {:.1}% accepted)",
        timestamp().bright_black(),
        "INFO".bright_green(),
        format!("[{}]", phase_name).bright_cyan(),
        phase_name.white().bold(),
        phase_index.to_string().yellow(),
        format_duration(duration).yellow(),
        format_score(best_score),
        moves_per_sec.to_formatted_string(&Locale::en).bright_magenta().bold(),
        steps_accepted.to_formatted_string(&Locale::en).white(),
        acceptance_rate
    );
}

/// Prints the optimizer completion summary.
pub fn print_solving_ended(
    total_duration: Duration,
    total_moves: u64,
    phase_count: usize,
    final_score: &str,
    all_served: bool,
) {
    let moves_per_sec = per_second(total_moves, total_duration);

    println!(
        "{} {} {} Solving ended: time spent ({}), best score ({}), move evaluation speed ({}/sec), phase total ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        "[Optimizer]".bright_cyan(),
        format_duration(total_duration).yellow(),
        format_score(final_score),
        moves_per_sec.to_formatted_string(&Locale::en).bright_magenta().bold(),
        phase_count.to_string().white()
    );

    // Summary box (60 chars wide, 56 char content area)
    println!();
    println!("{}", "╔══════════════════════════════════════════════════════════╗".bright_cyan());

    let status_text = if all_served {
        "✓ ALL STOPS SERVED"
    } else {
        "✗ PARTIAL PLAN (fleet capacity exceeded)"
    };
    let status_colored = if all_served {
        status_text.bright_green().bold().to_string()
    } else {
        status_text.bright_red().bold().to_string()
    };
    let status_padding = 56usize.saturating_sub(status_text.chars().count());
    let left_pad = status_padding / 2;
    let right_pad = status_padding - left_pad;
    println!(
        "{}{}{}{}{}",
        "║".bright_cyan(),
        " ".repeat(left_pad),
        status_colored,
        " ".repeat(right_pad),
        "║".bright_cyan()
    );

    println!("{}", "╠══════════════════════════════════════════════════════════╣".bright_cyan());

    for (label, value) in [
        ("Final Score:", final_score.to_string()),
        ("Solving Time:", format!("{:.2}s", total_duration.as_secs_f64())),
        (
            "Move Speed:",
            format!("{}/sec", moves_per_sec.to_formatted_string(&Locale::en)),
        ),
    ] {
        println!(
            "{}  {:<18}{:>36}  {}",
            "║".bright_cyan(),
            label,
            value,
            "║".bright_cyan()
        );
    }

    println!("{}", "╚══════════════════════════════════════════════════════════╝".bright_cyan());
    println!();
}

/// Prints the routing problem size.
pub fn print_config(vehicles: usize, stops: usize, locations: usize) {
    println!(
        "{} {} {} Problem: vehicles ({}), stops ({}), locations ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        "[Optimizer]".bright_cyan(),
        vehicles.to_formatted_string(&Locale::en).bright_yellow(),
        stops.to_formatted_string(&Locale::en).bright_yellow(),
        locations.to_formatted_string(&Locale::en).bright_yellow()
    );
}

/// Prints one forecast outcome.
pub fn print_forecast(method: &str, samples: usize, predicted: f64, confidence: f64) {
    let method = if method == "model" {
        method.bright_green().to_string()
    } else {
        method.yellow().to_string()
    };
    println!(
        "{} {} {} Forecast: method ({}), samples ({}), predicted ({} L), confidence ({:.2})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        "[Forecaster]".bright_cyan(),
        method,
        samples.to_formatted_string(&Locale::en).bright_yellow(),
        (predicted.round() as u64).to_formatted_string(&Locale::en).bright_magenta().bold(),
        confidence
    );
}

fn per_second(count: u64, duration: Duration) -> u64 {
    if duration.as_secs_f64() > 0.0 {
        (count as f64 / duration.as_secs_f64()) as u64
    } else {
        0
    }
}

/// Formats a duration nicely.
fn format_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms < 1000 {
        format!("{}ms", total_ms)
    } else if total_ms < 60_000 {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        let mins = total_ms / 60_000;
        let secs = (total_ms % 60_000) / 1000;
        format!("{}m {}s", mins, secs)
    }
}

/// Colours an `"<n>unserved/<d>km"` score: red when stops are left behind.
fn format_score(score: &str) -> String {
    if let Some((unserved, distance)) = score.split_once('/') {
        if let Some(count) = unserved.strip_suffix("unserved") {
            let count: usize = count.parse().unwrap_or(0);
            let unserved_str = if count > 0 {
                unserved.bright_red().to_string()
            } else {
                unserved.bright_green().to_string()
            };
            return format!("{}/{}", unserved_str, distance.white());
        }
    }

    score.white().to_string()
}

/// Returns a timestamp string.
fn timestamp() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| format!("{}.{:03}", d.as_secs(), d.subsec_millis()))
        .unwrap_or_else(|_| "0.000".to_string())
}

/// A timer for tracking phase durations and move counts.
///
/// Created silent (`enabled == false`) it only counts.
pub struct PhaseTimer {
    start: Instant,
    phase_name: String,
    phase_index: usize,
    steps_accepted: u64,
    moves_evaluated: u64,
    last_score: String,
    enabled: bool,
}

impl PhaseTimer {
    pub fn start(phase_name: impl Into<String>, phase_index: usize, enabled: bool) -> Self {
        let name = phase_name.into();
        if enabled {
            print_phase_start(&name, phase_index);
        }
        Self {
            start: Instant::now(),
            phase_name: name,
            phase_index,
            steps_accepted: 0,
            moves_evaluated: 0,
            last_score: String::new(),
            enabled,
        }
    }

    /// Counts an accepted step. `score` runs only when output is enabled.
    pub fn record_accepted(&mut self, score: impl FnOnce() -> String) {
        self.steps_accepted += 1;
        if self.enabled {
            self.last_score = score();
        }
    }

    pub fn record_move(&mut self) {
        self.moves_evaluated += 1;
    }

    pub fn moves_evaluated(&self) -> u64 {
        self.moves_evaluated
    }

    pub fn steps_accepted(&self) -> u64 {
        self.steps_accepted
    }

    pub fn finish(self) {
        if self.enabled {
            print_phase_end(
                &self.phase_name,
                self.phase_index,
                self.start.elapsed(),
                self.steps_accepted,
                self.moves_evaluated,
                &self.last_score,
            );
        }
    }
}
