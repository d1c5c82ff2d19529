pub mod check;
pub mod parse;
pub mod watch;

use courtwatch_core::AvailabilityRecord;

pub(crate) fn print_records(records: &[AvailabilityRecord]) {
    let available = records.iter().filter(|r| r.is_available()).count();

    println!("\n╔═══════════════════════════════════════════════════════════════════════╗");
    println!("║ {:<16} {:<12} {:<14} {:<18} {:<5} ║", "Location", "Date", "Time", "Court", "Open");
    println!("╠═══════════════════════════════════════════════════════════════════════╣");
    for r in records {
        println!(
            "║ {:<16} {:<12} {:<14} {:<18} {:<5} ║",
            truncate(&r.location, 16),
            r.date,
            truncate(&r.time_slot, 14),
            truncate(&r.court_label, 18),
            if r.is_available() { "yes" } else { "-" }
        );
    }
    println!("╠═══════════════════════════════════════════════════════════════════════╣");
    let footer = format!("{} of {} slots open", available, records.len());
    println!("║ {:<69} ║", footer);
    println!("╚═══════════════════════════════════════════════════════════════════════╝\n");
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max.saturating_sub(1)).chain(std::iter::once('…')).collect()
    }
}
