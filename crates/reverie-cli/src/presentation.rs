//! Terminal formatting helpers.

const BAR_WIDTH: usize = 30;

/// One-line progress report, e.g. `[#########.....]  60% (3/5 blocks)`.
pub fn progress_line(percent: u8, blocks_done: usize, total: usize) -> String {
    let percent = percent.min(100);
    let filled = usize::from(percent) * BAR_WIDTH / 100;
    format!(
        "[{}{}] {percent:>3}% ({blocks_done}/{total} blocks)",
        "#".repeat(filled),
        ".".repeat(BAR_WIDTH - filled),
    )
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
