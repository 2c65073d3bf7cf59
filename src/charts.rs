//! Horizontal bar charts for terminal output.
//!
//! Bars are scaled against the largest value in the chart. Labels are
//! right-padded to the longest label so bars line up.

pub fn render_bar_chart(title: &str, rows: &[(String, f64)], width: usize) -> String {
    let mut out = String::new();
    out.push_str(title);
    out.push('\n');
    out.push_str(&"=".repeat(title.chars().count()));
    out.push('\n');

    if rows.is_empty() {
        out.push_str("(no data)\n");
        return out;
    }

    let label_width = rows.iter().map(|(label, _)| label.chars().count()).max().unwrap_or(0);
    let max_value = rows.iter().map(|(_, value)| *value).fold(0.0_f64, f64::max);

    for (label, value) in rows {
        let bar_len = if max_value > 0.0 {
            ((value / max_value) * width as f64).round().max(0.0) as usize
        } else {
            0
        };
        out.push_str(&format!(
            "{:<label_width$} | {} {:.1}\n",
            label,
            "#".repeat(bar_len),
            value,
            label_width = label_width
        ));
    }

    out
}
