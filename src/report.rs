use crate::snapshot::{PerformanceChange, SnapshotDiff};

/// Group changes by show name, preserving first-seen order.
fn group_by_show(changes: &[PerformanceChange]) -> Vec<(String, Vec<&PerformanceChange>)> {
    let mut groups: Vec<(String, Vec<&PerformanceChange>)> = Vec::new();
    for change in changes {
        match groups.iter_mut().find(|(name, _)| *name == change.show_name) {
            Some((_, entries)) => entries.push(change),
            None => groups.push((change.show_name.clone(), vec![change])),
        }
    }
    groups
}

/// Render a snapshot diff as plain text for console output and the text part
/// of the update email.
pub fn format_diff_as_text(diff: &SnapshotDiff) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push("=".repeat(60));
    lines.push("EDINBURGH FRINGE DAILY UPDATE".to_string());
    lines.push(format!(
        "Comparing: {} -> {}",
        diff.old_snapshot_date, diff.new_snapshot_date
    ));
    lines.push("=".repeat(60));
    lines.push(String::new());

    if !diff.has_changes() {
        lines.push("No changes detected since last snapshot.".to_string());
        return lines.join("\n");
    }

    lines.push(format!("Total changes: {}", diff.total_changes()));
    lines.push(String::new());

    if !diff.new_shows.is_empty() {
        lines.push("-".repeat(40));
        lines.push(format!("NEW SHOWS ({})", diff.new_shows.len()));
        lines.push("-".repeat(40));
        for show in &diff.new_shows {
            lines.push(format!("\n  {}", show.show_name));
            lines.push(format!("    Performer: {}", show.performer));
            lines.push(format!("    Performances: {}", show.performance_count));
            if !show.date_range.is_empty() {
                lines.push(format!("    Dates: {}", show.date_range));
            }
            if !show.venues.is_empty() {
                lines.push(format!("    Venue: {}", show.venues.join(", ")));
            }
            lines.push(format!("    URL: {}", show.show_url));
        }
        lines.push(String::new());
    }

    if !diff.sold_out_performances.is_empty() {
        lines.push("-".repeat(40));
        lines.push(format!("SOLD OUT ({})", diff.sold_out_performances.len()));
        lines.push("-".repeat(40));
        for (show_name, perfs) in group_by_show(&diff.sold_out_performances) {
            lines.push(format!("\n  {}", show_name));
            for perf in perfs.iter().take(5) {
                lines.push(format!("    - {} {}", perf.date, perf.time));
            }
            if perfs.len() > 5 {
                lines.push(format!("    ... and {} more", perfs.len() - 5));
            }
        }
        lines.push(String::new());
    }

    if !diff.cancelled_performances.is_empty() {
        lines.push("-".repeat(40));
        lines.push(format!("CANCELLED ({})", diff.cancelled_performances.len()));
        lines.push("-".repeat(40));
        for perf in diff.cancelled_performances.iter().take(10) {
            lines.push(format!("  {} - {} {}", perf.show_name, perf.date, perf.time));
        }
        if diff.cancelled_performances.len() > 10 {
            lines.push(format!(
                "  ... and {} more",
                diff.cancelled_performances.len() - 10
            ));
        }
        lines.push(String::new());
    }

    if !diff.back_available.is_empty() {
        lines.push("-".repeat(40));
        lines.push(format!("BACK AVAILABLE ({})", diff.back_available.len()));
        lines.push("-".repeat(40));
        for perf in diff.back_available.iter().take(10) {
            lines.push(format!("  {} - {} {}", perf.show_name, perf.date, perf.time));
        }
        if diff.back_available.len() > 10 {
            lines.push(format!("  ... and {} more", diff.back_available.len() - 10));
        }
        lines.push(String::new());
    }

    if !diff.new_performances.is_empty() {
        lines.push("-".repeat(40));
        lines.push(format!(
            "NEW PERFORMANCES FOR EXISTING SHOWS ({})",
            diff.new_performances.len()
        ));
        lines.push("-".repeat(40));
        let groups = group_by_show(&diff.new_performances);
        for (show_name, perfs) in groups.iter().take(10) {
            lines.push(format!("\n  {}", show_name));
            for perf in perfs.iter().take(3) {
                lines.push(format!("    + {} {} @ {}", perf.date, perf.time, perf.venue));
            }
            if perfs.len() > 3 {
                lines.push(format!("    ... and {} more performances", perfs.len() - 3));
            }
        }
        if groups.len() > 10 {
            lines.push(format!(
                "\n  ... and {} more shows with new performances",
                groups.len() - 10
            ));
        }
        lines.push(String::new());
    }

    if !diff.removed_shows.is_empty() {
        lines.push("-".repeat(40));
        lines.push(format!("REMOVED SHOWS ({})", diff.removed_shows.len()));
        lines.push("-".repeat(40));
        for show in diff.removed_shows.iter().take(10) {
            lines.push(format!(
                "  {} ({} performances)",
                show.show_name, show.performance_count
            ));
        }
        if diff.removed_shows.len() > 10 {
            lines.push(format!("  ... and {} more", diff.removed_shows.len() - 10));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Render a snapshot diff as self-contained HTML for the email body. Styles
/// are inline in the document so an email client needs no external assets.
pub fn format_diff_as_html(diff: &SnapshotDiff) -> String {
    let mut html: Vec<String> = Vec::new();
    html.push(
        r#"<!DOCTYPE html>
<html>
<head>
<style>
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; color: #333; }
h1 { color: #7B2D8E; border-bottom: 3px solid #7B2D8E; padding-bottom: 10px; }
h2 { color: #444; margin-top: 30px; border-bottom: 1px solid #ddd; padding-bottom: 5px; }
.summary { background: #f5f5f5; padding: 15px; border-radius: 8px; margin: 20px 0; }
.show { background: #fff; border: 1px solid #e0e0e0; border-radius: 8px; padding: 15px; margin: 10px 0; }
.show-title { font-weight: bold; color: #7B2D8E; font-size: 1.1em; }
.show-meta { color: #666; font-size: 0.9em; margin-top: 5px; }
.performance-list { margin: 10px 0; padding-left: 20px; }
.sold-out { color: #d32f2f; }
.new { color: #2e7d32; }
.cancelled { color: #f57c00; }
.back { color: #1976d2; }
a { color: #7B2D8E; }
.badge { display: inline-block; padding: 2px 8px; border-radius: 12px; font-size: 0.8em; font-weight: bold; }
.badge-new { background: #e8f5e9; color: #2e7d32; }
.badge-soldout { background: #ffebee; color: #d32f2f; }
.badge-cancelled { background: #fff3e0; color: #f57c00; }
</style>
</head>
<body>"#
            .to_string(),
    );

    html.push("<h1>Edinburgh Fringe Daily Update</h1>".to_string());
    html.push(format!(
        "<p><em>Comparing: {} &rarr; {}</em></p>",
        diff.old_snapshot_date, diff.new_snapshot_date
    ));

    if !diff.has_changes() {
        html.push("<p>No changes detected since last snapshot.</p>".to_string());
        html.push("</body></html>".to_string());
        return html.join("\n");
    }

    html.push(r#"<div class="summary">"#.to_string());
    html.push("<strong>Summary:</strong><br>".to_string());
    if !diff.new_shows.is_empty() {
        html.push(format!(
            r#"<span class="new">{} new shows</span><br>"#,
            diff.new_shows.len()
        ));
    }
    if !diff.sold_out_performances.is_empty() {
        html.push(format!(
            r#"<span class="sold-out">{} performances sold out</span><br>"#,
            diff.sold_out_performances.len()
        ));
    }
    if !diff.cancelled_performances.is_empty() {
        html.push(format!(
            r#"<span class="cancelled">{} performances cancelled</span><br>"#,
            diff.cancelled_performances.len()
        ));
    }
    if !diff.back_available.is_empty() {
        html.push(format!(
            r#"<span class="back">{} back available</span><br>"#,
            diff.back_available.len()
        ));
    }
    if !diff.new_performances.is_empty() {
        html.push(format!(
            "{} new performances added<br>",
            diff.new_performances.len()
        ));
    }
    html.push("</div>".to_string());

    if !diff.new_shows.is_empty() {
        html.push(format!(
            r#"<h2 class="new">New Shows ({})</h2>"#,
            diff.new_shows.len()
        ));
        for show in &diff.new_shows {
            html.push(r#"<div class="show">"#.to_string());
            html.push(format!(
                r#"<div class="show-title"><a href="{}">{}</a> <span class="badge badge-new">NEW</span></div>"#,
                show.show_url, show.show_name
            ));
            html.push(r#"<div class="show-meta">"#.to_string());
            html.push(format!("Performer: {}<br>", show.performer));
            html.push(format!("{} performances", show.performance_count));
            if !show.date_range.is_empty() {
                html.push(format!(" | {}", show.date_range));
            }
            if !show.venues.is_empty() {
                html.push(format!("<br>Venue: {}", show.venues.join(", ")));
            }
            html.push("</div>".to_string());
            html.push("</div>".to_string());
        }
    }

    if !diff.sold_out_performances.is_empty() {
        html.push(format!(
            r#"<h2 class="sold-out">Sold Out ({})</h2>"#,
            diff.sold_out_performances.len()
        ));
        for (show_name, perfs) in group_by_show(&diff.sold_out_performances) {
            html.push(r#"<div class="show">"#.to_string());
            html.push(format!(
                r#"<div class="show-title"><a href="{}">{}</a> <span class="badge badge-soldout">SOLD OUT</span></div>"#,
                perfs[0].show_url, show_name
            ));
            html.push(r#"<ul class="performance-list">"#.to_string());
            for perf in perfs.iter().take(5) {
                html.push(format!("<li>{} {}</li>", perf.date, perf.time));
            }
            if perfs.len() > 5 {
                html.push(format!("<li><em>... and {} more</em></li>", perfs.len() - 5));
            }
            html.push("</ul></div>".to_string());
        }
    }

    if !diff.cancelled_performances.is_empty() {
        html.push(format!(
            r#"<h2 class="cancelled">Cancelled ({})</h2>"#,
            diff.cancelled_performances.len()
        ));
        for perf in diff.cancelled_performances.iter().take(10) {
            html.push(format!(
                r#"<div class="show"><a href="{}">{}</a> - {} {}</div>"#,
                perf.show_url, perf.show_name, perf.date, perf.time
            ));
        }
        if diff.cancelled_performances.len() > 10 {
            html.push(format!(
                "<p><em>... and {} more</em></p>",
                diff.cancelled_performances.len() - 10
            ));
        }
    }

    if !diff.back_available.is_empty() {
        html.push(format!(
            r#"<h2 class="back">Back Available ({})</h2>"#,
            diff.back_available.len()
        ));
        for perf in diff.back_available.iter().take(10) {
            html.push(format!(
                r#"<div class="show"><a href="{}">{}</a> - {} {}</div>"#,
                perf.show_url, perf.show_name, perf.date, perf.time
            ));
        }
        if diff.back_available.len() > 10 {
            html.push(format!(
                "<p><em>... and {} more</em></p>",
                diff.back_available.len() - 10
            ));
        }
    }

    if !diff.new_performances.is_empty() {
        html.push(format!(
            "<h2>New Performances ({})</h2>",
            diff.new_performances.len()
        ));
        let groups = group_by_show(&diff.new_performances);
        for (show_name, perfs) in groups.iter().take(10) {
            html.push(r#"<div class="show">"#.to_string());
            html.push(format!(
                r#"<div class="show-title"><a href="{}">{}</a></div>"#,
                perfs[0].show_url, show_name
            ));
            html.push(r#"<ul class="performance-list">"#.to_string());
            for perf in perfs.iter().take(3) {
                html.push(format!("<li>{} {} @ {}</li>", perf.date, perf.time, perf.venue));
            }
            if perfs.len() > 3 {
                html.push(format!("<li><em>... and {} more</em></li>", perfs.len() - 3));
            }
            html.push("</ul></div>".to_string());
        }
        if groups.len() > 10 {
            html.push(format!(
                "<p><em>... and {} more shows</em></p>",
                groups.len() - 10
            ));
        }
    }

    html.push("</body></html>".to_string());
    html.join("\n")
}
