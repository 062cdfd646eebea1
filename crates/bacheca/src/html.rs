use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use maud::{html, Markup, PreEscaped, DOCTYPE};
use std::fs;
use std::path::Path;

use crate::dates;
use crate::types::Initiative;

/// Write a static snapshot of the calendar view to disk
pub fn generate_html(
    path: &Path,
    selected_day: Option<NaiveDate>,
    matched: &[&Initiative],
    total: usize,
) -> Result<()> {
    let markup = render_page(selected_day, matched, total);
    fs::write(path, markup.into_string())?;
    Ok(())
}

/// Render the calendar view: the selected day, its active initiatives, and
/// prev/next day navigation
pub fn render_page(selected_day: Option<NaiveDate>, matched: &[&Initiative], total: usize) -> Markup {
    html! {
        (DOCTYPE)
        html lang="it" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { "Bacheca NAI Genova" }
                style { (PreEscaped(CSS)) }
            }
            body {
                div.container {
                    h1 { "Bacheca NAI" }
                    p.subtitle { "Attività e servizi per studenti neo-arrivati a Genova" }
                    div.stats {
                        span { (total) } " iniziative in archivio"
                    }
                    @if let Some(day) = selected_day {
                        (render_day(day, matched))
                    } @else {
                        div.empty-state {
                            p { "Nessuna iniziativa con una data riconoscibile." }
                        }
                    }
                }
            }
        }
    }
}

fn render_day(day: NaiveDate, matched: &[&Initiative]) -> Markup {
    let prev = day.pred_opt();
    let next = day.succ_opt();

    html! {
        div.day-nav {
            @if let Some(prev) = prev {
                a.day-link href={"/?giorno=" (prev.format("%Y-%m-%d"))} { "← " (format_day(prev)) }
            }
            h2.day-header { (format_day(day)) }
            @if let Some(next) = next {
                a.day-link href={"/?giorno=" (next.format("%Y-%m-%d"))} { (format_day(next)) " →" }
            }
        }
        div.initiative-list {
            @if matched.is_empty() {
                div.empty-state {
                    p { "Nessuna iniziativa attiva in questo giorno." }
                }
            } @else {
                @for initiative in matched {
                    (render_card(initiative))
                }
            }
        }
    }
}

fn render_card(initiative: &Initiative) -> Markup {
    html! {
        div.initiative-card {
            div.initiative-title {
                (initiative.title)
                @if !initiative.category.is_empty() {
                    span.initiative-type { (initiative.category) }
                }
            }
            @if !initiative.organization.is_empty() {
                div.initiative-org { (initiative.organization) }
            }
            @if !initiative.location.is_empty() {
                div.initiative-location { "📍 " (initiative.location) }
            }
            @if !initiative.description.is_empty() {
                p.initiative-description { (initiative.description) }
            }
            div.initiative-date { "📅 " (initiative.date) }
        }
    }
}

/// Format a day the way it reads in Italian, e.g. "15 giugno 2024"
fn format_day(day: NaiveDate) -> String {
    let month = dates::italian_month_name(day.month()).unwrap_or("?");
    format!("{} {} {}", day.day(), month, day.year())
}

const CSS: &str = r#"
* {
    margin: 0;
    padding: 0;
    box-sizing: border-box;
}

body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
    background: #f4f6f8;
    color: #1d2733;
    line-height: 1.5;
}

.container {
    max-width: 860px;
    margin: 0 auto;
    padding: 40px 20px 60px;
}

h1 {
    font-size: 2.2em;
    font-weight: 800;
    color: #0c4f6e;
}

.subtitle {
    color: #5a6b7b;
    margin-bottom: 12px;
}

.stats {
    color: #5a6b7b;
    font-size: 0.85em;
    margin-bottom: 32px;
    padding-bottom: 12px;
    border-bottom: 1px solid #dde4ea;
}

.day-nav {
    display: flex;
    align-items: baseline;
    justify-content: space-between;
    gap: 16px;
    margin-bottom: 24px;
}

.day-header {
    font-size: 1.3em;
    color: #0c4f6e;
    text-transform: capitalize;
}

.day-link {
    color: #1a7fb5;
    text-decoration: none;
    font-size: 0.9em;
    white-space: nowrap;
}

.day-link:hover {
    text-decoration: underline;
}

.initiative-list {
    display: grid;
    gap: 16px;
}

.initiative-card {
    background: #fff;
    border: 1px solid #dde4ea;
    border-left: 4px solid #1a7fb5;
    border-radius: 6px;
    padding: 18px 20px;
}

.initiative-title {
    font-weight: 700;
    font-size: 1.05em;
    margin-bottom: 4px;
}

.initiative-type {
    display: inline-block;
    margin-left: 10px;
    padding: 1px 8px;
    background: #e3eff6;
    color: #0c4f6e;
    border-radius: 10px;
    font-size: 0.7em;
    font-weight: 600;
    text-transform: uppercase;
    vertical-align: middle;
}

.initiative-org {
    color: #37505f;
    font-size: 0.9em;
}

.initiative-location {
    color: #5a6b7b;
    font-size: 0.85em;
    margin-top: 2px;
}

.initiative-description {
    margin-top: 8px;
    font-size: 0.92em;
    color: #37505f;
}

.initiative-date {
    margin-top: 10px;
    font-size: 0.85em;
    color: #5a6b7b;
}

.empty-state {
    text-align: center;
    padding: 48px 0;
    color: #8595a3;
}
"#;
