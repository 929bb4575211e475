//! Plain-text rendering for chat alerts, watchlists and the last-scan summary.

use std::fmt::Write;

use crate::state::Watchlist;
use crate::types::{Opportunity, ScanMetadata, ScanResult};

pub fn render_alert(o: &Opportunity) -> String {
    let mut s = format!("🔥 {} – {}\n", o.name, o.city);
    let _ = writeln!(s, "📍 {} | 📅 {}", o.venue, o.date);
    let _ = writeln!(s, "💷 {}", price_line(o));
    let _ = writeln!(
        s,
        "Demand: {:.1} | Margin: {:.1}% | Risk: {:.1}",
        o.demand_score,
        o.margin_estimate(),
        o.risk_score
    );
    let _ = write!(s, "→ Trade score: {:.1}", o.trade_score());
    if let Some(url) = &o.url {
        let _ = write!(s, "\n{url}");
    }
    s
}

/// `alert` plus a line naming the watchlist entries it matched, if any.
pub fn with_watch_note(alert: &str, matches: &[&str]) -> String {
    if matches.is_empty() {
        alert.to_string()
    } else {
        format!("{alert}\n⭐ On your watchlist: {}", matches.join(", "))
    }
}

pub fn render_watchlist(w: &Watchlist) -> String {
    if w.is_empty() {
        return "You're not watching anything yet.\nAdd artists and cities to tune your alerts.".to_string();
    }
    let mut s = "🎧 Your watchlist:".to_string();
    if !w.artists.is_empty() {
        let _ = write!(s, "\n• Artists: {}", w.artists.join(", "));
    }
    if !w.cities.is_empty() {
        let _ = write!(s, "\n• Cities: {}", w.cities.join(", "));
    }
    s
}

/// Header with scan bookkeeping, then the top `top_n` ranked rows.
pub fn render_summary(meta: Option<&ScanMetadata>, result: &ScanResult, top_n: usize) -> String {
    let Some(meta) = meta else {
        return "No scan has run yet.".to_string();
    };

    let mut s = format!(
        "📊 Last scan: {} ({})\nEvaluated: {} | Alerts: {} | Delivered: {} | Failed: {}",
        meta.scanned_at.format("%Y-%m-%d %H:%M:%S UTC"),
        meta.trigger,
        meta.evaluated,
        meta.alerts_selected,
        meta.deliveries_ok,
        meta.deliveries_failed,
    );

    if result.is_empty() {
        s.push_str("\n\nNo opportunities found.");
        return s;
    }

    for (i, o) in result.top(top_n).iter().enumerate() {
        let _ = write!(
            s,
            "\n\n{}. {} – {}\n   {} | {}\n   {} | Margin: {:.1}% | Trade score: {:.1}",
            i + 1,
            o.name,
            o.city,
            o.date,
            o.source,
            price_line(o),
            o.margin_estimate(),
            o.trade_score(),
        );
    }
    s
}

fn price_line(o: &Opportunity) -> String {
    if !o.price_known() {
        "Price: TBC (presale)".to_string()
    } else if o.price_max > o.price_min {
        format!("£{:.2} – £{:.2}", o.price_min, o.price_max)
    } else {
        format!("£{:.2}", o.price_min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::testkit::opportunity;
    use crate::types::Trigger;

    fn meta() -> ScanMetadata {
        ScanMetadata {
            scanned_at: Utc.with_ymd_and_hms(2031, 6, 1, 9, 30, 0).unwrap(),
            evaluated: 2,
            trigger: Trigger::Manual,
            alerts_selected: 0,
            deliveries_ok: 0,
            deliveries_failed: 0,
            duration_ms: 12,
        }
    }

    #[test]
    fn alert_carries_price_margin_and_score() {
        let mut o = opportunity("x", 75.0);
        o.url = Some("https://t/x".to_string());
        let text = render_alert(&o);
        assert!(text.contains("Event x – London"));
        assert!(text.contains("£120.00 – £180.00"));
        assert!(text.contains("Margin: 22.5%"));
        assert!(text.contains("Trade score: 75.0"));
        assert!(text.ends_with("https://t/x"));
    }

    #[test]
    fn unknown_price_reads_as_presale() {
        let mut o = opportunity("p", 50.0);
        o.price_min = 0.0;
        o.price_max = 0.0;
        assert!(render_alert(&o).contains("TBC (presale)"));
    }

    #[test]
    fn summary_lists_top_n_in_rank_order() {
        let r = ScanResult::rank(vec![opportunity("b", 40.0), opportunity("a", 90.0)]);
        let text = render_summary(Some(&meta()), &r, 1);
        assert!(text.contains("2031-06-01 09:30:00 UTC (manual)"));
        assert!(text.contains("1. Event a"));
        assert!(!text.contains("Event b"));
    }

    #[test]
    fn watch_note_only_when_something_matched() {
        assert_eq!(with_watch_note("alert", &[]), "alert");
        assert_eq!(with_watch_note("alert", &["Leeds", "Bicep"]), "alert\n⭐ On your watchlist: Leeds, Bicep");
    }

    #[test]
    fn watchlist_lists_only_non_empty_kinds() {
        assert!(render_watchlist(&Watchlist::default()).starts_with("You're not watching anything yet."));
        let w = Watchlist { artists: Vec::new(), cities: vec!["Leeds".to_string(), "York".to_string()] };
        let text = render_watchlist(&w);
        assert!(text.contains("Cities: Leeds, York"));
        assert!(!text.contains("Artists"));
    }

    #[test]
    fn summary_before_first_scan() {
        assert_eq!(render_summary(None, &ScanResult::default(), 10), "No scan has run yet.");
        assert!(render_summary(Some(&meta()), &ScanResult::default(), 10).contains("No opportunities found."));
    }
}
