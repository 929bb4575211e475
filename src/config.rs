use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::fetcher::RetryPolicy;
use crate::types::{parse_category_str, Category, SubscriberId, WatchTarget};

pub const TICKETMASTER_API_URL: &str = "https://app.ticketmaster.com/discovery/v2/events.json";
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

pub const USER_AGENT: &str = concat!("event-radar/", env!("CARGO_PKG_VERSION"));

/// Channel capacity for manual scan requests.
pub const CHANNEL_CAPACITY: usize = 16;

/// Scan loop interval (seconds).
pub const SCAN_INTERVAL_SECS: u64 = 300;

/// Discovery refresh interval (seconds): how often category pages are re-crawled.
pub const DISCOVERY_INTERVAL_SECS: u64 = 21_600;

/// How long the loop sleeps before re-checking when nobody is subscribed.
pub const IDLE_RECHECK_SECS: u64 = 30;

/// Watch targets fetched concurrently within one adapter.
pub const TARGET_FETCH_CONCURRENCY: usize = 4;

/// Placeholders used when a listing is missing a field.
pub const UNKNOWN_CITY: &str = "Unknown city";
pub const UNKNOWN_VENUE: &str = "Unknown venue";
pub const UNKNOWN_DATE: &str = "Unknown date";

/// Curated watchlist shipped with the binary: (category, label, city, venue, url, tags).
const DEFAULT_WATCHLIST: &[(&str, &str, &str, &str, &str, &[&str])] = &[
    (
        "festival",
        "Parklife",
        "Manchester",
        "Heaton Park",
        "https://www.skiddle.com/festivals/parklife/",
        &["outdoor"],
    ),
    (
        "festival",
        "Creamfields",
        "Daresbury",
        "Daresbury Estate",
        "https://www.skiddle.com/festivals/creamfields/",
        &["outdoor"],
    ),
    (
        "festival",
        "Boardmasters",
        "Newquay",
        "Watergate Bay",
        "https://www.skiddle.com/festivals/boardmasters/",
        &["outdoor"],
    ),
    (
        "boxing",
        "Matchroom Boxing: Wembley",
        "London",
        "Wembley Stadium",
        "https://www.matchroomboxing.com/events/",
        &["mega-fight"],
    ),
];

const DEFAULT_DISCOVERY_PAGES: &[(&str, &str)] = &[
    ("festival", "https://www.skiddle.com/festivals/"),
    ("boxing", "https://www.skiddle.com/whats-on/boxing/"),
];

const DEFAULT_CITIES: &[&str] = &["London", "Manchester", "Birmingham", "Glasgow", "Leeds"];

const FESTIVAL_HEADLINERS: &[&str] = &["Glastonbury", "Creamfields", "Parklife", "Oasis", "Coldplay"];
const FESTIVAL_MID_TIER: &[&str] = &["Boardmasters", "Reading", "Leeds Festival", "Fred again", "Chase & Status"];
const BOXING_HEADLINERS: &[&str] = &["Usyk", "Fury", "Joshua", "Dubois"];
const BOXING_MID_TIER: &[&str] = &["Eubank", "Benn", "Parker", "Taylor", "Catterall"];
const GENERIC_HEADLINERS: &[&str] = &["Taylor Swift", "Beyonce", "Arctic Monkeys"];
const GENERIC_MID_TIER: &[&str] = &["Sabrina Carpenter", "Sam Fender", "Chappell Roan"];

/// Trending names for one category. Headline matches get the full keyword
/// boost; mid-tier matches get the category's smaller boost.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    pub headline: Vec<String>,
    pub mid_tier: Vec<String>,
}

impl Roster {
    fn from_env(key: &str, headline: &[&str], mid_tier: &[&str]) -> Self {
        let headline = match std::env::var(key) {
            Ok(raw) if !raw.trim().is_empty() => split_list(&raw),
            _ => to_strings(headline),
        };
        Self { headline, mid_tier: to_strings(mid_tier) }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rosters {
    pub festival: Roster,
    pub boxing: Roster,
    pub generic: Roster,
}

impl Rosters {
    pub fn for_category(&self, category: Category) -> &Roster {
        match category {
            Category::Festival => &self.festival,
            Category::Boxing => &self.boxing,
            Category::Generic => &self.generic,
        }
    }
}

/// Whether a manual "scan now" also marks and dispatches alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualScanPolicy {
    /// Rank and report only; the alerted set is untouched.
    ReportOnly,
    /// Same filter/mark/dispatch path as a timer scan.
    Alert,
}

impl FromStr for ManualScanPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "report-only" | "report_only" | "report" => Ok(Self::ReportOnly),
            "alert" | "mark" => Ok(Self::Alert),
            other => Err(AppError::Config(format!(
                "MANUAL_SCAN_POLICY must be report-only or alert, got {other:?}"
            ))),
        }
    }
}

/// A category listing page crawled by discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryPage {
    pub url: String,
    pub category: Category,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub api_port: u16,
    /// Client-side timeout for every outbound GET (HTTP_TIMEOUT_SECS)
    pub http_timeout: Duration,
    pub scan_interval: Duration,
    pub discovery_interval: Duration,
    pub idle_recheck: Duration,
    /// Minimum trade score that triggers an alert (ALERT_THRESHOLD)
    pub alert_threshold: f64,
    /// Alerts delivered per cycle at most (MAX_ALERTS_PER_CYCLE)
    pub max_alerts_per_cycle: usize,
    pub manual_scan_policy: ManualScanPolicy,
    pub enable_ticketmaster: bool,
    pub enable_watchlist: bool,
    pub enable_discovery: bool,
    pub ticketmaster_api_url: String,
    pub ticketmaster_api_key: Option<String>,
    pub ticketmaster_country: String,
    pub ticketmaster_window_days: i64,
    pub ticketmaster_page_size: u32,
    pub telegram_bot_token: Option<String>,
    /// Subscribers registered at startup (SUBSCRIBER_IDS, comma-separated)
    pub subscriber_ids: Vec<SubscriberId>,
    pub cities_of_interest: Vec<String>,
    pub rosters: Rosters,
    pub watchlist: Vec<WatchTarget>,
    pub discovery_pages: Vec<DiscoveryPage>,
    pub discovery_max_per_page: usize,
    pub retry: RetryPolicy,
    /// Rows shown in the rendered scan summary (SUMMARY_TOP_N)
    pub summary_top_n: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut watchlist = default_watchlist();
        if let Ok(raw) = std::env::var("WATCHLIST_EXTRA") {
            for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                watchlist.push(parse_watch_target(entry)?);
            }
        }

        let discovery_pages = match std::env::var("DISCOVERY_PAGES") {
            Ok(raw) if !raw.trim().is_empty() => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(parse_discovery_page)
                .collect::<Result<Vec<_>>>()?,
            _ => DEFAULT_DISCOVERY_PAGES
                .iter()
                .map(|(category, url)| DiscoveryPage {
                    url: url.to_string(),
                    category: parse_category_str(category),
                })
                .collect(),
        };

        let subscriber_ids = std::env::var("SUBSCRIBER_IDS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<SubscriberId>().map_err(|_| {
                    AppError::Config(format!("SUBSCRIBER_IDS entry {s:?} is not a numeric id"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let cities_of_interest = match std::env::var("CITIES_OF_INTEREST") {
            Ok(raw) if !raw.trim().is_empty() => split_list(&raw),
            _ => to_strings(DEFAULT_CITIES),
        };

        let retry = RetryPolicy {
            max_attempts: env_parse("FETCH_MAX_ATTEMPTS", 3u32).max(1),
            base_delay: Duration::from_secs(env_parse("FETCH_BASE_DELAY_SECS", 5u64)),
            max_delay: Duration::from_secs(env_parse("FETCH_MAX_DELAY_SECS", 60u64)),
        };

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            http_timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 15u64)),
            scan_interval: Duration::from_secs(env_parse("SCAN_INTERVAL_SECS", SCAN_INTERVAL_SECS)),
            discovery_interval: Duration::from_secs(env_parse(
                "DISCOVERY_INTERVAL_SECS",
                DISCOVERY_INTERVAL_SECS,
            )),
            idle_recheck: Duration::from_secs(env_parse("IDLE_RECHECK_SECS", IDLE_RECHECK_SECS)),
            alert_threshold: env_parse("ALERT_THRESHOLD", 65.0f64),
            max_alerts_per_cycle: env_parse("MAX_ALERTS_PER_CYCLE", 5usize),
            manual_scan_policy: std::env::var("MANUAL_SCAN_POLICY")
                .unwrap_or_else(|_| "report-only".to_string())
                .parse()?,
            enable_ticketmaster: env_flag("ENABLE_TICKETMASTER", true),
            enable_watchlist: env_flag("ENABLE_WATCHLIST", true),
            enable_discovery: env_flag("ENABLE_DISCOVERY", true),
            ticketmaster_api_url: std::env::var("TICKETMASTER_API_URL")
                .unwrap_or_else(|_| TICKETMASTER_API_URL.to_string()),
            ticketmaster_api_key: non_empty_var("TICKETMASTER_API_KEY"),
            ticketmaster_country: std::env::var("TICKETMASTER_COUNTRY")
                .unwrap_or_else(|_| "GB".to_string()),
            ticketmaster_window_days: env_parse("TICKETMASTER_WINDOW_DAYS", 90i64),
            ticketmaster_page_size: env_parse("TICKETMASTER_PAGE_SIZE", 50u32),
            telegram_bot_token: non_empty_var("TELEGRAM_BOT_TOKEN"),
            subscriber_ids,
            cities_of_interest,
            rosters: Rosters {
                festival: Roster::from_env("FESTIVAL_KEYWORDS", FESTIVAL_HEADLINERS, FESTIVAL_MID_TIER),
                boxing: Roster::from_env("BOXING_KEYWORDS", BOXING_HEADLINERS, BOXING_MID_TIER),
                generic: Roster::from_env("GENERIC_KEYWORDS", GENERIC_HEADLINERS, GENERIC_MID_TIER),
            },
            watchlist,
            discovery_pages,
            discovery_max_per_page: env_parse("DISCOVERY_MAX_PER_PAGE", 10usize),
            retry,
            summary_top_n: env_parse("SUMMARY_TOP_N", 10usize),
        })
    }
}

fn default_watchlist() -> Vec<WatchTarget> {
    DEFAULT_WATCHLIST
        .iter()
        .map(|(category, label, city, venue, url, tags)| WatchTarget {
            url: url.to_string(),
            label: label.to_string(),
            city: city.to_string(),
            venue: venue.to_string(),
            category: parse_category_str(category),
            tags: to_strings(tags),
        })
        .collect()
}

/// `category|label|city|venue|url[|tag+tag]`
pub fn parse_watch_target(entry: &str) -> Result<WatchTarget> {
    let fields: Vec<&str> = entry.split('|').map(str::trim).collect();
    if fields.len() < 5 || fields[4].is_empty() {
        return Err(AppError::Config(format!(
            "WATCHLIST_EXTRA entry {entry:?} must be category|label|city|venue|url[|tags]"
        )));
    }
    let tags = fields
        .get(5)
        .map(|t| t.split('+').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
        .unwrap_or_default();
    Ok(WatchTarget {
        category: parse_category_str(fields[0]),
        label: fields[1].to_string(),
        city: or_placeholder(fields[2], UNKNOWN_CITY),
        venue: or_placeholder(fields[3], UNKNOWN_VENUE),
        url: fields[4].to_string(),
        tags,
    })
}

/// `category|url`
pub fn parse_discovery_page(entry: &str) -> Result<DiscoveryPage> {
    match entry.split_once('|') {
        Some((category, url)) if !url.trim().is_empty() => Ok(DiscoveryPage {
            url: url.trim().to_string(),
            category: parse_category_str(category),
        }),
        _ => Err(AppError::Config(format!(
            "DISCOVERY_PAGES entry {entry:?} must be category|url"
        ))),
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn or_placeholder(value: &str, placeholder: &str) -> String {
    if value.is_empty() { placeholder.to_string() } else { value.to_string() }
}
