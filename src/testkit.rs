//! Fakes shared by the unit tests: scripted transport, recording sleeper,
//! canned providers and a recording notifier.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, FetchError, Result};
use crate::fetcher::{HttpGet, HttpResponse, Sleeper};
use crate::notifier::Notifier;
use crate::providers::{Provider, ScanContext};
use crate::types::{Category, Opportunity, SubscriberId};

type Reply = std::result::Result<HttpResponse, FetchError>;

pub fn ok(body: &str) -> Reply {
    Ok(HttpResponse { status: 200, body: body.to_string() })
}

pub fn status(code: u16) -> Reply {
    Ok(HttpResponse { status: code, body: String::new() })
}

pub fn transport_err(msg: &str) -> Reply {
    Err(FetchError::Transport(msg.to_string()))
}

/// Replies from a per-URL table first (same reply every time), then from a
/// FIFO script.
#[derive(Default)]
pub struct ScriptedHttp {
    routes: HashMap<String, Reply>,
    queue: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl ScriptedHttp {
    pub fn new(script: Vec<Reply>) -> Self {
        Self { queue: Mutex::new(script.into()), ..Default::default() }
    }

    pub fn routes(routes: Vec<(&str, Reply)>) -> Self {
        Self {
            routes: routes.into_iter().map(|(u, r)| (u.to_string(), r)).collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }

    pub fn last_params(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().last().map(|(_, p)| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl HttpGet for ScriptedHttp {
    async fn get(&self, url: &str, params: &[(&str, String)]) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((
            url.to_string(),
            params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        ));
        if let Some(reply) = self.routes.get(url) {
            return reply.clone();
        }
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| transport_err("no scripted reply"))
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

/// Builds an opportunity whose trade score is exactly `trade_score`.
pub fn opportunity(id: &str, trade_score: f64) -> Opportunity {
    let mut o = Opportunity {
        id: id.to_string(),
        name: format!("Event {id}"),
        city: "London".to_string(),
        venue: "O2 Arena".to_string(),
        date: "Sat 12 Jul 2031".to_string(),
        source: "test".to_string(),
        category: Category::Generic,
        price_min: 120.0,
        price_max: 180.0,
        demand_score: 100.0,
        risk_score: 0.0,
        url: None,
        tags: Vec::new(),
    };
    o.risk_score = o.trade_score() - trade_score;
    o
}

/// Returns the same opportunities every cycle.
pub struct FixedProvider {
    pub name: &'static str,
    pub items: Vec<Opportunity>,
}

#[async_trait]
impl Provider for FixedProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, _ctx: &ScanContext) -> Vec<Opportunity> {
        self.items.clone()
    }
}

/// Stands in for a provider whose upstream is permanently down.
pub struct EmptyProvider;

#[async_trait]
impl Provider for EmptyProvider {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn fetch(&self, _ctx: &ScanContext) -> Vec<Opportunity> {
        Vec::new()
    }
}

pub struct PanickingProvider;

#[async_trait]
impl Provider for PanickingProvider {
    fn name(&self) -> &'static str {
        "panicking"
    }

    async fn fetch(&self, _ctx: &ScanContext) -> Vec<Opportunity> {
        panic!("provider blew up");
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub failing: HashSet<SubscriberId>,
    delivered: Mutex<Vec<(SubscriberId, String)>>,
}

impl RecordingNotifier {
    pub fn failing_for(ids: &[SubscriberId]) -> Self {
        Self { failing: ids.iter().copied().collect(), ..Default::default() }
    }

    pub fn delivered(&self) -> Vec<(SubscriberId, String)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, subscriber: SubscriberId, text: &str) -> Result<()> {
        if self.failing.contains(&subscriber) {
            return Err(AppError::Notify(format!("chat {subscriber} blocked the bot")));
        }
        self.delivered.lock().unwrap().push((subscriber, text.to_string()));
        Ok(())
    }
}

pub struct PanickingNotifier;

#[async_trait]
impl Notifier for PanickingNotifier {
    async fn deliver(&self, _subscriber: SubscriberId, _text: &str) -> Result<()> {
        panic!("notifier blew up");
    }
}
