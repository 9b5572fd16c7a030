// reference adapter talks to the challenge server over HTTP same as client.rs,
// the in-memory one backs tests and local demos

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client as ReqwestClient;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;

use crate::error::OrderError;
use crate::ledger::Action;
use crate::order::{NewOrder, Temperature};

pub const MAX_SEED: u64 = 1 << 63;
const HTTP_TIMEOUT_SECS: u64 = 5;

// order record as it arrives over the wire
#[derive(Debug, Clone, Deserialize)]
pub struct WireOrder {
    pub id: String,
    pub name: String,
    pub temperature: String,
    pub freshness: u64,
}

pub fn parse_wire_order(wire: WireOrder) -> Result<NewOrder, OrderError> {
    let ideal = Temperature::parse(&wire.temperature)?;
    Ok(NewOrder {
        id: wire.id,
        name: wire.name,
        ideal,
        freshness_budget_s: wire.freshness,
    })
}

pub trait OrderSource: Send + Sync {
    // None once exhausted; a malformed record is Some(Err(_)) without stopping the stream
    fn next(&self) -> Option<Result<NewOrder, OrderError>>;
}

pub trait Submitter: Send + Sync {
    fn submit(&self, ledger: &[Action]) -> Result<()>;
}

// finite in-memory order source, also used by tests
pub struct VecOrderSource {
    queue: Mutex<VecDeque<NewOrder>>,
}

impl VecOrderSource {
    pub fn new(orders: Vec<NewOrder>) -> Self {
        Self {
            queue: Mutex::new(orders.into_iter().collect()),
        }
    }
}

impl OrderSource for VecOrderSource {
    fn next(&self) -> Option<Result<NewOrder, OrderError>> {
        self.queue.lock().unwrap().pop_front().map(Ok)
    }
}

// records ledgers in memory, for tests
pub struct RecordingSubmitter {
    pub submitted: Mutex<Vec<Vec<Action>>>,
}

impl RecordingSubmitter {
    pub fn new() -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
        }
    }
}

impl Default for RecordingSubmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Submitter for RecordingSubmitter {
    fn submit(&self, ledger: &[Action]) -> Result<()> {
        self.submitted.lock().unwrap().push(ledger.to_vec());
        Ok(())
    }
}

// GET .../interview/challenge/new for orders + test id,
// POST .../interview/challenge/solve to submit the ledger
pub struct ChallengeServerSource {
    client: ReqwestClient,
    endpoint: String,
    auth: String,
    test_id: Mutex<String>,
    pending: Mutex<VecDeque<NewOrder>>,
}

impl ChallengeServerSource {
    pub fn new(endpoint: &str, auth: &str) -> Self {
        Self {
            client: ReqwestClient::new(),
            endpoint: endpoint.to_string(),
            auth: auth.to_string(),
            test_id: Mutex::new(String::new()),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn fetch_challenge(&self, name: &str, seed: u64) -> Result<()> {
        let seed = if seed == 0 {
            rand::random::<u64>() % MAX_SEED
        } else {
            seed
        }
        .to_string();

        let mut query_params: HashMap<&'static str, String> =
            HashMap::from([("seed", seed), ("auth", self.auth.clone())]);
        if !name.is_empty() {
            query_params.insert("name", name.to_string());
        }

        let url = reqwest::Url::parse_with_params(
            &format!("{}/interview/challenge/new", &self.endpoint),
            query_params.iter(),
        )?;

        let response = self
            .client
            .get(url.clone())
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .send()
            .context("fetching challenge")?;

        let test_id = response
            .headers()
            .get("x-test-id")
            .and_then(|v| v.to_str().ok().map(ToString::to_string))
            .unwrap_or_default();

        let wire_orders: Vec<WireOrder> = response.json().context("decoding challenge orders")?;
        let orders: Vec<NewOrder> = wire_orders
            .into_iter()
            .filter_map(|w| parse_wire_order(w).ok())
            .collect();

        *self.test_id.lock().unwrap() = test_id;
        *self.pending.lock().unwrap() = orders.into_iter().collect();
        Ok(())
    }

    pub fn test_id(&self) -> String {
        self.test_id.lock().unwrap().clone()
    }
}

impl OrderSource for ChallengeServerSource {
    fn next(&self) -> Option<Result<NewOrder, OrderError>> {
        self.pending.lock().unwrap().pop_front().map(Ok)
    }
}

impl Submitter for ChallengeServerSource {
    fn submit(&self, ledger: &[Action]) -> Result<()> {
        let test_id = self.test_id();
        let query = HashMap::from([("auth", &self.auth)]);

        let mut headers = HeaderMap::new();
        headers.insert("x-test-id", HeaderValue::from_str(&test_id)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_str("application/json")?);

        let body = json!({ "actions": ledger });

        let response = self
            .client
            .post(format!("{}/interview/challenge/solve", &self.endpoint))
            .headers(headers)
            .query(&query)
            .json(&body)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .send()
            .context("submitting ledger")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "challenge server rejected submission: {}",
                response.status()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_wire_order_rejects_unknown_temperature() {
        let wire = WireOrder {
            id: "o1".into(),
            name: "Mystery".into(),
            temperature: "frozen".into(),
            freshness: 100,
        };
        let err = parse_wire_order(wire).unwrap_err();
        assert!(matches!(err, OrderError::UnknownTemperature(_)));
    }

    #[test]
    fn vec_order_source_drains_in_order() {
        let src = VecOrderSource::new(vec![
            NewOrder {
                id: "a".into(),
                name: "A".into(),
                ideal: Temperature::Hot,
                freshness_budget_s: 10,
            },
            NewOrder {
                id: "b".into(),
                name: "B".into(),
                ideal: Temperature::Cold,
                freshness_budget_s: 10,
            },
        ]);
        assert_eq!(src.next().unwrap().unwrap().id, "a");
        assert_eq!(src.next().unwrap().unwrap().id, "b");
        assert!(src.next().is_none());
    }
}
