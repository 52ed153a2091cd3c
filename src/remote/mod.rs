//! Remote Client: JSON-RPC calls against the tracker.
//!
//! This module handles:
//! - The request/response envelope and error payloads
//! - `system.multicall` with order restored from 1-based response ids
//! - Lazy batching, one batch in flight at a time
//! - Typed accessors for tickets, changelogs, fields and reports

pub mod http;
pub mod wire;

pub use http::HttpTransport;

use crate::error::{OfftracError, Result};
use crate::model::{ChangeEvent, FieldKind, ReportDocument, TicketDocument};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::vec;
use tracing::{debug, trace};

/// Default JSON-RPC endpoint, relative to the tracker URL.
pub const DEFAULT_RPC_PATH: &str = "/login/jsonrpc";
/// Server-side multicall cap.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Byte transport under the client.
///
/// `HttpTransport` talks to a live tracker; tests script responses.
pub trait Transport {
    /// POST a JSON body to `path` and decode the JSON response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body is not JSON.
    fn post_json(&mut self, path: &str, body: &Value) -> Result<Value>;

    /// GET `path` and return the body as text.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn get_text(&mut self, path: &str) -> Result<String>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn post_json(&mut self, path: &str, body: &Value) -> Result<Value> {
        (**self).post_json(path, body)
    }

    fn get_text(&mut self, path: &str) -> Result<String> {
        (**self).get_text(path)
    }
}

/// Connection settings for the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: String,
    pub rpc_path: String,
    pub user: String,
    pub password: String,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    pub batch_size: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: "https://trac.example.org".to_string(),
            rpc_path: DEFAULT_RPC_PATH.to_string(),
            user: String::new(),
            password: String::new(),
            retries: 3,
            retry_delay_ms: 10,
            timeout_secs: 60,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// One method invocation inside a multicall.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    pub method: String,
    pub params: Vec<Value>,
}

impl RpcCall {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC client over a `Transport`.
pub struct RemoteClient<T> {
    transport: T,
    rpc_path: String,
    batch_size: usize,
}

impl<T: Transport> RemoteClient<T> {
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            rpc_path: DEFAULT_RPC_PATH.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_rpc_path(mut self, rpc_path: impl Into<String>) -> Self {
        self.rpc_path = rpc_path.into();
        self
    }

    /// Set the multicall batch size (clamped to at least 1).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Invoke one remote method.
    ///
    /// Tagged datetimes in the response are unwrapped at every depth.
    ///
    /// # Errors
    ///
    /// Returns `RemoteCall` if the response carries an error payload, or a
    /// transport error.
    pub fn call(&mut self, method: &str, params: Vec<Value>) -> Result<Value> {
        trace!(method, "RPC call");
        let body = json!({ "method": method, "params": params });
        let mut response = wire::normalize(self.transport.post_json(&self.rpc_path, &body)?);
        if let Some(error) = response.get("error").filter(|error| is_truthy(error)) {
            return Err(OfftracError::RemoteCall {
                method: method.to_string(),
                message: error_message(error),
            });
        }
        Ok(response
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Invoke several methods in one round trip.
    ///
    /// Results come back in the order of `calls`, whatever order the
    /// server answers in.
    ///
    /// # Errors
    ///
    /// Returns `RemoteCall` if any entry failed, or `Protocol` if the
    /// response does not account for every call.
    pub fn multicall(&mut self, calls: &[RpcCall]) -> Result<Vec<Value>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        let envelopes: Vec<Value> = calls
            .iter()
            .enumerate()
            .map(|(index, call)| {
                json!({ "method": call.method, "params": call.params, "id": index + 1 })
            })
            .collect();
        debug!(calls = calls.len(), "system.multicall");
        let response = self.call("system.multicall", envelopes)?;
        let Value::Array(entries) = response else {
            return Err(OfftracError::Protocol(
                "system.multicall did not return a list".to_string(),
            ));
        };

        let mut slots: Vec<Option<Value>> = vec![None; calls.len()];
        for mut entry in entries {
            let id = entry
                .get("id")
                .and_then(Value::as_u64)
                .and_then(|id| usize::try_from(id).ok())
                .filter(|id| (1..=calls.len()).contains(id))
                .ok_or_else(|| {
                    OfftracError::Protocol(format!("multicall entry has a bad id: {entry}"))
                })?;
            if let Some(error) = entry.get("error").filter(|error| is_truthy(error)) {
                return Err(OfftracError::RemoteCall {
                    method: calls[id - 1].method.clone(),
                    message: error_message(error),
                });
            }
            slots[id - 1] = Some(entry.get_mut("result").map_or(Value::Null, Value::take));
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    OfftracError::Protocol(format!("multicall response is missing id {}", index + 1))
                })
            })
            .collect()
    }

    /// Lazily run `calls` in batches of the configured size.
    ///
    /// The next batch is requested only once the previous one has been
    /// consumed.
    pub fn batched_multicall(&mut self, calls: Vec<RpcCall>) -> Multicall<'_, T> {
        let batch_size = self.batch_size;
        Multicall {
            client: self,
            pending: calls.into_iter(),
            batch_size,
            ready: VecDeque::new(),
            failed: false,
        }
    }

    /// Ids of tickets changed at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result is not a list of ids.
    pub fn recent_tickets(&mut self, since: &str) -> Result<Vec<i64>> {
        let result = self.call("ticket.getRecentChanges", vec![wire::datetime(since)])?;
        decode("ticket.getRecentChanges", result)
    }

    /// Names of every value of a field.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub fn field_names(&mut self, kind: FieldKind) -> Result<Vec<String>> {
        let method = format!("ticket.{kind}.getAll");
        let result = self.call(&method, Vec::new())?;
        let names: Vec<Value> = decode(&method, result)?;
        Ok(names.iter().map(value_text).collect())
    }

    /// Every value of a field, paired with its name.
    ///
    /// # Errors
    ///
    /// Returns an error if listing the names fails; per-value failures are
    /// yielded by the iterator.
    pub fn field_values(
        &mut self,
        kind: FieldKind,
    ) -> Result<impl Iterator<Item = Result<(String, Value)>> + '_> {
        let names = self.field_names(kind)?;
        let method = format!("ticket.{kind}.get");
        let calls = names
            .iter()
            .map(|name| RpcCall::new(method.clone(), vec![json!(name)]))
            .collect();
        Ok(names
            .into_iter()
            .zip(self.batched_multicall(calls))
            .map(|(name, value)| value.map(|value| (name, value))))
    }

    /// Ticket documents for `ids`, in order.
    pub fn tickets<'a>(
        &'a mut self,
        ids: &'a [i64],
    ) -> impl Iterator<Item = Result<(i64, TicketDocument)>> + 'a {
        let calls = ids
            .iter()
            .map(|id| RpcCall::new("ticket.get", vec![json!(id)]))
            .collect();
        ids.iter()
            .copied()
            .zip(self.batched_multicall(calls))
            .map(|(id, value)| -> Result<(i64, TicketDocument)> {
                Ok((id, decode("ticket.get", value?)?))
            })
    }

    /// Changelogs for `ids`, in order.
    pub fn changelogs<'a>(
        &'a mut self,
        ids: &'a [i64],
    ) -> impl Iterator<Item = Result<(i64, Vec<ChangeEvent>)>> + 'a {
        let calls = ids
            .iter()
            .map(|id| RpcCall::new("ticket.changeLog", vec![json!(id), json!(0)]))
            .collect();
        ids.iter()
            .copied()
            .zip(self.batched_multicall(calls))
            .map(|(id, value)| -> Result<(i64, Vec<ChangeEvent>)> {
                Ok((id, decode("ticket.changeLog", value?)?))
            })
    }

    /// Saved reports as `(id, title)` from the tab-separated index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be fetched.
    pub fn report_list(&mut self) -> Result<Vec<(String, String)>> {
        let body = self.transport.get_text("/report?asc=1&format=tab")?;
        Ok(parse_report_index(&body))
    }

    /// SQL of one report, combined with its title.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL cannot be fetched.
    pub fn report(&mut self, id: &str, title: &str) -> Result<ReportDocument> {
        let sql = self
            .transport
            .get_text(&format!("/report?id={id}&format=sql"))?;
        Ok(ReportDocument {
            title: title.to_string(),
            sql,
        })
    }
}

/// Lazy sequence of multicall results in submission order.
///
/// Fused after the first error.
pub struct Multicall<'a, T> {
    client: &'a mut RemoteClient<T>,
    pending: vec::IntoIter<RpcCall>,
    batch_size: usize,
    ready: VecDeque<Value>,
    failed: bool,
}

impl<T: Transport> Iterator for Multicall<'_, T> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.ready.is_empty() {
            let batch: Vec<RpcCall> = self.pending.by_ref().take(self.batch_size).collect();
            if batch.is_empty() {
                return None;
            }
            match self.client.multicall(&batch) {
                Ok(results) => self.ready.extend(results),
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        self.ready.pop_front().map(Ok)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }
        let remaining = self.ready.len() + self.pending.len();
        (0, Some(remaining))
    }
}

/// Parse the tab-separated report index; the header line is skipped.
#[must_use]
pub fn parse_report_index(body: &str) -> Vec<(String, String)> {
    body.lines()
        .skip(1)
        .filter_map(|line| line.split_once('\t'))
        .map(|(id, rest)| {
            let title = rest.split('\t').next().unwrap_or(rest);
            (id.to_string(), title.to_string())
        })
        .collect()
}

fn decode<D: DeserializeOwned>(method: &str, value: Value) -> Result<D> {
    serde_json::from_value(value)
        .map_err(|err| OfftracError::Protocol(format!("unexpected {method} result: {err}")))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::Bool(true) => true,
    }
}

fn error_message(error: &Value) -> String {
    error
        .get("message")
        .and_then(Value::as_str)
        .map_or_else(|| value_text(error), str::to_string)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Answers every multicall entry with its first parameter, in reverse order.
    #[derive(Default)]
    struct EchoTransport {
        posts: Vec<Value>,
        pages: Vec<(String, String)>,
    }

    impl Transport for EchoTransport {
        fn post_json(&mut self, _path: &str, body: &Value) -> Result<Value> {
            self.posts.push(body.clone());
            let method = body["method"].as_str().unwrap_or_default();
            if method == "system.multicall" {
                let mut answers: Vec<Value> = body["params"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .map(|call| json!({"id": call["id"], "result": call["params"][0], "error": null}))
                    .collect();
                answers.reverse();
                return Ok(json!({"result": answers, "error": null}));
            }
            if method == "fail" {
                return Ok(json!({"result": null, "error": {"message": "boom", "code": -32603}}));
            }
            Ok(json!({"result": {"__jsonclass__": ["datetime", "2021-01-01T00:00:00"]}, "error": null}))
        }

        fn get_text(&mut self, path: &str) -> Result<String> {
            self.pages
                .iter()
                .find(|(p, _)| p == path)
                .map(|(_, body)| body.clone())
                .ok_or_else(|| OfftracError::Transport {
                    url: path.to_string(),
                    message: "HTTP 404".to_string(),
                })
        }
    }

    fn echo_calls(n: i64) -> Vec<RpcCall> {
        (1..=n).map(|i| RpcCall::new("echo", vec![json!(i)])).collect()
    }

    #[test]
    fn call_normalizes_result() {
        let mut client = RemoteClient::new(EchoTransport::default());
        assert_eq!(client.call("ping", vec![]).unwrap(), json!("2021-01-01T00:00:00"));
    }

    #[test]
    fn call_surfaces_error_payload() {
        let mut client = RemoteClient::new(EchoTransport::default());
        let err = client.call("fail", vec![]).unwrap_err();
        assert!(matches!(err, OfftracError::RemoteCall { ref method, ref message }
            if method == "fail" && message == "boom"));
    }

    #[test]
    fn multicall_restores_submission_order() {
        let mut client = RemoteClient::new(EchoTransport::default());
        let results = client.multicall(&echo_calls(4)).unwrap();
        assert_eq!(results, vec![json!(1), json!(2), json!(3), json!(4)]);
        let ids: Vec<Value> = client.transport_mut().posts[0]["params"]
            .as_array()
            .unwrap()
            .iter()
            .map(|call| call["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3), json!(4)]);
    }

    #[test]
    fn batches_preserve_order_across_boundaries() {
        let mut client = RemoteClient::new(EchoTransport::default()).with_batch_size(2);
        let results: Vec<Value> = client
            .batched_multicall(echo_calls(5))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(results, (1..=5).map(|i| json!(i)).collect::<Vec<_>>());
        assert_eq!(client.transport_mut().posts.len(), 3);
    }

    #[test]
    fn batches_are_requested_lazily() {
        let mut client = RemoteClient::new(EchoTransport::default()).with_batch_size(2);
        let mut results = client.batched_multicall(echo_calls(5));
        assert_eq!(results.next().unwrap().unwrap(), json!(1));
        assert_eq!(results.next().unwrap().unwrap(), json!(2));
        drop(results);
        assert_eq!(client.transport_mut().posts.len(), 1);
    }

    #[test]
    fn multicall_detects_missing_ids() {
        struct Short;
        impl Transport for Short {
            fn post_json(&mut self, _path: &str, _body: &Value) -> Result<Value> {
                Ok(json!({"result": [{"id": 2, "result": "b", "error": null}], "error": null}))
            }
            fn get_text(&mut self, _path: &str) -> Result<String> {
                Ok(String::new())
            }
        }
        let mut client = RemoteClient::new(Short);
        let err = client.multicall(&echo_calls(2)).unwrap_err();
        assert!(matches!(err, OfftracError::Protocol(_)));
    }

    #[test]
    fn recent_tickets_wraps_the_watermark() {
        struct Recent(Option<Value>);
        impl Transport for Recent {
            fn post_json(&mut self, _path: &str, body: &Value) -> Result<Value> {
                self.0 = Some(body.clone());
                Ok(json!({"result": [3, 5], "error": null}))
            }
            fn get_text(&mut self, _path: &str) -> Result<String> {
                Ok(String::new())
            }
        }
        let mut client = RemoteClient::new(Recent(None));
        assert_eq!(client.recent_tickets("2000-01-01T00:00:00").unwrap(), vec![3, 5]);
        let sent = client.transport_mut().0.take().unwrap();
        assert_eq!(
            sent,
            json!({
                "method": "ticket.getRecentChanges",
                "params": [{"__jsonclass__": ["datetime", "2000-01-01T00:00:00"]}]
            })
        );
    }

    #[test]
    fn report_index_skips_header_and_junk() {
        let body = "report\ttitle\tdescription\n1\tActive Tickets\tall open\nbroken line\n11\tMy Tickets\t\n";
        assert_eq!(
            parse_report_index(body),
            vec![
                ("1".to_string(), "Active Tickets".to_string()),
                ("11".to_string(), "My Tickets".to_string()),
            ]
        );
    }

    #[test]
    fn report_fetches_sql() {
        let transport = EchoTransport {
            pages: vec![("/report?id=7&format=sql".to_string(), "SELECT 1".to_string())],
            ..EchoTransport::default()
        };
        let mut client = RemoteClient::new(transport);
        let report = client.report("7", "Seven").unwrap();
        assert_eq!(report, ReportDocument { title: "Seven".to_string(), sql: "SELECT 1".to_string() });
    }
}
