//! The client call loop.
//!
//! Each call waits out the next interval, draws the next delay from the
//! client's own strategy and asks the server to apply exactly that delay
//! through `x-delay-*` metadata. The run stops at the first failed call.

use std::time::{Duration, Instant};

use chrono::Utc;
use netfault_action::{Action, ActionTransport, CallMetadata};
use netfault_delay::{override_metadata, DelayStrategy};
use serde::Serialize;
use tracing::{error, info};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Action kind sent on every call.
pub const ECHO_ACTION: &str = "echo";

/// Message sent as the action payload.
#[derive(Debug, Clone, Serialize)]
pub struct EchoMessage<'a> {
    pub sequence: u32,
    pub total: u32,
    pub client_message: &'a str,
    pub client_delay_strategy: DelayReport,
    pub client_interval_strategy: IntervalReport,
    pub network_location: NetworkLocation<'a>,
    pub idle_seconds_before_request: f64,
    /// Wall-clock start of the attempt, seconds since the Unix epoch.
    pub attempt_started_epoch: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DelayReport {
    pub strategy: &'static str,
    pub current_delay_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntervalReport {
    pub strategy: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkLocation<'a> {
    pub host: &'a str,
    pub port: u16,
}

/// Outcome of one successful call.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub sequence: u32,
    /// Delay the server was asked to apply.
    pub requested_delay_secs: f64,
    /// Time since the previous success (or the start of the run).
    pub idle_secs: f64,
    pub round_trip_secs: f64,
    /// Decoded result bodies.
    pub responses: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub calls: Vec<CallRecord>,
}

/// Drives the configured number of echo calls over a transport.
pub struct Runner<T> {
    transport: T,
    config: ClientConfig,
    delay: DelayStrategy,
    interval: DelayStrategy,
}

impl<T: ActionTransport> Runner<T> {
    pub fn new(transport: T, config: ClientConfig) -> Result<Self, ClientError> {
        let delay = config.delay.build()?;
        let interval = config.interval.build()?;
        Ok(Self {
            transport,
            config,
            delay,
            interval,
        })
    }

    pub async fn run(&mut self) -> Result<RunSummary, ClientError> {
        let total = self.config.repetitions;
        let mut summary = RunSummary::default();
        let mut last_success = Instant::now();

        info!(repetitions = total, "Starting client");

        for sequence in 1..=total {
            let interval_secs = self.interval.next_delay();
            if interval_secs > 0.0 {
                info!(sleep_secs = interval_secs, "Sleeping before next message");
                tokio::time::sleep(to_duration(interval_secs)).await;
            }

            let idle_secs = last_success.elapsed().as_secs_f64();
            info!(idle_secs, "Idle since last successful response");

            let delay_secs = self.delay.next_delay();
            let metadata: CallMetadata = override_metadata(&self.delay, delay_secs)
                .into_iter()
                .collect();

            let message = EchoMessage {
                sequence,
                total,
                client_message: &self.config.message_template,
                client_delay_strategy: DelayReport {
                    strategy: self.delay.kind().as_str(),
                    current_delay_seconds: delay_secs,
                },
                client_interval_strategy: IntervalReport {
                    strategy: self.interval.kind().as_str(),
                },
                network_location: NetworkLocation {
                    host: &self.config.host,
                    port: self.config.port,
                },
                idle_seconds_before_request: idle_secs,
                attempt_started_epoch: epoch_seconds(),
            };
            let payload = serde_json::to_vec(&message)?;

            info!(sequence, total, delay_secs, "Sending message");
            let attempt_started = Instant::now();

            let results = match self
                .transport
                .do_action(Action::new(ECHO_ACTION, payload), &metadata)
                .await
            {
                Ok(results) => results,
                Err(source) => {
                    let idle_secs = last_success.elapsed().as_secs_f64();
                    let in_flight_secs = attempt_started.elapsed().as_secs_f64();
                    error!(
                        sequence,
                        total,
                        idle_secs,
                        in_flight_secs,
                        error = %source,
                        "Call failed"
                    );
                    return Err(ClientError::CallFailed {
                        sequence,
                        total,
                        idle_secs,
                        in_flight_secs,
                        source,
                    });
                }
            };

            let mut responses = Vec::with_capacity(results.len());
            for result in results {
                let response: serde_json::Value = serde_json::from_slice(&result.body)
                    .map_err(|e| ClientError::InvalidResponse {
                        sequence,
                        total,
                        message: e.to_string(),
                    })?;
                info!(response = %response, "Received response");
                responses.push(response);
            }

            last_success = Instant::now();
            let round_trip_secs = last_success.duration_since(attempt_started).as_secs_f64();
            info!(
                sequence,
                total,
                round_trip_secs,
                idle_secs,
                "Call completed"
            );

            summary.calls.push(CallRecord {
                sequence,
                requested_delay_secs: delay_secs,
                idle_secs,
                round_trip_secs,
                responses,
            });
        }

        info!("Client run complete");
        Ok(summary)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

fn to_duration(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use netfault_action::{ActionError, ActionResult};
    use std::sync::Mutex;

    /// Records calls; fails the `fail_on`-th call (1-based).
    struct FakeTransport {
        calls: Mutex<Vec<(Action, CallMetadata)>>,
        fail_on: Option<usize>,
        reply: &'static [u8],
    }

    impl FakeTransport {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: None,
                reply: br#"{"ok":true}"#,
            }
        }

        fn calls(&self) -> Vec<(Action, CallMetadata)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ActionTransport for FakeTransport {
        async fn do_action(
            &self,
            action: Action,
            metadata: &CallMetadata,
        ) -> Result<Vec<ActionResult>, ActionError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push((action, metadata.clone()));
            if self.fail_on == Some(calls.len()) {
                return Err(ActionError::rejected(503, "unavailable", "try later"));
            }
            Ok(vec![ActionResult::new(self.reply)])
        }
    }

    fn config(yaml: &str) -> ClientConfig {
        ClientConfig::from_yaml(yaml).unwrap()
    }

    fn payload(action: &Action) -> serde_json::Value {
        serde_json::from_slice(&action.body).unwrap()
    }

    #[tokio::test]
    async fn test_sends_sequenced_echo_messages() {
        let config = config(
            "client:\n  host: proxy\n  port: 9000\n  repetitions: 3\n  message_template: hi\n",
        );
        let mut runner = Runner::new(FakeTransport::new(), config).unwrap();

        let summary = runner.run().await.unwrap();
        assert_eq!(summary.calls.len(), 3);

        let calls = runner.transport().calls();
        assert_eq!(calls.len(), 3);
        for (index, (action, _)) in calls.iter().enumerate() {
            assert_eq!(action.kind, "echo");
            let body = payload(action);
            assert_eq!(body["sequence"], index as u64 + 1);
            assert_eq!(body["total"], 3);
            assert_eq!(body["client_message"], "hi");
            assert_eq!(body["client_delay_strategy"]["strategy"], "fixed");
            assert_eq!(body["client_interval_strategy"]["strategy"], "fixed");
            assert_eq!(body["network_location"]["host"], "proxy");
            assert_eq!(body["network_location"]["port"], 9000);
            assert!(body["idle_seconds_before_request"].as_f64().unwrap() >= 0.0);
            assert!(body["attempt_started_epoch"].as_f64().unwrap() > 0.0);
        }
        assert_eq!(summary.calls[0].responses[0]["ok"], true);
    }

    #[tokio::test]
    async fn test_metadata_carries_client_delay() {
        let config = config(
            "client:\n  repetitions: 2\n  delay:\n    strategy: linear\n    initial_ms: 100\n    linear_increment_ms: 50\n",
        );
        let mut runner = Runner::new(FakeTransport::new(), config).unwrap();
        let summary = runner.run().await.unwrap();

        let calls = runner.transport().calls();
        let first = &calls[0].1;
        assert_eq!(first.get("x-delay-strategy"), Some("linear"));
        assert_eq!(first.get("x-delay-initial-ms"), Some("100.000"));
        assert_eq!(first.get("x-delay-linear-increment-ms"), Some("50.000"));
        assert_eq!(first.get("x-delay-max-ms"), None);

        let second = &calls[1].1;
        assert_eq!(second.get("x-delay-initial-ms"), Some("150.000"));

        assert_eq!(summary.calls[0].requested_delay_secs, 0.1);
        assert_eq!(summary.calls[1].requested_delay_secs, 0.15);
        assert_eq!(
            payload(&calls[1].0)["client_delay_strategy"]["current_delay_seconds"],
            0.15
        );
    }

    #[tokio::test]
    async fn test_interval_is_slept_before_first_call() {
        let config =
            config("client:\n  repetitions: 1\n  interval:\n    strategy: fixed\n    initial_ms: 50\n");
        let mut runner = Runner::new(FakeTransport::new(), config).unwrap();

        let started = Instant::now();
        let summary = runner.run().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(summary.calls[0].idle_secs >= 0.05);
    }

    #[tokio::test]
    async fn test_failure_stops_the_run() {
        let config = config("client:\n  repetitions: 5\n");
        let mut transport = FakeTransport::new();
        transport.fail_on = Some(2);
        let mut runner = Runner::new(transport, config).unwrap();

        let err = runner.run().await.unwrap_err();
        match err {
            ClientError::CallFailed {
                sequence,
                total,
                idle_secs,
                in_flight_secs,
                source,
            } => {
                assert_eq!(sequence, 2);
                assert_eq!(total, 5);
                assert!(idle_secs >= 0.0 && in_flight_secs >= 0.0);
                assert!(matches!(source, ActionError::Rejected { status: 503, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(runner.transport().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_non_json_response_is_an_error() {
        let config = config("client:\n  repetitions: 1\n");
        let mut transport = FakeTransport::new();
        transport.reply = b"plain text";
        let mut runner = Runner::new(transport, config).unwrap();

        let err = runner.run().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidResponse { sequence: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_zero_repetitions_makes_no_calls() {
        let config = config("client:\n  repetitions: 0\n");
        let mut runner = Runner::new(FakeTransport::new(), config).unwrap();

        let summary = runner.run().await.unwrap();
        assert!(summary.calls.is_empty());
        assert!(runner.transport().calls().is_empty());
    }
}
