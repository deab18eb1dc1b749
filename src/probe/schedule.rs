//! The per-system probing loop.
//!
//! A [`Prober`] is built from an immutable copy of a system's probe
//! descriptor and interval. Spawning it moves it from `Idle` to `Running`; it
//! then probes, emits the observation, and sleeps for the interval until its
//! cancellation token fires. Both the request and the sleep race the token.

use std::time::{Duration, Instant};

use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::probe::{
    http_probe::{probe_http, shared_client},
    model::{Observation, ProbeTarget, System},
};

/// Default upper bound for a single request.
pub const REQUEST_TIMEOUT_CAP: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProberState {
    Idle,
    Running,
    /// Stopped by its cancellation token.
    Cancelled,
    /// Refused to run because the system is misconfigured.
    Fatal,
}

enum Plan {
    Run {
        target: ProbeTarget,
        interval: Duration,
    },
    Fatal(String),
}

pub struct Prober {
    name: String,
    plan: Plan,
    request_timeout_cap: Duration,
    state: watch::Sender<ProberState>,
}

impl Prober {
    /// Samples the system's probe target and interval once.
    pub fn new(system: &System, request_timeout_cap: Duration) -> Prober {
        let plan = match (system.probe_target(), system.interval()) {
            (Ok(target), Ok(interval)) => Plan::Run { target, interval },
            (Err(e), _) | (_, Err(e)) => Plan::Fatal(format!("configuration: {}", e)),
        };
        let (state, _) = watch::channel(ProberState::Idle);
        Prober {
            name: system.name.clone(),
            plan,
            request_timeout_cap,
            state,
        }
    }

    pub fn state(&self) -> ProberState {
        *self.state.borrow()
    }

    /// Per-request deadline, `min(interval, cap)`.
    pub fn request_timeout(&self) -> Option<Duration> {
        match &self.plan {
            Plan::Run { interval, .. } => Some((*interval).min(self.request_timeout_cap)),
            Plan::Fatal(_) => None,
        }
    }

    /// Starts the loop on its own task.
    ///
    /// `emit` is called synchronously on the prober task, once per probe, in
    /// probe order, with the observation and the time the probe took.
    pub fn spawn<F>(self, token: CancellationToken, emit: F) -> ProberHandle
    where
        F: FnMut(Observation, Duration) + Send + 'static,
    {
        let state = self.state.subscribe();
        let task_token = token.clone();
        let handle = tokio::spawn(self.run(task_token, emit));
        ProberHandle {
            token,
            handle,
            state,
            joined: false,
        }
    }

    async fn run<F>(self, token: CancellationToken, mut emit: F)
    where
        F: FnMut(Observation, Duration) + Send + 'static,
    {
        let (target, interval) = match self.plan {
            Plan::Run { target, interval } => (target, interval),
            Plan::Fatal(cause) => {
                warn!(system = %self.name, %cause, "prober refused to start");
                if !token.is_cancelled() {
                    emit(Observation::Down(cause), Duration::ZERO);
                }
                self.state.send_replace(ProberState::Fatal);
                return;
            }
        };
        let request_timeout = interval.min(self.request_timeout_cap);

        self.state.send_replace(ProberState::Running);
        info!(system = %self.name, ?interval, "prober started");

        loop {
            let started = Instant::now();
            let observation = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                observation = execute(&target, request_timeout) => observation,
            };
            let elapsed = started.elapsed();
            debug!(system = %self.name, ?observation, ?elapsed, "probe finished");
            emit(observation, elapsed);

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        self.state.send_replace(ProberState::Cancelled);
        info!(system = %self.name, "prober cancelled");
    }
}

async fn execute(target: &ProbeTarget, timeout: Duration) -> Observation {
    match target {
        ProbeTarget::Http(url) => probe_http(shared_client(), url, timeout).await,
    }
}

/// Cancellation handle and termination acknowledgement of a running prober.
pub struct ProberHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
    state: watch::Receiver<ProberState>,
    joined: bool,
}

impl ProberHandle {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn state(&self) -> ProberState {
        *self.state.borrow()
    }

    pub fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signals cancellation and waits until the prober task has exited.
    pub async fn stop(&mut self) {
        self.token.cancel();
        if self.joined {
            return;
        }
        let result = (&mut self.handle).await;
        self.joined = true;
        if let Err(e) = result {
            if e.is_panic() {
                warn!(error = %e, "prober task panicked");
            }
        }
    }
}

#[cfg(test)]
mod schedule_tests {
    use super::*;
    use crate::test_utils::{closed_port_url, wait_until};
    use std::sync::{Arc, Mutex};
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    fn recorder() -> (
        Arc<Mutex<Vec<Observation>>>,
        impl FnMut(Observation, Duration) + Send + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |observation, _| {
            sink.lock().unwrap().push(observation)
        })
    }

    #[test]
    fn test_request_timeout_is_capped_by_interval() {
        let short = System::http("short", "2s", "https://example.com");
        assert_eq!(
            Some(Duration::from_secs(2)),
            Prober::new(&short, REQUEST_TIMEOUT_CAP).request_timeout()
        );

        let long = System::http("long", "5m", "https://example.com");
        assert_eq!(
            Some(REQUEST_TIMEOUT_CAP),
            Prober::new(&long, REQUEST_TIMEOUT_CAP).request_timeout()
        );
    }

    #[tokio::test]
    async fn test_bad_url_emits_single_configuration_failure() {
        let system = System::http("broken", "1s", "::not-a-url::");
        let prober = Prober::new(&system, REQUEST_TIMEOUT_CAP);
        assert_eq!(ProberState::Idle, prober.state());

        let (seen, emit) = recorder();
        let handle = prober.spawn(CancellationToken::new(), emit);
        assert!(wait_until(Duration::from_secs(2), || !handle.is_live()).await);

        assert_eq!(ProberState::Fatal, handle.state());
        let seen = seen.lock().unwrap();
        assert_eq!(1, seen.len());
        match &seen[0] {
            Observation::Down(cause) => assert!(cause.starts_with("configuration: ")),
            other => panic!("unexpected observation {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bad_interval_is_fatal() {
        let system = System::http("broken", "every minute", "https://example.com");
        let (seen, emit) = recorder();
        let mut handle = Prober::new(&system, REQUEST_TIMEOUT_CAP).spawn(CancellationToken::new(), emit);
        assert!(wait_until(Duration::from_secs(2), || !handle.is_live()).await);
        assert_eq!(ProberState::Fatal, handle.state());
        handle.stop().await;

        let seen = seen.lock().unwrap();
        assert_eq!(1, seen.len());
        assert!(matches!(&seen[0], Observation::Down(c) if c.contains("check interval")));
    }

    #[tokio::test]
    async fn test_repeats_identical_observations() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let system = System::http("flaky", "1s", server.uri());
        let (seen, emit) = recorder();
        let mut handle = Prober::new(&system, REQUEST_TIMEOUT_CAP).spawn(CancellationToken::new(), emit);

        assert!(wait_until(Duration::from_secs(5), || seen.lock().unwrap().len() >= 2).await);
        assert_eq!(ProberState::Running, handle.state());
        handle.stop().await;

        let seen = seen.lock().unwrap();
        assert!(seen.iter().all(|o| *o == Observation::Err(500)));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_sleep() {
        let system = System::http("down", "1h", closed_port_url().as_str());
        let (seen, emit) = recorder();
        let mut handle = Prober::new(&system, REQUEST_TIMEOUT_CAP).spawn(CancellationToken::new(), emit);
        assert!(wait_until(Duration::from_secs(5), || !seen.lock().unwrap().is_empty()).await);

        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .expect("prober should stop well before its next probe");
        assert_eq!(ProberState::Cancelled, handle.state());
        assert_eq!(1, seen.lock().unwrap().len());
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_request() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(20)))
            .mount(&server)
            .await;

        let system = System::http("slow", "30s", server.uri());
        let (seen, emit) = recorder();
        let mut handle = Prober::new(&system, REQUEST_TIMEOUT_CAP).spawn(CancellationToken::new(), emit);
        tokio::time::sleep(Duration::from_millis(200)).await;

        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .expect("in-flight request should be abandoned on cancel");
        assert!(seen.lock().unwrap().is_empty());
    }
}
