use std::time::Duration;

use lazy_static::lazy_static;
use opentelemetry::{
    global,
    trace::{Span, Status, Tracer},
    KeyValue,
};
use opentelemetry_semantic_conventions::attribute::{
    HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, URL_FULL,
};
use reqwest::Url;
use tracing::debug;

use crate::probe::model::Observation;

lazy_static! {
    static ref CLIENT: reqwest::Client = reqwest::Client::new();
}

/// Client shared by all probers and the remote spec loader.
///
/// Redirects follow reqwest's default policy and TLS is verified.
pub fn shared_client() -> &'static reqwest::Client {
    &CLIENT
}

/// Issues one GET and classifies the outcome.
///
/// The body is drained before returning so the connection can go back to the
/// pool. `timeout` bounds the whole exchange, body included, and a body that
/// fails or stalls past it makes the probe `Down`.
pub async fn probe_http(client: &reqwest::Client, url: &Url, timeout: Duration) -> Observation {
    let tracer = global::tracer("syspoll");
    let mut span = tracer.start("http probe");
    span.set_attribute(KeyValue::new(HTTP_REQUEST_METHOD, "GET"));
    span.set_attribute(KeyValue::new(URL_FULL, url.to_string()));

    let observation = match client.get(url.clone()).timeout(timeout).send().await {
        Ok(mut response) => {
            let code = response.status().as_u16();
            span.set_attribute(KeyValue::new(HTTP_RESPONSE_STATUS_CODE, i64::from(code)));
            match drain(&mut response).await {
                Ok(()) => Observation::from_status(code),
                Err(e) => {
                    debug!(%url, code, error = %e, "response body failed");
                    Observation::Down(transport_cause(&e))
                }
            }
        }
        Err(e) => {
            debug!(%url, error = %e, "http probe failed");
            Observation::Down(transport_cause(&e))
        }
    };

    match &observation {
        Observation::Ok(_) => span.set_status(Status::Ok),
        Observation::Err(code) => span.set_status(Status::error(format!("status {}", code))),
        Observation::Down(cause) => span.set_status(Status::error(cause.clone())),
    }
    span.end();

    observation
}

/// Reads the body to the end one chunk at a time, keeping none of it.
async fn drain(response: &mut reqwest::Response) -> reqwest::Result<()> {
    while response.chunk().await?.is_some() {}
    Ok(())
}

fn transport_cause(error: &reqwest::Error) -> String {
    let cause = if error.is_timeout() {
        "timeout"
    } else if error.is_connect() {
        "connection failed"
    } else if error.is_redirect() {
        "redirect loop"
    } else if error.is_body() || error.is_decode() {
        "bad response"
    } else {
        "request failed"
    };
    cause.to_owned()
}
