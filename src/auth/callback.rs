//! Loopback HTTP listener that receives the OAuth2 redirect.
//!
//! The listener owns its server socket and a single route. It hands the
//! authorization code to the waiting caller through a capacity-one channel and
//! is torn down when dropped.

use anyhow::{Result, anyhow, bail};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError, sync_channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tiny_http::{Header, Request, Response, Server};
use url::Url;

use crate::shutdown::ShutdownSignal;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

const SUCCESS_PAGE: &str = "<html><body><h1>Authorization successful!</h1>\
<p>You can close this window now.</p></body></html>";
const ALREADY_DONE_PAGE: &str = "<html><body><h1>Authorization already completed.</h1>\
<p>You can close this window now.</p></body></html>";
const DENIED_PAGE: &str = "<html><body><h1>Authorization was not granted.</h1>\
<p>Return to the terminal for details.</p></body></html>";

/// What a callback delivered to the waiting flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Code(String),
    Denied(String),
}

/// How a single request to the listener is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Deliver(CallbackOutcome),
    NotFound,
    BadState,
    MissingCode,
}

/// Resolves the host/port to bind for a loopback redirect URI.
pub fn bind_address(redirect: &Url) -> Result<SocketAddr> {
    let host = redirect
        .host_str()
        .ok_or_else(|| anyhow!("redirect_uri missing host: {redirect}"))?;
    let port = redirect
        .port_or_known_default()
        .ok_or_else(|| anyhow!("redirect_uri missing/unknown port: {redirect}"))?;

    let bind_ip: IpAddr = match host {
        "localhost" | "127.0.0.1" => IpAddr::V4(Ipv4Addr::LOCALHOST),
        other => other
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .map_err(|_| anyhow!("redirect_uri host must be localhost or an IP: {other}"))?,
    };
    Ok(SocketAddr::new(bind_ip, port))
}

fn route(raw_url: &str, callback_path: &str, expected_state: &str) -> Route {
    // request.url() is path+query, e.g. "/oauth2/callback?code=...&state=..."
    let Ok(parsed) = Url::parse(&format!("http://localhost{raw_url}")) else {
        return Route::NotFound;
    };
    if parsed.path() != callback_path {
        return Route::NotFound;
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (k, v) in parsed.query_pairs() {
        match k.as_ref() {
            "code" => code = Some(v.into_owned()),
            "state" => state = Some(v.into_owned()),
            "error" => error = Some(v.into_owned()),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Route::BadState;
    }
    if let Some(error) = error {
        return Route::Deliver(CallbackOutcome::Denied(error));
    }
    match code {
        Some(code) if !code.is_empty() => Route::Deliver(CallbackOutcome::Code(code)),
        _ => Route::MissingCode,
    }
}

fn html(body: &str, status: u16) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut response = Response::from_string(body).with_status_code(status);
    if let Ok(h) = Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]) {
        response.add_header(h);
    }
    response
}

fn handle(
    request: Request,
    callback_path: &str,
    expected_state: &str,
    tx: &SyncSender<CallbackOutcome>,
) {
    let response = match route(request.url(), callback_path, expected_state) {
        Route::NotFound => Response::from_string("Not found").with_status_code(404),
        Route::BadState => {
            log::warn!("Rejected OAuth callback with unexpected state");
            Response::from_string("Invalid state parameter").with_status_code(400)
        }
        Route::MissingCode => {
            Response::from_string("No code found in redirect").with_status_code(400)
        }
        Route::Deliver(outcome) => {
            let page = match &outcome {
                CallbackOutcome::Code(_) => SUCCESS_PAGE,
                CallbackOutcome::Denied(_) => DENIED_PAGE,
            };
            match tx.try_send(outcome) {
                Ok(()) => html(page, 200),
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                    log::debug!("Ignoring duplicate OAuth callback");
                    html(ALREADY_DONE_PAGE, 200)
                }
            }
        }
    };
    if let Err(e) = request.respond(response) {
        log::warn!("Unable to answer OAuth callback: {e}");
    }
}

/// A bound, serving callback endpoint. Dropping it stops the listener thread.
pub struct CallbackListener {
    server: Arc<Server>,
    worker: Option<JoinHandle<()>>,
    outcomes: Receiver<CallbackOutcome>,
    local_addr: SocketAddr,
}

impl CallbackListener {
    /// Bind on the redirect URI's loopback address and start serving its path.
    pub fn bind(redirect: &Url, expected_state: &str) -> Result<Self> {
        let bind_addr = bind_address(redirect)?;
        let server = Server::http(bind_addr)
            .map_err(|e| anyhow!("Failed to bind OAuth callback server on {bind_addr}: {e}"))?;
        let local_addr = server.server_addr();
        let server = Arc::new(server);

        let (tx, outcomes) = sync_channel(1);
        let callback_path = redirect.path().to_string();
        let expected_state = expected_state.to_string();
        let srv = server.clone();
        let worker = thread::Builder::new()
            .name("oauth-callback".into())
            .spawn(move || {
                for request in srv.incoming_requests() {
                    handle(request, &callback_path, &expected_state, &tx);
                }
                log::debug!("OAuth callback listener stopped");
            })?;

        log::debug!("OAuth callback listener on http://{local_addr}{}", redirect.path());
        Ok(Self {
            server,
            worker: Some(worker),
            outcomes,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Block until the callback delivers a code, polling `shutdown` for cancellation.
    pub fn wait_for_code(&self, shutdown: &ShutdownSignal) -> Result<String> {
        loop {
            if shutdown.is_triggered() {
                bail!("Authorization cancelled while waiting for the browser callback");
            }
            match self.outcomes.recv_timeout(POLL_INTERVAL) {
                Ok(CallbackOutcome::Code(code)) => return Ok(code),
                Ok(CallbackOutcome::Denied(reason)) => {
                    bail!("Authorization was denied in the browser: {reason}")
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    bail!("OAuth callback listener stopped before a code was received")
                }
            }
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("OAuth callback listener thread panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str = "/oauth2/callback";
    const STATE: &str = "state-token";

    #[test]
    fn routes_code_with_matching_state() {
        assert_eq!(
            route("/oauth2/callback?state=state-token&code=4%2F0Abc", PATH, STATE),
            Route::Deliver(CallbackOutcome::Code("4/0Abc".into()))
        );
    }

    #[test]
    fn rejects_other_paths_and_bad_state() {
        assert_eq!(route("/favicon.ico", PATH, STATE), Route::NotFound);
        assert_eq!(route("/oauth2/callback?code=x&state=evil", PATH, STATE), Route::BadState);
        assert_eq!(route("/oauth2/callback?code=x", PATH, STATE), Route::BadState);
        assert_eq!(route("/oauth2/callback?state=state-token", PATH, STATE), Route::MissingCode);
    }

    #[test]
    fn routes_consent_denial() {
        assert_eq!(
            route("/oauth2/callback?error=access_denied&state=state-token", PATH, STATE),
            Route::Deliver(CallbackOutcome::Denied("access_denied".into()))
        );
    }

    #[test]
    fn bind_address_maps_localhost_to_loopback() {
        let url = Url::parse("http://localhost:8080/oauth2/callback").unwrap();
        assert_eq!(bind_address(&url).unwrap(), "127.0.0.1:8080".parse().unwrap());
        let url = Url::parse("http://example.com/cb").unwrap();
        assert!(bind_address(&url).is_err());
    }

    fn get(url: String) -> reqwest::blocking::Response {
        reqwest::blocking::Client::builder()
            .no_proxy()
            .build()
            .unwrap()
            .get(url)
            .send()
            .unwrap()
    }

    fn listener() -> CallbackListener {
        let url = Url::parse("http://127.0.0.1:0/oauth2/callback").unwrap();
        CallbackListener::bind(&url, STATE).unwrap()
    }

    #[test]
    fn delivers_first_code_and_ignores_duplicates() {
        let listener = listener();
        let base = format!("http://{}{PATH}", listener.local_addr());

        let first = get(format!("{base}?code=first&state={STATE}"));
        assert!(first.status().is_success());
        assert!(first.text().unwrap().contains("successful"));

        let second = get(format!("{base}?code=second&state={STATE}"));
        assert!(second.text().unwrap().contains("already completed"));

        let code = listener.wait_for_code(&ShutdownSignal::new()).unwrap();
        assert_eq!(code, "first");
    }

    #[test]
    fn bad_state_does_not_consume_the_slot() {
        let listener = listener();
        let base = format!("http://{}{PATH}", listener.local_addr());

        let rejected = get(format!("{base}?code=forged&state=nope"));
        assert_eq!(rejected.status().as_u16(), 400);
        get(format!("{base}?code=real&state={STATE}"));

        assert_eq!(listener.wait_for_code(&ShutdownSignal::new()).unwrap(), "real");
    }

    #[test]
    fn wait_is_cancellable() {
        let listener = listener();
        let shutdown = ShutdownSignal::new();
        let trigger = shutdown.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            trigger.trigger();
        });
        let err = listener.wait_for_code(&shutdown).unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        t.join().unwrap();
    }

    #[test]
    fn denial_fails_the_wait() {
        let listener = listener();
        let url = format!(
            "http://{}{PATH}?error=access_denied&state={STATE}",
            listener.local_addr()
        );
        get(url);
        let err = listener.wait_for_code(&ShutdownSignal::new()).unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }
}
