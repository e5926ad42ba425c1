//! libcurl-backed transport: one OS thread and one easy handle per transfer.
//!
//! Body chunks are posted to the bounded event channel as they arrive, so a
//! consumer that falls behind slows the transfer down. The thread never
//! touches the destination file. An abort token per transfer makes
//! the write/progress callbacks stop the transfer early.

use std::cell::Cell;
use std::collections::HashMap;
use std::str;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::TransportConfig;
use crate::event::{Event, EventSender};

use super::classify::{classify_curl_error, classify_http_status};
use super::{TransferId, TransferRequest, Transport, TransportError, TransportEvent};

/// Streams GET requests with libcurl.
pub struct CurlTransport {
    events: EventSender,
    opts: TransportConfig,
    transfers: HashMap<TransferId, Arc<AtomicBool>>,
}

impl CurlTransport {
    pub fn new(events: EventSender, opts: TransportConfig) -> Self {
        Self {
            events,
            opts,
            transfers: HashMap::new(),
        }
    }
}

impl Transport for CurlTransport {
    fn start(&mut self, request: TransferRequest) -> Result<(), TransportError> {
        // Tokens still shared with a thread belong to live transfers.
        self.transfers.retain(|_, token| Arc::strong_count(token) > 1);

        let abort = Arc::new(AtomicBool::new(false));
        let id = request.id;
        let events = self.events.clone();
        let opts = self.opts.clone();
        let token = Arc::clone(&abort);
        std::thread::Builder::new()
            .name(format!("mdm-transfer-{}", id.0))
            .spawn(move || {
                let outcome = perform(&request, &opts, &events, &token);
                let event = match outcome {
                    Ok(()) => TransportEvent::Finished { id: request.id },
                    Err(error) => {
                        tracing::debug!(transfer = %request.id, %error, "transfer failed");
                        TransportEvent::Failed {
                            id: request.id,
                            error,
                        }
                    }
                };
                let _ = events.blocking_send(Event::Transport(event));
            })
            .map_err(|e| TransportError::Other(format!("spawn transfer thread: {}", e)))?;
        self.transfers.insert(id, abort);
        Ok(())
    }

    fn abort(&mut self, id: TransferId) {
        if let Some(token) = self.transfers.remove(&id) {
            token.store(true, Ordering::Relaxed);
            tracing::debug!(transfer = %id, "abort requested");
        }
    }
}

/// Runs one GET to completion on the current thread.
fn perform(
    request: &TransferRequest,
    opts: &TransportConfig,
    events: &EventSender,
    abort: &AtomicBool,
) -> Result<(), TransportError> {
    let curl_err = |e: curl::Error| classify_curl_error(&e);
    let id = request.id;

    let mut easy = curl::easy::Easy::new();
    easy.url(&request.url).map_err(curl_err)?;
    easy.follow_location(true).map_err(curl_err)?;
    easy.max_redirections(opts.max_redirections).map_err(curl_err)?;
    easy.connect_timeout(Duration::from_secs(opts.connect_timeout_secs))
        .map_err(curl_err)?;
    easy.low_speed_limit(opts.low_speed_limit_bytes)
        .map_err(curl_err)?;
    easy.low_speed_time(Duration::from_secs(opts.low_speed_time_secs))
        .map_err(curl_err)?;
    easy.ssl_verify_peer(true).map_err(curl_err)?;
    easy.ssl_verify_host(true).map_err(curl_err)?;
    easy.progress(true).map_err(curl_err)?;
    if let Some(ua) = &opts.user_agent {
        easy.useragent(ua).map_err(curl_err)?;
    }

    let mut list = curl::easy::List::new();
    for (k, v) in &request.headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))
            .map_err(curl_err)?;
    }
    if !request.headers.is_empty() {
        easy.http_headers(list).map_err(curl_err)?;
    }

    // Status of the most recent response; redirects produce several status lines.
    let status = Cell::new(0u32);
    let last_reported = Cell::new(0u64);
    let result = {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Ok(line) = str::from_utf8(data) {
                    if let Some(code) = parse_status_line(line) {
                        status.set(code);
                    }
                }
                true
            })
            .map_err(curl_err)?;
        transfer
            .write_function(|data| {
                if abort.load(Ordering::Relaxed) || status.get() >= 400 {
                    // Short count makes libcurl fail the transfer.
                    return Ok(0);
                }
                let chunk = Event::Transport(TransportEvent::Data {
                    id,
                    chunk: data.to_vec(),
                });
                // Blocks while the event queue is full.
                if events.blocking_send(chunk).is_err() {
                    return Ok(0);
                }
                Ok(data.len())
            })
            .map_err(curl_err)?;
        transfer
            .progress_function(|dltotal, dlnow, _, _| {
                if abort.load(Ordering::Relaxed) {
                    return false;
                }
                let now = dlnow as u64;
                if now != last_reported.get() {
                    last_reported.set(now);
                    let total = (dltotal > 0.0).then(|| dltotal as u64);
                    let _ = events.blocking_send(Event::Transport(TransportEvent::Progress {
                        id,
                        received: now,
                        total,
                    }));
                }
                true
            })
            .map_err(curl_err)?;
        transfer.perform()
    };

    if abort.load(Ordering::Relaxed) {
        return Err(TransportError::Aborted);
    }
    if let Err(e) = result {
        if status.get() >= 400 {
            return Err(TransportError::Http(status.get()));
        }
        return Err(classify_curl_error(&e));
    }
    let code = easy.response_code().map_err(curl_err)?;
    match classify_http_status(code) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Parse `HTTP/1.1 200 OK` (or `HTTP/2 404`) into its status code.
fn parse_status_line(line: &str) -> Option<u32> {
    let mut parts = line.split_whitespace();
    let proto = parts.next()?;
    if !proto.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_line_variants() {
        assert_eq!(parse_status_line("HTTP/1.1 200 OK\r\n"), Some(200));
        assert_eq!(parse_status_line("HTTP/2 404\r\n"), Some(404));
        assert_eq!(parse_status_line("Content-Length: 10\r\n"), None);
        assert_eq!(parse_status_line("\r\n"), None);
    }

    #[test]
    fn abort_unknown_id_is_ignored() {
        let (tx, _rx) = crate::event::channel();
        let mut t = CurlTransport::new(tx, TransportConfig::default());
        t.abort(TransferId(42));
        assert!(t.transfers.is_empty());
    }
}
