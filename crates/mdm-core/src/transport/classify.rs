//! Classify HTTP status and curl errors into transport error kinds.

use super::error::TransportError;

/// Map a final HTTP status to an error; `None` for 2xx.
pub fn classify_http_status(code: u32) -> Option<TransportError> {
    match code {
        200..=299 => None,
        _ => Some(TransportError::Http(code)),
    }
}

/// Classify a curl error.
pub fn classify_curl_error(e: &curl::Error) -> TransportError {
    let msg = e.to_string();
    if e.is_aborted_by_callback() {
        return TransportError::Aborted;
    }
    if e.is_operation_timedout() {
        return TransportError::Timeout(msg);
    }
    if e.is_ssl_connect_error()
        || e.is_peer_failed_verification()
        || e.is_ssl_certproblem()
        || e.is_ssl_cacert()
        || e.is_ssl_cacert_badfile()
        || e.is_ssl_cipher()
    {
        return TransportError::Tls(msg);
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return TransportError::Connection(msg);
    }
    TransportError::Other(msg)
}
