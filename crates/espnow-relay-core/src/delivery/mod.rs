//! HTTPS delivery of relayed samples
//!
//! A [`DeliveryClient`] turns one [`SensorMessage`] into one JSON `POST` over a
//! fresh TLS session. The session itself is opened by an [`HttpsTransport`]:
//! the firmware provides one on top of embassy-net and embedded-tls, tests and
//! the simulator provide in-memory ones.
//!
//! Every call is bounded by the configured request timeout. When it expires
//! the transport future is dropped, which closes the socket and frees the TLS
//! buffers it borrowed.

mod task;

pub use task::DeliveryTask;

use core::future::Future;

use embassy_time::{Duration, with_timeout};
use embedded_io_async::ErrorKind;
use heapless::Vec;
use log::warn;
use thiserror_no_std::Error;

use crate::endpoint::{Endpoint, EndpointError};
use crate::http::{HttpError, RESPONSE_BODY_LIMIT, Request, ResponseSummary};
use crate::json::{FormatError, format_reading};
use crate::message::SensorMessage;

/// Upper bound on one complete delivery, handshake included
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// How the server certificate's subject is checked against the endpoint host.
///
/// The certificate chain is validated against the trust anchor in both modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostnameVerification {
    #[default]
    Verify,
    /// Accept a valid chain whose subject does not name the endpoint host
    SkipCommonNameCheck,
}

/// Where and how samples are delivered
#[derive(Debug, Clone, Copy)]
pub struct EndpointConfig<'a> {
    /// `https://host[:port][/path]`
    pub url: &'a str,
    /// DER-encoded CA certificate the server chain must lead to
    pub trust_anchor: &'a [u8],
    pub hostname: HostnameVerification,
    pub timeout: Duration,
}

impl<'a> EndpointConfig<'a> {
    pub fn new(url: &'a str, trust_anchor: &'a [u8]) -> Self {
        Self {
            url,
            trust_anchor,
            hostname: HostnameVerification::default(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Connection parameters handed to the transport for each exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsTarget<'a> {
    pub host: &'a str,
    pub port: u16,
    pub trust_anchor: &'a [u8],
    pub hostname: HostnameVerification,
}

/// Failures below the HTTP status line
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("DNS lookup failed")]
    Dns,
    #[error("TCP connect failed")]
    Connect,
    #[error("server certificate rejected")]
    Certificate,
    #[error("TLS session failed")]
    Tls,
    #[error("I/O error: {0:?}")]
    Io(ErrorKind),
    #[error("malformed HTTP response")]
    MalformedResponse,
    #[error("request does not fit in the transport buffers")]
    RequestTooLarge,
}

impl TransportError {
    pub fn is_certificate(&self) -> bool {
        matches!(self, TransportError::Certificate)
    }
}

impl From<HttpError> for TransportError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Io(kind) => TransportError::Io(kind),
            HttpError::RequestTooLarge => TransportError::RequestTooLarge,
            HttpError::HeaderTooLarge | HttpError::MalformedStatusLine | HttpError::ConnectionClosed => {
                TransportError::MalformedResponse
            }
        }
    }
}

/// Why a TLS handshake did not complete, as reported by the TLS stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeFailure {
    /// The server chain does not lead to the trust anchor, is malformed, or
    /// names another host
    InvalidCertificate,
    /// The server could not prove it holds the certificate's key
    InvalidSignature,
    /// The underlying socket failed
    Io(ErrorKind),
    /// Any other protocol or configuration failure
    Protocol,
}

impl From<HandshakeFailure> for TransportError {
    fn from(failure: HandshakeFailure) -> Self {
        match failure {
            HandshakeFailure::InvalidCertificate | HandshakeFailure::InvalidSignature => TransportError::Certificate,
            HandshakeFailure::Io(kind) => TransportError::Io(kind),
            HandshakeFailure::Protocol => TransportError::Tls,
        }
    }
}

/// One TLS-protected HTTP exchange per call.
///
/// Implementations open a new session for every call and tear it down before
/// returning. Dropping the returned future must release every resource the
/// exchange holds.
pub trait HttpsTransport {
    /// Connect to `target`, send `request` and read the response, copying up
    /// to `body_out.len()` body bytes into `body_out`.
    fn exchange(
        &mut self,
        target: &TlsTarget<'_>,
        request: &Request<'_>,
        body_out: &mut [u8],
    ) -> impl Future<Output = Result<ResponseSummary, TransportError>>;
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("could not format body: {0}")]
    Format(#[from] FormatError),
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Response to a completed delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub status: u16,
    pub body: Vec<u8, RESPONSE_BODY_LIMIT>,
    pub truncated: bool,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, cut at the first invalid UTF-8 sequence
    pub fn body_text(&self) -> &str {
        match core::str::from_utf8(&self.body) {
            Ok(text) => text,
            Err(e) => core::str::from_utf8(&self.body[..e.valid_up_to()]).unwrap_or_default(),
        }
    }
}

/// Delivers samples to one fixed HTTPS endpoint
pub struct DeliveryClient<'a, T> {
    transport: T,
    target: TlsTarget<'a>,
    path: &'a str,
    timeout: Duration,
}

impl<'a, T: HttpsTransport> DeliveryClient<'a, T> {
    pub fn new(transport: T, config: &EndpointConfig<'a>) -> Result<Self, EndpointError> {
        let endpoint = Endpoint::parse(config.url)?;

        if config.hostname == HostnameVerification::SkipCommonNameCheck {
            warn!(
                "Hostname verification disabled for {}; the certificate chain is still validated",
                endpoint.host
            );
        }

        Ok(Self {
            transport,
            target: TlsTarget {
                host: endpoint.host,
                port: endpoint.port,
                trust_anchor: config.trust_anchor,
                hostname: config.hostname,
            },
            path: endpoint.path,
            timeout: config.timeout,
        })
    }

    pub fn target(&self) -> &TlsTarget<'a> {
        &self.target
    }

    /// POST `message` and read the response.
    ///
    /// A single attempt; nothing is retried.
    pub async fn deliver(&mut self, message: &SensorMessage) -> Result<DeliveryReport, DeliveryError> {
        let body = format_reading(message)?;
        let request = Request::post_json(self.target.host, self.target.port, self.path, body.as_bytes());

        let mut buf = [0u8; RESPONSE_BODY_LIMIT];
        let summary = with_timeout(self.timeout, self.transport.exchange(&self.target, &request, &mut buf))
            .await
            .map_err(|_| DeliveryError::Timeout)??;

        let body_len = summary.body_len.min(RESPONSE_BODY_LIMIT);
        let mut body = Vec::new();
        // Cannot fail, `body_len` is clamped to the capacity.
        let _ = body.extend_from_slice(&buf[..body_len]);

        Ok(DeliveryReport {
            status: summary.status,
            body,
            truncated: summary.truncated,
        })
    }
}
