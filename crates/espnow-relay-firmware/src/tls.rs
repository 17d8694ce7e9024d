//! HTTPS transport over embassy-net and embedded-tls
//!
//! Each exchange resolves the host, opens a TCP socket, runs a TLS 1.3
//! handshake that validates the server chain against the configured trust
//! anchor, and performs one HTTP/1.1 request. All buffers live in a single
//! [`TlsBuffers`] block reused across exchanges; the socket and session are
//! dropped before `exchange` returns.

use core::net::Ipv4Addr;

use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpAddress, Stack};
use embassy_time::Duration;
use embedded_tls::webpki::CertVerifier;
use embedded_tls::{
    Aes128GcmSha256, Certificate, CertificateRef, CryptoProvider, HandshakeVerifyRef, NoClock, TlsCipherSuite,
    TlsConfig, TlsConnection, TlsContext, TlsError, TlsVerifier,
};
use espnow_relay_core::delivery::{HandshakeFailure, HostnameVerification, HttpsTransport, TlsTarget, TransportError};
use espnow_relay_core::http::{self, Request, ResponseSummary};
use log::{debug, warn};
use rand_core::CryptoRngCore;

use crate::rng::HardwareRng;

/// Largest TLS record plus header and tag
const TLS_READ_RECORD: usize = 16_640;
const TLS_WRITE_RECORD: usize = 4_096;
const TCP_BUFFER: usize = 2_048;
const RESPONSE_HEAD: usize = 1_024;
/// Largest certificate the verifier will parse
const MAX_CERT_SIZE: usize = 4_096;

/// Socket-level inactivity limit; the overall bound is the delivery timeout
const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

type CipherSuite = Aes128GcmSha256;

/// Working memory for one exchange at a time
pub struct TlsBuffers {
    read_record: [u8; TLS_READ_RECORD],
    write_record: [u8; TLS_WRITE_RECORD],
    tcp_rx: [u8; TCP_BUFFER],
    tcp_tx: [u8; TCP_BUFFER],
    head: [u8; RESPONSE_HEAD],
}

impl TlsBuffers {
    pub const fn new() -> Self {
        Self {
            read_record: [0; TLS_READ_RECORD],
            write_record: [0; TLS_WRITE_RECORD],
            tcp_rx: [0; TCP_BUFFER],
            tcp_tx: [0; TCP_BUFFER],
            head: [0; RESPONSE_HEAD],
        }
    }
}

impl Default for TlsBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/// [`HttpsTransport`] for the firmware network stack
pub struct TlsTransport<'a> {
    stack: Stack<'a>,
    buffers: &'a mut TlsBuffers,
    rng: HardwareRng,
}

impl<'a> TlsTransport<'a> {
    pub fn new(stack: Stack<'a>, buffers: &'a mut TlsBuffers, rng: HardwareRng) -> Self {
        Self { stack, buffers, rng }
    }

    async fn resolve(&self, host: &str) -> Result<IpAddress, TransportError> {
        if let Ok(address) = host.parse::<Ipv4Addr>() {
            return Ok(IpAddress::Ipv4(address));
        }

        let addresses = self.stack.dns_query(host, DnsQueryType::A).await.map_err(|e| {
            warn!("DNS lookup for {} failed: {:?}", host, e);
            TransportError::Dns
        })?;
        addresses.first().copied().ok_or(TransportError::Dns)
    }
}

impl HttpsTransport for TlsTransport<'_> {
    async fn exchange(
        &mut self,
        target: &TlsTarget<'_>,
        request: &Request<'_>,
        body_out: &mut [u8],
    ) -> Result<ResponseSummary, TransportError> {
        let address = self.resolve(target.host).await?;

        let TlsBuffers {
            read_record,
            write_record,
            tcp_rx,
            tcp_tx,
            head,
        } = &mut *self.buffers;

        let mut socket = TcpSocket::new(self.stack, tcp_rx, tcp_tx);
        socket.set_timeout(Some(SOCKET_TIMEOUT));
        socket.connect((address, target.port)).await.map_err(|e| {
            warn!("TCP connect to {}:{} failed: {:?}", target.host, target.port, e);
            TransportError::Connect
        })?;

        let config = TlsConfig::new()
            .with_server_name(target.host)
            .with_ca(Certificate::X509(target.trust_anchor));
        let mut verifier = ChainVerifier::new(target.hostname);
        let provider = RelayCryptoProvider {
            rng: &mut self.rng,
            verifier: &mut verifier,
        };

        let mut tls = TlsConnection::new(socket, read_record, write_record);
        tls.open(TlsContext::new(&config, provider))
            .await
            .map_err(classify_handshake_error)?;
        debug!("TLS session established with {}", target.host);

        let result = http::exchange(&mut tls, request, head, body_out).await;

        if let Err((mut socket, e)) = tls.close().await {
            debug!("TLS close failed: {:?}", e);
            socket.abort();
        }

        Ok(result?)
    }
}

/// Certificate failures are reported apart from every other handshake error.
///
/// | `TlsError`                              | `HandshakeFailure`   |
/// |-----------------------------------------|----------------------|
/// | `InvalidCertificate` (chain, name, DER) | `InvalidCertificate` |
/// | `InvalidSignature` (CertificateVerify)  | `InvalidSignature`   |
/// | `Io(kind)`                              | `Io(kind)`           |
/// | anything else                           | `Protocol`           |
fn classify_handshake_error(e: TlsError) -> TransportError {
    let failure = match e {
        TlsError::InvalidCertificate => HandshakeFailure::InvalidCertificate,
        TlsError::InvalidSignature => HandshakeFailure::InvalidSignature,
        TlsError::Io(kind) => HandshakeFailure::Io(kind),
        _ => HandshakeFailure::Protocol,
    };
    let error = TransportError::from(failure);
    if error.is_certificate() {
        warn!("Server certificate rejected: {:?}", e);
    } else {
        warn!("TLS handshake failed: {:?}", e);
    }
    error
}

/// Validates the server chain against the trust anchor, with the subject name
/// check controlled by [`HostnameVerification`].
struct ChainVerifier {
    inner: CertVerifier<CipherSuite, NoClock, MAX_CERT_SIZE>,
    hostname: HostnameVerification,
}

impl ChainVerifier {
    fn new(hostname: HostnameVerification) -> Self {
        Self {
            inner: CertVerifier::new(),
            hostname,
        }
    }
}

impl TlsVerifier<CipherSuite> for ChainVerifier {
    fn set_hostname_verification(&mut self, hostname: &str) -> Result<(), TlsError> {
        match self.hostname {
            HostnameVerification::Verify => self.inner.set_hostname_verification(hostname),
            // The chain check still runs; only the subject match is skipped.
            HostnameVerification::SkipCommonNameCheck => Ok(()),
        }
    }

    fn verify_certificate(
        &mut self,
        transcript: &<CipherSuite as TlsCipherSuite>::Hash,
        ca: &Option<Certificate>,
        cert: CertificateRef,
    ) -> Result<(), TlsError> {
        self.inner.verify_certificate(transcript, ca, cert)
    }

    fn verify_signature(&mut self, verify: HandshakeVerifyRef) -> Result<(), TlsError> {
        self.inner.verify_signature(verify)
    }
}

struct RelayCryptoProvider<'p> {
    rng: &'p mut HardwareRng,
    verifier: &'p mut ChainVerifier,
}

impl CryptoProvider for RelayCryptoProvider<'_> {
    type CipherSuite = CipherSuite;
    type Signature = &'static [u8];

    fn rng(&mut self) -> impl CryptoRngCore {
        &mut *self.rng
    }

    fn verifier(&mut self) -> Result<&mut impl TlsVerifier<Self::CipherSuite>, TlsError> {
        Ok(&mut *self.verifier)
    }
}
