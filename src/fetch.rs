use crate::natnet::NatNetClient;
use crate::protocol::{RequestKind, COMMAND_PORT, DATA_PORT};
use crate::types::{CameraDescription, ModelDefinition};
use crate::{CalibError, Result};
use crossbeam_channel::RecvTimeoutError;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// Slice length for the bounded wait on the model definition.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Wildcard bind address used when the outbound interface can't be found.
pub const WILDCARD_IP: &str = "0.0.0.0";
pub const LOOPBACK_IP: &str = "127.0.0.1";

/// Callback receiving a model definition. May run on the client's own thread.
pub type DataDescriptionListener = Box<dyn Fn(ModelDefinition) + Send + 'static>;

/// The streaming client a fetch drives: configure, register one listener,
/// start, send requests, shut down.
pub trait StreamingClient {
    fn configure(&mut self, server_ip: &str, client_ip: &str, use_multicast: bool);

    /// Install or clear (`None`) the data-description listener. After a clear
    /// returns, the previous listener must not be invoked again.
    fn set_data_description_listener(&mut self, listener: Option<DataDescriptionListener>);

    fn start(&mut self) -> Result<()>;

    fn send_request(&mut self, kind: RequestKind, payload: &str, address: SocketAddr)
        -> Result<()>;

    /// Release sockets and threads. Must tolerate a client that never started.
    fn shutdown(&mut self);
}

/// Cameras returned by one fetch, with the client IP that was used.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedCameras {
    pub cameras: Vec<CameraDescription>,
    pub client_ip: String,
}

/// Anything that can produce the camera list of a rig.
pub trait CameraSource {
    fn fetch(
        &self,
        server_ip: &str,
        client_ip: &str,
        timeout: Duration,
        use_multicast: bool,
    ) -> Result<FetchedCameras>;
}

/// Pick the local address to receive NatNet traffic on.
///
/// An explicit address is used as-is; `"auto"` or empty resolves to loopback
/// for a local server, otherwise to the interface that routes to the server.
/// Detection never fails: it falls back to `0.0.0.0`.
pub fn resolve_client_ip(server_ip: &str, requested: &str) -> String {
    let requested = requested.trim();
    if !requested.is_empty() && !requested.eq_ignore_ascii_case("auto") {
        return requested.to_string();
    }

    if server_ip.starts_with("127.") || server_ip.eq_ignore_ascii_case("localhost") {
        return LOOPBACK_IP.to_string();
    }

    match probe_outbound_ip(server_ip) {
        Ok(ip) => ip.to_string(),
        Err(e) => {
            log::warn!(
                "Could not detect local interface toward {}: {}; binding {}",
                server_ip,
                e,
                WILDCARD_IP
            );
            WILDCARD_IP.to_string()
        }
    }
}

/// A connected UDP socket reports the local address the OS routed it through.
/// No packet is sent. The data port (1511) is used, as Motive tooling does;
/// routing is the same for the command port.
fn probe_outbound_ip(server_ip: &str) -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind((WILDCARD_IP, 0))?;
    socket.connect((server_ip, DATA_PORT))?;
    Ok(socket.local_addr()?.ip())
}

fn resolve_command_address(server_ip: &str, port: u16) -> Result<SocketAddr> {
    (server_ip, port)
        .to_socket_addrs()
        .map_err(|e| {
            CalibError::Configuration(format!("Cannot resolve server '{}': {}", server_ip, e))
        })?
        .find(|a| a.is_ipv4())
        .ok_or_else(|| CalibError::Configuration(format!("No IPv4 address for '{}'", server_ip)))
}

/// Owns a started client for the duration of one fetch. Dropping it clears
/// the listener and then shuts the client down, on every exit path.
struct ClientSession<C: StreamingClient> {
    client: C,
}

impl<C: StreamingClient> Drop for ClientSession<C> {
    fn drop(&mut self) {
        self.client.set_data_description_listener(None);
        self.client.shutdown();
    }
}

/// Fetches camera descriptions with one request/response cycle per call.
///
/// Every call builds a fresh client through `connect`, so nothing carries
/// over between fetches.
pub struct DescriptionFetcher<F> {
    connect: F,
    command_port: u16,
}

impl DescriptionFetcher<fn() -> NatNetClient> {
    /// Fetcher backed by the NatNet client on the standard command port.
    pub fn natnet() -> Self {
        DescriptionFetcher::new(NatNetClient::new as fn() -> NatNetClient)
    }
}

impl<F, C> DescriptionFetcher<F>
where
    F: Fn() -> C,
    C: StreamingClient,
{
    pub fn new(connect: F) -> Self {
        DescriptionFetcher {
            connect,
            command_port: COMMAND_PORT,
        }
    }

    /// Port the model-definition request is addressed to.
    pub fn with_command_port(mut self, port: u16) -> Self {
        self.command_port = port;
        self
    }

    /// Request the model definition and wait up to `timeout` for it.
    ///
    /// Fails with [`CalibError::FetchStartFailure`] if the client won't start
    /// and [`CalibError::FetchTimeout`] if no definition arrives in time. No
    /// retries happen here.
    pub fn fetch(
        &self,
        server_ip: &str,
        client_ip: &str,
        timeout: Duration,
        use_multicast: bool,
    ) -> Result<FetchedCameras> {
        let client_ip = resolve_client_ip(server_ip, client_ip);
        let command_addr = resolve_command_address(server_ip, self.command_port)?;

        let mut client = (self.connect)();
        client.configure(server_ip, &client_ip, use_multicast);

        let (sender, receiver) = crossbeam_channel::bounded::<ModelDefinition>(1);
        client.set_data_description_listener(Some(Box::new(move |def| {
            // Capacity one: later deliveries are dropped.
            let _ = sender.try_send(def);
        })));

        let mut session = ClientSession { client };
        session
            .client
            .start()
            .map_err(|e| CalibError::FetchStartFailure(e.to_string()))?;

        session
            .client
            .send_request(RequestKind::ModelDefinition, "", command_addr)?;

        let deadline = Instant::now() + timeout;
        let definition = loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(CalibError::FetchTimeout(timeout));
            }
            match receiver.recv_timeout(POLL_INTERVAL.min(deadline - now)) {
                Ok(def) => break def,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CalibError::Protocol(
                        "data description listener dropped before delivery".into(),
                    ));
                }
            }
        };
        drop(session);

        let cameras: Vec<CameraDescription> = definition
            .cameras
            .into_iter()
            .map(CameraDescription::from_raw)
            .collect();
        log::info!(
            "Received {} camera descriptions from {} (client {})",
            cameras.len(),
            server_ip,
            client_ip
        );

        Ok(FetchedCameras { cameras, client_ip })
    }
}

impl<F, C> CameraSource for DescriptionFetcher<F>
where
    F: Fn() -> C,
    C: StreamingClient,
{
    fn fetch(
        &self,
        server_ip: &str,
        client_ip: &str,
        timeout: Duration,
        use_multicast: bool,
    ) -> Result<FetchedCameras> {
        DescriptionFetcher::fetch(self, server_ip, client_ip, timeout, use_multicast)
    }
}
