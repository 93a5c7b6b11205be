use crate::fetch::{DataDescriptionListener, StreamingClient};
use crate::protocol::{self, NatNetVersion, RequestKind, ServerInfo, COMMAND_PORT};
use crate::{CalibError, Result};
use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Poll interval of the command reader; bounds how long shutdown waits.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// State shared between the client handle and its reader thread.
#[derive(Default)]
struct Shared {
    listener: Mutex<Option<DataDescriptionListener>>,
    server_info: Mutex<Option<ServerInfo>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// NatNet command-channel client.
///
/// Talks to Motive over UDP: announces itself with NAT_CONNECT, sends
/// requests to the server's command port, and hands model definitions to the
/// registered listener from a background reader thread. Frame data is never
/// subscribed to.
pub struct NatNetClient {
    server_ip: String,
    client_ip: String,
    use_multicast: bool,
    command_port: u16,
    shared: Arc<Shared>,
    socket: Option<UdpSocket>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Default for NatNetClient {
    fn default() -> Self {
        Self::new()
    }
}

impl NatNetClient {
    pub fn new() -> Self {
        NatNetClient {
            server_ip: "127.0.0.1".to_string(),
            client_ip: "127.0.0.1".to_string(),
            use_multicast: true,
            command_port: COMMAND_PORT,
            shared: Arc::new(Shared::default()),
            socket: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Override the server command port (1510 by default).
    pub fn with_command_port(mut self, port: u16) -> Self {
        self.command_port = port;
        self
    }

    /// Server details from the last NAT_SERVERINFO reply.
    pub fn server_info(&self) -> Option<ServerInfo> {
        lock(&self.shared.server_info).clone()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    fn command_address(&self) -> Result<SocketAddr> {
        (self.server_ip.as_str(), self.command_port)
            .to_socket_addrs()?
            .find(|a| a.is_ipv4())
            .ok_or_else(|| {
                CalibError::Configuration(format!(
                    "No IPv4 address for server '{}'",
                    self.server_ip
                ))
            })
    }

    fn bind_command_socket(&self) -> Result<UdpSocket> {
        let socket = if self.use_multicast {
            let s = UdpSocket::bind(("0.0.0.0", 0))?;
            s.set_broadcast(true)?;
            s
        } else {
            UdpSocket::bind((self.client_ip.as_str(), 0))?
        };
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        Ok(socket)
    }
}

impl StreamingClient for NatNetClient {
    fn configure(&mut self, server_ip: &str, client_ip: &str, use_multicast: bool) {
        self.server_ip = server_ip.to_string();
        self.client_ip = client_ip.to_string();
        self.use_multicast = use_multicast;
    }

    fn set_data_description_listener(&mut self, listener: Option<DataDescriptionListener>) {
        *lock(&self.shared.listener) = listener;
    }

    /// Bind the command socket, start the reader thread, and say hello.
    fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let socket = self.bind_command_socket()?;
        let reader = socket.try_clone()?;
        let local = socket.local_addr()?;

        self.stop_flag.store(false, Ordering::Relaxed);
        let shared = self.shared.clone();
        let stop = self.stop_flag.clone();
        let thread = std::thread::Builder::new()
            .name("natnet-command".into())
            .spawn(move || {
                command_reader_loop(reader, shared, stop);
            })?;
        self.thread = Some(thread);
        self.socket = Some(socket);

        log::info!(
            "NatNet client started: local={} server={}:{} multicast={}",
            local,
            self.server_ip,
            self.command_port,
            self.use_multicast
        );

        let server = self.command_address()?;
        self.send_request(RequestKind::Connect, "", server)
    }

    fn send_request(
        &mut self,
        kind: RequestKind,
        payload: &str,
        address: SocketAddr,
    ) -> Result<()> {
        let socket = self.socket.as_ref().ok_or_else(|| {
            CalibError::Socket(std::io::Error::new(
                ErrorKind::NotConnected,
                "NatNet client not started",
            ))
        })?;
        let packet = protocol::build_request(kind, payload);
        socket.send_to(&packet, address)?;
        log::debug!("Sent {:?} ({} bytes) to {}", kind, packet.len(), address);
        Ok(())
    }

    /// Stop the reader thread and close the socket. Safe to call repeatedly.
    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            log::debug!("NatNet client stopped");
        }
        self.socket = None;
    }
}

impl Drop for NatNetClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Reads command-channel replies until the stop flag is set.
fn command_reader_loop(socket: UdpSocket, shared: Arc<Shared>, stop_flag: Arc<AtomicBool>) {
    let mut buf = vec![0u8; protocol::MAX_PACKET_SIZE];

    log::debug!("NatNet command reader started");

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            break;
        }

        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => {
                // ICMP port-unreachable surfaces here on some platforms.
                log::warn!("NatNet command read error: {}", e);
                std::thread::sleep(READ_TIMEOUT);
                continue;
            }
        };

        handle_packet(&buf[..len], from, &shared);
    }
}

fn handle_packet(packet: &[u8], from: SocketAddr, shared: &Shared) {
    let Some((id, payload)) = protocol::parse_header(packet) else {
        log::trace!("Runt packet ({} bytes) from {}", packet.len(), from);
        return;
    };

    match id {
        protocol::NAT_SERVERINFO => match protocol::parse_server_info(payload) {
            Ok(info) => {
                log::info!(
                    "Connected to {} {}.{} (NatNet {}.{})",
                    info.app_name,
                    info.app_version[0],
                    info.app_version[1],
                    info.natnet_version.major,
                    info.natnet_version.minor
                );
                *lock(&shared.server_info) = Some(info);
            }
            Err(e) => log::warn!("Bad server info from {}: {}", from, e),
        },
        protocol::NAT_MODELDEF => {
            let version = lock(&shared.server_info)
                .as_ref()
                .map(|i| i.natnet_version)
                .unwrap_or_else(NatNetVersion::default);
            match protocol::parse_model_definition(payload, version) {
                Ok(def) => {
                    log::debug!("Model definition with {} cameras", def.cameras.len());
                    // Held across the call: once the slot is cleared no
                    // callback can still be running or start later.
                    let listener = lock(&shared.listener);
                    if let Some(callback) = listener.as_ref() {
                        callback(def);
                    }
                }
                Err(e) => log::warn!("Bad model definition from {}: {}", from, e),
            }
        }
        protocol::NAT_MESSAGESTRING => {
            log::debug!("Server message: {}", protocol::extract_string(payload));
        }
        protocol::NAT_UNRECOGNIZED_REQUEST => {
            log::warn!("Server did not recognize the last request");
        }
        other => log::trace!("Ignoring message id {} from {}", other, from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::tests::{camera_body, model_def_payload, packet, server_info_payload};
    use crate::protocol::DATASET_CAMERA;
    use std::sync::atomic::AtomicUsize;

    fn fake_server() -> (UdpSocket, u16) {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        server.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let port = server.local_addr().unwrap().port();
        (server, port)
    }

    #[test]
    fn test_send_before_start_fails() {
        let mut client = NatNetClient::new();
        let addr: SocketAddr = "127.0.0.1:1510".parse().unwrap();
        let err = client
            .send_request(RequestKind::ModelDefinition, "", addr)
            .unwrap_err();
        assert!(matches!(err, CalibError::Socket(_)));
    }

    #[test]
    fn test_start_sends_connect_and_tracks_server_info() {
        let (server, port) = fake_server();
        let mut client = NatNetClient::new().with_command_port(port);
        client.configure("127.0.0.1", "127.0.0.1", false);
        client.start().unwrap();
        assert!(client.is_running());

        let mut buf = [0u8; 1024];
        let (len, from) = server.recv_from(&mut buf).unwrap();
        let (id, payload) = protocol::parse_header(&buf[..len]).unwrap();
        assert_eq!(id, protocol::NAT_CONNECT);
        assert_eq!(&payload[..4], b"Ping");

        server
            .send_to(&packet(protocol::NAT_SERVERINFO, &server_info_payload(4, 1)), from)
            .unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while client.server_info().is_none() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        let info = client.server_info().unwrap();
        assert_eq!(info.natnet_version, NatNetVersion { major: 4, minor: 1 });

        client.shutdown();
        client.shutdown();
        assert!(!client.is_running());
    }

    #[test]
    fn test_cleared_listener_is_not_called() {
        let (server, port) = fake_server();
        let mut client = NatNetClient::new().with_command_port(port);
        client.configure("127.0.0.1", "127.0.0.1", false);

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        client.set_data_description_listener(Some(Box::new(move |def| {
            seen.fetch_add(def.cameras.len(), Ordering::SeqCst);
        })));
        client.start().unwrap();

        let mut buf = [0u8; 1024];
        let (_, from) = server.recv_from(&mut buf).unwrap();
        let modeldef = packet(
            protocol::NAT_MODELDEF,
            &model_def_payload(&[(
                DATASET_CAMERA,
                camera_body("cam #1", [0.0; 3], [0.0, 0.0, 0.0, 1.0]),
            )]),
        );

        server.send_to(&modeldef, from).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while calls.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        client.set_data_description_listener(None);
        server.send_to(&modeldef, from).unwrap();
        std::thread::sleep(Duration::from_millis(400));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        client.shutdown();
    }
}
