use crate::types::{ModelDefinition, RawCameraDescription};
use crate::{CalibError, Result};
use std::collections::BTreeMap;

// -- Ports --
pub const COMMAND_PORT: u16 = 1510;
pub const DATA_PORT: u16 = 1511;

// -- Message ids --
pub const NAT_CONNECT: u16 = 0;
pub const NAT_SERVERINFO: u16 = 1;
pub const NAT_REQUEST: u16 = 2;
pub const NAT_RESPONSE: u16 = 3;
pub const NAT_REQUEST_MODELDEF: u16 = 4;
pub const NAT_MODELDEF: u16 = 5;
pub const NAT_MESSAGESTRING: u16 = 8;
pub const NAT_KEEPALIVE: u16 = 10;
pub const NAT_UNRECOGNIZED_REQUEST: u16 = 100;

// -- Packet geometry --
pub const HEADER_SIZE: usize = 4;
pub const MAX_PACKET_SIZE: usize = 65503;
pub const CONNECT_PAYLOAD_SIZE: usize = 270;
/// Offset of the client's NatNet version inside the connect payload.
pub const CONNECT_VERSION_OFFSET: usize = 265;
pub const SERVER_APP_NAME_SIZE: usize = 256;

/// NatNet version this client announces on connect.
pub const CLIENT_NATNET_VERSION: [u8; 4] = [4, 1, 0, 0];

// -- Model definition dataset types --
pub const DATASET_MARKER_SET: i32 = 0;
pub const DATASET_RIGID_BODY: i32 = 1;
pub const DATASET_SKELETON: i32 = 2;
pub const DATASET_FORCE_PLATE: i32 = 3;
pub const DATASET_DEVICE: i32 = 4;
pub const DATASET_CAMERA: i32 = 5;
pub const DATASET_ASSET: i32 = 6;

/// Requests this client can send on the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Connect,
    ModelDefinition,
    KeepAlive,
    Command,
}

impl RequestKind {
    pub fn message_id(self) -> u16 {
        match self {
            RequestKind::Connect => NAT_CONNECT,
            RequestKind::ModelDefinition => NAT_REQUEST_MODELDEF,
            RequestKind::KeepAlive => NAT_KEEPALIVE,
            RequestKind::Command => NAT_REQUEST,
        }
    }
}

/// NatNet protocol version reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NatNetVersion {
    pub major: u8,
    pub minor: u8,
}

impl NatNetVersion {
    pub fn is_known(self) -> bool {
        self.major != 0
    }

    /// Datasets carry a byte size from 4.1 on. An unknown version is treated as
    /// current since every supported Motive release reports 4.1 or later.
    pub fn has_dataset_sizes(self) -> bool {
        !self.is_known() || self.major > 4 || (self.major == 4 && self.minor >= 1)
    }
}

/// Contents of a NAT_SERVERINFO reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub app_name: String,
    pub app_version: [u8; 4],
    pub natnet_version: NatNetVersion,
}

/// Build a command packet: [id: u16 LE, size: u16 LE, payload...].
///
/// Model-definition and keep-alive requests carry a single NUL byte on the
/// wire and announce a size of zero, matching the Motive SDK clients.
pub fn build_request(kind: RequestKind, payload: &str) -> Vec<u8> {
    let body: Vec<u8> = match kind {
        RequestKind::Connect => build_connect_payload(),
        RequestKind::ModelDefinition | RequestKind::KeepAlive => Vec::new(),
        RequestKind::Command => {
            let mut b = payload.as_bytes().to_vec();
            b.push(0);
            b
        }
    };

    let mut packet = Vec::with_capacity(HEADER_SIZE + body.len() + 1);
    packet.extend_from_slice(&kind.message_id().to_le_bytes());
    packet.extend_from_slice(&(body.len() as u16).to_le_bytes());
    if body.is_empty() {
        packet.push(0);
    } else {
        packet.extend_from_slice(&body);
    }
    packet
}

fn build_connect_payload() -> Vec<u8> {
    let mut body = vec![0u8; CONNECT_PAYLOAD_SIZE];
    body[..4].copy_from_slice(b"Ping");
    body[CONNECT_VERSION_OFFSET..CONNECT_VERSION_OFFSET + 4]
        .copy_from_slice(&CLIENT_NATNET_VERSION);
    body
}

/// Split a packet into (message id, payload). The payload is clamped to the
/// bytes actually received.
pub fn parse_header(packet: &[u8]) -> Option<(u16, &[u8])> {
    if packet.len() < HEADER_SIZE {
        return None;
    }
    let id = u16::from_le_bytes([packet[0], packet[1]]);
    let size = u16::from_le_bytes([packet[2], packet[3]]) as usize;
    let end = (HEADER_SIZE + size).min(packet.len());
    Some((id, &packet[HEADER_SIZE..end]))
}

pub fn parse_server_info(payload: &[u8]) -> Result<ServerInfo> {
    let mut r = PacketReader::new(payload);
    let name = r.bytes(SERVER_APP_NAME_SIZE, "server app name")?;
    let app = r.bytes(4, "server app version")?;
    let natnet = r.bytes(4, "server NatNet version")?;
    Ok(ServerInfo {
        app_name: extract_string(name),
        app_version: [app[0], app[1], app[2], app[3]],
        natnet_version: NatNetVersion {
            major: natnet[0],
            minor: natnet[1],
        },
    })
}

/// Parse a NAT_MODELDEF payload, keeping only camera datasets.
pub fn parse_model_definition(payload: &[u8], version: NatNetVersion) -> Result<ModelDefinition> {
    let mut r = PacketReader::new(payload);
    let count = r.i32("dataset count")?;
    let mut cameras = Vec::new();

    for index in 0..count.max(0) {
        let kind = r.i32("dataset type")?;
        if version.has_dataset_sizes() {
            let size = r.i32("dataset size")?;
            let body = r.bytes(size.max(0) as usize, "dataset body")?;
            if kind == DATASET_CAMERA {
                cameras.push(parse_camera(&mut PacketReader::new(body))?);
            }
        } else if kind == DATASET_CAMERA {
            cameras.push(parse_camera(&mut r)?);
        } else {
            // Without sizes, skipping a dataset means decoding it.
            log::warn!(
                "Stopping model definition parse at dataset {} (type {}) for NatNet {}.{}",
                index,
                kind,
                version.major,
                version.minor
            );
            break;
        }
    }

    Ok(ModelDefinition { cameras })
}

fn parse_camera(r: &mut PacketReader<'_>) -> Result<RawCameraDescription> {
    let name = r.cstring("camera name")?;
    let mut position = Vec::with_capacity(3);
    for _ in 0..3 {
        position.push(r.f32("camera position")? as f64);
    }
    let mut orientation = Vec::with_capacity(4);
    for _ in 0..4 {
        orientation.push(r.f32("camera orientation")? as f64);
    }
    Ok(RawCameraDescription {
        name,
        position,
        orientation,
        extra: BTreeMap::new(),
    })
}

/// Extract a null-terminated string from a byte slice.
pub fn extract_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}

/// Bounds-checked little-endian cursor over a payload.
struct PacketReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PacketReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                CalibError::Protocol(format!(
                    "truncated {} at offset {} (need {}, have {})",
                    what,
                    self.offset,
                    len,
                    self.data.len().saturating_sub(self.offset)
                ))
            })?;
        let out = &self.data[self.offset..end];
        self.offset = end;
        Ok(out)
    }

    fn i32(&mut self, what: &str) -> Result<i32> {
        let b = self.bytes(4, what)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f32(&mut self, what: &str) -> Result<f32> {
        let b = self.bytes(4, what)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn cstring(&mut self, what: &str) -> Result<String> {
        let rest = &self.data[self.offset..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| CalibError::Protocol(format!("unterminated {}", what)))?;
        let s = String::from_utf8_lossy(&rest[..len]).to_string();
        self.offset += len + 1;
        Ok(s)
    }
}
