//! Control packets the relay understands.
//!
//! Everything else passes through as an opaque [`Frame`]. The relay only
//! builds the handful of packets it injects itself (protocol version,
//! connect response, chat, client disconnect) and decodes the client's
//! connect handshake and chat sends so the interceptor can inspect them.

use crate::codec::{CodecError, Frame, PacketReader, PacketWriter};

/// Protocol version announced to clients when none is configured.
pub const DEFAULT_PROTOCOL_VERSION: u32 = 636;

/// Color tag used for warnings shown to players.
pub const WARNING_COLOR: &str = "^#f75d5d;";

/// Packet identifiers with meaning to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PacketId {
    ProtocolVersion = 1,
    ConnectResponse = 2,
    ChatReceive = 5,
    ClientConnect = 7,
    ClientDisconnect = 8,
    ChatSend = 11,
}

impl PacketId {
    pub fn from_u32(value: u32) -> Option<Self> {
        let id = match value {
            1 => Self::ProtocolVersion,
            2 => Self::ConnectResponse,
            5 => Self::ChatReceive,
            7 => Self::ClientConnect,
            8 => Self::ClientDisconnect,
            11 => Self::ChatSend,
            _ => return None,
        };
        Some(id)
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl From<PacketId> for u32 {
    fn from(id: PacketId) -> Self {
        id.as_u32()
    }
}

/// Protocol version announcement: a single big-endian `u32`.
pub fn protocol_version(version: u32) -> Frame {
    let mut writer = PacketWriter::new();
    writer.write_u32_be(version);
    Frame::new(PacketId::ProtocolVersion.as_u32(), writer.into_inner())
}

/// Notice sent to the backend when a client goes away.
pub fn client_disconnect() -> Frame {
    Frame::new(PacketId::ClientDisconnect.as_u32(), vec![0])
}

/// Rejection sent in place of a successful connect response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    pub reason: String,
}

impl ConnectResponse {
    pub fn rejection(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn to_frame(&self) -> Frame {
        let mut writer = PacketWriter::new();
        writer.write_bool(false).write_var_u32(0).write_string(&self.reason);
        Frame::new(PacketId::ConnectResponse.as_u32(), writer.into_inner())
    }

    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut reader = PacketReader::new(payload);
        let _success = reader.read_u8()?;
        let _client_id = reader.read_var_u32()?;
        let reason = reader.read_string()?;
        Ok(Self { reason })
    }
}

/// Where a chat line appears on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChatContext {
    Channel = 0,
    Broadcast = 1,
    Whisper = 2,
    CommandResult = 3,
}

impl ChatContext {
    fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(Self::Channel),
            1 => Ok(Self::Broadcast),
            2 => Ok(Self::Whisper),
            3 => Ok(Self::CommandResult),
            _ => Err(CodecError::InvalidField("context")),
        }
    }
}

/// An outgoing chat line for one client.
///
/// World, originating client id and display name are optional; the helpers
/// cover the common shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub context: ChatContext,
    pub world: String,
    pub client_id: u32,
    pub name: String,
    pub message: String,
}

impl ChatMessage {
    pub fn new(context: ChatContext, message: impl Into<String>) -> Self {
        Self {
            context,
            world: String::new(),
            client_id: 0,
            name: String::new(),
            message: message.into(),
        }
    }

    pub fn command_result(message: impl Into<String>) -> Self {
        Self::new(ChatContext::CommandResult, message)
    }

    pub fn broadcast(message: impl Into<String>) -> Self {
        Self::new(ChatContext::Broadcast, message)
    }

    pub fn world(mut self, world: impl Into<String>) -> Self {
        self.world = world.into();
        self
    }

    pub fn from_client(mut self, client_id: u32) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn to_frame(&self) -> Frame {
        let mut writer = PacketWriter::new();
        writer
            .write_u8(self.context as u8)
            .write_string(&self.world)
            .write_u32_be(self.client_id)
            .write_string(&self.name)
            .write_string(&self.message);
        Frame::new(PacketId::ChatReceive.as_u32(), writer.into_inner())
    }

    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut reader = PacketReader::new(payload);
        Ok(Self {
            context: ChatContext::from_u8(reader.read_u8()?)?,
            world: reader.read_string()?,
            client_id: reader.read_u32_be()?,
            name: reader.read_string()?,
            message: reader.read_string()?,
        })
    }
}

/// The client's connect handshake.
///
/// Only the leading fields are decoded: asset digest, optional player UUID,
/// player name and species. Whatever follows is left to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConnect {
    pub asset_digest: Vec<u8>,
    pub uuid: Option<[u8; 16]>,
    pub name: String,
    pub species: String,
}

impl ClientConnect {
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut reader = PacketReader::new(payload);
        let asset_digest = reader.read_bytes()?;
        let uuid = match reader.read_u8()? {
            0 => None,
            _ => {
                let mut uuid = [0u8; 16];
                uuid.copy_from_slice(reader.read_raw(16)?);
                Some(uuid)
            }
        };
        let name = reader.read_string()?;
        let species = reader.read_string()?;
        Ok(Self {
            asset_digest,
            uuid,
            name,
            species,
        })
    }

    pub fn to_frame(&self) -> Frame {
        let mut writer = PacketWriter::new();
        writer.write_bytes(&self.asset_digest);
        match &self.uuid {
            Some(uuid) => writer.write_bool(true).write_raw(uuid),
            None => writer.write_bool(false),
        };
        writer.write_string(&self.name).write_string(&self.species);
        Frame::new(PacketId::ClientConnect.as_u32(), writer.into_inner())
    }
}

/// A chat line typed by the player, travelling client to backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSend {
    pub message: String,
    pub channel: u8,
}

impl ChatSend {
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut reader = PacketReader::new(payload);
        let message = reader.read_string()?;
        let channel = reader.read_u8()?;
        Ok(Self { message, channel })
    }

    pub fn to_frame(&self) -> Frame {
        let mut writer = PacketWriter::new();
        writer.write_string(&self.message).write_u8(self.channel);
        Frame::new(PacketId::ChatSend.as_u32(), writer.into_inner())
    }
}
