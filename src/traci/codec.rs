//! Encoding and decoding of TraCI messages.
//!
//! A message is a big-endian `u32` length (which counts itself) followed by
//! commands. Each command starts with a one byte length, or a zero byte and a
//! `u32` length for longer commands, then a command ID and its content.

use crate::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Command IDs.
pub mod cmd {
    pub const GET_VERSION: u8 = 0x00;
    pub const SIMSTEP: u8 = 0x02;
    pub const CLOSE: u8 = 0x7f;
    pub const GET_TL_VARIABLE: u8 = 0xa2;
    pub const GET_SIM_VARIABLE: u8 = 0xab;
    pub const GET_LANEAREA_VARIABLE: u8 = 0xad;
    pub const SET_TL_VARIABLE: u8 = 0xc2;
}

/// Variable IDs.
pub mod var {
    pub const LAST_STEP_VEHICLE_NUMBER: u8 = 0x10;
    pub const TL_PHASE_INDEX: u8 = 0x22;
    pub const TL_CURRENT_PHASE: u8 = 0x28;
    pub const MIN_EXPECTED_VEHICLES: u8 = 0x7d;
}

/// Type tags of typed values.
pub mod ty {
    pub const INTEGER: u8 = 0x09;
    pub const DOUBLE: u8 = 0x0b;
    pub const STRING: u8 = 0x0c;
}

/// Result codes of a status response.
pub mod status {
    pub const OK: u8 = 0x00;
    pub const NOT_IMPLEMENTED: u8 = 0x01;
    pub const ERR: u8 = 0xff;
}

/// The response to a get command has this offset added to the command ID.
pub const RESPONSE_OFFSET: u8 = 0x10;

/// A typed value, as carried by variable get and set commands.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i32),
    Double(f64),
    String(String),
}

impl Value {
    fn encode(&self, dst: &mut BytesMut) {
        match self {
            Value::Integer(v) => {
                dst.put_u8(ty::INTEGER);
                dst.put_i32(*v);
            }
            Value::Double(v) => {
                dst.put_u8(ty::DOUBLE);
                dst.put_f64(*v);
            }
            Value::String(v) => {
                dst.put_u8(ty::STRING);
                put_string(dst, v);
            }
        }
    }

    fn decode(src: &mut Bytes) -> Result<Self> {
        ensure(src, 1)?;
        match src.get_u8() {
            ty::INTEGER => {
                ensure(src, 4)?;
                Ok(Value::Integer(src.get_i32()))
            }
            ty::DOUBLE => {
                ensure(src, 8)?;
                Ok(Value::Double(src.get_f64()))
            }
            ty::STRING => Ok(Value::String(get_string(src)?)),
            other => Err(Error::protocol(format!("unsupported type tag {other:#04x}"))),
        }
    }

    /// Gets the value as an integer.
    pub fn as_integer(&self) -> Result<i32> {
        match self {
            Value::Integer(v) => Ok(*v),
            other => Err(Error::protocol(format!("expected an integer, got {other:?}"))),
        }
    }
}

/// A single command within a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The command identifier.
    pub id: u8,
    /// Everything after the identifier.
    pub content: Bytes,
}

impl Command {
    /// Creates a command with the given content.
    pub fn new(id: u8, content: impl Into<Bytes>) -> Self {
        Self {
            id,
            content: content.into(),
        }
    }

    /// A command with no content.
    pub fn bare(id: u8) -> Self {
        Self::new(id, Bytes::new())
    }

    /// Asks for one step of simulation.
    pub fn simulation_step() -> Self {
        let mut content = BytesMut::with_capacity(8);
        // A target time of zero advances by a single step.
        content.put_f64(0.0);
        Self::new(cmd::SIMSTEP, content)
    }

    /// Reads a variable of an object.
    pub fn get_variable(id: u8, variable: u8, object: &str) -> Self {
        let mut content = BytesMut::with_capacity(5 + object.len());
        content.put_u8(variable);
        put_string(&mut content, object);
        Self::new(id, content)
    }

    /// Writes a variable of an object.
    pub fn set_variable(id: u8, variable: u8, object: &str, value: &Value) -> Self {
        let mut content = BytesMut::with_capacity(16 + object.len());
        content.put_u8(variable);
        put_string(&mut content, object);
        value.encode(&mut content);
        Self::new(id, content)
    }

    /// Writes the command with its length prefix.
    pub fn encode(&self, dst: &mut BytesMut) {
        let len = self.content.len() + 2;
        if len <= u8::MAX as usize {
            dst.put_u8(len as u8);
        } else {
            dst.put_u8(0);
            dst.put_u32((len + 4) as u32);
        }
        dst.put_u8(self.id);
        dst.put_slice(&self.content);
    }

    /// Splits the next command off the front of `src`.
    pub fn decode(src: &mut Bytes) -> Result<Self> {
        ensure(src, 1)?;
        let (len, header) = match src.get_u8() {
            0 => {
                ensure(src, 4)?;
                (src.get_u32() as usize, 5)
            }
            len => (len as usize, 1),
        };
        if len < header + 1 {
            return Err(Error::protocol(format!("command length {len} is too short")));
        }
        let body = len - header;
        ensure(src, body)?;
        let mut body = src.split_to(body);
        let id = body.get_u8();
        Ok(Self { id, content: body })
    }
}

/// The status response which answers every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// The command being answered.
    pub command: u8,
    /// One of the [status] codes.
    pub result: u8,
    /// A human readable reason, empty on success.
    pub description: String,
}

impl Status {
    /// Reads a status response.
    pub fn decode(src: &mut Bytes) -> Result<Self> {
        let mut command = Command::decode(src)?;
        ensure(&command.content, 1)?;
        let result = command.content.get_u8();
        let description = get_string(&mut command.content)?;
        Ok(Self {
            command: command.id,
            result,
            description,
        })
    }

    /// Writes a status response.
    pub fn encode(&self, dst: &mut BytesMut) {
        let mut content = BytesMut::with_capacity(5 + self.description.len());
        content.put_u8(self.result);
        put_string(&mut content, &self.description);
        Command::new(self.command, content).encode(dst);
    }

    /// Fails unless this is a successful answer to `command`.
    pub fn check(self, command: u8) -> Result<()> {
        if self.command != command {
            return Err(Error::protocol(format!(
                "status for command {:#04x} received in reply to {command:#04x}",
                self.command
            )));
        }
        match self.result {
            status::OK => Ok(()),
            _ => Err(Error::Command {
                command,
                description: self.description,
            }),
        }
    }
}

/// Wraps commands in a length-prefixed message.
pub fn encode_message<'a>(commands: impl IntoIterator<Item = &'a Command>) -> Bytes {
    let mut body = BytesMut::new();
    for command in commands {
        command.encode(&mut body);
    }
    let mut message = BytesMut::with_capacity(body.len() + 4);
    message.put_u32((body.len() + 4) as u32);
    message.put_slice(&body);
    message.freeze()
}

/// Decodes the answer to a get command and returns the variable's value.
pub fn decode_variable(src: &mut Bytes, id: u8, variable: u8, object: &str) -> Result<Value> {
    let mut response = Command::decode(src)?;
    if response.id != id.wrapping_add(RESPONSE_OFFSET) {
        return Err(Error::protocol(format!(
            "unexpected response {:#04x} to command {id:#04x}",
            response.id
        )));
    }
    ensure(&response.content, 1)?;
    let returned_var = response.content.get_u8();
    let returned_obj = get_string(&mut response.content)?;
    if returned_var != variable || returned_obj != object {
        return Err(Error::protocol(format!(
            "asked for variable {variable:#04x} of '{object}', \
             got {returned_var:#04x} of '{returned_obj}'"
        )));
    }
    Value::decode(&mut response.content)
}

/// Writes a length-prefixed string.
pub fn put_string(dst: &mut BytesMut, value: &str) {
    dst.put_u32(value.len() as u32);
    dst.put_slice(value.as_bytes());
}

/// Reads a length-prefixed string.
pub fn get_string(src: &mut Bytes) -> Result<String> {
    ensure(src, 4)?;
    let len = src.get_u32() as usize;
    ensure(src, len)?;
    let raw = src.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|e| Error::protocol(format!("invalid string: {e}")))
}

fn ensure(src: &Bytes, len: usize) -> Result<()> {
    if src.remaining() < len {
        return Err(Error::protocol(format!(
            "truncated message: needed {len} bytes, {} left",
            src.remaining()
        )));
    }
    Ok(())
}
