//! A blocking TraCI client for controlling SUMO.

use crate::config::SumoConfig;
use crate::simulation::{DetectorQuery, SignalActuator, SimulationControl};
use crate::{Error, Result};
use bytes::{Buf, Bytes};
use codec::{cmd, var, Command, Status, Value};
use log::{debug, info, warn};
use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream, ToSocketAddrs};
use std::process::{Child, Stdio};
use std::thread;
use std::time::Duration;

pub mod codec;

/// The delay between connection attempts.
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);
/// The largest response accepted from the server, length prefix included.
const MAX_MESSAGE_LEN: usize = 64 * 1024 * 1024;

/// A connection to a TraCI server, and the SUMO process behind it if it
/// was launched by this client.
#[derive(Debug)]
pub struct TraciClient {
    /// The TraCI connection.
    stream: TcpStream,
    /// The SUMO process, if launched by [TraciClient::launch].
    child: Option<Child>,
    /// Set once the close command has been sent.
    closed: bool,
}

impl TraciClient {
    /// Starts SUMO with the configured scenario and connects to it.
    pub fn launch(config: &SumoConfig) -> Result<Self> {
        let binary = config.resolve_binary()?;
        let port = match config.port {
            Some(port) => port,
            None => free_port()?,
        };

        info!(
            "Launching {} -c {} on port {}",
            binary.display(),
            config.config_file.display(),
            port
        );
        let mut child = std::process::Command::new(&binary)
            .arg("-c")
            .arg(&config.config_file)
            .arg("--remote-port")
            .arg(port.to_string())
            .args(&config.extra_args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| Error::Launch {
                binary: binary.clone(),
                source,
            })?;

        let stream = match connect_with_retries(port, config.connect_retries, &mut child) {
            Ok(stream) => stream,
            Err(err) => {
                // Nothing else will reap the process on this path.
                let _ = child.kill();
                let _ = child.wait();
                return Err(err);
            }
        };
        Self::attach(stream, Some(child))
    }

    /// Connects to a TraCI server which is already running.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::attach(TcpStream::connect(addr)?, None)
    }

    fn attach(stream: TcpStream, child: Option<Child>) -> Result<Self> {
        stream.set_nodelay(true)?;
        let mut client = Self {
            stream,
            child,
            closed: false,
        };
        let (api, identifier) = client.version()?;
        info!("Connected to {} (TraCI API {})", identifier, api);
        Ok(client)
    }

    /// Gets the server's API version and identifier string.
    pub fn version(&mut self) -> Result<(i32, String)> {
        let mut response = self.request(Command::bare(cmd::GET_VERSION))?;
        let mut command = Command::decode(&mut response)?;
        if command.id != cmd::GET_VERSION || command.content.remaining() < 4 {
            return Err(Error::protocol("malformed version response"));
        }
        let api = command.content.get_i32();
        let identifier = codec::get_string(&mut command.content)?;
        Ok((api, identifier))
    }

    /// Sends a single command and returns whatever follows its status.
    fn request(&mut self, command: Command) -> Result<Bytes> {
        let message = codec::encode_message([&command]);
        self.stream.write_all(&message)?;

        let mut header = [0u8; 4];
        self.stream.read_exact(&mut header)?;
        let len = u32::from_be_bytes(header) as usize;
        if len < 4 {
            return Err(Error::protocol(format!("message length {len} is too short")));
        }
        if len > MAX_MESSAGE_LEN {
            return Err(Error::protocol(format!(
                "message length {len} exceeds the {MAX_MESSAGE_LEN} byte limit"
            )));
        }
        let mut body = vec![0u8; len - 4];
        self.stream.read_exact(&mut body)?;

        let mut body = Bytes::from(body);
        Status::decode(&mut body)?.check(command.id)?;
        Ok(body)
    }

    fn get_variable(&mut self, id: u8, variable: u8, object: &str) -> Result<Value> {
        let mut response = self.request(Command::get_variable(id, variable, object))?;
        codec::decode_variable(&mut response, id, variable, object)
    }

    fn get_count(&mut self, id: u8, variable: u8, object: &str) -> Result<u32> {
        let value = self.get_variable(id, variable, object)?.as_integer()?;
        u32::try_from(value)
            .map_err(|_| Error::protocol(format!("negative count {value} for '{object}'")))
    }
}

impl SimulationControl for TraciClient {
    fn advance(&mut self) -> Result<()> {
        let mut response = self.request(Command::simulation_step())?;
        if response.remaining() >= 4 {
            let subscriptions = response.get_i32();
            if subscriptions != 0 {
                debug!("Ignoring {} subscription results", subscriptions);
            }
        }
        Ok(())
    }

    fn pending_entities(&mut self) -> Result<u32> {
        self.get_count(cmd::GET_SIM_VARIABLE, var::MIN_EXPECTED_VEHICLES, "")
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.request(Command::bare(cmd::CLOSE))?;
        self.closed = true;
        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            debug!("SUMO exited with {}", status);
        }
        Ok(())
    }
}

impl DetectorQuery for TraciClient {
    fn last_step_vehicle_count(&mut self, detector: &str) -> Result<u32> {
        self.get_count(
            cmd::GET_LANEAREA_VARIABLE,
            var::LAST_STEP_VEHICLE_NUMBER,
            detector,
        )
    }
}

impl SignalActuator for TraciClient {
    fn phase(&mut self, signal: &str) -> Result<i32> {
        self.get_variable(cmd::GET_TL_VARIABLE, var::TL_CURRENT_PHASE, signal)?
            .as_integer()
    }

    fn set_phase(&mut self, signal: &str, index: i32) -> Result<()> {
        self.request(Command::set_variable(
            cmd::SET_TL_VARIABLE,
            var::TL_PHASE_INDEX,
            signal,
            &Value::Integer(index),
        ))?;
        Ok(())
    }
}

impl Drop for TraciClient {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!("Connection dropped without closing; killing SUMO");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Asks the OS for a port that is currently free.
fn free_port() -> Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}

fn connect_with_retries(port: u16, attempts: u32, child: &mut Child) -> Result<TcpStream> {
    for attempt in 1..=attempts {
        match TcpStream::connect((Ipv4Addr::LOCALHOST, port)) {
            Ok(stream) => return Ok(stream),
            Err(err) => debug!("Connection attempt {} failed: {}", attempt, err),
        }
        if let Some(status) = child.try_wait()? {
            warn!("SUMO exited early with {}", status);
            return Err(Error::Connect { port, attempts: attempt });
        }
        thread::sleep(CONNECT_RETRY_DELAY);
    }
    Err(Error::Connect { port, attempts })
}
