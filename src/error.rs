//! Error types shared by the controller, the TraCI client and the converters.

use std::path::PathBuf;
use thiserror::Error;

/// A specialised result type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Process exit codes used by the command line tool.
pub struct ExitCode;

impl ExitCode {
    /// The command completed.
    pub const SUCCESS: i32 = 0;
    /// An error with no more specific category.
    pub const ERROR: i32 = 1;
    /// The configuration is invalid or SUMO could not be located.
    pub const CONFIG_ERROR: i32 = 2;
    /// A file could not be read or written.
    pub const IO_ERROR: i32 = 3;
    /// The simulator failed or misbehaved.
    pub const SIMULATION_ERROR: i32 = 4;
    /// A log could not be converted.
    pub const CONVERSION_ERROR: i32 = 5;
}

/// Any error that can end a control run or a log conversion.
#[derive(Debug, Error)]
pub enum Error {
    /// The startup configuration is incomplete or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to serialise configuration: {0}")]
    ConfigSerialise(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The simulator process could not be spawned.
    #[error("failed to launch `{}`: {source}", .binary.display())]
    Launch {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No connection could be made to the simulator.
    #[error("could not connect to the simulator on port {port} after {attempts} attempts")]
    Connect { port: u16, attempts: u32 },

    /// A TraCI frame was malformed or did not match the request.
    #[error("TraCI protocol error: {0}")]
    Protocol(String),

    /// The simulator rejected a command.
    #[error("simulator rejected command {command:#04x}: {description}")]
    Command { command: u8, description: String },

    /// An input log for a converter does not exist.
    #[error("the file '{}' was not found", .0.display())]
    InputNotFound(PathBuf),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Returns the exit code the command line tool reports for this error.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::ConfigParse(_) | Self::ConfigSerialise(_) => {
                ExitCode::CONFIG_ERROR
            }
            Self::Io(_) => ExitCode::IO_ERROR,
            Self::Launch { .. } | Self::Connect { .. } | Self::Protocol(_) | Self::Command { .. } => {
                ExitCode::SIMULATION_ERROR
            }
            Self::InputNotFound(_) | Self::Xml(_) | Self::Csv(_) => ExitCode::CONVERSION_ERROR,
            Self::Json(_) => ExitCode::ERROR,
        }
    }
}
