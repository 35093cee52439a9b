//! Error types for GroveIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// GroveIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The bus device could not be opened
    #[error("Failed to open bus: {0}")]
    TransportOpen(#[source] std::io::Error),

    /// A bus transaction failed after the transport exhausted its retries
    #[error("Bus I/O failed during {operation}: {source}")]
    TransportIo {
        /// Transport primitive that failed
        operation: &'static str,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Another unit already occupies the port
    #[error("Port {0} is already occupied by another unit")]
    PortOccupied(String),

    /// The unit cannot be attached to this kind of port
    #[error("Unit {unit} does not support {port_kind} ports")]
    UnsupportedPortType {
        /// Unit description
        unit: String,
        /// Port kind description
        port_kind: String,
    },

    /// The owning bus has been torn down
    #[error("Bus has been disconnected")]
    DisconnectedBus,

    /// The connection has been disconnected
    #[error("Port {0} is disconnected")]
    DisconnectedPort(String),

    /// The output adapter cannot encode the value
    #[error("Unsupported output value: {0}")]
    UnsupportedOutputValue(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
