/// Failure kinds surfaced by the dispatch engine, grouped by the scope
/// they abort: pre-dispatch errors stop the whole job before any worker
/// is launched, the rest are per-worker and only fail that worker's
/// outcome (except the gang-transport case, which the engine escalates
/// itself).
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("gethostbyname {0}: lookup failed")]
    HostResolution(String),

    #[error("host {0} resolved to a non-IPv4 address")]
    NonIpv4Address(String),

    #[error("access: {path}: {source}")]
    InputAccess {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("not a regular file or directory: {0}")]
    NotRegularOrDirectory(String),

    #[error("transport init failed: {0}")]
    TransportInit(String),

    #[error("{host}: connect failed: {reason}")]
    ConnectFailed { host: String, reason: String },

    #[error("{host}: connect timeout")]
    ConnectTimeout { host: String },

    #[error("{host}: command timeout")]
    CommandTimeout { host: String },

    #[error("{host}: select: {reason}")]
    StreamError { host: String, reason: String },

    #[error("{host}: remote error: {message}")]
    CopyProtocolFatal { host: String, message: String },

    #[error("{host}: short write")]
    ShortWrite { host: String },
}
