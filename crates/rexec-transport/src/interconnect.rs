//! High-speed-interconnect gang transport: a proprietary launch
//! mechanism (historically vendor MPI/interconnect job launchers) that
//! starts every peer together and tears the whole gang down if any one
//! peer fails.
//!
//! The real wire protocol is vendor-specific and unavailable here; this
//! module implements the structural contract -- `RcmdKind::is_gang`
//! returning true for this variant is what the engine's worker
//! lifecycle actually keys its abort-the-whole-job behavior on, so a
//! transport that simply refuses to connect is enough to exercise and
//! document that path without fabricating a wire format.

use rexec_core::EngineError;
use tokio_util::sync::CancellationToken;

use crate::request::{OpenRequest, OpenedConnection};
use crate::Transport;

#[derive(Debug, Default, Clone, Copy)]
pub struct InterconnectTransport;

#[async_trait::async_trait]
impl Transport for InterconnectTransport {
    async fn init(&self) -> Result<(), EngineError> {
        Err(EngineError::TransportInit(
            "interconnect gang-launch transport is not available in this build".to_string(),
        ))
    }

    async fn open(
        &self,
        req: OpenRequest,
        _cancel: &CancellationToken,
    ) -> Result<OpenedConnection, EngineError> {
        Err(EngineError::ConnectFailed {
            host: req.host,
            reason: "interconnect gang-launch transport is not available in this build".to_string(),
        })
    }

    fn signal(&self, _conn: &OpenedConnection, _signum: i32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_reports_unavailable() {
        let transport = InterconnectTransport;
        let err = transport.init().await.unwrap_err();
        assert!(matches!(err, EngineError::TransportInit(_)));
    }
}
