//! OCPP WebSocket gateway.
//!
//! Accepts station connections at `ws://<host>:<port>/ocpp/{stationId}`
//! (1.6-first) and `/ocpp2/{stationId}` (2.0.1). The subprotocol is
//! negotiated from `Sec-WebSocket-Protocol`; the tenant is resolved from
//! the handshake (header, query parameter, subdomain) and bound to the
//! session for every frame it carries.
//!
//! Close codes: 1000 normal, 1008 policy violation (tenant rejected),
//! 1011 server error during setup.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use super::registry::SharedSessionRegistry;
use super::router::SharedMessageRouter;
use super::session::OcppSession;
use crate::charging::ChargingService;
use crate::domain::OcppVersion;
use crate::shared::shutdown::ShutdownSignal;
use crate::tenant::resolver::{self, TenantDirectory};
use crate::tenant::TenantContext;

/// What the handshake callback extracts from the upgrade request.
#[derive(Debug, Default, Clone)]
struct HandshakeInfo {
    station_id: Option<String>,
    version: Option<OcppVersion>,
    tenant_header: Option<String>,
    query: Option<String>,
    host: Option<String>,
    authorization_present: bool,
}

/// Parse `/ocpp/{stationId}` and `/ocpp2/{stationId}` paths.
fn parse_path(path: &str) -> Option<(String, OcppVersion)> {
    let path = path.trim_start_matches('/');
    if let Some(id) = path.strip_prefix("ocpp2/") {
        let id = id.trim_matches('/');
        (!id.is_empty() && !id.contains('/')).then(|| (id.to_string(), OcppVersion::V201))
    } else if let Some(id) = path.strip_prefix("ocpp/") {
        let id = id.trim_matches('/');
        (!id.is_empty() && !id.contains('/')).then(|| (id.to_string(), OcppVersion::V16))
    } else {
        None
    }
}

/// Pick the best mutually supported subprotocol; the path determines the
/// fallback when the station advertises nothing.
fn negotiate_version(requested: &str, path_version: OcppVersion) -> OcppVersion {
    let offered: Vec<&str> = requested.split(',').map(|p| p.trim()).collect();
    if path_version == OcppVersion::V201 {
        return OcppVersion::V201;
    }
    for candidate in [OcppVersion::V201, OcppVersion::V16] {
        if offered.contains(&candidate.subprotocol()) {
            return candidate;
        }
    }
    path_version
}

/// Whether a station id is acceptable: alphanumeric, `_`, `-`, at most 100
/// characters.
fn valid_station_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 100
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub struct OcppGatewayServer {
    addr: String,
    registry: SharedSessionRegistry,
    router: SharedMessageRouter,
    service: Arc<ChargingService>,
    directory: Arc<dyn TenantDirectory>,
    default_tenant: Option<String>,
    shutdown: Option<ShutdownSignal>,
}

impl OcppGatewayServer {
    pub fn new(
        addr: impl Into<String>,
        registry: SharedSessionRegistry,
        router: SharedMessageRouter,
        service: Arc<ChargingService>,
        directory: Arc<dyn TenantDirectory>,
        default_tenant: Option<String>,
    ) -> Self {
        Self {
            addr: addr.into(),
            registry,
            router,
            service,
            directory,
            default_tenant,
            shutdown: None,
        }
    }

    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    /// Run the accept loop until shutdown.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(&self.addr).await?;
        info!(addr = self.addr.as_str(), "OCPP gateway listening");
        info!(
            "Stations connect to ws://{}/ocpp/{{stationId}} or /ocpp2/{{stationId}}",
            self.addr
        );

        loop {
            let accept = listener.accept();
            if let Some(shutdown) = &self.shutdown {
                tokio::select! {
                    result = accept => match result {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr),
                        Err(e) => error!(error = %e, "Failed to accept connection"),
                    },
                    _ = shutdown.notified().wait() => {
                        info!("OCPP gateway received shutdown signal");
                        self.close_all_sessions();
                        return Ok(());
                    }
                }
            } else {
                match accept.await {
                    Ok((stream, addr)) => self.spawn_connection(stream, addr),
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let registry = self.registry.clone();
        let router = self.router.clone();
        let service = self.service.clone();
        let directory = self.directory.clone();
        let default_tenant = self.default_tenant.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(
                stream,
                addr,
                registry,
                router,
                service,
                directory,
                default_tenant,
                shutdown,
            )
            .await
            {
                error!(addr = %addr, error = %e, "Connection error");
            }
        });
    }

    fn close_all_sessions(&self) {
        for session in self.registry.all() {
            self.registry.unregister(&session.session_id);
        }
        info!("OCPP gateway shutdown complete");
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: SharedSessionRegistry,
    router: SharedMessageRouter,
    service: Arc<ChargingService>,
    directory: Arc<dyn TenantDirectory>,
    default_tenant: Option<String>,
    shutdown: Option<ShutdownSignal>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut info = HandshakeInfo::default();

    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, mut response: Response| {
        let path = req.uri().path().to_string();

        let Some((station_id, path_version)) = parse_path(&path) else {
            warn!(addr = %addr, path = path.as_str(), "Rejecting handshake: bad path");
            return Err(bad_request("expected /ocpp/{stationId} or /ocpp2/{stationId}"));
        };
        if !valid_station_id(&station_id) {
            warn!(addr = %addr, station_id = station_id.as_str(), "Rejecting handshake: bad station id");
            return Err(bad_request("invalid station id"));
        }

        let requested_protocols = req
            .headers()
            .get("Sec-WebSocket-Protocol")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let version = negotiate_version(&requested_protocols, path_version);
        if requested_protocols
            .split(',')
            .any(|p| p.trim() == version.subprotocol())
        {
            response.headers_mut().insert(
                "Sec-WebSocket-Protocol",
                version.subprotocol().parse().expect("static subprotocol"),
            );
        }

        info.station_id = Some(station_id);
        info.version = Some(version);
        info.tenant_header = req
            .headers()
            .get(resolver::TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        info.query = req.uri().query().map(String::from);
        info.host = req
            .headers()
            .get("Host")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        info.authorization_present = req.headers().contains_key("Authorization");

        Ok(response)
    })
    .await?;

    // Rejected during the callback; nothing more to do.
    let (Some(station_id), Some(version)) = (info.station_id.clone(), info.version) else {
        return Ok(());
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Tenant resolution: header, query parameter, subdomain, then the
    // configured default.
    let tenant_id = resolver::resolve_ws(
        info.tenant_header.as_deref(),
        info.query.as_deref(),
        info.host.as_deref(),
    )
    .or(default_tenant);

    let tenant_id = match tenant_id {
        Some(code) if directory.is_active_tenant(&code).await => code,
        rejected => {
            warn!(
                addr = %addr,
                station_id = station_id.as_str(),
                tenant = ?rejected,
                "Tenant rejected at handshake"
            );
            let _ = ws_sender
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Policy,
                    reason: "tenant rejected".into(),
                })))
                .await;
            return Ok(());
        }
    };

    info!(
        station_id = station_id.as_str(),
        tenant_id = tenant_id.as_str(),
        %version,
        addr = %addr,
        "Station connected"
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let session = Arc::new(OcppSession::new(
        &station_id,
        &tenant_id,
        version,
        addr.to_string(),
        tx,
    ));
    if info.authorization_present {
        session.set_authenticated(true);
    }

    registry.register(session.clone());

    if let Err(e) = TenantContext::new(&tenant_id)
        .scope(service.mark_station_connected(&station_id, true))
        .await
    {
        // Station may simply not exist yet; BootNotification creates it.
        info!(station_id = station_id.as_str(), error = %e, "Connect bookkeeping skipped");
    }

    // Serialised writer: the single task draining the session's queue, so
    // outbound frames never interleave on the wire.
    let writer_session = session.clone();
    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(msg) => {
                        if let Err(e) = ws_sender.send(Message::Text(msg)).await {
                            error!(
                                station_id = writer_session.station_id.as_str(),
                                error = %e,
                                "Send error"
                            );
                            break;
                        }
                    }
                    None => break,
                },
                _ = writer_session.close_signal().notified().wait() => {
                    let _ = ws_sender
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "session closed".into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    // Reader: frames handled through the router; responses are queued on
    // the session so the writer serialises them.
    let reader_session = session.clone();
    let reader_router = router.clone();
    let recv_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                msg = ws_receiver.next() => msg,
                _ = reader_session.close_signal().notified().wait() => break,
            };
            match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(response) =
                        reader_router.handle_text(&reader_session, &text).await
                    {
                        if reader_session.send(response).is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    info!(
                        station_id = reader_session.station_id.as_str(),
                        ?frame,
                        "Close frame received"
                    );
                    break;
                }
                Some(Ok(Message::Binary(data))) => {
                    warn!(
                        station_id = reader_session.station_id.as_str(),
                        bytes = data.len(),
                        "Binary message ignored"
                    );
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => {
                    error!(
                        station_id = reader_session.station_id.as_str(),
                        error = %e,
                        "WebSocket error"
                    );
                    break;
                }
                None => break,
            }
        }
    });

    if let Some(shutdown) = shutdown {
        tokio::select! {
            _ = send_task => {},
            _ = recv_task => {},
            _ = shutdown.notified().wait() => {
                info!(station_id = station_id.as_str(), "Closing connection on shutdown");
            }
        }
    } else {
        tokio::select! {
            _ = send_task => {},
            _ = recv_task => {},
        }
    }

    // Teardown is the registry's job; eviction may already have replaced
    // this session, in which case unregister leaves the successor alone.
    registry.unregister(&session.session_id);
    session.close();

    let disconnect = TenantContext::new(&tenant_id)
        .scope(service.mark_station_connected(&station_id, false))
        .await;
    if let Err(e) = disconnect {
        info!(station_id = station_id.as_str(), error = %e, "Disconnect bookkeeping skipped");
    }

    info!(
        station_id = station_id.as_str(),
        tenant_id = tenant_id.as_str(),
        "Station disconnected"
    );
    Ok(())
}

fn bad_request(reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = tokio_tungstenite::tungstenite::http::StatusCode::BAD_REQUEST;
    response
}
