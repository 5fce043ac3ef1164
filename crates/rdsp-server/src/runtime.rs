//! Builds the subsystem registry from configuration, listens on whichever
//! transports were requested, and drives hello negotiation followed by the
//! dispatch loop for each accepted connection.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use rdsp_proto::{Capabilities, Challenge, HelloResolver, NegotiationError, SessionProfile};
use rdsp_session::{run as run_dispatch_loop, ConnectionSource, SessionIdAllocator, SubsystemRegistry};
use rdsp_subsystems::{
    AudioSubsystem, BandwidthSubsystem, ClipboardSubsystem, CommandSubsystem, CursorSubsystem, DisplaySubsystem,
    EncodingSubsystem, KeyboardSubsystem, LoggingSubsystem, NotificationSubsystem, PointerSubsystem, WebcamSubsystem,
    WindowSubsystem,
};
use rdsp_wire::{
    AesGcmCipher, CipherContext, FramePipeline, LegacyEncoder, ModernEncoder, PacketEncoder, Priority, Transport,
    Value, compressor_by_name,
};
use rdsp_worker::WorkerHandle;
use tokio::net::{TcpListener, UnixListener};
use tracing::{info, warn};

use crate::codec::WorkerAudioCodec;
use crate::config::{self, Config};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("no listen transport was configured (pass at least one --bind-* flag)")]
    NoListeners,
}

/// Ties the negotiated configuration, the subsystem registry, and the
/// session-id allocator together for the lifetime of the process.
pub struct Runtime {
    config: Config,
    registry: Arc<SubsystemRegistry>,
    ids: Arc<SessionIdAllocator>,
    local_capabilities: Capabilities,
    encoder: Arc<dyn PacketEncoder>,
}

impl Runtime {
    pub async fn build(config: Config) -> Self {
        let registry = Arc::new(build_registry(&config).await);
        let local_capabilities = default_capabilities(&config);
        let encoder = build_encoder(&config);
        Self { config, registry, ids: Arc::new(SessionIdAllocator::new()), local_capabilities, encoder }
    }

    pub async fn run(self) -> Result<(), RuntimeError> {
        let mut listeners = Vec::new();

        if let Some(addr) = self.config.args.bind_tcp {
            listeners.push(tokio::spawn(self.clone_for_listener().serve_tcp(addr)));
        }
        if let Some(path) = self.config.args.bind_unix.clone() {
            listeners.push(tokio::spawn(self.clone_for_listener().serve_unix(path)));
        }
        #[cfg(target_os = "linux")]
        if let Some(spec) = self.config.args.bind_vsock.clone() {
            listeners.push(tokio::spawn(self.clone_for_listener().serve_vsock(spec)));
        }
        if let Some(addr) = self.config.args.bind_ws {
            listeners.push(tokio::spawn(self.clone_for_listener().serve_websocket(addr)));
        }

        if listeners.is_empty() {
            return Err(RuntimeError::NoListeners);
        }

        for listener in listeners {
            let _ = listener.await;
        }
        Ok(())
    }

    fn clone_for_listener(&self) -> ListenerContext {
        ListenerContext {
            registry: self.registry.clone(),
            ids: self.ids.clone(),
            local_capabilities: self.local_capabilities.clone(),
            auth: self.config.args.auth.clone(),
            encryption: self.config.args.encryption.clone(),
            encoder: self.encoder.clone(),
        }
    }
}

fn build_encoder(config: &Config) -> Arc<dyn PacketEncoder> {
    match config.args.packet_encoder {
        config::PacketEncoderChoice::Modern => Arc::new(ModernEncoder),
        // Recognized but disabled unless a connection's hello re-enables it
        // and the core has a verified implementation to serve it with;
        // until then every encode/decode on a legacy connection fails fast.
        config::PacketEncoderChoice::Legacy => Arc::new(LegacyEncoder { enabled: false }),
    }
}

/// The slice of [`Runtime`] state a single listener task needs; kept
/// separate from `Runtime` itself so each transport's accept loop can own
/// its copy without fighting over `&Runtime`.
#[derive(Clone)]
struct ListenerContext {
    registry: Arc<SubsystemRegistry>,
    ids: Arc<SessionIdAllocator>,
    local_capabilities: Capabilities,
    auth: Option<String>,
    /// `--encryption`'s spec string. Its presence, combined with `auth`
    /// supplying the key material, turns on AES-256-GCM for the
    /// connection; the actual scheme name isn't parsed since AES-GCM is
    /// the only cipher this core implements.
    encryption: Option<String>,
    encoder: Arc<dyn PacketEncoder>,
}

impl ListenerContext {
    async fn serve_tcp(self, addr: SocketAddr) {
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(err) => {
                warn!(%addr, error = %err, "failed to bind TCP listener");
                return;
            }
        };
        info!(%addr, "listening on TCP");
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    info!(%peer, "accepted TCP connection");
                    let transport = Transport::stream(stream);
                    self.clone().spawn_connection(transport);
                }
                Err(err) => warn!(error = %err, "TCP accept failed"),
            }
        }
    }

    async fn serve_unix(self, path: PathBuf) {
        let _ = std::fs::remove_file(&path);
        let listener = match UnixListener::bind(&path) {
            Ok(listener) => listener,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to bind Unix listener");
                return;
            }
        };
        info!(path = %path.display(), "listening on Unix socket");
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    info!("accepted Unix socket connection");
                    let transport = Transport::stream(stream);
                    self.clone().spawn_connection(transport);
                }
                Err(err) => warn!(error = %err, "Unix socket accept failed"),
            }
        }
    }

    #[cfg(target_os = "linux")]
    async fn serve_vsock(self, spec: String) {
        use tokio_vsock::VsockListener;

        let Some((cid_str, port_str)) = spec.split_once(':') else {
            warn!(spec, "--bind-vsock expects CID:PORT");
            return;
        };
        let (Ok(cid), Ok(port)) = (cid_str.parse::<u32>(), port_str.parse::<u32>()) else {
            warn!(spec, "--bind-vsock CID and PORT must be integers");
            return;
        };

        let listener = match VsockListener::bind(cid, port) {
            Ok(listener) => listener,
            Err(err) => {
                warn!(spec, error = %err, "failed to bind vsock listener");
                return;
            }
        };
        info!(cid, port, "listening on vsock");
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    info!("accepted vsock connection");
                    let transport = Transport::stream(stream);
                    self.clone().spawn_connection(transport);
                }
                Err(err) => warn!(error = %err, "vsock accept failed"),
            }
        }
    }

    async fn serve_websocket(self, addr: SocketAddr) {
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(err) => {
                warn!(%addr, error = %err, "failed to bind WebSocket listener");
                return;
            }
        };
        info!(%addr, "listening for WebSocket connections");
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let context = self.clone();
                    tokio::spawn(async move {
                        match Transport::websocket_accept(stream).await {
                            Ok(transport) => {
                                info!(%peer, "accepted WebSocket connection");
                                context.spawn_connection(transport);
                            }
                            Err(err) => warn!(%peer, error = %err, "WebSocket handshake failed"),
                        }
                    });
                }
                Err(err) => warn!(error = %err, "WebSocket accept failed"),
            }
        }
    }

    fn spawn_connection(self, transport: Transport) {
        tokio::spawn(async move {
            let id = self.ids.next();
            let encoder = self.encoder.clone();
            let mut source = ConnectionSource::new(id, transport);

            let outcome = negotiate_hello(
                &mut source,
                &self.local_capabilities,
                self.auth.as_deref(),
                self.encryption.is_some(),
                encoder.as_ref(),
            )
            .await;

            match outcome {
                Ok(()) => {}
                Err(HelloError::Negotiation(NegotiationError::NoCommonEncoding)) => {
                    warn!("hello declared no common picture encoding, disconnecting");
                    let _ = send_disconnect(&mut source, "no-common-encoding", encoder.as_ref()).await;
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "hello negotiation failed, dropping connection");
                    return;
                }
            }

            if let Err(err) = run_dispatch_loop(source, self.registry.clone(), encoder).await {
                warn!(error = %err, "connection ended with an error");
            }
        });
    }
}

#[derive(Debug, thiserror::Error)]
enum HelloError {
    #[error(transparent)]
    Wire(#[from] rdsp_wire::WireError),
    #[error(transparent)]
    Send(#[from] rdsp_session::SendError),
    #[error(transparent)]
    Negotiation(#[from] rdsp_proto::NegotiationError),
    #[error("first packet from peer was not hello")]
    NotHello,
    #[error("authentication challenge was not answered correctly")]
    AuthenticationFailed,
}

/// Random salt width for PBKDF2 key derivation. Sent to the peer in the
/// server's hello reply so both sides derive the same key from the shared
/// password.
const ENCRYPTION_SALT_LEN: usize = 16;

/// Performs the hello exchange: reads the peer's hello, optionally issues
/// an authentication challenge and re-reads a second hello carrying the
/// response, negotiates the session profile, sends the server's own hello
/// reply, and installs the negotiated compression/encryption pipeline
/// before transitioning the connection to `Ready`.
///
/// The hello exchange itself (and the challenge/response round, if any)
/// always travels through the connection's still-`FramePipeline::plain()`
/// pipeline; only frames sent after this function installs the negotiated
/// pipeline are compressed or encrypted, matching §4.B's "every frame
/// after the hello" wording.
async fn negotiate_hello(
    source: &mut ConnectionSource,
    local_capabilities: &Capabilities,
    auth_password: Option<&str>,
    want_encryption: bool,
    encoder: &dyn PacketEncoder,
) -> Result<(), HelloError> {
    let resolver = HelloResolver::with_defaults();
    let mut peer_capabilities = read_hello(source, encoder).await?;

    if let Some(password) = auth_password {
        let challenge = Challenge::generate("authentication required");
        send_challenge(source, &challenge, encoder).await?;

        source.transition(rdsp_session::ConnectionState::Auth);
        peer_capabilities = read_hello(source, encoder).await?;

        let response = peer_capabilities
            .get("challenge_response")
            .and_then(Value::as_list)
            .map(|bytes| bytes.iter().filter_map(Value::as_int).map(|b| b as u8).collect::<Vec<u8>>())
            .unwrap_or_default();

        if !challenge.verify(password.as_bytes(), &response) {
            return Err(HelloError::AuthenticationFailed);
        }
    }

    // Encryption needs a password to derive a key from; without one
    // `--encryption` is a no-op for this connection rather than a fatal
    // misconfiguration, since the key material has to come from somewhere
    // and `--auth` is this core's only source of a shared secret.
    let salt = (want_encryption && auth_password.is_some()).then(|| {
        use rand::RngCore;
        let mut salt = vec![0u8; ENCRYPTION_SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        salt
    });

    let mut outbound_capabilities = local_capabilities.clone();
    if let Some(salt) = &salt {
        let mut encryption = std::collections::BTreeMap::new();
        encryption.insert("scheme".to_string(), Value::Str("aes256-pbkdf2".to_string()));
        encryption.insert("salt".to_string(), Value::Bytes(salt.clone()));
        encryption.insert("iterations".to_string(), Value::Int(rdsp_wire::MIN_PBKDF2_ITERATIONS as i64));
        outbound_capabilities.set("encryption", Value::Map(encryption));
    }

    let profile = SessionProfile::negotiate(&resolver, &outbound_capabilities, &peer_capabilities)?;
    source.set_capabilities(profile.capabilities.clone());
    // `hello` is otherwise only a `New`/`Auth`-state packet; transition to
    // `Ready` before sending it back so the reply isn't rejected by the
    // state machine when the connection went through an auth round.
    source.transition(rdsp_session::ConnectionState::Ready);

    send_hello(source, &outbound_capabilities, encoder).await?;

    let compressors = profile
        .capabilities
        .get_str_list("compressors")
        .unwrap_or_default()
        .into_iter()
        .filter_map(compressor_by_name)
        .collect();
    let cipher: Option<std::sync::Arc<dyn CipherContext>> = match (salt, auth_password) {
        (Some(salt), Some(password)) => Some(std::sync::Arc::new(AesGcmCipher::from_password(
            password.as_bytes(),
            &salt,
            rdsp_wire::MIN_PBKDF2_ITERATIONS,
        ))),
        _ => None,
    };
    source.set_pipeline(FramePipeline::new(compressors, cipher));

    Ok(())
}

async fn read_hello(source: &mut ConnectionSource, encoder: &dyn PacketEncoder) -> Result<Capabilities, HelloError> {
    let frame = source.transport().recv_frame().await?;
    let payload = source.decode_frame(&frame)?;
    let values = encoder.decode(&payload)?;
    let Some(Value::Str(packet_type)) = values.first() else {
        return Err(HelloError::NotHello);
    };
    if packet_type != "hello" {
        return Err(HelloError::NotHello);
    }
    let Some(caps_value) = values.get(1).cloned() else {
        return Err(HelloError::NotHello);
    };
    Ok(Capabilities::from_value(caps_value).unwrap_or_default())
}

/// Flushes whatever `send_packet` just queued straight to the transport;
/// there's no dispatch loop driving the outbound writer yet during hello
/// negotiation.
async fn flush_outbound(source: &mut ConnectionSource) -> Result<(), HelloError> {
    while let Some(frame) = source.pop_outbound() {
        source.transport().send_frame(frame).await?;
    }
    Ok(())
}

async fn send_challenge(source: &mut ConnectionSource, challenge: &Challenge, encoder: &dyn PacketEncoder) -> Result<(), HelloError> {
    let args = vec![
        Value::Bytes(challenge.bytes.clone()),
        Value::Str(challenge.digest.name().to_string()),
        Value::Bytes(challenge.salt.clone()),
        Value::Str(challenge.prompt.clone()),
    ];
    source.send_packet(Priority::Urgent, "challenge", encoder, args, &[])?;
    flush_outbound(source).await
}

async fn send_hello(source: &mut ConnectionSource, capabilities: &Capabilities, encoder: &dyn PacketEncoder) -> Result<(), HelloError> {
    source.send_packet(Priority::Urgent, "hello", encoder, vec![capabilities.clone().into_value()], &[])?;
    flush_outbound(source).await
}

async fn send_disconnect(source: &mut ConnectionSource, reason: &str, encoder: &dyn PacketEncoder) -> Result<(), HelloError> {
    source.send_packet(Priority::Urgent, "disconnect", encoder, vec![Value::Str(reason.to_string())], &[])?;
    flush_outbound(source).await
}

async fn build_registry(config: &Config) -> SubsystemRegistry {
    if let Some(path) = &config.env.save_debug_path {
        info!(path = %path.display(), "worker debug dumps enabled");
    }
    info!(threads = config.env.worker_threads, "codec worker pool size (single worker spawned per session for now)");

    let audio_codec = match spawn_audio_worker(config).await {
        Ok(handle) => WorkerAudioCodec::spawn(handle, 64),
        Err(err) => {
            warn!(error = %err, "failed to spawn codec worker, audio frames will be rejected");
            WorkerAudioCodec::spawn_unavailable()
        }
    };

    SubsystemRegistry::build(vec![
        Arc::new(AudioSubsystem::new(audio_codec)),
        Arc::new(BandwidthSubsystem),
        Arc::new(ClipboardSubsystem),
        Arc::new(CommandSubsystem),
        Arc::new(CursorSubsystem),
        Arc::new(DisplaySubsystem),
        Arc::new(EncodingSubsystem),
        Arc::new(KeyboardSubsystem),
        Arc::new(LoggingSubsystem),
        Arc::new(NotificationSubsystem),
        Arc::new(PointerSubsystem),
        Arc::new(WebcamSubsystem),
        Arc::new(WindowSubsystem),
    ])
}

async fn spawn_audio_worker(config: &Config) -> Result<WorkerHandle, rdsp_worker::WorkerError> {
    let mut handle = WorkerHandle::spawn("rdsp-codec-worker", &[]).await?;
    handle
        .send(&rdsp_worker::WorkerControl::Init {
            codec: "opus".to_string(),
            width: 0,
            height: 0,
            quality: config.env.codec_quality,
            speed: config.env.codec_speed,
        })
        .await?;
    Ok(handle)
}

fn default_capabilities(config: &Config) -> Capabilities {
    let mut caps = Capabilities::new();
    caps.set("encodings", Value::List(vec![Value::Str("png".into()), Value::Str("h264".into())]));
    caps.set("audio.codecs", Value::List(vec![Value::Str("opus".into())]));
    caps.set(
        "compressors",
        Value::List(config.args.compressors.iter().map(|name| Value::Str(name.clone())).collect()),
    );
    if let Some(limit) = config.args.bandwidth_limit {
        caps.set("bandwidth-limit", Value::Int(limit as i64));
    }
    caps
}
