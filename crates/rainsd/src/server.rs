//! The server loop: receive, dispatch, emit, reap.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use rains_engine::{Engine, Outbound};
use rains_model::{Message, NotificationKind, Section, SignedSection, Token};

use crate::transport::{self, MAX_DATAGRAM};
use crate::ServerConfig;

/// A running RAINS server.
pub struct Server {
    config: ServerConfig,
    engine: Arc<Engine>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl Server {
    /// Build a server and its engine from configuration.
    pub fn new(config: ServerConfig) -> Self {
        let (engine, outbound) = Engine::new(config.engine_config());
        Self {
            config,
            engine,
            outbound,
        }
    }

    /// The shared engine, for inspection and tests.
    pub fn engine(&self) -> Arc<Engine> {
        self.engine.clone()
    }

    /// Run until ctrl-c.
    pub async fn run(self) -> anyhow::Result<()> {
        let Self {
            config,
            engine,
            mut outbound,
        } = self;

        let socket = Arc::new(transport::bind(config.listen, config.sndbuf, config.rcvbuf).await?);
        info!(listen = %config.listen, "rainsd serving");

        // Writer task: drain the engine's outbound channel onto the wire.
        let writer_socket = socket.clone();
        let writer = tokio::spawn(async move {
            while let Some(Outbound { dest, message }) = outbound.recv().await {
                match serde_json::to_vec(&message) {
                    Ok(data) => {
                        if let Err(err) = writer_socket.send_to(&data, dest).await {
                            warn!(%dest, %err, "failed to send message");
                        }
                    }
                    Err(err) => error!(%err, "failed to encode outbound message"),
                }
            }
        });

        // Reaper task: sweep all caches periodically.
        let reaper_engine = engine.clone();
        let reaper_interval = Duration::from_secs(config.reaper_interval.max(1));
        let reaper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reaper_interval);
            loop {
                ticker.tick().await;
                if let Err(err) = reaper_engine.reap() {
                    debug!(%err, "reaper stopping");
                    break;
                }
            }
        });

        // Receive loop.
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                received = socket.recv_from(&mut buf) => {
                    let (len, src) = match received {
                        Ok(received) => received,
                        Err(err) => {
                            warn!(%err, "recv failed");
                            continue;
                        }
                    };
                    if let Err(err) = handle_datagram(&config, &engine, &buf[..len], src) {
                        // The outbound channel is gone; nothing more to serve.
                        error!(%err, "engine stopped");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down");
                    break;
                }
            }
        }

        reaper.abort();
        drop(engine);
        writer.await.ok();
        Ok(())
    }
}

/// Decode one datagram and dispatch its sections.
fn handle_datagram(
    config: &ServerConfig,
    engine: &Engine,
    data: &[u8],
    src: SocketAddr,
) -> rains_engine::Result<()> {
    let message: Message = match serde_json::from_slice(data) {
        Ok(message) => message,
        Err(err) => {
            debug!(%src, %err, "undecodable datagram");
            // The offending token is unknowable; answer with the empty one.
            return engine.emit(
                src,
                Message::notification(Token::EMPTY, NotificationKind::BadMessage, ""),
            );
        }
    };
    dispatch(config, engine, message, src)
}

/// Route each section of a decoded message into the engine.
pub fn dispatch(
    config: &ServerConfig,
    engine: &Engine,
    message: Message,
    src: SocketAddr,
) -> rains_engine::Result<()> {
    let token = message.token;
    for section in message.content {
        match section {
            Section::Assertion(a) => {
                let authoritative = config.is_authoritative(&a.context, &a.zone);
                engine.assert(SignedSection::Assertion(a), authoritative, token)?;
            }
            Section::Shard(s) => {
                let authoritative = config.is_authoritative(&s.context, &s.zone);
                engine.assert(SignedSection::Shard(s), authoritative, token)?;
            }
            Section::Zone(z) => {
                let authoritative = config.is_authoritative(&z.context, &z.zone);
                engine.assert(SignedSection::Zone(z), authoritative, token)?;
            }
            Section::Query(q) => engine.query(q, src)?,
            Section::Notification(n) => engine.notify(n.kind, n.token, src)?,
            Section::AddressAssertion(_) | Section::AddressZone(_) | Section::AddressQuery(_) => {
                // No address engine here.
                engine.emit(
                    src,
                    Message::notification(
                        token,
                        NotificationKind::ServerNotCapable,
                        "address sections are not supported",
                    ),
                )?;
            }
        }
    }
    Ok(())
}
