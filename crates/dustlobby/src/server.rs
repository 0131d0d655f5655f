//! `DustlobbyServer` builder and server loop.
//!
//! Ties the layers together: the WebSocket accept loop feeds connection
//! handlers, the admin API and the score feed run beside it, and all three
//! reach lobbies through one [`LobbyRouter`].

use std::net::SocketAddr;
use std::sync::Arc;

use dustlobby_feed::FeedListener;
use dustlobby_lobby::LevelResolver;
use dustlobby_protocol::JsonCodec;
use dustlobby_session::{NameResolver, SessionRegistry};
use dustlobby_transport::{Handshake, Transport, WebSocketTransport};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::admin::{AdminState, admin_router};
use crate::handler::handle_connection;
use crate::levels::AtlasLevels;
use crate::names::HitboxNames;
use crate::router::LobbyRouter;
use crate::{DustlobbyError, ServerConfig};

/// Shared state passed to each connection handler task.
pub(crate) struct ServerState<N: NameResolver> {
    pub(crate) sessions: Mutex<SessionRegistry>,
    pub(crate) router: LobbyRouter,
    pub(crate) names: N,
    pub(crate) codec: JsonCodec,
}

/// Builder for a [`DustlobbyServer`].
///
/// Name and level lookups default to the public game services named in the
/// config; tests swap in fixed tables.
///
/// ```rust,no_run
/// # async fn run() -> Result<(), dustlobby::DustlobbyError> {
/// use dustlobby::prelude::*;
///
/// let server = DustlobbyServer::builder(ServerConfig::default())
///     .names(StaticNames::new().with(UserId(123), "alice"))
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct DustlobbyServerBuilder<N, L> {
    config: ServerConfig,
    names: N,
    levels: L,
}

impl DustlobbyServerBuilder<HitboxNames, AtlasLevels> {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            names: HitboxNames::new(config.name_lookup_url.clone()),
            levels: AtlasLevels::new(config.level_lookup_url.clone()),
            config,
        }
    }
}

impl<N: NameResolver, L: LevelResolver> DustlobbyServerBuilder<N, L> {
    /// Replaces the display-name lookup.
    pub fn names<N2: NameResolver>(self, names: N2) -> DustlobbyServerBuilder<N2, L> {
        DustlobbyServerBuilder {
            config: self.config,
            names,
            levels: self.levels,
        }
    }

    /// Replaces the level lookup used by the admin API.
    pub fn levels<L2: LevelResolver>(self, levels: L2) -> DustlobbyServerBuilder<N, L2> {
        DustlobbyServerBuilder {
            config: self.config,
            names: self.names,
            levels,
        }
    }

    /// Validates the config and binds both listeners.
    ///
    /// Generates (and logs) an admin password if none is configured.
    pub async fn build(mut self) -> Result<DustlobbyServer<N, L>, DustlobbyError> {
        self.config.validate()?;
        if self.config.ensure_admin_password() {
            tracing::warn!(
                password = self.config.admin_password.as_deref().unwrap_or_default(),
                "no admin password configured, generated one"
            );
        }

        let transport = WebSocketTransport::bind(&self.config.ws_addr).await?;
        let admin = TcpListener::bind(&self.config.admin_addr)
            .await
            .map_err(DustlobbyError::Admin)?;

        let router = LobbyRouter::new(self.config.lobby_config());
        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionRegistry::new(self.config.session_config())),
            router,
            names: self.names,
            codec: JsonCodec,
        });

        Ok(DustlobbyServer {
            config: self.config,
            transport,
            admin,
            levels: self.levels,
            state,
        })
    }
}

/// A bound Dustlobby server. Call [`run()`](Self::run) to start serving.
pub struct DustlobbyServer<N: NameResolver, L: LevelResolver> {
    config: ServerConfig,
    transport: WebSocketTransport,
    admin: TcpListener,
    levels: L,
    state: Arc<ServerState<N>>,
}

impl DustlobbyServer<HitboxNames, AtlasLevels> {
    pub fn builder(config: ServerConfig) -> DustlobbyServerBuilder<HitboxNames, AtlasLevels> {
        DustlobbyServerBuilder::new(config)
    }
}

impl<N: NameResolver, L: LevelResolver> DustlobbyServer<N, L> {
    /// The WebSocket listener's address.
    pub fn local_addr(&self) -> Result<SocketAddr, DustlobbyError> {
        Ok(self.transport.local_addr()?)
    }

    /// The admin listener's address.
    pub fn admin_addr(&self) -> Result<SocketAddr, DustlobbyError> {
        self.admin.local_addr().map_err(DustlobbyError::Admin)
    }

    /// The admin password in effect, configured or generated.
    pub fn admin_password(&self) -> &str {
        self.config.admin_password.as_deref().unwrap_or_default()
    }

    pub fn router(&self) -> &LobbyRouter {
        &self.state.router
    }

    /// Serves clients, the admin API and the score feed until the process
    /// ends. Only returns if the admin server fails.
    pub async fn run(self) -> Result<(), DustlobbyError> {
        let Self {
            config,
            transport,
            admin,
            levels,
            state,
        } = self;

        if let Some(url) = &config.feed_url {
            let listener = FeedListener::new(url.clone(), state.router.lobbies().clone());
            tokio::spawn(listener.run());
        } else {
            tracing::info!("score feed disabled");
        }

        let app = admin_router(AdminState {
            router: state.router.clone(),
            levels,
            password: config.admin_password.clone().unwrap_or_default(),
            defaults: config.default_game(),
        });
        let admin_task = tokio::spawn(async move { axum::serve(admin, app).await });

        tracing::info!(ws_addr = %config.ws_addr, admin_addr = %config.admin_addr, "dustlobby running");

        tokio::select! {
            () = accept_loop(transport, state) => Ok(()),
            result = admin_task => match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(DustlobbyError::Admin(e)),
                Err(e) => Err(DustlobbyError::Admin(std::io::Error::other(e))),
            },
        }
    }
}

/// Accepts connections forever, one handler task each. The upgrade
/// runs inside that task so a peer that never finishes it only stalls
/// itself.
async fn accept_loop<N: NameResolver>(mut transport: WebSocketTransport, state: Arc<ServerState<N>>) {
    loop {
        match transport.accept().await {
            Ok(pending) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let peer = pending.peer_addr();
                    let conn = match pending.complete().await {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::debug!(%peer, error = %e, "upgrade failed");
                            return;
                        }
                    };
                    if let Err(e) = handle_connection(conn, state).await {
                        tracing::debug!(error = %e, "connection ended with error");
                    }
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
            }
        }
    }
}
