//! Translator service lifecycle
//!
//! Both listeners are bound in [`TranslatorServer::bind`] so that a taken port
//! fails startup before anything else happens. [`TranslatorServer::run`] then
//! brings the key material to `Ready` and serves ingress and egress on two
//! independent tasks until the shared shutdown token is cancelled, either by a
//! [`ShutdownHandle`] or, with [`TranslatorServer::run_until_signal`], by
//! SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::server::Router;
use tonic::transport::Server;
use tracing::{error, info};
use wirepact_pki::KeyMaterial;

use crate::config::TranslatorConfig;
use crate::egress::EgressService;
use crate::error::{Result, TranslatorError};
use crate::ingress::IngressService;
use crate::token::TokenCodec;
use crate::translation::{EgressTranslator, IngressTranslator};

/// Stops a running [`TranslatorServer`]
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    /// Stop both listeners; in-flight checks finish, new ones are refused
    pub fn stop(&self) {
        info!("Translator stop requested");
        self.token.cancel();
    }

    /// Whether a stop was requested
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// The ingress and egress ext_authz servers of one translator
pub struct TranslatorServer {
    config: TranslatorConfig,
    ingress_translator: Arc<dyn IngressTranslator>,
    egress_translator: Arc<dyn EgressTranslator>,
    ingress_listener: TcpListener,
    egress_listener: TcpListener,
    ingress_addr: SocketAddr,
    egress_addr: SocketAddr,
    shutdown: CancellationToken,
}

impl TranslatorServer {
    /// Bind both listeners
    pub async fn bind(
        config: TranslatorConfig,
        ingress_translator: Arc<dyn IngressTranslator>,
        egress_translator: Arc<dyn EgressTranslator>,
    ) -> Result<Self> {
        let (ingress_listener, ingress_addr) = bind_listener(config.ingress_addr()).await?;
        let (egress_listener, egress_addr) = bind_listener(config.egress_addr()).await?;

        Ok(Self {
            config,
            ingress_translator,
            egress_translator,
            ingress_listener,
            egress_listener,
            ingress_addr,
            egress_addr,
            shutdown: CancellationToken::new(),
        })
    }

    /// Bound address of the inbound listener
    pub fn ingress_addr(&self) -> SocketAddr {
        self.ingress_addr
    }

    /// Bound address of the outbound listener
    pub fn egress_addr(&self) -> SocketAddr {
        self.egress_addr
    }

    /// Handle to stop the server from elsewhere
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            token: self.shutdown.clone(),
        }
    }

    /// Ensure the key material, then serve until stopped
    ///
    /// Key material failures are returned before anything is served.
    pub async fn run(self) -> Result<()> {
        let material = KeyMaterial::ensure(&self.config.pki).await?;
        self.run_with_material(Arc::new(material)).await
    }

    /// Serve with already loaded key material until stopped
    pub async fn run_with_material(self, material: Arc<KeyMaterial>) -> Result<()> {
        let codec = TokenCodec::new(material);
        let ingress = IngressService::new(codec.clone(), self.ingress_translator);
        let egress = EgressService::new(codec, self.config.token.clone(), self.egress_translator);

        info!(addr = %self.ingress_addr, "Serving ingress");
        let ingress_task = spawn_server(
            "ingress",
            Server::builder().add_service(ingress.into_service()),
            self.ingress_listener,
            self.shutdown.clone(),
        );

        info!(addr = %self.egress_addr, "Serving egress");
        let egress_task = spawn_server(
            "egress",
            Server::builder().add_service(egress.into_service()),
            self.egress_listener,
            self.shutdown.clone(),
        );

        let (ingress_result, egress_result) = tokio::join!(
            join_server("ingress", ingress_task),
            join_server("egress", egress_task)
        );
        info!("Translator stopped");
        ingress_result.and(egress_result)
    }

    /// Run until SIGINT or SIGTERM (ctrl-c off unix) or an explicit stop
    pub async fn run_until_signal(self) -> Result<()> {
        let token = self.shutdown.clone();
        let watcher = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_signal() => {
                    info!("Shutdown signal received, stopping translator");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        });

        let result = self.run().await;
        watcher.abort();
        result
    }
}

async fn bind_listener(addr: SocketAddr) -> Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| TranslatorError::bind(addr, e))?;
    let local = listener
        .local_addr()
        .map_err(|e| TranslatorError::bind(addr, e))?;
    Ok((listener, local))
}

fn spawn_server(
    listener_name: &'static str,
    router: Router,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let incoming = TcpListenerStream::new(listener);
        let signal = shutdown.clone();
        let result = router
            .serve_with_incoming_shutdown(incoming, async move { signal.cancelled().await })
            .await;

        if let Err(e) = result {
            error!(listener = listener_name, error = %e, "Server failed, stopping translator");
            // One listener down takes the other with it
            shutdown.cancel();
            return Err(TranslatorError::Serve {
                listener: listener_name,
                source: e,
            });
        }
        Ok(())
    })
}

async fn join_server(listener_name: &'static str, task: JoinHandle<Result<()>>) -> Result<()> {
    task.await.map_err(|e| TranslatorError::Task {
        listener: listener_name,
        message: e.to_string(),
    })?
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
