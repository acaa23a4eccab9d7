use crate::handlers::common::healthz;
use crate::handlers::{blocks, endpoints, externals, networks, reservations, spaces, subnets};
use crate::state::AppState;
use crate::tls::{resolve_tls, TlsMaterial, TlsMode};
use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub tls_mode: TlsMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".parse().unwrap(),
            tls_mode: TlsMode::Disabled,
        }
    }
}

pub struct ApiServer {
    config: Config,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: Config, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Resolve this server's TLS material ahead of `run`, so callers that
    /// need the CA cert (e.g. to hand to an internal client) can read it
    /// before the listener starts.
    pub fn resolve_tls_material(&self) -> miette::Result<Option<TlsMaterial>> {
        resolve_tls(&self.config.tls_mode)
    }

    fn build_router(&self) -> Router {
        Router::new()
            .route("/healthz", get(healthz))
            .route("/spaces", get(spaces::list_spaces).post(spaces::create_space))
            .route(
                "/spaces/{space}",
                get(spaces::get_space).patch(spaces::patch_space).delete(spaces::delete_space),
            )
            .route(
                "/spaces/{space}/reservations",
                get(reservations::list_space_reservations).post(reservations::create_multi_block_reservation),
            )
            .route("/spaces/{space}/blocks", get(blocks::list_blocks).post(blocks::create_block))
            .route(
                "/spaces/{space}/blocks/{block}",
                get(blocks::get_block).patch(blocks::patch_block).delete(blocks::delete_block),
            )
            .route("/spaces/{space}/blocks/{block}/available", get(networks::available_block_nets))
            .route(
                "/spaces/{space}/blocks/{block}/networks",
                get(networks::list_block_networks)
                    .post(networks::attach_network)
                    .put(networks::replace_networks)
                    .delete(networks::detach_networks),
            )
            .route(
                "/spaces/{space}/blocks/{block}/externals",
                get(externals::list_externals).post(externals::create_external),
            )
            .route(
                "/spaces/{space}/blocks/{block}/externals/{ext}",
                get(externals::get_external).patch(externals::patch_external).delete(externals::delete_external),
            )
            .route(
                "/spaces/{space}/blocks/{block}/externals/{ext}/subnets",
                get(subnets::list_subnets).post(subnets::create_subnet),
            )
            .route(
                "/spaces/{space}/blocks/{block}/externals/{ext}/subnets/{subnet}",
                get(subnets::get_subnet).patch(subnets::patch_subnet).delete(subnets::delete_subnet),
            )
            .route(
                "/spaces/{space}/blocks/{block}/externals/{ext}/subnets/{subnet}/endpoints",
                get(endpoints::list_endpoints).post(endpoints::create_endpoint),
            )
            .route(
                "/spaces/{space}/blocks/{block}/externals/{ext}/subnets/{subnet}/endpoints/{endpoint}",
                get(endpoints::get_endpoint).patch(endpoints::patch_endpoint).delete(endpoints::delete_endpoint),
            )
            .route(
                "/spaces/{space}/blocks/{block}/reservations",
                get(reservations::list_block_reservations)
                    .post(reservations::create_block_reservation)
                    .delete(reservations::delete_block_reservations),
            )
            .route(
                "/spaces/{space}/blocks/{block}/reservations/{id}",
                get(reservations::get_reservation).delete(reservations::delete_reservation),
            )
            .route("/livez", get(healthz))
            .route("/readyz", get(healthz))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    pub async fn run(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let app = self.build_router();
        let material = self
            .config
            .tls_mode
            .clone()
            .pipe(|mode| resolve_tls(&mode))
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        match material {
            None => {
                info!("Starting API server on {} (no TLS)", self.config.listen_addr);
                let listener = tokio::net::TcpListener::bind(self.config.listen_addr).await?;
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await
            }
            Some(material) => {
                info!("Starting API server on {} (TLS)", self.config.listen_addr);
                let rustls_config = RustlsConfig::from_pem(material.cert_pem, material.key_pem)
                    .await
                    .map_err(|e| std::io::Error::other(e.to_string()))?;
                let handle = axum_server::Handle::new();
                let shutdown_handle = handle.clone();
                tokio::spawn(async move {
                    shutdown.cancelled().await;
                    shutdown_handle.graceful_shutdown(Some(std::time::Duration::from_secs(5)));
                });
                axum_server::bind_rustls(self.config.listen_addr, rustls_config)
                    .handle(handle)
                    .serve(app.into_make_service())
                    .await
            }
        }
    }
}

/// Tiny local `pipe` to keep the TLS resolution a one-liner above without
/// reaching for a crate just for this.
trait Pipe: Sized {
    fn pipe<T>(self, f: impl FnOnce(Self) -> T) -> T {
        f(self)
    }
}
impl<T> Pipe for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use ipam_engine::SpaceService;
    use ipam_inventory::InMemoryInventory;
    use ipam_storage::InMemoryDocStore;

    #[test]
    fn default_config_has_no_tls() {
        let config = Config::default();
        assert!(matches!(config.tls_mode, TlsMode::Disabled));
    }

    #[test]
    fn build_router_succeeds() {
        let service = SpaceService::new(Arc::new(InMemoryDocStore::default()), Arc::new(InMemoryInventory::new()));
        let state = Arc::new(AppState::new(Arc::new(service)));
        let server = ApiServer::new(Config::default(), state);
        let router = server.build_router();
        assert!(std::mem::size_of_val(&router) > 0);
    }
}
