pub mod api;

use std::error::Error;
use std::net::SocketAddr;

use log::{ error, info };

use crate::cli::Args;
use api::AppState;

pub struct Server {
    addr: String,
    state: AppState,
    args: Args,
}

impl Server {
    pub fn new(addr: String, state: AppState, args: Args) -> Self {
        Self { addr, state, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let app = api::router(self.state.clone());

        if self.args.enable_tls {
            let (Some(cert_path), Some(key_path)) =
                (&self.args.tls_cert_path, &self.args.tls_key_path)
            else {
                error!("--enable-tls was set but certificate/key paths are missing.");
                return Err("TLS enabled without cert/key".into());
            };

            info!(
                "TLS enabled. Loading certificate from '{}' and key from '{}'",
                cert_path,
                key_path
            );
            let tls_config = axum_server::tls_rustls::RustlsConfig
                ::from_pem_file(cert_path, key_path).await?;

            info!("Starting HTTPS server on: https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service()).await?;
        } else {
            info!("Starting HTTP server on: http://{}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app.into_make_service()).await?;
        }

        Ok(())
    }
}
