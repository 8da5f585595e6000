//! Chainkeeper Admission Webhook Server
//!
//! Defaults and validates PolkadotNode, NearNode and BesuNetwork resources
//! before the API server stores them. Routes follow the
//! `/mutate-<kind>` and `/validate-<kind>` convention.

use chainkeeper_operator::admission::{self, AdmissionReview};
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::fs;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "webhook", about = "Admission webhook for chainkeeper resources")]
struct Args {
    /// HTTPS port.
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = 8443)]
    port: u16,

    /// TLS certificate path (mounted by Kubernetes).
    #[arg(long, env = "TLS_CERT_FILE", default_value = "/certs/tls.crt")]
    tls_cert: String,

    /// TLS private key path (mounted by Kubernetes).
    #[arg(long, env = "TLS_KEY_FILE", default_value = "/certs/tls.key")]
    tls_key: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chainkeeper_operator=info".parse()?)
                .add_directive("webhook=info".parse()?),
        )
        .init();

    let _ = rustls::crypto::ring::default_provider().install_default();

    info!(
        port = args.port,
        tls_cert = %args.tls_cert,
        tls_key = %args.tls_key,
        "Chainkeeper webhook server starting"
    );

    // Load TLS certificates
    let cert_pem = fs::read(&args.tls_cert).await?;
    let key_pem = fs::read(&args.tls_key).await?;

    let certs = rustls_pemfile::certs(&mut cert_pem.as_slice()).collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {}", args.tls_key))?;

    let mut tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    tls_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    let tls_acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(tls_config));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Webhook server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let acceptor = tls_acceptor.clone();

        tokio::spawn(async move {
            match acceptor.accept(stream).await {
                Ok(tls_stream) => {
                    let io = hyper_util::rt::TokioIo::new(tls_stream);
                    let service = hyper::service::service_fn(handle_request);

                    if let Err(e) = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!(peer = %peer, error = %e, "Connection error");
                    }
                }
                Err(e) => {
                    error!(peer = %peer, error = %e, "TLS handshake failed");
                }
            }
        });
    }
}

/// Handle incoming HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/healthz") => Ok(build_response(StatusCode::OK, "OK")),
        (&Method::GET, "/readyz") => Ok(build_response(StatusCode::OK, "Ready")),
        (&Method::POST, _) => Ok(review(req).await),
        _ => Ok(build_response(StatusCode::NOT_FOUND, "Not Found")),
    }
}

/// Decode an AdmissionReview and route it to the handler for its path.
async fn review(req: Request<hyper::body::Incoming>) -> Response<Full<Bytes>> {
    let path = req.uri().path().to_string();

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!(error = %e, "Failed to read request body");
            return build_response(StatusCode::BAD_REQUEST, "Failed to read request body");
        }
    };

    let review: AdmissionReview = match serde_json::from_slice(&body) {
        Ok(review) => review,
        Err(e) => {
            error!(path = %path, error = %e, "Failed to parse AdmissionReview");
            return build_response(StatusCode::BAD_REQUEST, "Invalid AdmissionReview format");
        }
    };

    let Some(answer) = admission::dispatch(&path, &review) else {
        return build_response(StatusCode::NOT_FOUND, "Not Found");
    };

    if let Some(response) = &answer.response {
        info!(
            path = %path,
            uid = %response.uid,
            allowed = response.allowed,
            "Admission reviewed"
        );
    }

    match serde_json::to_vec(&answer) {
        Ok(json) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(json)))
            .unwrap_or_else(|e| {
                error!(error = %e, "Failed to build admission review response");
                build_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to build response")
            }),
        Err(e) => {
            error!(error = %e, "Failed to serialize response");
            build_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to serialize response")
        }
    }
}

fn build_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to build response");
            Response::new(Full::new(Bytes::from("Internal Error")))
        })
}
