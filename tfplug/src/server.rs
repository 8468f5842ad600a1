//! Server module for running Terraform providers
//!
//! Implements the go-plugin side of the handshake: verify the magic cookie,
//! bind a local port, optionally set up AutoMTLS, then announce the address
//! on stdout. Everything else the provider prints must go to stderr.

use crate::error::{Result, TfplugError};
use crate::grpc::GrpcProviderServer;
use crate::proto::ProviderServer;
use crate::provider::Provider;
use base64::Engine;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use tonic::transport::{Identity, Server, ServerTlsConfig};

pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

/// Set by Terraform when it wants the plugin to use AutoMTLS
pub const CLIENT_CERT_ENV: &str = "PLUGIN_CLIENT_CERT";

pub const CORE_PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_VERSION: u32 = 6;

/// Log level for the provider process
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parses Terraform's `TF_LOG` values; anything unrecognised is None
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TRACE" | "JSON" => Some(LogLevel::Trace),
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" => Some(LogLevel::Warn),
            "ERROR" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// Reads `TF_LOG`, defaulting to Info
    pub fn from_env() -> Self {
        std::env::var("TF_LOG")
            .ok()
            .and_then(|v| Self::parse(&v))
            .unwrap_or(LogLevel::Info)
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Server configuration for running a Terraform provider
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// PEM certificate used when AutoMTLS is not in effect
    pub cert_path: Option<PathBuf>,
    /// PEM key paired with cert_path
    pub key_path: Option<PathBuf>,
    /// Maximum message size in bytes
    pub max_message_size: usize,
    pub log_level: LogLevel,
    /// Generate a certificate when Terraform offers a client certificate
    pub auto_mtls: bool,
    /// Refuse to start unless launched by Terraform
    pub check_magic_cookie: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cert_path: None,
            key_path: None,
            max_message_size: 256 << 20, // 256MB
            log_level: LogLevel::from_env(),
            auto_mtls: true,
            check_magic_cookie: true,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cert_path(mut self, path: PathBuf) -> Self {
        self.cert_path = Some(path);
        self
    }

    pub fn with_key_path(mut self, path: PathBuf) -> Self {
        self.key_path = Some(path);
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn without_auto_mtls(mut self) -> Self {
        self.auto_mtls = false;
        self
    }

    pub fn without_magic_cookie(mut self) -> Self {
        self.check_magic_cookie = false;
        self
    }
}

/// TLS material for the listener plus the certificate advertised in the handshake
struct TlsSetup {
    identity: Identity,
    advertised_cert: Option<String>,
}

/// Main entry point for running a provider
pub async fn serve<P: Provider + 'static>(provider: P, config: ServerConfig) -> Result<()> {
    if config.check_magic_cookie {
        verify_magic_cookie()?;
    }

    // A second install attempt only means a provider is already in place
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let provider_name = provider.type_name().to_string();
    let grpc_server = GrpcProviderServer::new(provider);
    let provider_service = ProviderServer::new(grpc_server)
        .max_decoding_message_size(config.max_message_size)
        .max_encoding_message_size(config.max_message_size);

    let tls = tls_setup(&config).await?;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let mut builder = Server::builder();
    let advertised_cert = match tls {
        Some(tls) => {
            builder = builder.tls_config(ServerTlsConfig::new().identity(tls.identity))?;
            tls.advertised_cert
        }
        None => None,
    };

    tracing::info!(provider = %provider_name, %addr, tls = advertised_cert.is_some(), "starting provider server");

    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}", handshake_line(addr, advertised_cert.as_deref()))?;
    stdout.flush()?;

    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);
    builder
        .add_service(provider_service)
        .serve_with_incoming_shutdown(incoming, async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("interrupt received, shutting down");
        })
        .await?;

    Ok(())
}

/// Convenience function to run a provider with default configuration
pub async fn serve_default<P: Provider + 'static>(provider: P) -> Result<()> {
    serve(provider, ServerConfig::default()).await
}

fn verify_magic_cookie() -> Result<()> {
    match std::env::var(MAGIC_COOKIE_KEY) {
        Ok(value) if value == MAGIC_COOKIE_VALUE => Ok(()),
        _ => Err(TfplugError::ServerError(
            "This binary is a plugin. These are not meant to be executed directly. \
             Please execute the program that consumes these plugins, which will \
             load any plugins automatically"
                .to_string(),
        )),
    }
}

async fn tls_setup(config: &ServerConfig) -> Result<Option<TlsSetup>> {
    let client_cert = std::env::var(CLIENT_CERT_ENV).unwrap_or_default();
    if config.auto_mtls && !client_cert.trim().is_empty() {
        tracing::debug!("client certificate offered, generating server certificate");
        return generate_auto_mtls().map(Some);
    }

    match (&config.cert_path, &config.key_path) {
        (Some(cert_path), Some(key_path)) => {
            let cert = tokio::fs::read(cert_path)
                .await
                .map_err(|e| TfplugError::TlsError(format!("Failed to read certificate: {}", e)))?;
            let key = tokio::fs::read(key_path)
                .await
                .map_err(|e| TfplugError::TlsError(format!("Failed to read key: {}", e)))?;
            Ok(Some(TlsSetup {
                identity: Identity::from_pem(cert, key),
                advertised_cert: None,
            }))
        }
        _ => Ok(None),
    }
}

/// Self-signed certificate for localhost, advertised to Terraform in the handshake
fn generate_auto_mtls() -> Result<TlsSetup> {
    use rcgen::{
        BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
        KeyUsagePurpose,
    };

    let tls_err = |e: rcgen::Error| TfplugError::TlsError(e.to_string());

    let mut params = CertificateParams::new(vec!["localhost".to_string()]).map_err(tls_err)?;
    params.distinguished_name.push(DnType::CommonName, "localhost");
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::KeyCertSign,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];

    let key = KeyPair::generate().map_err(tls_err)?;
    let cert = params.self_signed(&key).map_err(tls_err)?;

    Ok(TlsSetup {
        identity: Identity::from_pem(cert.pem(), key.serialize_pem()),
        advertised_cert: Some(
            base64::engine::general_purpose::STANDARD_NO_PAD.encode(cert.der()),
        ),
    })
}

/// `CORE|APP|NET|ADDR|PROTO[|CERT]`, the line go-plugin clients wait for
pub fn handshake_line(addr: SocketAddr, server_cert: Option<&str>) -> String {
    let mut line = format!(
        "{}|{}|tcp|{}|grpc",
        CORE_PROTOCOL_VERSION, PROTOCOL_VERSION, addr
    );
    if let Some(cert) = server_cert {
        line.push('|');
        line.push_str(cert);
    }
    line
}
