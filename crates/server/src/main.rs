use apilink_openapi_tools::config::{ApiConfig, AuthConfig};
use apilink_openapi_tools::document::OpenApiDocument;
use apilink_openapi_tools::executor::RequestExecutor;
use apilink_openapi_tools::registry::ToolRegistry;
use apilink_server::http::{self, HttpConfig};
use apilink_server::stdio;
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "apilink", version, about = "Expose an OpenAPI document as MCP tools")]
struct Cli {
    /// OpenAPI document location: file path or http(s) URL.
    #[arg(long, env = "APILINK_SPEC")]
    spec: String,

    /// Default base URL for API calls; falls back to the document's first server.
    #[arg(long, env = "APILINK_BASE_URL")]
    base_url: Option<String>,

    /// Default credential injected into outbound requests.
    #[arg(long, env = "APILINK_TOKEN")]
    token: Option<String>,

    /// Header the credential is sent under.
    #[arg(long, env = "APILINK_AUTH_HEADER", default_value = "Authorization")]
    auth_header: String,

    /// Credential value prefix, e.g. "Bearer ".
    #[arg(long, env = "APILINK_AUTH_PREFIX", default_value = "")]
    auth_prefix: String,

    /// Outbound request timeout in seconds.
    #[arg(long, env = "APILINK_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    #[arg(long, env = "APILINK_TRANSPORT", value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,

    /// HTTP transport bind address.
    #[arg(long, env = "APILINK_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Path the MCP service is mounted on.
    #[arg(long, env = "APILINK_HTTP_PATH", default_value = "/mcp")]
    path: String,

    /// Allowed Host header values (repeatable); empty allows any.
    #[arg(long = "allowed-host")]
    allowed_hosts: Vec<String>,

    /// Allowed Origin header values (repeatable); empty allows any.
    #[arg(long = "allowed-origin")]
    allowed_origins: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Transport {
    Stdio,
    Http,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout belongs to the stdio transport.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = ApiConfig::new(cli.spec);
    config.base_url = cli.base_url;
    config.timeout_secs = cli.timeout_secs;
    config.auth = AuthConfig {
        header: cli.auth_header,
        prefix: cli.auth_prefix,
        token: cli.token,
    };

    let doc = OpenApiDocument::load(&config.spec).await?;
    let registry = Arc::new(ToolRegistry::from_document(&doc)?);
    tracing::info!(
        source = %doc.location(),
        title = doc.title().unwrap_or("<untitled>"),
        tools = registry.len(),
        "compiled tool registry",
    );

    let base_url = config.base_url.clone().or_else(|| doc.default_server_url());
    if base_url.is_none() {
        tracing::warn!("no base URL configured or declared; calls must supply 'baseUrl'");
    }
    let executor = Arc::new(RequestExecutor::new(
        base_url,
        config.auth.clone(),
        config.timeout_secs,
    )?);

    match cli.transport {
        Transport::Stdio => stdio::run_stdio(registry, executor).await,
        Transport::Http => {
            http::run_http(
                registry,
                executor,
                HttpConfig {
                    bind: cli.bind,
                    path: cli.path,
                    allowed_hosts: cli.allowed_hosts,
                    allowed_origins: cli.allowed_origins,
                },
            )
            .await
        }
    }
}
