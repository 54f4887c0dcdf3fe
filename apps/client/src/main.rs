use anyhow::{Context, Result, bail};
use clap::Parser;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use relay_common::{
    Message, TunnelError, TunnelRequest, TunnelResponse,
    constants::{CHANNEL_QUEUE_DEPTH, CONTROL_CHANNEL_PATH, RECONNECT_DELAY},
    headers_to_map, map_to_headers, scrub_response_headers,
};
use reqwest::Client;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
};
use tracing::{debug, error, info, warn};
use url::Url;

type WebSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// CLI arguments for the tunnel client
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(about = "Expose a local service under a public subdomain", long_about = None)]
#[command(version)]
struct Args {
    /// Target to expose: a port ("3000") or host:port ("app:8080")
    target: String,

    /// Relay server hostname; prefix with ws:// or wss:// to pin the
    /// channel scheme instead of inferring it from the host
    #[arg(short, long, env = "SERVER")]
    server: String,

    /// Shared authentication secret
    #[arg(long, env = "SECRET")]
    secret: String,

    /// Custom subdomain; omit for a random 3-word name
    #[arg(short = 'n', long, env = "SUBDOMAIN")]
    subdomain: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Local request timeout in seconds
    #[arg(long, default_value = "30")]
    request_timeout: u64,
}

/// Configuration for the tunnel client
#[derive(Debug, Clone)]
pub struct Config {
    /// Local service address (e.g. "http://localhost:3000")
    pub local_address: String,

    /// Value written into the Host header of forwarded requests
    pub target_host: String,

    /// Control-channel endpoint
    pub endpoint: Url,

    /// Shared authentication secret
    pub secret: String,

    /// Requested subdomain, if any
    pub subdomain: Option<String>,

    /// Timeout for calls against the local service
    pub request_timeout: Duration,

    /// Fixed delay between reconnection attempts
    pub reconnect_delay: Duration,
}

impl Config {
    fn from_args(args: Args) -> Result<Self> {
        let (host, port) = parse_target(&args.target)?;
        let endpoint = endpoint_url(&args.server)?;

        Ok(Self {
            local_address: format!("http://{host}:{port}"),
            target_host: format!("{host}:{port}"),
            endpoint,
            secret: args.secret,
            subdomain: args.subdomain,
            request_timeout: Duration::from_secs(args.request_timeout),
            reconnect_delay: RECONNECT_DELAY,
        })
    }
}

/// Parse the forwarding target: "3000" means "localhost:3000"
fn parse_target(target: &str) -> Result<(String, u16)> {
    let (host, port) = match target.split_once(':') {
        Some((host, port)) => (host, port),
        None => ("localhost", target),
    };
    if host.is_empty() {
        bail!("Invalid target: {target}");
    }
    let port: u16 = port
        .parse()
        .with_context(|| format!("Invalid target port: {target}"))?;
    Ok((host.to_string(), port))
}

/// Resolve the control-channel endpoint. An explicit ws:// or wss:// scheme
/// is taken as given; otherwise loopback hosts get ws:// and anything else
/// wss://. The inference is a convenience, not a security boundary — pin
/// the scheme to override it.
fn endpoint_url(server: &str) -> Result<Url> {
    let raw = if server.starts_with("ws://") || server.starts_with("wss://") {
        server.to_string()
    } else {
        let host = server.split(':').next().unwrap_or(server);
        let scheme = if host == "localhost" || host.starts_with("127.") {
            "ws"
        } else {
            "wss"
        };
        format!("{scheme}://{server}{CONTROL_CHANNEL_PATH}")
    };

    Url::parse(&raw).with_context(|| format!("Invalid server address: {server}"))
}

/// Connection lifecycle states
#[derive(Debug, Clone)]
#[allow(dead_code)]
enum ClientState {
    Disconnected,
    Connecting,
    Authenticated,
    Forwarding { public_url: String },
}

/// Owns the control channel and the reconnection state machine
pub struct ConnectionManager {
    config: Config,
    http: Client,
    state: Arc<Mutex<ClientState>>,
}

impl ConnectionManager {
    pub fn new(config: Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            config,
            http,
            state: Arc::new(Mutex::new(ClientState::Disconnected)),
        })
    }

    /// Run loop: reconnect after a fixed delay until a fatal server error.
    /// Auth and allocation rejections are configuration problems, not
    /// transient faults, so they end the process instead of retrying.
    pub async fn run(&self) -> Result<()> {
        loop {
            self.set_state(ClientState::Connecting).await;

            match self.connect_and_forward().await {
                Ok(()) => info!("Disconnected from server"),
                Err(e) if e.is_fatal() => {
                    error!("Server error: {}", e);
                    self.set_state(ClientState::Disconnected).await;
                    return Err(e.into());
                }
                Err(e) => error!("Connection error: {}", e),
            }

            self.set_state(ClientState::Disconnected).await;
            info!("Reconnecting in {:?}...", self.config.reconnect_delay);
            tokio::time::sleep(self.config.reconnect_delay).await;
        }
    }

    /// Drive one channel from dial to close
    async fn connect_and_forward(&self) -> std::result::Result<(), TunnelError> {
        debug!("Connecting to {}", self.config.endpoint);
        let (mut channel, _) = connect_async(self.config.endpoint.as_str())
            .await
            .map_err(|e| TunnelError::Connection(e.to_string()))?;
        info!("Connected to server");

        if let Some(ref subdomain) = self.config.subdomain {
            info!("Requesting subdomain: {}", subdomain);
        }
        let auth = Message::Auth {
            secret: self.config.secret.clone(),
            subdomain: self.config.subdomain.clone(),
        };
        channel
            .send(WsMessage::Text(auth.encode()?.into()))
            .await
            .map_err(|e| TunnelError::WebSocket(e.to_string()))?;
        self.set_state(ClientState::Authenticated).await;

        let (sink, stream) = channel.split();
        let (outgoing_tx, outgoing_rx) = mpsc::channel(CHANNEL_QUEUE_DEPTH);
        let writer = tokio::spawn(write_channel(sink, outgoing_rx));

        let result = self.read_channel(stream, outgoing_tx).await;
        writer.abort();
        result
    }

    /// Dispatch inbound frames until the channel drops
    async fn read_channel(
        &self,
        mut stream: SplitStream<WebSocket>,
        outgoing_tx: mpsc::Sender<WsMessage>,
    ) -> std::result::Result<(), TunnelError> {
        while let Some(frame) = stream.next().await {
            let text = match frame {
                Ok(WsMessage::Text(text)) => text,
                Ok(WsMessage::Close(_)) => {
                    info!("Server closed connection");
                    return Ok(());
                }
                Ok(_) => continue,
                Err(e) => return Err(TunnelError::WebSocket(e.to_string())),
            };

            match Message::decode(&text) {
                Ok(Message::Ready { subdomain, url }) => {
                    debug!("Assigned subdomain: {}", subdomain);
                    self.set_state(ClientState::Forwarding {
                        public_url: url.clone(),
                    })
                    .await;
                    info!("Relay active!");
                    info!("  {}", url);
                    info!("  -> {}", self.config.local_address);
                }
                Ok(Message::Error { message }) => {
                    return Err(TunnelError::Rejected(message));
                }
                Ok(Message::Request(request)) => {
                    let http = self.http.clone();
                    let config = self.config.clone();
                    let outgoing_tx = outgoing_tx.clone();
                    tokio::spawn(async move {
                        let response = handle_request(&http, &config, request).await;
                        match Message::Response(response).encode() {
                            Ok(json) => {
                                let _ = outgoing_tx.send(WsMessage::Text(json.into())).await;
                            }
                            Err(e) => error!("Failed to encode response: {}", e),
                        }
                    });
                }
                Ok(_) => warn!("Ignoring unexpected message from server"),
                Err(e) => warn!("Dropping malformed frame: {}", e),
            }
        }

        Ok(())
    }

    async fn set_state(&self, state: ClientState) {
        *self.state.lock().await = state;
    }
}

/// Write task sends outgoing frames through the channel
async fn write_channel(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut outgoing_rx: mpsc::Receiver<WsMessage>,
) {
    while let Some(message) = outgoing_rx.recv().await {
        if let Err(e) = sink.send(message).await {
            error!("Failed to send message: {}", e);
            break;
        }
    }
    debug!("Write task exiting");
}

/// Forward one request to the local service. Failures are converted into a
/// synthetic 502 so the channel itself stays up.
async fn handle_request(http: &Client, config: &Config, request: TunnelRequest) -> TunnelResponse {
    let started = Instant::now();
    let method = request.method.clone();
    let path = request.path.clone();

    match call_local(http, config, request).await {
        Ok(response) => {
            debug!(
                "{} {} -> {} ({}ms)",
                method,
                path,
                response.status,
                started.elapsed().as_millis()
            );
            response
        }
        Err((id, e)) => {
            error!("Error forwarding request: {}", e);
            bad_gateway(&id, &e.to_string())
        }
    }
}

async fn call_local(
    http: &Client,
    config: &Config,
    request: TunnelRequest,
) -> std::result::Result<TunnelResponse, (String, TunnelError)> {
    let id = request.id.clone();

    let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|_| {
        (
            id.clone(),
            TunnelError::Http(format!("Unsupported HTTP method: {}", request.method)),
        )
    })?;
    let url = format!("{}{}", config.local_address, request.path);

    // Re-point the Host header at the target and drop connection framing;
    // reqwest recomputes content-length from the actual body
    let mut headers = map_to_headers(&request.headers);
    headers.remove(reqwest::header::CONTENT_LENGTH);
    headers.remove(reqwest::header::TRANSFER_ENCODING);
    match config.target_host.parse() {
        Ok(host) => {
            headers.insert(reqwest::header::HOST, host);
        }
        Err(_) => {
            headers.remove(reqwest::header::HOST);
        }
    }

    let body = request
        .body_bytes()
        .map_err(|e| (id.clone(), e))?;

    let mut builder = http.request(method, &url).headers(headers);
    if !body.is_empty() {
        builder = builder.body(body);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| (id.clone(), TunnelError::Http(e.to_string())))?;

    let status = response.status().as_u16();
    let headers = scrub_response_headers(&headers_to_map(response.headers()));
    let bytes = response
        .bytes()
        .await
        .map_err(|e| (id.clone(), TunnelError::Http(e.to_string())))?;

    let mut reply = TunnelResponse::new(id, status).with_body(&bytes);
    reply.headers = headers;
    Ok(reply)
}

/// Synthetic response for a local-call failure
fn bad_gateway(id: &str, detail: &str) -> TunnelResponse {
    let mut response = TunnelResponse::new(id.to_string(), 502)
        .with_body(format!("Bad Gateway: {detail}").as_bytes());
    response
        .headers
        .insert("content-type".to_string(), vec!["text/plain".to_string()]);
    response
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    info!("relay v{}", env!("CARGO_PKG_VERSION"));
    let config = Config::from_args(args)?;
    info!("Target: {}", config.local_address);
    info!("Server: {}", config.endpoint);

    let manager = ConnectionManager::new(config)?;

    tokio::select! {
        // only returns on a fatal server rejection
        result = manager.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            Ok(())
        }
    }
}
