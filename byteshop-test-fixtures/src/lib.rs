//! Scripted doubles and canned responses for testing the purchase flow.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use byteshop_client::{
    ActionResult, AuthenticatedTransport, ByteShopClient, CreateActionRequest, KeyDerivationRequest,
    LockingScriptBuilder, ScriptError, TransportError, Wallet, WalletError, WalletNetwork,
};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Shop URL the test clients are pinned to.
pub const TEST_SERVER_URL: &str = "http://localhost:3002";

/// A valid compressed secp256k1 public key (the generator point).
pub const DERIVED_PUBLIC_KEY: &str =
    "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

/// P2PKH locking script for [`DERIVED_PUBLIC_KEY`].
pub const DERIVED_KEY_SCRIPT: &str = "76a914751e76e8199196d454941c45d1b3a323f1433bd688ac";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Canned JSON responses
// ---------------------------------------------------------------------------

/// Successful `/invoice` response.
pub fn invoice_ok(order_id: &str, identity_key: &str, amount: u64) -> Value {
    json!({
        "status": "success",
        "message": format!("Send {} satoshis to complete order {}", amount, order_id),
        "identityKey": identity_key,
        "amount": amount,
        "orderID": order_id,
        "publicURL": format!("https://nanostore.example/{}", order_id),
    })
}

/// `/invoice` refusal for cool bytes without a certificate.
pub fn not_cool_enough(certificate_url: &str) -> Value {
    json!({
        "status": "error",
        "code": "ERR_NOT_COOL_ENOUGH",
        "description": "You are not cool enough to buy cool bytes",
        "coolcertURL": certificate_url,
    })
}

/// Generic shop error response.
pub fn server_error(code: &str, description: &str) -> Value {
    json!({
        "status": "error",
        "code": code,
        "description": description,
    })
}

/// Successful `/pay` response.
pub fn pay_ok(bytes: &str, note: &str) -> Value {
    json!({
        "status": "success",
        "bytes": bytes,
        "note": note,
    })
}

/// Wallet action that went through.
pub fn action_ok() -> ActionResult {
    ActionResult::from_value(json!({
        "txid": "4c1b2b8b1f0e0f6c6d1a0b7e9a8d2c3b4a5f6e7d8c9b0a1f2e3d4c5b6a7f8e9d",
        "rawTx": "0100000001",
        "mapiResponses": [],
        "inputs": {},
    }))
}

/// Wallet action refused by the wallet.
pub fn action_error(code: &str, description: &str) -> ActionResult {
    ActionResult::from_value(server_error(code, description))
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Scripted {
    Respond(Value),
    Fail(String),
}

impl Scripted {
    fn produce(&self) -> Result<Value, TransportError> {
        match self {
            Scripted::Respond(value) => Ok(value.clone()),
            Scripted::Fail(message) => Err(TransportError::Http(message.clone())),
        }
    }
}

/// A request seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub base_url: String,
    pub path: String,
    pub body: Value,
}

#[derive(Debug, Default)]
struct TransportState {
    queued: HashMap<String, VecDeque<Scripted>>,
    fallback: HashMap<String, Scripted>,
    requests: Vec<RecordedRequest>,
}

/// Transport answering from per-path scripts and recording every request.
///
/// Queued responses are used once, in order; after that the `always` response for
/// the path (if any) is repeated. A path with neither fails with a transport error.
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<TransportState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one response for `path`.
    pub fn respond(&self, path: &str, response: Value) -> &Self {
        lock(&self.state)
            .queued
            .entry(path.to_string())
            .or_default()
            .push_back(Scripted::Respond(response));
        self
    }

    /// Queue one network failure for `path`.
    pub fn fail(&self, path: &str, message: &str) -> &Self {
        lock(&self.state)
            .queued
            .entry(path.to_string())
            .or_default()
            .push_back(Scripted::Fail(message.to_string()));
        self
    }

    /// Answer every otherwise unscripted call to `path` with `response`.
    pub fn always(&self, path: &str, response: Value) -> &Self {
        lock(&self.state)
            .fallback
            .insert(path.to_string(), Scripted::Respond(response));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state).requests.clone()
    }

    /// Requests made to `path`.
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        lock(&self.state)
            .requests
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.state).requests.len()
    }
}

#[async_trait]
impl AuthenticatedTransport for MockTransport {
    async fn post_signed(
        &self,
        base_url: &str,
        path: &str,
        body: Value,
    ) -> Result<Value, TransportError> {
        let mut state = lock(&self.state);
        state.requests.push(RecordedRequest {
            base_url: base_url.to_string(),
            path: path.to_string(),
            body,
        });

        let queued = state.queued.get_mut(path).and_then(VecDeque::pop_front);
        match queued.or_else(|| state.fallback.get(path).cloned()) {
            Some(scripted) => scripted.produce(),
            None => Err(TransportError::Http(format!("no scripted response for {}", path))),
        }
    }
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct WalletState {
    public_key: Result<String, WalletError>,
    actions: VecDeque<Result<ActionResult, WalletError>>,
    network: WalletNetwork,
    derivations: Vec<KeyDerivationRequest>,
    action_requests: Vec<CreateActionRequest>,
    network_queries: usize,
}

/// Wallet returning scripted keys and actions and recording every call.
///
/// Defaults: derives [`DERIVED_PUBLIC_KEY`], every action succeeds with
/// [`action_ok`], network is mainnet.
#[derive(Debug)]
pub struct MockWallet {
    state: Mutex<WalletState>,
}

impl Default for MockWallet {
    fn default() -> Self {
        Self {
            state: Mutex::new(WalletState {
                public_key: Ok(DERIVED_PUBLIC_KEY.to_string()),
                actions: VecDeque::new(),
                network: WalletNetwork::Mainnet,
                derivations: Vec::new(),
                action_requests: Vec::new(),
                network_queries: 0,
            }),
        }
    }
}

impl MockWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key returned by every derivation.
    pub fn with_public_key(self, public_key: &str) -> Self {
        lock(&self.state).public_key = Ok(public_key.to_string());
        self
    }

    /// Make every derivation fail.
    pub fn with_derivation_error(self, error: WalletError) -> Self {
        lock(&self.state).public_key = Err(error);
        self
    }

    pub fn with_network(self, network: WalletNetwork) -> Self {
        lock(&self.state).network = network;
        self
    }

    /// Queue the result of the next `create_action`.
    pub fn queue_action(&self, result: Result<ActionResult, WalletError>) -> &Self {
        lock(&self.state).actions.push_back(result);
        self
    }

    pub fn derivations(&self) -> Vec<KeyDerivationRequest> {
        lock(&self.state).derivations.clone()
    }

    pub fn action_requests(&self) -> Vec<CreateActionRequest> {
        lock(&self.state).action_requests.clone()
    }

    pub fn network_queries(&self) -> usize {
        lock(&self.state).network_queries
    }
}

#[async_trait]
impl Wallet for MockWallet {
    async fn derive_public_key(&self, request: &KeyDerivationRequest) -> Result<String, WalletError> {
        let mut state = lock(&self.state);
        state.derivations.push(request.clone());
        state.public_key.clone()
    }

    async fn create_action(&self, request: &CreateActionRequest) -> Result<ActionResult, WalletError> {
        let mut state = lock(&self.state);
        state.action_requests.push(request.clone());
        state.actions.pop_front().unwrap_or_else(|| Ok(action_ok()))
    }

    async fn network(&self) -> Result<WalletNetwork, WalletError> {
        let mut state = lock(&self.state);
        state.network_queries += 1;
        Ok(state.network)
    }
}

// ---------------------------------------------------------------------------
// Scripts and clients
// ---------------------------------------------------------------------------

/// Script builder that accepts any key and labels the script with it.
///
/// Lets tests use placeholder keys such as `"D1"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelScriptBuilder;

impl LabelScriptBuilder {
    pub fn script_for(public_key: &str) -> String {
        format!("script-for-{}", public_key)
    }
}

impl LockingScriptBuilder for LabelScriptBuilder {
    fn pay_to_public_key(&self, public_key: &str) -> Result<String, ScriptError> {
        Ok(Self::script_for(public_key))
    }
}

/// Client over the given doubles, pinned to [`TEST_SERVER_URL`].
pub fn test_client(transport: Arc<MockTransport>, wallet: Arc<MockWallet>) -> ByteShopClient {
    ByteShopClient::new(transport, wallet).with_server_url(TEST_SERVER_URL)
}

// ---------------------------------------------------------------------------
// Local HTTP server
// ---------------------------------------------------------------------------

/// Loopback HTTP server answering each connection with the next canned response.
///
/// Every response closes its connection, so one canned response serves exactly one
/// request. Raw requests (head and body) are handed back by [`CannedHttpServer::finish`].
pub struct CannedHttpServer {
    url: String,
    task: JoinHandle<io::Result<Vec<String>>>,
}

impl CannedHttpServer {
    /// Serve `responses` (status code, body) in order, one per connection.
    pub async fn start(responses: Vec<(u16, String)>) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);

        let task = tokio::spawn(async move {
            let mut requests = Vec::with_capacity(responses.len());
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await?;
                requests.push(read_request(&mut socket).await?);

                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason_phrase(status),
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await?;
                socket.shutdown().await?;
            }
            Ok(requests)
        });

        Ok(Self { url, task })
    }

    /// Serve a single response.
    pub async fn once(status: u16, body: impl Into<String>) -> io::Result<Self> {
        Self::start(vec![(status, body.into())]).await
    }

    /// Base URL, e.g. `http://127.0.0.1:41234`.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Wait until every canned response was served and return the raw requests.
    pub async fn finish(self) -> io::Result<Vec<String>> {
        self.task.await.map_err(io::Error::other)?
    }
}

async fn read_request(socket: &mut TcpStream) -> io::Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + body_len {
                break;
            }
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        402 => "Payment Required",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "Status",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteshop_client::{P2pkhScriptBuilder, ProtocolId};

    #[test]
    fn derived_key_script_matches_p2pkh() {
        assert_eq!(
            P2pkhScriptBuilder.pay_to_public_key(DERIVED_PUBLIC_KEY).unwrap(),
            DERIVED_KEY_SCRIPT
        );
    }

    #[tokio::test]
    async fn transport_uses_queue_then_fallback() {
        let transport = MockTransport::new();
        transport
            .respond("/pay", pay_ok("first", ""))
            .always("/pay", pay_ok("again", ""));

        let first = transport.post_signed("u", "/pay", json!({})).await.unwrap();
        let second = transport.post_signed("u", "/pay", json!({})).await.unwrap();
        assert_eq!(first["bytes"], "first");
        assert_eq!(second["bytes"], "again");

        assert!(transport.post_signed("u", "/invoice", json!({})).await.is_err());
        assert_eq!(transport.request_count(), 3);
        assert_eq!(transport.requests_to("/pay").len(), 2);
    }

    #[tokio::test]
    async fn wallet_records_calls() {
        let wallet = MockWallet::new();
        wallet.queue_action(Ok(action_error("ERR_WALLET", "no funds")));

        let request = KeyDerivationRequest {
            protocol_id: ProtocolId::payment(),
            key_id: "a b".into(),
            counterparty: "K".into(),
        };
        assert_eq!(wallet.derive_public_key(&request).await.unwrap(), DERIVED_PUBLIC_KEY);

        let action = CreateActionRequest {
            description: "d".into(),
            outputs: vec![],
        };
        assert!(wallet.create_action(&action).await.unwrap().status().is_error());
        assert!(!wallet.create_action(&action).await.unwrap().status().is_error());

        assert_eq!(wallet.derivations(), vec![request]);
        assert_eq!(wallet.action_requests().len(), 2);
    }
}
