//! Ledger client backed by a wallet gateway sidecar over HTTP.
//!
//! The gateway holds the lite-server connections and does key derivation, signing and
//! message serialization. This client only maps disburser types to its JSON API.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Account, BlockRef, LedgerClient, NewWallet, TxResult};
use crate::address::Address;
use crate::amount::Nanotons;
use crate::batch::{Payload, TransferInstruction};
use crate::config::Mnemonic;
use crate::error::{LedgerError, LedgerResult};

const WALLET_VERSION: &str = "highload_v3";
/// Seconds an external message stays valid before the wallet rejects it.
const MESSAGE_TTL_SECS: u32 = 60 * 5;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(MESSAGE_TTL_SECS as u64 + 30);

/// Gateway endpoint checked reachable by [`LedgerClient::connect`].
#[derive(Debug, Clone)]
pub struct GatewaySession {
    pub base_url: String,
    pub network: String,
    pub masterchain_seqno: u32,
}

#[derive(Clone)]
pub struct HttpLedgerClient {
    client: reqwest::Client,
}

impl HttpLedgerClient {
    pub fn new() -> LedgerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    async fn get<Resp: DeserializeOwned>(&self, base_url: &str, path: &str) -> LedgerResult<Resp> {
        let url = format!("{base_url}{path}");
        debug!(url = %url, "Calling wallet gateway");
        let response = self.client.get(&url).send().await.map_err(timeout_aware)?;
        decode(response).await
    }

    async fn post<Req: Serialize + Sync, Resp: DeserializeOwned>(
        &self,
        session: &GatewaySession,
        path: &str,
        body: &Req,
        timeout: Duration,
    ) -> LedgerResult<Resp> {
        let url = format!("{}{}", session.base_url, path);
        debug!(url = %url, "Calling wallet gateway");
        let response = self
            .client
            .post(&url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(timeout_aware)?;
        decode(response).await
    }
}

fn timeout_aware(e: reqwest::Error) -> LedgerError {
    if e.is_timeout() {
        LedgerError::Timeout
    } else {
        LedgerError::Http(e)
    }
}

async fn decode<Resp: DeserializeOwned>(response: reqwest::Response) -> LedgerResult<Resp> {
    let status = response.status().as_u16();
    let body = response.text().await.map_err(timeout_aware)?;

    if !(200..300).contains(&status) {
        return Err(gateway_error(status, &body));
    }

    serde_json::from_str(&body).map_err(|e| LedgerError::Gateway {
        status,
        message: format!("malformed gateway response: {e}"),
    })
}

fn gateway_error(status: u16, body: &str) -> LedgerError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse {
            error,
            retryable: Some(false),
        }) => LedgerError::Rejected(error),
        Ok(ErrorResponse { error, .. }) => LedgerError::Gateway {
            status,
            message: error,
        },
        Err(_) => LedgerError::Gateway {
            status,
            message: body.to_string(),
        },
    }
}

/// A success status means the batch went out, so an unreadable body must not be resent.
fn unreadable_confirmation(e: LedgerError) -> LedgerError {
    match e {
        LedgerError::Gateway { status, message } if (200..300).contains(&status) => {
            LedgerError::UnknownOutcome(message)
        }
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    retryable: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    network: String,
    #[serde(default)]
    masterchain_seqno: u32,
}

#[derive(Debug, Serialize)]
struct WalletRequest<'a> {
    mnemonic: &'a [String],
    wallet_version: &'static str,
    message_ttl: u32,
}

impl<'a> WalletRequest<'a> {
    fn new(mnemonic: &'a Mnemonic) -> Self {
        Self {
            mnemonic: mnemonic.words(),
            wallet_version: WALLET_VERSION,
            message_ttl: MESSAGE_TTL_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AddressResponse {
    address: String,
}

#[derive(Debug, Serialize)]
struct BalanceRequest {
    address: String,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    /// Decimal string; nanoton balances can exceed what JSON numbers carry safely.
    nano: String,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    #[serde(flatten)]
    wallet: WalletRequest<'a>,
    messages: Vec<WireMessage>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct WireMessage {
    destination: String,
    amount_nano: String,
    bounce: bool,
    ihr_disabled: bool,
    mode: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
}

impl From<&TransferInstruction> for WireMessage {
    fn from(instruction: &TransferInstruction) -> Self {
        Self {
            destination: instruction.destination.to_string(),
            amount_nano: instruction.amount.as_nano().to_string(),
            bounce: instruction.bounce,
            ihr_disabled: true,
            mode: instruction.mode.bits(),
            comment: match &instruction.payload {
                Payload::Empty => None,
                Payload::Comment(text) => Some(text.clone()),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    hash: String,
    #[serde(default)]
    block: Option<WireBlock>,
}

#[derive(Debug, Deserialize)]
struct WireBlock {
    workchain: i32,
    shard: i64,
    seqno: u32,
}

impl TryFrom<SendResponse> for TxResult {
    type Error = LedgerError;

    fn try_from(response: SendResponse) -> Result<Self, Self::Error> {
        let hash = STANDARD.decode(&response.hash).map_err(|e| {
            LedgerError::UnknownOutcome(format!("gateway returned invalid hash: {e}"))
        })?;
        Ok(TxResult {
            hash,
            block: response.block.map(|block| BlockRef {
                workchain: block.workchain,
                shard: block.shard,
                seqno: block.seqno,
            }),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CreateWalletResponse {
    mnemonic: Vec<String>,
    address: String,
}

fn parse_address(address: &str) -> LedgerResult<Address> {
    address
        .parse()
        .map_err(|e| LedgerError::Account(format!("gateway returned address {address}: {e}")))
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    type Session = GatewaySession;

    async fn connect(&self, endpoint: &str) -> LedgerResult<GatewaySession> {
        let base_url = endpoint.trim_end_matches('/');
        let status: StatusResponse = self
            .get(base_url, "/v1/status")
            .await
            .map_err(|e| LedgerError::Connection(e.to_string()))?;
        info!(
            network = %status.network,
            seqno = status.masterchain_seqno,
            "Connected to wallet gateway"
        );
        Ok(GatewaySession {
            base_url: base_url.to_string(),
            network: status.network,
            masterchain_seqno: status.masterchain_seqno,
        })
    }

    async fn open_account(
        &self,
        session: &GatewaySession,
        mnemonic: &Mnemonic,
    ) -> LedgerResult<Account> {
        let response: AddressResponse = self
            .post(session, "/v1/wallet/derive", &WalletRequest::new(mnemonic), REQUEST_TIMEOUT)
            .await
            .map_err(|e| LedgerError::Account(e.to_string()))?;
        Ok(Account {
            address: parse_address(&response.address)?,
            mnemonic: mnemonic.clone(),
        })
    }

    async fn balance(&self, session: &GatewaySession, account: &Account) -> LedgerResult<Nanotons> {
        let request = BalanceRequest {
            address: account.address.to_string(),
        };
        let response: BalanceResponse = self
            .post(session, "/v1/wallet/balance", &request, REQUEST_TIMEOUT)
            .await
            .map_err(|e| LedgerError::Query(e.to_string()))?;
        response
            .nano
            .parse::<u64>()
            .map(Nanotons::new)
            .map_err(|e| LedgerError::Query(format!("invalid balance '{}': {e}", response.nano)))
    }

    async fn submit(
        &self,
        session: &GatewaySession,
        account: &Account,
        instructions: &[TransferInstruction],
    ) -> LedgerResult<TxResult> {
        let request = SendRequest {
            wallet: WalletRequest::new(&account.mnemonic),
            messages: instructions.iter().map(WireMessage::from).collect(),
        };
        let response: SendResponse = self
            .post(session, "/v1/wallet/send", &request, SUBMIT_TIMEOUT)
            .await
            .map_err(unreadable_confirmation)?;
        response.try_into()
    }

    async fn create_wallet(&self, session: &GatewaySession) -> LedgerResult<NewWallet> {
        let request = serde_json::json!({
            "wallet_version": WALLET_VERSION,
            "message_ttl": MESSAGE_TTL_SECS,
        });
        let response: CreateWalletResponse = self
            .post(session, "/v1/wallet/create", &request, REQUEST_TIMEOUT)
            .await?;
        let mnemonic = Mnemonic::from_words(response.mnemonic)
            .ok_or_else(|| LedgerError::Account("gateway returned an empty seed".to_string()))?;
        Ok(NewWallet {
            address: parse_address(&response.address)?,
            mnemonic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::SendMode;

    const DESTINATION: &str = "UQAAAQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eH0Bm";

    #[test]
    fn test_wire_message_from_instruction() {
        let instruction = TransferInstruction {
            destination: DESTINATION.parse().unwrap(),
            amount: Nanotons::new(1_250_000_000),
            bounce: false,
            mode: SendMode::BATCH,
            payload: Payload::Comment("Payout".to_string()),
        };

        let wire = WireMessage::from(&instruction);
        assert_eq!(
            serde_json::to_value(&wire).unwrap(),
            serde_json::json!({
                "destination": DESTINATION,
                "amount_nano": "1250000000",
                "bounce": false,
                "ihr_disabled": true,
                "mode": 3,
                "comment": "Payout",
            })
        );
    }

    #[test]
    fn test_empty_payload_omits_comment() {
        let instruction = TransferInstruction {
            destination: DESTINATION.parse().unwrap(),
            amount: Nanotons::ZERO,
            bounce: true,
            mode: SendMode::PAY_FEES_SEPARATELY,
            payload: Payload::Empty,
        };
        let value = serde_json::to_value(WireMessage::from(&instruction)).unwrap();
        assert!(value.get("comment").is_none());
        assert_eq!(value["mode"], 1);
    }

    #[test]
    fn test_send_request_flattens_wallet_fields() {
        let mnemonic = Mnemonic::from_phrase("one two").unwrap();
        let request = SendRequest {
            wallet: WalletRequest::new(&mnemonic),
            messages: Vec::new(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["mnemonic"], serde_json::json!(["one", "two"]));
        assert_eq!(value["wallet_version"], "highload_v3");
        assert_eq!(value["message_ttl"], 300);
    }

    #[test]
    fn test_gateway_error_classification() {
        let rejected = gateway_error(500, r#"{"error":"cell overflow","retryable":false}"#);
        assert!(matches!(rejected, LedgerError::Rejected(ref m) if m == "cell overflow"));
        assert!(!rejected.is_retryable());

        let busy = gateway_error(503, r#"{"error":"no lite servers"}"#);
        assert!(busy.is_retryable());

        let throttled = gateway_error(429, r#"{"error":"too many requests"}"#);
        assert!(matches!(throttled, LedgerError::Gateway { status: 429, .. }));
        assert!(throttled.is_retryable());

        let invalid = gateway_error(400, "not json");
        assert!(matches!(invalid, LedgerError::Gateway { status: 400, .. }));
        assert!(!invalid.is_retryable());
    }

    #[test]
    fn test_send_response_into_tx_result() {
        let response = SendResponse {
            hash: STANDARD.encode([7u8; 32]),
            block: Some(WireBlock {
                workchain: -1,
                shard: i64::MIN,
                seqno: 42,
            }),
        };
        let tx = TxResult::try_from(response).unwrap();
        assert_eq!(tx.hash, vec![7u8; 32]);
        assert_eq!(tx.block.unwrap().seqno, 42);

        let broken = SendResponse {
            hash: "%%%".to_string(),
            block: None,
        };
        let error = TxResult::try_from(broken).unwrap_err();
        assert!(matches!(error, LedgerError::UnknownOutcome(_)));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_malformed_confirmation_is_unknown_outcome() {
        let confirmed = unreadable_confirmation(LedgerError::Gateway {
            status: 200,
            message: "malformed gateway response: EOF".to_string(),
        });
        assert!(matches!(confirmed, LedgerError::UnknownOutcome(_)));

        let busy = unreadable_confirmation(LedgerError::Gateway {
            status: 503,
            message: "no lite servers".to_string(),
        });
        assert!(matches!(busy, LedgerError::Gateway { status: 503, .. }));
        assert!(busy.is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_a_connection_error() {
        let client = HttpLedgerClient::new().unwrap();
        let result = client.connect("http://127.0.0.1:9/").await;
        assert!(matches!(result, Err(LedgerError::Connection(_))));
    }
}
