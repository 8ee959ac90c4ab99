//! Purchase orchestrator
//!
//! [`ByteShopClient`] is the one purchase API front ends call. It holds the
//! capabilities as shared trait objects, so a single client can serve concurrent
//! purchases; each purchase draws its own derivation nonces.

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::{ByteShopConfig, ServerEnvironment};
use crate::entropy::{EntropySource, OsEntropy};
use crate::error::Result;
use crate::invoice::InvoiceRequester;
use crate::pay::{PaymentSubmitter, PaymentTarget};
use crate::script::{LockingScriptBuilder, P2pkhScriptBuilder};
use crate::stage::PurchaseStage;
use crate::transport::{AuthenticatedTransport, HttpTransport, IdentityKeySigner};
use crate::types::{Invoice, PurchaseRequest, PurchaseResult};
use crate::wallet::{HttpWallet, Wallet};
use crate::DEFAULT_PURCHASE_DESCRIPTION;

/// Buys bytes from a Byte Shop server
#[derive(Clone)]
pub struct ByteShopClient {
    transport: Arc<dyn AuthenticatedTransport>,
    wallet: Arc<dyn Wallet>,
    scripts: Arc<dyn LockingScriptBuilder>,
    entropy: Arc<dyn EntropySource>,
    server_url: Option<String>,
    description: String,
}

impl ByteShopClient {
    /// Client over the given transport and wallet, with P2PKH scripts and OS entropy
    pub fn new(transport: Arc<dyn AuthenticatedTransport>, wallet: Arc<dyn Wallet>) -> Self {
        Self {
            transport,
            wallet,
            scripts: Arc::new(P2pkhScriptBuilder),
            entropy: Arc::new(OsEntropy),
            server_url: None,
            description: DEFAULT_PURCHASE_DESCRIPTION.to_string(),
        }
    }

    /// Production client: HTTPS transport and the local HTTP wallet
    pub fn connect(config: ByteShopConfig) -> Result<Self> {
        let entropy: Arc<dyn EntropySource> = Arc::new(OsEntropy);
        let signer = match &config.identity_key {
            Some(key) => IdentityKeySigner::from_hex(key, entropy.clone())?,
            None => IdentityKeySigner::ephemeral(entropy.clone()),
        };
        tracing::debug!(identity_key = %signer.identity_key(), "request signer ready");

        let transport = HttpTransport::new(signer, config.request_timeout)?;
        let wallet = HttpWallet::new(config.wallet_url.clone(), config.request_timeout)?;

        let mut client = Self::new(Arc::new(transport), Arc::new(wallet))
            .with_entropy(entropy)
            .with_description(config.description);
        client.server_url = config.server_url.map(|url| url.to_string());
        Ok(client)
    }

    pub fn with_entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    pub fn with_script_builder(mut self, scripts: Arc<dyn LockingScriptBuilder>) -> Self {
        self.scripts = scripts;
        self
    }

    /// Pin the shop instead of choosing it from the wallet's network
    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = Some(server_url.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Shop URL to use: the pinned one, or the one matching the wallet's network
    pub async fn resolve_server_url(&self) -> Result<String> {
        if let Some(url) = &self.server_url {
            return Ok(url.clone());
        }
        let network = self.wallet.network().await?;
        let environment = ServerEnvironment::for_network(network);
        tracing::info!(?network, server = environment.url(), "selected shop from wallet network");
        Ok(environment.url().to_string())
    }

    /// Ask `server_url` to price `number_of_bytes` bytes
    pub async fn request_invoice(&self, server_url: &str, number_of_bytes: u64, cool: bool) -> Result<Invoice> {
        InvoiceRequester::new(self.transport.as_ref())
            .request(server_url, number_of_bytes, cool)
            .await
    }

    /// Pay an invoice and redeem the bytes
    pub async fn submit_payment(
        &self,
        server_url: &str,
        description: &str,
        order_id: &str,
        payee_identity_key: &str,
        amount_satoshis: u64,
    ) -> Result<PurchaseResult> {
        PaymentSubmitter::new(
            self.transport.as_ref(),
            self.wallet.as_ref(),
            self.scripts.as_ref(),
            self.entropy.as_ref(),
        )
        .submit(PaymentTarget {
            server_url,
            description,
            order_id,
            payee_identity_key,
            amount_satoshis,
        })
        .await
    }

    /// Run a whole purchase
    pub async fn purchase(&self, request: PurchaseRequest) -> Result<PurchaseResult> {
        let (stages, _) = watch::channel(PurchaseStage::Idle);
        self.purchase_with_progress(request, &stages).await
    }

    /// Run a whole purchase, publishing each stage on `stages`
    ///
    /// The local byte count check happens before the `Invoicing` stage is published.
    pub async fn purchase_with_progress(
        &self,
        request: PurchaseRequest,
        stages: &watch::Sender<PurchaseStage>,
    ) -> Result<PurchaseResult> {
        request.validate()?;

        stages.send_replace(PurchaseStage::Invoicing);
        let (invoice, server_url) = match self.invoice_for(request).await {
            Ok(found) => found,
            Err(e) => {
                stages.send_replace(PurchaseStage::InvoiceFailed {
                    code: e.code().to_string(),
                });
                return Err(e);
            }
        };

        stages.send_replace(PurchaseStage::Invoiced {
            order_id: invoice.order_id.clone(),
            amount_satoshis: invoice.amount_satoshis,
        });
        stages.send_replace(PurchaseStage::Paying {
            order_id: invoice.order_id.clone(),
        });

        let result = self
            .submit_payment(
                &server_url,
                &self.description,
                &invoice.order_id,
                &invoice.payee_identity_key,
                invoice.amount_satoshis,
            )
            .await;

        match &result {
            Ok(_) => stages.send_replace(PurchaseStage::Paid {
                order_id: invoice.order_id,
            }),
            Err(e) => stages.send_replace(PurchaseStage::PayFailed {
                order_id: invoice.order_id,
                code: e.code().to_string(),
            }),
        };
        result
    }

    async fn invoice_for(&self, request: PurchaseRequest) -> Result<(Invoice, String)> {
        let server_url = self.resolve_server_url().await?;
        let invoice = self
            .request_invoice(&server_url, request.number_of_bytes, request.cool)
            .await?;
        Ok((invoice, server_url))
    }
}

impl std::fmt::Debug for ByteShopClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteShopClient")
            .field("server_url", &self.server_url)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
