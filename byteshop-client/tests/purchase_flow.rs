use std::collections::HashSet;
use std::sync::Arc;

use byteshop_client::{
    ByteShopClient, PurchaseError, PurchaseRequest, PurchaseStage, SeededEntropy, WalletError,
    WalletNetwork, DEFAULT_PURCHASE_DESCRIPTION,
};
use byteshop_test_fixtures::{
    action_error, invoice_ok, not_cool_enough, pay_ok, server_error, test_client,
    LabelScriptBuilder, MockTransport, MockWallet, DERIVED_KEY_SCRIPT, TEST_SERVER_URL,
};
use proptest::prelude::*;
use serde_json::json;
use tokio::sync::watch;

fn doubles() -> (Arc<MockTransport>, Arc<MockWallet>) {
    (Arc::new(MockTransport::new()), Arc::new(MockWallet::new()))
}

#[tokio::test]
async fn end_to_end_purchase_returns_bytes_and_note() {
    let transport = Arc::new(MockTransport::new());
    let wallet = Arc::new(MockWallet::new().with_public_key("D1"));
    transport
        .respond("/invoice", invoice_ok("o1", "K1", 1400))
        .respond("/pay", pay_ok("<blob>", "stored"));

    let client = test_client(transport.clone(), wallet.clone())
        .with_script_builder(Arc::new(LabelScriptBuilder));
    let result = client
        .purchase(PurchaseRequest::new(14, false))
        .await
        .expect("purchase succeeds");

    assert_eq!(result.bytes, "<blob>");
    assert_eq!(result.note, "stored");

    let invoice = &transport.requests_to("/invoice")[0];
    assert_eq!(invoice.base_url, TEST_SERVER_URL);
    assert_eq!(invoice.body, json!({"numberOfBytes": 14, "cool": false}));

    let actions = wallet.action_requests();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].description, DEFAULT_PURCHASE_DESCRIPTION);
    assert_eq!(actions[0].outputs.len(), 1);
    assert_eq!(actions[0].outputs[0].script, LabelScriptBuilder::script_for("D1"));
    assert_eq!(actions[0].outputs[0].satoshis, 1400);
}

#[tokio::test]
async fn pay_body_carries_order_amount_and_counterparty() {
    let (transport, wallet) = doubles();
    transport
        .respond("/invoice", invoice_ok("abc", "K", 5000))
        .respond("/pay", pay_ok("bytes", ""));

    test_client(transport.clone(), wallet.clone())
        .purchase(PurchaseRequest::new(50, false))
        .await
        .expect("purchase succeeds");

    let derivations = wallet.derivations();
    assert_eq!(derivations.len(), 1);
    assert_eq!(derivations[0].counterparty, "K");
    assert_eq!(derivations[0].protocol_id.security_level(), 2);
    assert_eq!(derivations[0].protocol_id.name(), "3241645161d8");

    // Real P2PKH script for the default derived key
    assert_eq!(wallet.action_requests()[0].outputs[0].script, DERIVED_KEY_SCRIPT);

    let pay = &transport.requests_to("/pay")[0].body;
    assert_eq!(pay["orderID"], "abc");
    assert_eq!(pay["description"], DEFAULT_PURCHASE_DESCRIPTION);

    let output = &pay["transaction"]["outputs"][0];
    assert_eq!(pay["transaction"]["outputs"].as_array().map(Vec::len), Some(1));
    assert_eq!(output["vout"], 0);
    assert_eq!(output["satoshis"], 5000);

    // The derivation inputs sent to the shop are the ones the wallet derived with
    let key_id = format!(
        "{} {}",
        output["derivationPrefix"].as_str().unwrap(),
        output["derivationSuffix"].as_str().unwrap()
    );
    assert_eq!(key_id, derivations[0].key_id);

    // Wallet action fields are forwarded untouched
    assert_eq!(pay["transaction"]["rawTx"], "0100000001");
}

#[tokio::test]
async fn not_cool_enough_surfaces_certificate_url() {
    let (transport, wallet) = doubles();
    transport.respond("/invoice", not_cool_enough("https://x"));

    let err = test_client(transport.clone(), wallet.clone())
        .purchase(PurchaseRequest::new(14, true))
        .await
        .unwrap_err();

    assert!(err.is_not_cool_enough());
    assert_eq!(err.certificate_url(), Some("https://x"));
    assert!(wallet.derivations().is_empty());
    assert!(wallet.action_requests().is_empty());
    assert!(transport.requests_to("/pay").is_empty());
}

#[tokio::test]
async fn invoice_error_is_a_server_error() {
    let (transport, wallet) = doubles();
    transport.respond(
        "/invoice",
        server_error("ERR_INVALID_NUMBER_OF_BYTES", "Number of bytes must be at least 10"),
    );

    let err = test_client(transport, wallet.clone())
        .purchase(PurchaseRequest::new(5, false))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PurchaseError::Server {
            code: "ERR_INVALID_NUMBER_OF_BYTES".into(),
            description: "Number of bytes must be at least 10".into(),
        }
    );
    assert!(wallet.action_requests().is_empty());
}

#[tokio::test]
async fn wallet_refusal_stops_before_pay() {
    let (transport, wallet) = doubles();
    transport.respond("/invoice", invoice_ok("o1", "K1", 1400));
    wallet.queue_action(Ok(action_error("ERR_WALLET", "no funds")));

    let err = test_client(transport.clone(), wallet.clone())
        .purchase(PurchaseRequest::new(14, false))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PurchaseError::Wallet {
            code: "ERR_WALLET".into(),
            description: "no funds".into(),
        }
    );
    assert!(transport.requests_to("/pay").is_empty());
}

#[tokio::test]
async fn unreachable_wallet_is_reported_as_wallet_error() {
    let (transport, wallet) = doubles();
    transport.respond("/invoice", invoice_ok("o1", "K1", 1400));
    wallet.queue_action(Err(WalletError::Unavailable("connection refused".into())));

    let err = test_client(transport.clone(), wallet)
        .purchase(PurchaseRequest::new(14, false))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "ERR_WALLET_UNAVAILABLE");
    assert!(transport.requests_to("/pay").is_empty());
}

#[tokio::test]
async fn invalid_derived_key_never_reaches_create_action() {
    let transport = Arc::new(MockTransport::new());
    let wallet = Arc::new(MockWallet::new().with_public_key("not-a-key"));
    transport.respond("/invoice", invoice_ok("o1", "K1", 1400));

    let err = test_client(transport, wallet.clone())
        .purchase(PurchaseRequest::new(14, false))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "ERR_INVALID_DERIVED_KEY");
    assert!(wallet.action_requests().is_empty());
}

#[tokio::test]
async fn pay_error_is_not_retried() {
    let (transport, wallet) = doubles();
    transport
        .respond("/invoice", invoice_ok("o1", "K1", 1400))
        .always("/pay", server_error("ERR_DUPLICATE_ORDER", "Order already paid"));

    let err = test_client(transport.clone(), wallet.clone())
        .purchase(PurchaseRequest::new(14, false))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "ERR_DUPLICATE_ORDER");
    assert_eq!(wallet.action_requests().len(), 1);
    assert_eq!(transport.requests_to("/pay").len(), 1);
}

#[tokio::test]
async fn pay_transport_failure_after_action() {
    let (transport, wallet) = doubles();
    transport
        .respond("/invoice", invoice_ok("o1", "K1", 1400))
        .fail("/pay", "connection reset");

    let err = test_client(transport.clone(), wallet.clone())
        .purchase(PurchaseRequest::new(14, false))
        .await
        .unwrap_err();

    assert!(matches!(err, PurchaseError::Transport { .. }));
    assert_eq!(wallet.action_requests().len(), 1);
    assert_eq!(transport.requests_to("/pay").len(), 1);
}

#[tokio::test]
async fn pay_response_without_bytes_is_invalid() {
    let (transport, wallet) = doubles();
    transport
        .respond("/invoice", invoice_ok("o1", "K1", 1400))
        .respond("/pay", json!({"status": "success", "note": "stored"}));

    let err = test_client(transport, wallet)
        .purchase(PurchaseRequest::new(14, false))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "ERR_INVALID_RESPONSE");
}

#[tokio::test]
async fn thousand_payments_use_distinct_key_ids() {
    let (transport, wallet) = doubles();
    transport.always("/pay", pay_ok("bytes", ""));
    let client = test_client(transport, wallet.clone());

    for i in 0..1000 {
        client
            .submit_payment(TEST_SERVER_URL, "d", &format!("o{}", i), "K", 10)
            .await
            .expect("payment succeeds");
    }

    let key_ids: HashSet<String> = wallet.derivations().into_iter().map(|d| d.key_id).collect();
    assert_eq!(key_ids.len(), 1000);
}

#[tokio::test]
async fn seeded_entropy_makes_derivation_reproducible() {
    let mut key_ids = Vec::new();
    for _ in 0..2 {
        let (transport, wallet) = doubles();
        transport
            .respond("/invoice", invoice_ok("o1", "K1", 1400))
            .respond("/pay", pay_ok("bytes", ""));
        test_client(transport, wallet.clone())
            .with_entropy(Arc::new(SeededEntropy::from_seed(7)))
            .purchase(PurchaseRequest::new(14, false))
            .await
            .expect("purchase succeeds");
        key_ids.push(wallet.derivations()[0].key_id.clone());
    }
    assert_eq!(key_ids[0], key_ids[1]);
}

#[tokio::test]
async fn progress_stages_follow_the_flow() {
    let (transport, wallet) = doubles();
    transport
        .respond("/invoice", invoice_ok("o1", "K1", 1400))
        .respond("/pay", pay_ok("bytes", "note"));

    let (stages, mut receiver) = watch::channel(PurchaseStage::Idle);
    let client = test_client(transport, wallet);

    client
        .purchase_with_progress(PurchaseRequest::new(14, false), &stages)
        .await
        .expect("purchase succeeds");

    assert!(receiver.has_changed().unwrap());
    let last = receiver.borrow_and_update().clone();
    assert_eq!(last, PurchaseStage::Paid { order_id: "o1".into() });
    assert!(last.is_terminal());
}

#[tokio::test]
async fn failed_invoice_reports_invoice_failed_stage() {
    let (transport, wallet) = doubles();
    transport.respond("/invoice", not_cool_enough("https://x"));

    let (stages, receiver) = watch::channel(PurchaseStage::Idle);
    let _ = test_client(transport, wallet)
        .purchase_with_progress(PurchaseRequest::new(14, true), &stages)
        .await;

    assert_eq!(
        *receiver.borrow(),
        PurchaseStage::InvoiceFailed {
            code: "ERR_NOT_COOL_ENOUGH".into()
        }
    );
}

#[tokio::test]
async fn failed_payment_reports_pay_failed_stage() {
    let (transport, wallet) = doubles();
    transport
        .respond("/invoice", invoice_ok("o1", "K1", 1400))
        .respond("/pay", server_error("ERR_DUPLICATE_ORDER", "Order already paid"));

    let (stages, receiver) = watch::channel(PurchaseStage::Idle);
    let _ = test_client(transport, wallet)
        .purchase_with_progress(PurchaseRequest::new(14, false), &stages)
        .await;

    assert_eq!(
        *receiver.borrow(),
        PurchaseStage::PayFailed {
            order_id: "o1".into(),
            code: "ERR_DUPLICATE_ORDER".into(),
        }
    );
}

#[tokio::test]
async fn unpinned_client_picks_shop_from_wallet_network() {
    let transport = Arc::new(MockTransport::new());
    let wallet = Arc::new(MockWallet::new().with_network(WalletNetwork::Testnet));
    transport
        .respond("/invoice", invoice_ok("o1", "K1", 1400))
        .respond("/pay", pay_ok("bytes", ""));

    let client = ByteShopClient::new(transport.clone(), wallet.clone());
    assert_eq!(
        client.resolve_server_url().await.unwrap(),
        "https://staging-byte-shop.babbage.systems"
    );

    client
        .purchase(PurchaseRequest::new(14, false))
        .await
        .expect("purchase succeeds");
    for request in transport.requests() {
        assert_eq!(request.base_url, "https://staging-byte-shop.babbage.systems");
    }
    assert_eq!(wallet.network_queries(), 2);
}

#[tokio::test]
async fn custom_description_reaches_wallet_and_shop() {
    let (transport, wallet) = doubles();
    transport
        .respond("/invoice", invoice_ok("o1", "K1", 1400))
        .respond("/pay", pay_ok("bytes", ""));

    test_client(transport.clone(), wallet.clone())
        .with_description("CLI purchase")
        .purchase(PurchaseRequest::new(14, false))
        .await
        .expect("purchase succeeds");

    assert_eq!(wallet.action_requests()[0].description, "CLI purchase");
    assert_eq!(transport.requests_to("/pay")[0].body["description"], "CLI purchase");
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn zero_bytes_never_touches_the_network(cool in any::<bool>()) {
        let (transport, wallet) = doubles();
        let client = test_client(transport.clone(), wallet.clone());

        let err = runtime()
            .block_on(client.purchase(PurchaseRequest::new(0, cool)))
            .unwrap_err();

        prop_assert_eq!(err, PurchaseError::MissingParameter("numberOfBytes"));
        prop_assert_eq!(transport.request_count(), 0);
        prop_assert!(wallet.derivations().is_empty());
    }

    #[test]
    fn byte_count_is_sent_verbatim(number_of_bytes in 1u64..1_000_000, cool in any::<bool>()) {
        let (transport, wallet) = doubles();
        transport.respond("/invoice", server_error("ERR_STOP", "stop here"));
        let client = test_client(transport.clone(), wallet);

        let _ = runtime().block_on(client.request_invoice(TEST_SERVER_URL, number_of_bytes, cool));

        let requests = transport.requests_to("/invoice");
        prop_assert_eq!(requests.len(), 1);
        prop_assert_eq!(
            &requests[0].body,
            &json!({"numberOfBytes": number_of_bytes, "cool": cool})
        );
    }
}
