//! Integration tests for webhook reconciliation against stored contracts.

use chrono::Utc;
use serde_json::{Value, json};
use sqlx::PgPool;

use pladivo_db::models::{ContractParty, ContractStatus, EventContract, OutboxStatus};
use pladivo_db::queries::outbox as outbox_db;
use pladivo_test_utils::{create_test_db, drop_test_db};

use pladivo_core::contract::{self, ContractInput, ContractSettings, ScheduleItemInput};
use pladivo_core::error::DomainError;
use pladivo_core::payment::{ReconcileOutcome, SepayWebhookPayload, reconcile_payment};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn seed_contract(pool: &PgPool, booking_id: &str, number: &str) -> EventContract {
    let input = ContractInput {
        booking_id: booking_id.to_string(),
        contract_number: number.to_string(),
        title: "Hợp đồng tổ chức sự kiện".to_string(),
        party_a: ContractParty {
            name: "Nguyễn Văn A".to_string(),
            email: Some("khach@example.com".to_string()),
            ..Default::default()
        },
        total_value: None,
        payment_schedule: vec![
            ScheduleItemInput {
                amount: 5_000_000,
                description: "Đặt cọc".to_string(),
                due_date: None,
            },
            ScheduleItemInput {
                amount: 15_000_000,
                description: "Thanh toán còn lại".to_string(),
                due_date: None,
            },
        ],
        created_by: Some("staff-1".to_string()),
        send_email: false,
    };
    contract::upsert_contract(pool, &ContractSettings::default(), &input)
        .await
        .expect("seed contract")
        .contract
}

fn code_of(contract: &EventContract, index: usize) -> String {
    contract.payment_schedule[index]
        .payment_code
        .clone()
        .expect("installment has a code")
}

fn payload(id: &str, content: &str, amount: i64) -> (SepayWebhookPayload, Value) {
    let raw = json!({
        "id": id,
        "gateway": "MBBank",
        "transactionDate": "2026-10-01 09:30:00",
        "accountNumber": "0123456789",
        "content": content,
        "transferType": "in",
        "transferAmount": amount,
        "referenceCode": format!("FT{id}"),
    });
    let parsed: SepayWebhookPayload = serde_json::from_value(raw.clone()).unwrap();
    (parsed, raw)
}

async fn deliver(
    pool: &PgPool,
    payload: &SepayWebhookPayload,
    raw: &Value,
) -> Result<ReconcileOutcome, DomainError> {
    reconcile_payment(pool, &ContractSettings::default(), payload, raw, Utc::now()).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_installment_marks_paid_and_signs() {
    let (pool, db_name) = create_test_db().await;

    let contract = seed_contract(&pool, "bk-pay-1", "HD001").await;
    assert_eq!(contract.status, ContractStatus::Draft);
    let code = code_of(&contract, 0);

    let (p, raw) = payload("9001", &format!("CK {code} thanh toan"), 5_000_000);
    let outcome = deliver(&pool, &p, &raw).await.unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Paid {
            payment_schedule_index: 0,
            installment_number: 1,
            contract_signed: true,
            ..
        }
    ));

    let stored = contract::get_contract(&pool, contract.id).await.unwrap();
    assert_eq!(stored.status, ContractStatus::Signed);
    assert!(stored.signed_at.is_some());
    let item = &stored.payment_schedule[0];
    assert!(item.is_paid());
    assert_eq!(item.transaction_id.as_deref(), Some("9001"));
    // 09:30 at UTC+7.
    assert_eq!(
        item.paid_at.unwrap().to_rfc3339(),
        "2026-10-01T02:30:00+00:00"
    );
    assert!(!stored.payment_schedule[1].is_paid());

    let audit = contract::list_payments(&pool, contract.id).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].payment_code, code);
    assert_eq!(audit[0].gateway_transaction_id, "9001");
    assert_eq!(audit[0].reference_code.as_deref(), Some("FT9001"));
    assert_eq!(audit[0].raw_payload, raw);

    let queued = outbox_db::list_messages(&pool, Some(OutboxStatus::Pending))
        .await
        .unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].kind, "payment_confirmed");
    assert_eq!(queued[0].recipient, "khach@example.com");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn replayed_webhook_is_a_no_op() {
    let (pool, db_name) = create_test_db().await;

    let contract = seed_contract(&pool, "bk-replay", "HD002").await;
    let code = code_of(&contract, 0);
    let (p, raw) = payload("9101", &code, 5_000_000);

    deliver(&pool, &p, &raw).await.unwrap();
    let after_first = contract::get_contract(&pool, contract.id).await.unwrap();

    let outcome = deliver(&pool, &p, &raw).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::AlreadyPaid {
            contract_id: contract.id,
            payment_code: code,
            payment_schedule_index: 0,
            installment_number: 1,
        }
    );

    let after_second = contract::get_contract(&pool, contract.id).await.unwrap();
    assert_eq!(after_second.version, after_first.version);
    assert_eq!(
        contract::list_payments(&pool, contract.id).await.unwrap().len(),
        1
    );
    assert_eq!(outbox_db::list_messages(&pool, None).await.unwrap().len(), 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn concurrent_duplicate_deliveries_record_once() {
    let (pool, db_name) = create_test_db().await;

    let contract = seed_contract(&pool, "bk-dup-delivery", "HD003").await;
    let (p, raw) = payload("9201", &code_of(&contract, 0), 5_000_000);

    let (a, b) = tokio::join!(deliver(&pool, &p, &raw), deliver(&pool, &p, &raw));
    let paid = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Ok(ReconcileOutcome::Paid { .. })))
        .count();
    assert_eq!(paid, 1, "{a:?} / {b:?}");
    assert_eq!(
        contract::list_payments(&pool, contract.id).await.unwrap().len(),
        1
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn later_installment_does_not_change_status() {
    let (pool, db_name) = create_test_db().await;

    let contract = seed_contract(&pool, "bk-second", "HD004").await;
    let (p, raw) = payload("9301", &code_of(&contract, 1), 15_000_000);

    let outcome = deliver(&pool, &p, &raw).await.unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Paid {
            payment_schedule_index: 1,
            installment_number: 2,
            contract_signed: false,
            ..
        }
    ));

    let stored = contract::get_contract(&pool, contract.id).await.unwrap();
    assert_eq!(stored.status, ContractStatus::Draft);
    assert!(stored.signed_at.is_none());
    assert!(stored.payment_schedule[1].is_paid());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn amount_mismatch_is_accepted() {
    let (pool, db_name) = create_test_db().await;

    let contract = seed_contract(&pool, "bk-short", "HD005").await;
    let (p, raw) = payload("9401", &code_of(&contract, 0), 4_000_000);

    let outcome = deliver(&pool, &p, &raw).await.unwrap();
    match outcome {
        ReconcileOutcome::Paid {
            amount,
            scheduled_amount,
            ..
        } => {
            assert_eq!(amount, 4_000_000);
            assert_eq!(scheduled_amount, 5_000_000);
        }
        other => panic!("expected Paid, got {other:?}"),
    }

    let audit = contract::list_payments(&pool, contract.id).await.unwrap();
    assert_eq!(audit[0].amount, 4_000_000);
    assert_eq!(audit[0].scheduled_amount, 5_000_000);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn code_field_is_used_when_content_has_none() {
    let (pool, db_name) = create_test_db().await;

    let contract = seed_contract(&pool, "bk-code-field", "HD006").await;
    let (mut p, raw) = payload("9501", "chuyen tien", 5_000_000);
    p.code = Some(code_of(&contract, 0));

    assert!(matches!(
        deliver(&pool, &p, &raw).await.unwrap(),
        ReconcileOutcome::Paid { .. }
    ));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn outbound_transfers_are_ignored() {
    let (pool, db_name) = create_test_db().await;

    let contract = seed_contract(&pool, "bk-out", "HD007").await;
    let (mut p, raw) = payload("9601", &code_of(&contract, 0), 5_000_000);
    p.transfer_type = "out".to_string();

    let outcome = deliver(&pool, &p, &raw).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Ignored {
            transfer_type: "out".to_string()
        }
    );
    assert!(
        contract::list_payments(&pool, contract.id)
            .await
            .unwrap()
            .is_empty()
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn missing_and_unknown_codes() {
    let (pool, db_name) = create_test_db().await;

    let (p, raw) = payload("9701", "chuyen tien an cuoi", 1_000);
    assert!(matches!(
        deliver(&pool, &p, &raw).await,
        Err(DomainError::Validation(_))
    ));

    let (p, raw) = payload("9702", "PLADIVO-HD999-1-ZZZZZZ", 1_000);
    assert!(matches!(
        deliver(&pool, &p, &raw).await,
        Err(DomainError::NotFound(_))
    ));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn slash_numbered_contract_is_matched_from_content() {
    let (pool, db_name) = create_test_db().await;

    let contract = seed_contract(&pool, "bk-slash", "12/2025/HĐ-SK").await;
    let code = code_of(&contract, 0);
    assert!(code.starts_with("PLADIVO-12/2025/HĐ-SK-1-"), "{code}");

    let (p, raw) = payload("9801", &format!("{code} Thanh toan hop dong"), 5_000_000);
    let outcome = deliver(&pool, &p, &raw).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Paid {
            contract_id: contract.id,
            booking_id: "bk-slash".to_string(),
            payment_code: code.clone(),
            payment_schedule_index: 0,
            installment_number: 1,
            amount: 5_000_000,
            scheduled_amount: 5_000_000,
            contract_signed: true,
        }
    );

    let stored = contract::get_contract(&pool, contract.id).await.unwrap();
    assert_eq!(stored.status, ContractStatus::Signed);
    assert!(stored.payment_schedule[0].is_paid());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn payload_without_transaction_id_is_rejected() {
    let (pool, db_name) = create_test_db().await;

    let contract = seed_contract(&pool, "bk-no-id", "HD011").await;
    let (p, raw) = payload("", &code_of(&contract, 0), 5_000_000);
    assert!(matches!(
        deliver(&pool, &p, &raw).await,
        Err(DomainError::Validation(_))
    ));

    let stored = contract::get_contract(&pool, contract.id).await.unwrap();
    assert!(!stored.payment_schedule[0].is_paid());
    assert_eq!(stored.version, contract.version);
    assert!(contract::list_payments(&pool, contract.id).await.unwrap().is_empty());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn regenerated_code_invalidates_the_old_one() {
    let (pool, db_name) = create_test_db().await;

    let contract = seed_contract(&pool, "bk-regen-pay", "HD008").await;
    let old_code = code_of(&contract, 0);
    let regenerated =
        contract::regenerate_payment_links(&pool, &ContractSettings::default(), contract.id)
            .await
            .unwrap();
    let new_code = code_of(&regenerated, 0);
    assert_ne!(old_code, new_code);

    let (p, raw) = payload("9801", &old_code, 5_000_000);
    assert!(matches!(
        deliver(&pool, &p, &raw).await,
        Err(DomainError::NotFound(_))
    ));

    let (p, raw) = payload("9802", &new_code, 5_000_000);
    assert!(matches!(
        deliver(&pool, &p, &raw).await.unwrap(),
        ReconcileOutcome::Paid { .. }
    ));

    pool.close().await;
    drop_test_db(&db_name).await;
}
