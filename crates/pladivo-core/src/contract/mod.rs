//! Contracts and their embedded payment schedules.
//!
//! A booking has at most one contract. Saving a contract is an upsert keyed
//! by booking id; on update the new schedule is merged with the stored one
//! by position so already-issued payment codes survive edits that do not
//! affect them.

use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use pladivo_db::models::{ContractParty, ContractStatus, EventContract, Payment, PaymentScheduleItem};
use pladivo_db::queries::contracts::{self as db, ContractWrite};
use pladivo_db::queries::payments as payment_db;

use crate::error::{DomainError, DomainResult, is_unique_violation};
use crate::notify::{self, DEFAULT_MAX_ATTEMPTS, EmailMessage};
use crate::payment::code::{BankAccount, assign_payment_details};

/// Settings shared by contract and payment operations.
#[derive(Debug, Clone)]
pub struct ContractSettings {
    pub bank: BankAccount,
    pub email_max_attempts: i32,
}

impl Default for ContractSettings {
    fn default() -> Self {
        Self {
            bank: BankAccount::default(),
            email_max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// One installment as submitted by staff.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleItemInput {
    pub amount: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "due_date")]
    pub due_date: Option<NaiveDate>,
}

/// Contract content as submitted by staff. Keys may be camelCase or the
/// snake_case names the stored contract is returned with.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractInput {
    #[serde(alias = "booking_id")]
    pub booking_id: String,
    #[serde(alias = "contract_number")]
    pub contract_number: String,
    #[serde(default)]
    pub title: String,
    #[serde(alias = "party_a")]
    pub party_a: ContractParty,
    /// Defaults to the schedule total.
    #[serde(default, alias = "total_value")]
    pub total_value: Option<i64>,
    #[serde(alias = "payment_schedule")]
    pub payment_schedule: Vec<ScheduleItemInput>,
    #[serde(default, alias = "created_by")]
    pub created_by: Option<String>,
    /// Queue the contract email after saving.
    #[serde(default, alias = "send_email")]
    pub send_email: bool,
}

/// Result of [`upsert_contract`].
#[derive(Debug, Clone)]
pub struct Upserted {
    pub contract: EventContract,
    pub created: bool,
}

fn validate(input: &ContractInput) -> DomainResult<()> {
    if input.booking_id.trim().is_empty() {
        return Err(DomainError::validation("Thiếu mã booking"));
    }
    if input.contract_number.trim().is_empty() {
        return Err(DomainError::validation("Thiếu số hợp đồng"));
    }
    if input.payment_schedule.is_empty() {
        return Err(DomainError::validation("Lịch thanh toán không được để trống"));
    }
    if let Some(n) = input.payment_schedule.iter().position(|i| i.amount <= 0) {
        return Err(DomainError::validation(format!(
            "Số tiền đợt {} phải lớn hơn 0",
            n + 1
        )));
    }
    let has_email = input
        .party_a
        .email
        .as_deref()
        .is_some_and(|e| !e.trim().is_empty());
    if !has_email {
        return Err(DomainError::validation("Thiếu email khách hàng (bên A)"));
    }
    Ok(())
}

/// Merge the submitted schedule with the stored one, position by position.
///
/// - Paid installments are kept as stored.
/// - Unpaid installments keep their payment details when the contract
///   number and amount are unchanged; otherwise they get fresh ones.
/// - New positions get fresh details.
/// - Dropping a paid installment is rejected.
pub fn merge_schedule(
    existing: Option<&EventContract>,
    input: &ContractInput,
    bank: &BankAccount,
) -> DomainResult<Vec<PaymentScheduleItem>> {
    let contract_number = input.contract_number.trim();
    let stored: &[PaymentScheduleItem] = match existing {
        Some(c) => &c.payment_schedule,
        None => &[],
    };
    let same_number = existing.is_some_and(|c| c.contract_number == contract_number);

    if let Some(n) = stored
        .iter()
        .skip(input.payment_schedule.len())
        .position(PaymentScheduleItem::is_paid)
    {
        return Err(DomainError::validation(format!(
            "Không thể xóa đợt {} đã thanh toán",
            input.payment_schedule.len() + n + 1
        )));
    }

    let mut merged = Vec::with_capacity(input.payment_schedule.len());
    for (index, submitted) in input.payment_schedule.iter().enumerate() {
        let old = stored.get(index);

        if let Some(old) = old.filter(|o| o.is_paid()) {
            if old.amount != submitted.amount {
                tracing::warn!(
                    contract_number,
                    installment = index + 1,
                    stored = old.amount,
                    submitted = submitted.amount,
                    "ignoring amount change on a paid installment"
                );
            }
            merged.push(old.clone());
            continue;
        }

        let mut item = PaymentScheduleItem {
            amount: submitted.amount,
            description: submitted.description.trim().to_string(),
            due_date: submitted.due_date,
            ..Default::default()
        };

        let reusable = old.filter(|o| {
            same_number && o.amount == submitted.amount && o.payment_code.is_some()
        });
        match reusable {
            Some(old) => {
                item.payment_code = old.payment_code.clone();
                item.payment_link = old.payment_link.clone();
                item.qr_code = old.qr_code.clone();
                item.transfer_content = old.transfer_content.clone();
            }
            None => {
                assign_payment_details(&mut item, bank, contract_number, index)?;
            }
        }
        merged.push(item);
    }

    Ok(merged)
}

/// Create or update the contract of `input.booking_id`.
pub async fn upsert_contract(
    pool: &PgPool,
    settings: &ContractSettings,
    input: &ContractInput,
) -> DomainResult<Upserted> {
    validate(input)?;
    let booking_id = input.booking_id.trim();

    let existing = db::get_contract_by_booking(pool, booking_id).await?;
    if let Some(c) = existing
        .as_ref()
        .filter(|c| matches!(c.status, ContractStatus::Completed | ContractStatus::Cancelled))
    {
        return Err(DomainError::invalid_state(format!(
            "Không thể sửa hợp đồng ở trạng thái '{}'",
            c.status
        )));
    }

    let schedule = merge_schedule(existing.as_ref(), input, &settings.bank)?;
    let write = ContractWrite {
        booking_id: booking_id.to_string(),
        contract_number: input.contract_number.trim().to_string(),
        title: input.title.trim().to_string(),
        party_a: input.party_a.clone(),
        total_value: input
            .total_value
            .unwrap_or_else(|| schedule.iter().map(|i| i.amount).sum()),
        payment_schedule: schedule,
        created_by: input.created_by.clone(),
    };

    let mut tx = pool.begin().await?;

    let (contract, created) = match &existing {
        None => match db::insert_contract(&mut *tx, &write).await {
            Ok(c) => (c, true),
            Err(e) if is_unique_violation(&e) => {
                return Err(DomainError::conflict(
                    "Số hợp đồng hoặc booking đã tồn tại",
                ));
            }
            Err(e) => return Err(e.into()),
        },
        Some(old) => match db::update_contract_content(&mut *tx, old.id, old.version, &write).await
        {
            Ok(Some(c)) => (c, false),
            Ok(None) => {
                return Err(DomainError::conflict(
                    "Hợp đồng đã được cập nhật bởi người khác, vui lòng tải lại",
                ));
            }
            Err(e) if is_unique_violation(&e) => {
                return Err(DomainError::conflict("Số hợp đồng đã tồn tại"));
            }
            Err(e) => return Err(e.into()),
        },
    };

    let contract = if input.send_email {
        queue_contract_email(&mut tx, settings, contract).await?
    } else {
        contract
    };

    tx.commit().await?;

    tracing::info!(
        contract_id = %contract.id,
        booking_id,
        contract_number = %contract.contract_number,
        installments = contract.payment_schedule.len(),
        created,
        "contract saved"
    );

    Ok(Upserted { contract, created })
}

/// Enqueue the contract email and move a draft contract to `sent`.
async fn queue_contract_email(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    settings: &ContractSettings,
    contract: EventContract,
) -> DomainResult<EventContract> {
    let recipient = contract
        .party_a
        .email
        .clone()
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| DomainError::validation("Thiếu email khách hàng (bên A)"))?;

    notify::enqueue_email(
        &mut **tx,
        &recipient,
        &EmailMessage::contract_issued(&contract),
        settings.email_max_attempts,
    )
    .await?;

    if contract.status != ContractStatus::Draft {
        return Ok(contract);
    }

    db::update_contract_status(&mut **tx, contract.id, contract.version, ContractStatus::Sent)
        .await?
        .ok_or_else(|| {
            DomainError::conflict("Hợp đồng đã được cập nhật bởi người khác, vui lòng tải lại")
        })
}

pub async fn get_contract(pool: &PgPool, contract_id: Uuid) -> DomainResult<EventContract> {
    db::get_contract(pool, contract_id)
        .await?
        .ok_or_else(|| DomainError::not_found("Không tìm thấy hợp đồng"))
}

pub async fn get_contract_by_booking(pool: &PgPool, booking_id: &str) -> DomainResult<EventContract> {
    db::get_contract_by_booking(pool, booking_id)
        .await?
        .ok_or_else(|| DomainError::not_found("Không tìm thấy hợp đồng"))
}

/// Payment audit rows of a contract.
pub async fn list_payments(pool: &PgPool, contract_id: Uuid) -> DomainResult<Vec<Payment>> {
    get_contract(pool, contract_id).await?;
    Ok(payment_db::list_payments_for_contract(pool, contract_id).await?)
}

/// Issue new codes and links for every unpaid installment. Previously
/// issued links for those installments stop matching.
pub async fn regenerate_payment_links(
    pool: &PgPool,
    settings: &ContractSettings,
    contract_id: Uuid,
) -> DomainResult<EventContract> {
    let contract = get_contract(pool, contract_id).await?;

    let mut schedule = contract.payment_schedule.0.clone();
    let mut reissued = 0;
    for (index, item) in schedule.iter_mut().enumerate() {
        if item.is_paid() {
            continue;
        }
        let old = assign_payment_details(item, &settings.bank, &contract.contract_number, index)?;
        reissued += 1;
        tracing::info!(
            contract_id = %contract.id,
            installment = index + 1,
            old_code = old.as_deref().unwrap_or("-"),
            new_code = item.payment_code.as_deref().unwrap_or("-"),
            "payment code reissued"
        );
    }

    if reissued == 0 {
        return Ok(contract);
    }

    db::update_payment_schedule(pool, contract.id, contract.version, &schedule, contract.status, None)
        .await?
        .ok_or_else(|| {
            DomainError::conflict("Hợp đồng đã được cập nhật bởi người khác, vui lòng tải lại")
        })
}

/// Queue the contract email again. A draft contract becomes `sent`.
pub async fn resend_contract_email(
    pool: &PgPool,
    settings: &ContractSettings,
    contract_id: Uuid,
) -> DomainResult<EventContract> {
    let contract = get_contract(pool, contract_id).await?;

    let mut tx = pool.begin().await?;
    let contract = queue_contract_email(&mut tx, settings, contract).await?;
    tx.commit().await?;

    tracing::info!(contract_id = %contract.id, status = %contract.status, "contract email queued");
    Ok(contract)
}
