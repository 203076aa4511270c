//! Per-installment payment code and VietQR link generation.
//!
//! A payment code has the shape `PLADIVO-{contract_number}-{n}-{SUFFIX}`
//! where `n` is the 1-based installment number and `SUFFIX` is six random
//! uppercase alphanumerics. The code doubles as the bank transfer note, so
//! the customer's bank app carries it back to us in the webhook.

use rand::Rng;
use serde::{Deserialize, Serialize};
use url::Url;

use pladivo_db::models::PaymentScheduleItem;

pub const CODE_PREFIX: &str = "PLADIVO";
pub const SUFFIX_LEN: usize = 6;
const SUFFIX_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const VIETQR_BASE: &str = "https://img.vietqr.io/image/";

/// Receiving bank account rendered into VietQR images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankAccount {
    /// VietQR bank identifier (BIN or short name, e.g. `MB`).
    pub bank_id: String,
    pub account_number: String,
    pub account_name: String,
    /// VietQR image template, e.g. `compact2`.
    pub template: String,
}

impl Default for BankAccount {
    fn default() -> Self {
        Self {
            bank_id: "MB".to_string(),
            account_number: String::new(),
            account_name: String::new(),
            template: "compact2".to_string(),
        }
    }
}

fn random_suffix<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.random_range(0..SUFFIX_CHARSET.len())] as char)
        .collect()
}

/// Generate a fresh code for installment `index` (0-based) of a contract.
/// Each call yields a new random suffix.
pub fn generate_payment_code(contract_number: &str, index: usize) -> String {
    let suffix = random_suffix(&mut rand::rng());
    format!("{CODE_PREFIX}-{}-{}-{suffix}", contract_number.trim(), index + 1)
}

/// The human-readable transfer note shown next to the QR code.
pub fn transfer_content(payment_code: &str, contract_number: &str, index: usize) -> String {
    format!(
        "{payment_code} Thanh toan hop dong {} dot {}",
        contract_number.trim(),
        index + 1
    )
}

/// Build the VietQR image URL for a transfer of `amount` VND with
/// `add_info` as the transfer note.
pub fn build_vietqr_url(bank: &BankAccount, amount: i64, add_info: &str) -> anyhow::Result<String> {
    let path = format!(
        "{}-{}-{}.png",
        bank.bank_id, bank.account_number, bank.template
    );
    let mut url = Url::parse(VIETQR_BASE)?.join(&path)?;
    url.query_pairs_mut()
        .append_pair("amount", &amount.to_string())
        .append_pair("addInfo", add_info)
        .append_pair("accountName", &bank.account_name);
    Ok(url.into())
}

/// Issue a new code, link, QR and transfer note on `item`.
///
/// Returns the previous code, if any, so callers can log the replacement.
pub fn assign_payment_details(
    item: &mut PaymentScheduleItem,
    bank: &BankAccount,
    contract_number: &str,
    index: usize,
) -> anyhow::Result<Option<String>> {
    let code = generate_payment_code(contract_number, index);
    let link = build_vietqr_url(bank, item.amount, &code)?;

    item.transfer_content = Some(transfer_content(&code, contract_number, index));
    item.payment_link = Some(link.clone());
    item.qr_code = Some(link);
    Ok(item.payment_code.replace(code))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn bank() -> BankAccount {
        BankAccount {
            bank_id: "MB".to_string(),
            account_number: "0123456789".to_string(),
            account_name: "CONG TY PLADIVO".to_string(),
            template: "compact2".to_string(),
        }
    }

    #[test]
    fn code_shape() {
        let code = generate_payment_code("HD001", 0);
        let (head, suffix) = code.rsplit_once('-').unwrap();
        assert_eq!(head, "PLADIVO-HD001-1");
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()),
            "{suffix}"
        );
    }

    #[test]
    fn installment_number_is_one_based() {
        let code = generate_payment_code("12/2025/HĐ-SK", 2);
        assert!(code.starts_with("PLADIVO-12/2025/HĐ-SK-3-"), "{code}");
    }

    #[test]
    fn codes_differ_between_calls() {
        let a = generate_payment_code("HD001", 0);
        let b = generate_payment_code("HD001", 0);
        assert_ne!(a, b);
    }

    #[test]
    fn suffix_is_deterministic_for_a_seeded_rng() {
        let a = random_suffix(&mut StdRng::seed_from_u64(7));
        let b = random_suffix(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn vietqr_url_encodes_query_values() {
        let url = build_vietqr_url(&bank(), 4_000_000, "PLADIVO-12/2025/HĐ-SK-1-ABC123").unwrap();
        assert!(
            url.starts_with("https://img.vietqr.io/image/MB-0123456789-compact2.png?"),
            "{url}"
        );
        assert!(url.contains("amount=4000000"), "{url}");
        assert!(url.contains("accountName=CONG+TY+PLADIVO"), "{url}");
        assert!(url.contains("addInfo=PLADIVO-12%2F2025%2FH%C4%90-SK-1-ABC123"), "{url}");
    }

    #[test]
    fn assign_fills_every_payment_field() {
        let mut item = PaymentScheduleItem {
            amount: 6_000_000,
            ..Default::default()
        };
        let previous = assign_payment_details(&mut item, &bank(), "HD009", 1).unwrap();
        assert!(previous.is_none());

        let code = item.payment_code.clone().unwrap();
        assert!(code.starts_with("PLADIVO-HD009-2-"));
        assert_eq!(item.payment_link, item.qr_code);
        assert_eq!(
            item.transfer_content.as_deref(),
            Some(format!("{code} Thanh toan hop dong HD009 dot 2").as_str())
        );

        let replaced = assign_payment_details(&mut item, &bank(), "HD009", 1).unwrap();
        assert_eq!(replaced.as_deref(), Some(code.as_str()));
        assert_ne!(item.payment_code.as_deref(), Some(code.as_str()));
    }
}
