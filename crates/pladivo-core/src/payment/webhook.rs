//! Sepay bank-transfer webhook payload.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Gateway local time (Vietnam, UTC+7).
const GATEWAY_OFFSET_SECS: i32 = 7 * 3600;

/// The notification Sepay posts for every movement on the watched account.
///
/// Field names follow our snake_case convention; Sepay's camelCase names are
/// accepted as aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SepayWebhookPayload {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub gateway: String,
    #[serde(alias = "transactionDate")]
    pub transaction_date: String,
    #[serde(alias = "accountNumber")]
    pub account_number: String,
    pub code: Option<String>,
    pub content: String,
    #[serde(alias = "transferType")]
    pub transfer_type: String,
    #[serde(alias = "transferAmount", alias = "amountIn")]
    pub amount_in: i64,
    #[serde(alias = "amountOut")]
    pub amount_out: i64,
    pub accumulated: i64,
    #[serde(alias = "referenceCode")]
    pub reference_code: Option<String>,
}

impl SepayWebhookPayload {
    /// Only money coming into the account is reconciled.
    pub fn is_inbound(&self) -> bool {
        self.transfer_type.trim().eq_ignore_ascii_case("in")
    }

    /// The transaction timestamp, or `received_at` when the gateway's value
    /// cannot be parsed.
    pub fn transaction_time(&self, received_at: DateTime<Utc>) -> DateTime<Utc> {
        parse_gateway_time(&self.transaction_date).unwrap_or_else(|| {
            if !self.transaction_date.is_empty() {
                tracing::warn!(
                    transaction_id = %self.id,
                    transaction_date = %self.transaction_date,
                    "unparseable webhook transaction date, using receive time"
                );
            }
            received_at
        })
    }
}

/// Parse `YYYY-MM-DD HH:MM:SS` (gateway local time) or RFC 3339.
pub fn parse_gateway_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        let offset = FixedOffset::east_opt(GATEWAY_OFFSET_SECS)?;
        return offset
            .from_local_datetime(&naive)
            .single()
            .map(|t| t.with_timezone(&Utc));
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(i64),
        Null(()),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
        Raw::Null(()) => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn accepts_sepay_camel_case() {
        let payload: SepayWebhookPayload = serde_json::from_value(json!({
            "id": 92704,
            "gateway": "MBBank",
            "transactionDate": "2026-10-19 14:02:37",
            "accountNumber": "0123456789",
            "code": null,
            "content": "PLADIVO-HD001-1-ABC123 Thanh toan",
            "transferType": "in",
            "transferAmount": 4000000,
            "accumulated": 19077000,
            "subAccount": null,
            "referenceCode": "MBVCB.3278907687",
            "description": ""
        }))
        .unwrap();

        assert_eq!(payload.id, "92704");
        assert_eq!(payload.gateway, "MBBank");
        assert_eq!(payload.amount_in, 4_000_000);
        assert_eq!(payload.reference_code.as_deref(), Some("MBVCB.3278907687"));
        assert!(payload.code.is_none());
        assert!(payload.is_inbound());
    }

    #[test]
    fn accepts_snake_case() {
        let payload: SepayWebhookPayload = serde_json::from_value(json!({
            "id": "tx-1",
            "transfer_type": "out",
            "amount_out": 10,
            "content": ""
        }))
        .unwrap();
        assert_eq!(payload.id, "tx-1");
        assert_eq!(payload.amount_out, 10);
        assert!(!payload.is_inbound());
    }

    #[test]
    fn gateway_time_is_vietnam_local() {
        let parsed = parse_gateway_time("2026-10-19 14:02:37").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 10, 19, 7, 2, 37).unwrap());
    }

    #[test]
    fn rfc3339_time() {
        let parsed = parse_gateway_time("2026-10-19T14:02:37+07:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 10, 19, 7, 2, 37).unwrap());
    }

    #[test]
    fn unparseable_time_falls_back_to_receive_time() {
        let received = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let payload = SepayWebhookPayload {
            transaction_date: "yesterday".to_string(),
            ..Default::default()
        };
        assert_eq!(payload.transaction_time(received), received);
    }
}
