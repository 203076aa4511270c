//! Subject and HTML body for each email kind.

use super::{ContractIssued, EmailMessage, PaymentConfirmed};

/// An email ready to hand to a sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

/// Format an amount as Vietnamese dong with dot thousands separators.
pub fn format_vnd(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 4);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    if amount < 0 {
        out.insert(0, '-');
    }
    out.push_str(" VND");
    out
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn render(message: &EmailMessage) -> RenderedEmail {
    match message {
        EmailMessage::ContractIssued(c) => contract_issued(c),
        EmailMessage::PaymentConfirmed(p) => payment_confirmed(p),
    }
}

fn contract_issued(c: &ContractIssued) -> RenderedEmail {
    let mut rows = String::new();
    for line in &c.installments {
        let due = line
            .due_date
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_default();
        let action = if line.paid {
            "Đã thanh toán".to_string()
        } else {
            match &line.payment_link {
                Some(link) => format!("<a href=\"{}\">Mã QR thanh toán</a>", escape(link)),
                None => String::new(),
            }
        };
        let note = line.transfer_content.as_deref().map(escape).unwrap_or_default();
        rows.push_str(&format!(
            "<tr><td>Đợt {}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            line.number,
            escape(&line.description),
            format_vnd(line.amount),
            due,
            note,
            action
        ));
    }

    RenderedEmail {
        subject: format!("Hợp đồng {} - {}", c.contract_number, c.title),
        html: format!(
            "<p>Kính gửi {},</p>\
             <p>Pladivo gửi quý khách hợp đồng <strong>{}</strong> ({}) \
             với tổng giá trị {}.</p>\
             <table><thead><tr><th>Đợt</th><th>Nội dung</th><th>Số tiền</th>\
             <th>Hạn thanh toán</th><th>Nội dung chuyển khoản</th><th></th></tr></thead>\
             <tbody>{}</tbody></table>\
             <p>Vui lòng giữ nguyên nội dung chuyển khoản để hệ thống tự động xác nhận.</p>",
            escape(&c.customer_name),
            escape(&c.contract_number),
            escape(&c.title),
            format_vnd(c.total_value),
            rows
        ),
    }
}

fn payment_confirmed(p: &PaymentConfirmed) -> RenderedEmail {
    let signed = if p.contract_signed {
        "<p>Hợp đồng đã chính thức có hiệu lực.</p>"
    } else {
        ""
    };

    RenderedEmail {
        subject: format!(
            "Xác nhận thanh toán đợt {} - hợp đồng {}",
            p.installment, p.contract_number
        ),
        html: format!(
            "<p>Kính gửi {},</p>\
             <p>Pladivo đã nhận {} cho đợt {} của hợp đồng <strong>{}</strong> \
             lúc {} (mã giao dịch {}).</p>{}",
            escape(&p.customer_name),
            format_vnd(p.amount),
            p.installment,
            escape(&p.contract_number),
            p.paid_at.format("%H:%M %d/%m/%Y UTC"),
            escape(&p.transaction_id),
            signed
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::super::InstallmentLine;
    use super::*;

    #[test]
    fn vnd_grouping() {
        assert_eq!(format_vnd(0), "0 VND");
        assert_eq!(format_vnd(999), "999 VND");
        assert_eq!(format_vnd(1_000), "1.000 VND");
        assert_eq!(format_vnd(4_000_000), "4.000.000 VND");
        assert_eq!(format_vnd(-25_500), "-25.500 VND");
    }

    #[test]
    fn contract_email_lists_links_for_unpaid_installments() {
        let email = render(&EmailMessage::ContractIssued(ContractIssued {
            customer_name: "Nguyen Van A".into(),
            contract_number: "HD001".into(),
            title: "Gala <2026>".into(),
            total_value: 10_000_000,
            installments: vec![
                InstallmentLine {
                    number: 1,
                    description: "Đặt cọc".into(),
                    amount: 4_000_000,
                    due_date: None,
                    paid: true,
                    payment_link: Some("https://img.vietqr.io/image/a.png".into()),
                    transfer_content: None,
                },
                InstallmentLine {
                    number: 2,
                    description: "Còn lại".into(),
                    amount: 6_000_000,
                    due_date: None,
                    paid: false,
                    payment_link: Some("https://img.vietqr.io/image/b.png?x=1&y=2".into()),
                    transfer_content: Some("PLADIVO-HD001-2-ABCDEF".into()),
                },
            ],
        }));

        assert_eq!(email.subject, "Hợp đồng HD001 - Gala <2026>");
        assert!(email.html.contains("Gala &lt;2026&gt;"));
        assert!(email.html.contains("Đã thanh toán"));
        assert!(!email.html.contains("a.png"));
        assert!(email.html.contains("b.png?x=1&amp;y=2"));
        assert!(email.html.contains("PLADIVO-HD001-2-ABCDEF"));
    }

    #[test]
    fn payment_email_mentions_signing_only_when_signed() {
        let mut p = PaymentConfirmed {
            customer_name: "A".into(),
            contract_number: "HD001".into(),
            installment: 2,
            amount: 6_000_000,
            paid_at: "2026-10-19T07:02:37Z".parse().unwrap(),
            transaction_id: "92704".into(),
            contract_signed: false,
        };
        let email = render(&EmailMessage::PaymentConfirmed(p.clone()));
        assert!(email.subject.contains("đợt 2"));
        assert!(email.html.contains("6.000.000 VND"));
        assert!(!email.html.contains("hiệu lực"));

        p.contract_signed = true;
        let email = render(&EmailMessage::PaymentConfirmed(p));
        assert!(email.html.contains("hiệu lực"));
    }
}
