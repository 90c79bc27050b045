//! Message templates.
//!
//! Every template renders to a subject plus matching plain-text and HTML
//! bodies. User-supplied text is HTML-escaped in the HTML body.

use arena_core::mail::{
    ConsolidatedPendingPaymentEmail, FlagRaisedEmail, PaymentRejectedEmail, PaymentVerifiedEmail,
    PendingPaymentEmail, RegistrationLine,
};
use arena_core::types::Money;
use std::fmt::Write as _;

/// A message ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    /// Recipient
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub text: String,
    /// HTML body
    pub html: String,
}

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn amount(currency: &str, money: Money) -> String {
    format!("{currency} {money}")
}

fn line_text(line: &RegistrationLine, currency: &str) -> String {
    let team = line
        .team_name
        .as_deref()
        .map(|t| format!(" (team {t})"))
        .unwrap_or_default();
    format!(
        "{} - {} - {}{team}: {}",
        line.registration_number,
        line.competition_name,
        line.registration_type_name,
        amount(currency, line.amount)
    )
}

fn line_row(line: &RegistrationLine, currency: &str) -> String {
    format!(
        "<tr><td><strong>{}</strong></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
        escape(&line.registration_number),
        escape(&line.competition_name),
        escape(&line.registration_type_name),
        escape(line.team_name.as_deref().unwrap_or("-")),
        escape(&amount(currency, line.amount)),
    )
}

fn layout(heading: &str, color: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>{heading}</title></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
  <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: {color};">{heading}</h2>
    {content}
  </div>
</body>
</html>"#
    )
}

const TABLE_HEAD: &str = "<table style=\"border-collapse: collapse; width: 100%;\">\
<tr><th>Registration</th><th>Competition</th><th>Type</th><th>Team</th><th>Amount</th></tr>";

/// Single-registration pending notice.
#[must_use]
pub fn pending_payment(email: &PendingPaymentEmail) -> RenderedEmail {
    let subject = format!(
        "Registration received: {} ({})",
        email.registration.competition_name, email.registration.registration_number
    );
    let text = format!(
        "Hi {},\n\nWe received your registration and bank slip for order {}.\n\n{}\n\n\
         Your registration is pending until our team verifies the payment. \
         We will email you again once it is confirmed.\n",
        email.customer_name,
        email.order_id,
        line_text(&email.registration, &email.currency),
    );
    let content = format!(
        "<p>Hi {},</p><p>We received your registration and bank slip for order \
         <strong>{}</strong>.</p>{TABLE_HEAD}{}</table>\
         <p>Your registration is pending until our team verifies the payment.</p>",
        escape(&email.customer_name),
        escape(&email.order_id),
        line_row(&email.registration, &email.currency),
    );
    RenderedEmail {
        to: email.to.clone(),
        subject,
        text,
        html: layout("Registration received", "#2563eb", &content),
    }
}

/// Multi-registration pending notice.
#[must_use]
pub fn pending_payment_consolidated(email: &ConsolidatedPendingPaymentEmail) -> RenderedEmail {
    let subject = format!(
        "{} registrations received (order {})",
        email.registrations.len(),
        email.order_id
    );

    let mut text = format!(
        "Hi {},\n\nWe received your bank slip for order {} covering these registrations:\n\n",
        email.customer_name, email.order_id
    );
    for line in &email.registrations {
        let _ = writeln!(text, "- {}", line_text(line, &email.currency));
    }
    let _ = write!(
        text,
        "\nTotal: {}\n\nAll registrations stay pending until our team verifies the payment.\n",
        amount(&email.currency, email.total)
    );

    let rows: String = email
        .registrations
        .iter()
        .map(|line| line_row(line, &email.currency))
        .collect();
    let content = format!(
        "<p>Hi {},</p><p>We received your bank slip for order <strong>{}</strong>.</p>\
         {TABLE_HEAD}{rows}</table><p><strong>Total: {}</strong></p>\
         <p>All registrations stay pending until our team verifies the payment.</p>",
        escape(&email.customer_name),
        escape(&email.order_id),
        escape(&amount(&email.currency, email.total)),
    );

    RenderedEmail {
        to: email.to.clone(),
        subject,
        text,
        html: layout("Registrations received", "#2563eb", &content),
    }
}

/// Payment verified notice.
#[must_use]
pub fn payment_verified(email: &PaymentVerifiedEmail) -> RenderedEmail {
    let subject = format!(
        "Registration confirmed: {} ({})",
        email.registration.competition_name, email.registration.registration_number
    );
    let text = format!(
        "Hi {},\n\nYour payment for order {} has been verified and your registration is confirmed.\n\n{}\n",
        email.customer_name,
        email.order_id,
        line_text(&email.registration, &email.currency),
    );
    let content = format!(
        "<p>Hi {},</p><p>Your payment for order <strong>{}</strong> has been verified \
         and your registration is confirmed.</p>{TABLE_HEAD}{}</table>",
        escape(&email.customer_name),
        escape(&email.order_id),
        line_row(&email.registration, &email.currency),
    );
    RenderedEmail {
        to: email.to.clone(),
        subject,
        text,
        html: layout("Registration confirmed", "#16a34a", &content),
    }
}

/// Payment rejected notice.
#[must_use]
pub fn payment_rejected(email: &PaymentRejectedEmail) -> RenderedEmail {
    let subject = format!(
        "Payment not accepted: {} ({})",
        email.registration.competition_name, email.registration.registration_number
    );
    let text = format!(
        "Hi {},\n\nWe could not verify the payment for order {} (registration {}).\n\n\
         Reason: {}\n\nPlease contact us or register again with a valid payment.\n",
        email.customer_name,
        email.order_id,
        email.registration.registration_number,
        email.reason,
    );
    let content = format!(
        "<p>Hi {},</p><p>We could not verify the payment for order <strong>{}</strong> \
         (registration {}).</p>\
         <div style=\"background-color: #fef2f2; border-left: 4px solid #dc2626; padding: 15px;\">\
         <p style=\"margin: 0;\">{}</p></div>\
         <p>Please contact us or register again with a valid payment.</p>",
        escape(&email.customer_name),
        escape(&email.order_id),
        escape(&email.registration.registration_number),
        escape(&email.reason),
    );
    RenderedEmail {
        to: email.to.clone(),
        subject,
        text,
        html: layout("Payment not accepted", "#dc2626", &content),
    }
}

/// High-severity flag alert for staff.
#[must_use]
pub fn flag_raised(email: &FlagRaisedEmail) -> RenderedEmail {
    let subject = format!(
        "[{}] Post flagged for {}: {}",
        email.severity.as_str().to_uppercase(),
        email.reason,
        email.post_title
    );
    let details = email.details.as_deref().unwrap_or("(none)");
    let text = format!(
        "{} flagged post {} (\"{}\").\n\nReason: {}\nSeverity: {}\nDetails: {details}\n",
        email.reporter_name, email.post_id, email.post_title, email.reason, email.severity,
    );
    let content = format!(
        "<p><strong>{}</strong> flagged the post <em>{}</em>.</p>\
         <ul><li>Reason: {}</li><li>Severity: {}</li><li>Details: {}</li><li>Post id: {}</li></ul>",
        escape(&email.reporter_name),
        escape(&email.post_title),
        email.reason,
        email.severity,
        escape(details),
        email.post_id,
    );
    RenderedEmail {
        to: email.to.clone(),
        subject,
        text,
        html: layout("Post flagged", "#dc2626", &content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::moderation::{FlagReason, FlagSeverity};
    use arena_core::types::PostId;

    fn line(number: &str) -> RegistrationLine {
        RegistrationLine {
            registration_number: number.to_string(),
            competition_name: "Robotics".to_string(),
            registration_type_name: "Team".to_string(),
            team_name: Some("<Bots>".to_string()),
            amount: Money::from_major(5000),
        }
    }

    #[test]
    fn test_consolidated_lists_every_registration() {
        let email = ConsolidatedPendingPaymentEmail {
            to: "ana@example.com".to_string(),
            customer_name: "Ana Silva".to_string(),
            order_id: "ORDER-1".to_string(),
            registrations: vec![line("ABC234"), line("XYZ789")],
            total: Money::from_major(10_000),
            currency: "LKR".to_string(),
        };
        let rendered = pending_payment_consolidated(&email);
        assert_eq!(rendered.to, "ana@example.com");
        assert!(rendered.subject.starts_with("2 registrations"));
        assert!(rendered.text.contains("ABC234") && rendered.text.contains("XYZ789"));
        assert!(rendered.text.contains("LKR 10000.00"));
        assert!(rendered.html.contains("&lt;Bots&gt;"));
        assert!(!rendered.html.contains("<Bots>"));
    }

    #[test]
    fn test_rejection_carries_reason() {
        let email = PaymentRejectedEmail {
            to: "ana@example.com".to_string(),
            customer_name: "Ana".to_string(),
            order_id: "ORDER-1".to_string(),
            registration: line("ABC234"),
            reason: "Slip amount does not match".to_string(),
        };
        let rendered = payment_rejected(&email);
        assert!(rendered.text.contains("Reason: Slip amount does not match"));
        assert!(rendered.html.contains("Slip amount does not match"));
    }

    #[test]
    fn test_flag_alert_subject() {
        let email = FlagRaisedEmail {
            to: "mod@example.com".to_string(),
            post_id: PostId::new(),
            post_title: "Hello".to_string(),
            reporter_name: "Ana".to_string(),
            reason: FlagReason::Harassment,
            severity: FlagSeverity::High,
            details: None,
        };
        let rendered = flag_raised(&email);
        assert_eq!(rendered.subject, "[HIGH] Post flagged for harassment: Hello");
        assert!(rendered.text.contains("Details: (none)"));
    }
}
