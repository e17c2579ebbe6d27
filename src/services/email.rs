use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{info, warn};

use crate::config::SmtpConfig;
use crate::models::ticket::{SupplyItem, Ticket, TicketCategory};
use crate::utils::error::AppError;

/// Outbound mail. Built once at startup; when SMTP is not configured
/// every send is skipped with a warning instead of failing, so a dev
/// instance works without a relay.
#[derive(Clone)]
pub struct Mailer {
    smtp: Option<SmtpConfig>,
    admin_email: Option<String>,
}

/// Everything a ticket email needs, assembled by the caller so the
/// mailer itself never touches the database.
pub struct TicketEmail<'a> {
    pub ticket: &'a Ticket,
    pub supplies: &'a [SupplyItem],
    pub convention_name: &'a str,
    pub verify_url: &'a str,
    pub qr_png: Vec<u8>,
}

impl Mailer {
    pub fn new(smtp: Option<SmtpConfig>, admin_email: Option<String>) -> Self {
        Self { smtp, admin_email }
    }

    pub fn is_configured(&self) -> bool {
        self.smtp.is_some()
    }

    /// Send the QR ticket email. Returns `Ok(false)` when mail is not
    /// configured and the send was skipped.
    pub async fn send_ticket_email(&self, email: TicketEmail<'_>) -> Result<bool, AppError> {
        let Some(smtp) = self.smtp.clone() else {
            warn!(to = %email.ticket.email, "SMTP not configured, skipping ticket email");
            return Ok(false);
        };

        let label = ticket_label(email.ticket);
        let html = ticket_html(&email, &label);

        let qr_part = Attachment::new_inline("qrcode".to_string()).body(
            email.qr_png,
            ContentType::parse("image/png")
                .map_err(|e| AppError::InternalServerError(format!("Bad content type: {}", e)))?,
        );

        let message = Message::builder()
            .from(parse_mailbox(&smtp.from_address)?)
            .to(parse_mailbox(&email.ticket.email)?)
            .subject(format!("Your {}", label))
            .multipart(
                MultiPart::related()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html),
                    )
                    .singlepart(qr_part),
            )
            .map_err(|e| {
                AppError::ExternalServiceError(format!("Failed to build email: {}", e))
            })?;

        deliver(smtp, message).await?;
        info!(to = %email.ticket.email, ticket_id = email.ticket.id, "Ticket email sent");
        Ok(true)
    }

    /// Plain HTML send used by the bulk mailer and test sends.
    pub async fn send_html(
        &self,
        to: &str,
        subject: &str,
        html: String,
    ) -> Result<bool, AppError> {
        let Some(smtp) = self.smtp.clone() else {
            warn!(to = %to, "SMTP not configured, skipping email");
            return Ok(false);
        };

        let message = Message::builder()
            .from(parse_mailbox(&smtp.from_address)?)
            .to(parse_mailbox(to)?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)
            .map_err(|e| {
                AppError::ExternalServiceError(format!("Failed to build email: {}", e))
            })?;

        deliver(smtp, message).await?;
        Ok(true)
    }

    /// Best-effort operational alert to the configured admin address.
    /// Never fails the caller; an alert about a failure failing too is
    /// only worth a log line.
    pub async fn send_admin_alert(&self, subject: &str, body: &str, details: &[(&str, String)]) {
        let (Some(smtp), Some(admin_email)) = (self.smtp.clone(), self.admin_email.clone())
        else {
            warn!("Admin alert skipped, mail or admin address not configured");
            return;
        };

        let html = alert_html(subject, body, details);

        let message = Message::builder()
            .from(match parse_mailbox(&smtp.from_address) {
                Ok(mailbox) => mailbox,
                Err(e) => {
                    warn!(error = ?e, "Admin alert skipped, bad from address");
                    return;
                }
            })
            .to(match parse_mailbox(&admin_email) {
                Ok(mailbox) => mailbox,
                Err(e) => {
                    warn!(error = ?e, "Admin alert skipped, bad admin address");
                    return;
                }
            })
            .subject(format!("[Admin Alert] {}", subject))
            .header(ContentType::TEXT_HTML)
            .body(html);

        match message {
            Ok(message) => {
                if let Err(e) = deliver(smtp, message).await {
                    warn!(error = ?e, "Failed to send admin alert");
                }
            }
            Err(e) => warn!(error = %e, "Failed to build admin alert"),
        }
    }
}

fn parse_mailbox(address: &str) -> Result<lettre::message::Mailbox, AppError> {
    address
        .parse()
        .map_err(|e| AppError::ExternalServiceError(format!("Invalid email address: {}", e)))
}

async fn deliver(smtp: SmtpConfig, message: Message) -> Result<(), AppError> {
    let transport = SmtpTransport::starttls_relay(&smtp.host)
        .map_err(|e| AppError::ExternalServiceError(format!("SMTP relay error: {}", e)))?
        .port(smtp.port)
        .credentials(Credentials::new(smtp.username, smtp.password))
        .build();

    tokio::task::spawn_blocking(move || {
        transport
            .send(&message)
            .map(|_| ())
            .map_err(|e| AppError::ExternalServiceError(format!("Failed to send email: {}", e)))
    })
    .await
    .map_err(|e| AppError::ExternalServiceError(format!("Email task failed: {}", e)))?
}

/// Display name for the pass on the email subject and header.
fn ticket_label(ticket: &Ticket) -> String {
    if ticket.category == TicketCategory::Attendee {
        if let Some(subtype) = ticket.subtype_kind() {
            return subtype.label().to_string();
        }
    }
    match ticket.category {
        TicketCategory::Student => "Student Ticket",
        TicketCategory::Exhibitor => "Exhibitor Ticket",
        TicketCategory::Attendee => "Attendee Ticket",
    }
    .to_string()
}

fn ticket_html(email: &TicketEmail<'_>, label: &str) -> String {
    let ticket = email.ticket;

    let teacher_row = match (&ticket.category, &ticket.teacher_name) {
        (TicketCategory::Student, Some(teacher)) => {
            format!("<p><strong>Teacher:</strong> {}</p>", teacher)
        }
        _ => String::new(),
    };

    let supplies_html = supplies_block(ticket.category, email.supplies);

    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
  <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
    <div style="background-color: #4CAF50; color: white; padding: 20px; text-align: center;">
      <h1>{label}</h1>
    </div>
    <div style="padding: 20px; background-color: #f9f9f9;">
      <h2>Hello {name}!</h2>
      <p>Your {convention_name} ticket has been issued.</p>
      <p><strong>Name:</strong> {name}</p>
      {teacher_row}
      <p><strong>Type:</strong> {label}</p>
      {supplies_html}
      <div style="text-align: center; margin: 30px 0;">
        <p><strong>Your Ticket QR Code:</strong></p>
        <img src="cid:qrcode" alt="Ticket QR Code" style="max-width: 300px; border: 2px solid #ddd; padding: 10px; background: white;" />
        <p>Scan this QR code at the convention entrance</p>
      </div>
      <p style="text-align: center;">
        <a href="{verify_url}" style="display: inline-block; padding: 12px 30px; background-color: #4CAF50; color: white; text-decoration: none; border-radius: 5px;">View Ticket Online</a>
      </p>
      <p><strong>Important:</strong> This ticket can only be used once. Please keep it safe and present it at the convention entrance.</p>
    </div>
    <div style="text-align: center; padding: 20px; font-size: 12px; color: #666;">
      <p>This is an automated email. Please do not reply.</p>
    </div>
  </div>
</body>
</html>"#,
        label = label,
        name = ticket.name,
        convention_name = email.convention_name,
        teacher_row = teacher_row,
        supplies_html = supplies_html,
        verify_url = email.verify_url,
    )
}

fn supplies_block(category: TicketCategory, supplies: &[SupplyItem]) -> String {
    if category != TicketCategory::Exhibitor || supplies.is_empty() {
        return String::new();
    }

    let items: String = supplies
        .iter()
        .map(|s| format!("<li>{} (Quantity: {})</li>", s.name, s.quantity))
        .collect();

    format!(
        r#"<div style="background: #e8f5e9; padding: 15px; border-radius: 5px; margin: 20px 0;">
  <h3 style="margin-top: 0; color: #2e7d32;">Supplies Provided:</h3>
  <ul style="margin: 10px 0;">{}</ul>
</div>"#,
        items
    )
}

fn alert_html(subject: &str, body: &str, details: &[(&str, String)]) -> String {
    let detail_rows: String = details
        .iter()
        .map(|(name, value)| format!("<p><strong>{}:</strong> {}</p>", name, value))
        .collect();

    let details_block = if detail_rows.is_empty() {
        String::new()
    } else {
        format!(
            r#"<div style="background: white; padding: 15px; margin: 15px 0; border-radius: 5px; border: 1px solid #ddd;">
  <h3>Details:</h3>
  {}
</div>"#,
            detail_rows
        )
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
  <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
    <div style="background-color: #f44336; color: white; padding: 20px; text-align: center;">
      <h1>Admin Alert</h1>
    </div>
    <div style="padding: 20px; background-color: #fff3e0; border: 1px solid #ffcc80;">
      <h2>{subject}</h2>
      <p>{body}</p>
      {details_block}
      <p><strong>Action Required:</strong> Please review this issue and take appropriate action.</p>
    </div>
    <div style="text-align: center; padding: 20px; font-size: 12px; color: #666;">
      <p>This is an automated notification from the ticketing server.</p>
    </div>
  </div>
</body>
</html>"#,
        subject = subject,
        body = body,
        details_block = details_block,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn ticket(category: TicketCategory, subtype: Option<&str>) -> Ticket {
        Ticket {
            id: 7,
            uuid: Uuid::new_v4(),
            category,
            subtype: subtype.map(|s| s.to_string()),
            name: "Robin Marsh".to_string(),
            teacher_name: Some("Dana Whitfield".to_string()),
            email: "robin@example.com".to_string(),
            status: crate::models::ticket::TicketStatus::Valid,
            is_used: false,
            used_at: None,
            order_id: None,
            email_sent: false,
            email_sent_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn label_prefers_subtype_for_attendees() {
        assert_eq!(
            ticket_label(&ticket(TicketCategory::Attendee, Some("adult_saturday"))),
            "Adult 1-Day Pass (Saturday Only)"
        );
        assert_eq!(
            ticket_label(&ticket(TicketCategory::Attendee, Some("not_a_real_pass"))),
            "Attendee Ticket"
        );
        assert_eq!(
            ticket_label(&ticket(TicketCategory::Student, None)),
            "Student Ticket"
        );
    }

    #[test]
    fn student_email_includes_teacher() {
        let t = ticket(TicketCategory::Student, None);
        let html = ticket_html(
            &TicketEmail {
                ticket: &t,
                supplies: &[],
                convention_name: "Percussion Expo",
                verify_url: "https://example.com/verify/x",
                qr_png: Vec::new(),
            },
            "Student Ticket",
        );
        assert!(html.contains("Dana Whitfield"));
        assert!(html.contains("cid:qrcode"));
        assert!(html.contains("Percussion Expo"));
    }

    #[test]
    fn supplies_only_render_for_exhibitors() {
        let supplies = vec![SupplyItem {
            name: "Table".to_string(),
            quantity: 2,
        }];
        assert!(supplies_block(TicketCategory::Exhibitor, &supplies).contains("Table (Quantity: 2)"));
        assert!(supplies_block(TicketCategory::Student, &supplies).is_empty());
        assert!(supplies_block(TicketCategory::Exhibitor, &[]).is_empty());
    }

    #[test]
    fn unconfigured_mailer_reports_not_configured() {
        let mailer = Mailer::new(None, None);
        assert!(!mailer.is_configured());
    }

    #[test]
    fn alert_html_renders_detail_rows() {
        let html = alert_html(
            "Email delivery failed",
            "The ticket was created but could not be emailed.",
            &[("Recipient", "robin@example.com".to_string())],
        );
        assert!(html.contains("Email delivery failed"));
        assert!(html.contains("<strong>Recipient:</strong> robin@example.com"));
    }
}
