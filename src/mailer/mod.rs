//! Mail transport seam.
//!
//! The actual sending facility is an external collaborator; the backend
//! only renders templates and hands them to a [`Mailer`]. The default
//! implementation logs the mail instead of sending it, which is also what
//! keeps the alert sweep testable.

use crate::errors::AppError;
use crate::models::Bag;
use crate::status::display_date;

/// Outbound mail transport.
pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError>;
}

/// Transport that writes mails to the log. Stands in where no real
/// transport is wired up.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        tracing::info!(recipient = to, subject = subject, "mail: {}", body);
        Ok(())
    }
}

/// Substitute the bag placeholders into a mail body: `{nom}`,
/// `{categorie}`, `{date}` (last control) and `{echeance}` (next control),
/// dates in DD/MM/YYYY form.
pub fn render_body(template: &str, bag: &Bag) -> String {
    template
        .replace("{nom}", &bag.name)
        .replace("{categorie}", &bag.category)
        .replace("{date}", &display_date(&bag.last_control))
        .replace("{echeance}", &display_date(&bag.next_control))
}

/// Subjects only substitute `{nom}`.
pub fn render_subject(template: &str, bag: &Bag) -> String {
    template.replace("{nom}", &bag.name)
}
