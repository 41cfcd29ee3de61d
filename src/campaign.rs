use std::path::PathBuf;

use futures::future::join_all;
use log::{debug, error, info, trace};

use crate::inliner::{inline, InlinedDocument};
use crate::mailer::{DeliveryError, Mailer, OutgoingEmail};
use crate::recipients::RecipientList;
use crate::template::{MarkupCompiler, Template, TemplateError};

/// Outcome of one send. `Ok` carries the message id.
#[derive(Debug)]
pub struct Delivery {
    pub template: String,
    pub recipient: String,
    pub outcome: Result<String, DeliveryError>,
}

#[derive(Debug, Default)]
pub struct RunReport {
    /// Templates that compiled and were sent out.
    pub templates: usize,
    /// Templates dropped because they failed to compile.
    pub skipped_templates: Vec<String>,
    pub deliveries: Vec<Delivery>,
}

impl RunReport {
    pub fn sent(&self) -> usize {
        self.deliveries.iter().filter(|d| d.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.deliveries.iter().filter(|d| d.outcome.is_err()).count()
    }
}

/// Sends each template to every recipient, one template at a time.
pub struct CampaignRunner<'a> {
    compiler: &'a dyn MarkupCompiler,
    mailer: &'a dyn Mailer,
    base_dir: PathBuf,
}

impl<'a> CampaignRunner<'a> {
    /// `base_dir` is where image references in the templates are resolved.
    pub fn new(compiler: &'a dyn MarkupCompiler, mailer: &'a dyn Mailer, base_dir: PathBuf) -> Self {
        Self {
            compiler,
            mailer,
            base_dir,
        }
    }

    /// Compile `template` and rewrite its local images into inline parts.
    pub fn prepare(&self, template: &Template) -> Result<InlinedDocument, TemplateError> {
        let html = self.compiler.compile(template)?;
        let document = inline(&html, &self.base_dir);
        debug!(
            "Template {} compiled ({} bytes, {} inline images)",
            template.name,
            document.html.len(),
            document.attachments.len()
        );
        Ok(document)
    }

    /// Run every template in order. A template that fails to compile is
    /// logged and skipped; delivery failures are recorded per recipient.
    pub async fn run(&self, templates: &[Template], recipients: &RecipientList) -> RunReport {
        let mut report = RunReport::default();

        for template in templates {
            let document = match self.prepare(template) {
                Ok(document) => document,
                Err(e) => {
                    error!("Skipping template {}: {}", template.name, e);
                    report.skipped_templates.push(template.name.clone());
                    continue;
                }
            };

            info!(
                "Sending template {} to {} recipients",
                template.name,
                recipients.len()
            );
            let deliveries = self.dispatch(template, &document, recipients).await;
            report.templates += 1;
            report.deliveries.extend(deliveries);
        }

        report
    }

    /// Send `document` to all recipients at once and wait for every send to
    /// settle. One failure never cancels the others.
    async fn dispatch(
        &self,
        template: &Template,
        document: &InlinedDocument,
        recipients: &RecipientList,
    ) -> Vec<Delivery> {
        let sends = recipients.iter().map(|recipient| async move {
            trace!("Start process for {}", recipient);

            let email = OutgoingEmail {
                to: recipient,
                subject: &template.name,
                html: &document.html,
                attachments: &document.attachments,
            };
            let outcome = self.mailer.send(&email).await;

            match &outcome {
                Ok(message_id) => info!("Email sent to {}: {}", recipient, message_id),
                Err(e) => error!("Error while sending mail to {}: {}", recipient, e),
            }

            Delivery {
                template: template.name.clone(),
                recipient: recipient.clone(),
                outcome,
            }
        });

        join_all(sends).await
    }
}
