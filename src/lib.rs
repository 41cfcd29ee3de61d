pub mod campaign;
pub mod config;
pub mod inliner;
pub mod logging;
pub mod mailer;
pub mod recipients;
pub mod template;

// Re-export commonly used types
pub use campaign::{CampaignRunner, Delivery, RunReport};
pub use config::{Config, ConfigError, LogSettings};
pub use inliner::{inline, InlineAttachment, InlinedDocument};
pub use mailer::{DeliveryError, Mailer, OutgoingEmail, SmtpMailer};
pub use recipients::{RecipientList, RecipientsError};
pub use template::{list_templates, MarkupCompiler, MjmlCompiler, Template, TemplateError};
