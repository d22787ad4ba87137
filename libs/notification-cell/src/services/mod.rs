pub mod dispatch;
pub mod mailer;
pub mod notifications;

pub use dispatch::NotificationDispatchService;
pub use mailer::MailerService;
pub use notifications::NotificationService;
