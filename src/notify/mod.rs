pub mod gateway;
pub mod mailer;
pub mod worker;
