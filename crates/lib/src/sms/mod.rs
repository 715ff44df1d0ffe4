//! SMS boundary: provider API, webhook decoding, and the HTTP server that feeds the gateway.

mod error;
mod event;
mod provider;
mod server;
mod twilio;

pub use error::SmsError;
pub use event::{Reply, RxSms, Sms, SmsEvent, SmsOutcome, SmsStatus};
pub use provider::{select_provider, SmsProvider};
pub use server::{bind_http, router, serve_http, SmsState};
pub use twilio::TwilioProvider;
