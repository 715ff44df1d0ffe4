//! smsxmpp core library: SMS <-> XMPP gateway, its two boundaries, and the
//! supervisor that keeps them running. Used by the `smsxmpp` CLI.

pub mod config;
pub mod gateway;
pub mod queue;
pub mod routing;
pub mod shutdown;
pub mod sms;
pub mod supervisor;
pub mod xmpp;
