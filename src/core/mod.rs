//! Controller core: facade, dispatcher and role state machines

pub mod ap;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod scanner;
pub mod service;
pub mod sta;
pub mod timeout;
pub mod types;
